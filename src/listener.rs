use crate::error::Result;
use crate::midi::parse_note_message;
use crate::types::*;
use crossbeam_channel::{SendTimeoutError, Sender, TrySendError};
use log::{error, trace, warn};
use std::time::Duration;

/// Capacity of the shell's event queue. When the shell falls this far behind,
/// new note-ons are dropped with a warning.
pub const EVENT_QUEUE_CAPACITY: usize = 1024;

/// How long a note-off or device error may wait for room in a full queue.
/// Bounded so a shell that is closing this connection is never deadlocked
/// against the callback thread it is joining.
pub const RELEASE_SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// Delivers events from one device connection to the shell.
///
/// Every event is tagged with the session id the shell handed out when it
/// opened the connection, so anything still queued after a disconnect is
/// recognised as stale and discarded.
#[derive(Clone)]
pub struct EventSink {
    session: u64,
    tx: Sender<ShellEvent>,
}

impl EventSink {
    pub fn new(session: u64, tx: Sender<ShellEvent>) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    /// Parse raw MIDI bytes and forward note messages. Returns false once the
    /// shell has gone away.
    pub fn raw(&self, bytes: &[u8]) -> bool {
        match parse_note_message(bytes) {
            Some(event) => self.note(event),
            None => {
                trace!("ignoring MIDI message {:02X?}", bytes);
                true
            }
        }
    }

    pub fn note(&self, event: NoteEvent) -> bool {
        self.send(ShellEvent::Midi {
            session: self.session,
            event,
        })
    }

    /// Report that the device failed after connecting.
    pub fn device_error(&self, reason: impl Into<String>) -> bool {
        self.send(ShellEvent::DeviceError {
            session: self.session,
            reason: reason.into(),
        })
    }

    /// Note-ons are dropped when the queue is full. Note-offs and errors
    /// wait for room: losing one would leave a note held or a dead device
    /// looking connected.
    fn send(&self, event: ShellEvent) -> bool {
        let droppable = matches!(
            event,
            ShellEvent::Midi { event: NoteEvent { kind: NoteKind::On, .. }, .. }
        );
        if droppable {
            return match self.tx.try_send(event) {
                Ok(()) => true,
                Err(TrySendError::Full(ev)) => {
                    warn!("Event queue full, dropping {:?}", ev);
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            };
        }
        match self.tx.send_timeout(event, RELEASE_SEND_TIMEOUT) {
            Ok(()) => true,
            Err(SendTimeoutError::Timeout(ev)) => {
                error!("Event queue stuck for {:?}, dropping {:?}", RELEASE_SEND_TIMEOUT, ev);
                true
            }
            Err(SendTimeoutError::Disconnected(_)) => false,
        }
    }
}

/// An open input port. Dropping it releases the port and stops delivery;
/// no event from it reaches the sink after `drop` returns.
pub trait Connection {
    fn device(&self) -> &DeviceDescriptor;
}

/// A source of MIDI input devices.
pub trait MidiBackend: Send {
    fn name(&self) -> &str;

    /// Devices present right now. May be empty.
    fn list_devices(&self) -> Result<Vec<DeviceDescriptor>>;

    /// Open `device` and start forwarding its note messages to `sink`.
    /// Fails with `DeviceUnavailable` when the port cannot be opened or no
    /// longer matches the listing `device` came from.
    fn connect(
        &mut self,
        device: &DeviceDescriptor,
        sink: EventSink,
    ) -> Result<Box<dyn Connection>>;
}
