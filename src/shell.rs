use crate::chords::{ChordLibrary, ChordShape};
use crate::error::{FretError, Result};
use crate::listener::{Connection, EventSink, MidiBackend, EVENT_QUEUE_CAPACITY};
use crate::practice::{ChordQueue, ChordVerdict, ChordVerifier, PracticeLibrary};
use crate::render::render;
use crate::tuning::{standard_tuning, Tuning};
use crate::types::*;
use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error, info, trace, warn};
use std::collections::BTreeSet;
use std::thread::{self, JoinHandle};

/// The bounded queue every producer (device callbacks, console, web page)
/// sends into and only the shell reads from.
pub fn event_channel() -> (Sender<ShellEvent>, Receiver<ShellEvent>) {
    bounded(EVENT_QUEUE_CAPACITY)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellState {
    Disconnected,
    Connected,
}

struct PracticeRun {
    collection: String,
    queue: ChordQueue,
    completed: usize,
}

/// The shell owns all mutable application state: the connection, the set
/// of pressed notes and the practice selection.
///
/// It consumes `ShellEvent`s from a single channel, so MIDI callbacks and
/// user commands are applied one at a time on the shell's own thread, and
/// after every change it renders the fretboard and sends a `FretboardFrame`
/// to each downstream consumer.
///
/// # Sessions
///
/// Every connect and disconnect bumps `session`. A connection's events
/// carry the session they were opened under; events from any other session
/// are dropped, so notes still queued when the user disconnects never
/// reach the pressed set.
pub struct Shell {
    events_tx: Sender<ShellEvent>,
    events_rx: Receiver<ShellEvent>,
    frame_txs: Vec<Sender<FretboardFrame>>,
    backend: Box<dyn MidiBackend>,
    tuning: Tuning,
    chords: ChordLibrary,
    library: PracticeLibrary,
    clock: SessionClock,
    connection: Option<Box<dyn Connection>>,
    session: u64,
    devices: Vec<DeviceDescriptor>,
    pressed: BTreeSet<Note>,
    selection: Option<ChordShape>,
    practice: Option<PracticeRun>,
    notice: Option<String>,
    seq: u64,
}

impl Shell {
    pub fn new(
        backend: Box<dyn MidiBackend>,
        events_tx: Sender<ShellEvent>,
        events_rx: Receiver<ShellEvent>,
        frame_txs: Vec<Sender<FretboardFrame>>,
    ) -> Self {
        let chords = ChordLibrary::standard();
        let library = PracticeLibrary::builtin(&chords);
        Self {
            events_tx,
            events_rx,
            frame_txs,
            backend,
            tuning: standard_tuning(),
            chords,
            library,
            clock: SessionClock::new(),
            connection: None,
            session: 0,
            devices: Vec::new(),
            pressed: BTreeSet::new(),
            selection: None,
            practice: None,
            notice: None,
            seq: 0,
        }
    }

    /// Replace the built-in practice collections.
    pub fn with_practice_library(mut self, library: PracticeLibrary) -> Self {
        self.library = library;
        self
    }

    /// Consume events until a `Quit` command. Releases the connection on the
    /// way out.
    pub fn run(&mut self) {
        info!("Shell running (backend: {})", self.backend.name());
        self.publish();

        let rx = self.events_rx.clone();
        for event in rx.iter() {
            if !self.handle(event) {
                break;
            }
        }

        if self.connection.is_some() {
            self.disconnect();
            self.publish();
        }
        info!("Shell shutting down after {} frames", self.seq);
    }

    /// Apply one event and publish the result. Returns false on `Quit`.
    pub fn handle(&mut self, event: ShellEvent) -> bool {
        match event {
            ShellEvent::Midi { session, event } => {
                if !self.is_current(session) {
                    trace!("Dropping stale event from session {}: {}", session, event);
                    return true;
                }
                debug!("{}", event);
                match event.kind {
                    NoteKind::On => {
                        self.pressed.insert(event.note);
                    }
                    NoteKind::Off => {
                        self.pressed.remove(&event.note);
                    }
                }
                self.check_practice();
            }

            ShellEvent::DeviceError { session, reason } => {
                if !self.is_current(session) {
                    return true;
                }
                let device = self
                    .connection
                    .as_ref()
                    .map(|c| c.device().name.clone())
                    .unwrap_or_default();
                let err = FretError::DeviceUnavailable { device, reason };
                warn!("{}", err);
                self.disconnect();
                self.notice = Some(err.to_string());
            }

            ShellEvent::Command(command) => {
                self.notice = None;
                if command == Command::Quit {
                    info!("Quit requested");
                    return false;
                }
                if let Err(e) = self.command(command) {
                    warn!("{}", e);
                    self.notice = Some(e.to_string());
                }
            }
        }
        self.publish();
        true
    }

    fn command(&mut self, command: Command) -> Result<()> {
        match command {
            Command::ListDevices => {
                let devices = self.refresh_devices()?;
                if devices.is_empty() {
                    return Err(FretError::NoDevicesFound);
                }
                let names: Vec<String> = devices.iter().map(|d| d.to_string()).collect();
                self.notice = Some(names.join("  "));
            }
            Command::Connect(selector) => self.connect(selector)?,
            Command::Disconnect => {
                if self.connection.is_some() {
                    self.disconnect();
                    self.notice = Some("Disconnected".into());
                } else {
                    self.notice = Some("Not connected".into());
                }
            }
            Command::SelectChord(Some(name)) => {
                let shape = self.chords.lookup(&name)?.clone();
                info!("Practice chord: {} ({})", shape.name, shape.fingering());
                self.end_practice();
                self.selection = Some(shape);
            }
            Command::SelectChord(None) => {
                self.end_practice();
                self.selection = None;
            }
            Command::Practice(name) => self.start_practice(&name)?,
            Command::Skip => {
                if self.practice.is_none() {
                    self.notice = Some("No practice running".into());
                } else {
                    self.advance_practice(false);
                }
            }
            Command::ListChords => self.notice = Some(self.chords.names().join(", ")),
            Command::ListCollections => self.notice = Some(self.library.names().join(", ")),
            Command::Help => self.notice = Some(COMMAND_HELP.to_string()),
            Command::Quit => {}
        }
        Ok(())
    }

    // ─── Connection ─────────────────────────────────────────────────────────

    fn is_current(&self, session: u64) -> bool {
        self.connection.is_some() && session == self.session
    }

    fn refresh_devices(&mut self) -> Result<Vec<DeviceDescriptor>> {
        self.devices = self.backend.list_devices()?;
        debug!("{} MIDI inputs", self.devices.len());
        Ok(self.devices.clone())
    }

    fn resolve_device(&mut self, selector: &DeviceSelector) -> Result<DeviceDescriptor> {
        match selector {
            DeviceSelector::First => self
                .refresh_devices()?
                .into_iter()
                .next()
                .ok_or(FretError::NoDevicesFound),
            DeviceSelector::Index(i) => {
                if self.devices.is_empty() {
                    self.refresh_devices()?;
                }
                self.devices
                    .iter()
                    .find(|d| d.index == *i)
                    .cloned()
                    .ok_or_else(|| FretError::DeviceUnavailable {
                        device: format!("#{}", i),
                        reason: "no device with that index (try 'devices')".into(),
                    })
            }
            DeviceSelector::Name(name) => {
                let wanted = name.to_lowercase();
                self.refresh_devices()?
                    .into_iter()
                    .find(|d| d.name.to_lowercase().contains(&wanted))
                    .ok_or_else(|| FretError::DeviceUnavailable {
                        device: name.clone(),
                        reason: "no matching device".into(),
                    })
            }
        }
    }

    /// A selector that matches nothing leaves the current connection alone.
    fn connect(&mut self, selector: DeviceSelector) -> Result<()> {
        let device = self.resolve_device(&selector)?;
        if self.connection.is_some() {
            self.disconnect();
        }

        self.session += 1;
        let sink = EventSink::new(self.session, self.events_tx.clone());
        let connection = self.backend.connect(&device, sink)?;

        info!("Connected: {} (session {})", device, self.session);
        self.notice = Some(format!("Connected to {}", device.name));
        self.connection = Some(connection);
        Ok(())
    }

    /// Release the port and forget everything it said.
    fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            let device = connection.device().clone();
            drop(connection);
            info!("Disconnected: {} ({} notes released)", device, self.pressed.len());
        }
        self.session += 1;
        self.pressed.clear();
    }

    // ─── Practice ───────────────────────────────────────────────────────────

    fn start_practice(&mut self, name: &str) -> Result<()> {
        let queue: ChordQueue = self.library.collection(name)?.iter().cloned().collect();
        let collection = self
            .library
            .canonical_name(name)
            .unwrap_or(name)
            .to_string();
        info!("Practicing '{}': {} chords", collection, queue.len());
        self.practice = Some(PracticeRun {
            collection,
            queue,
            completed: 0,
        });
        self.select_queue_head();
        Ok(())
    }

    fn end_practice(&mut self) {
        if let Some(run) = self.practice.take() {
            info!("Practice '{}' ended after {} chords", run.collection, run.completed);
        }
    }

    fn select_queue_head(&mut self) {
        let head = self.practice.as_ref().and_then(|run| run.queue.peek());
        self.selection = head.and_then(|name| self.chords.lookup(name).ok()).cloned();
    }

    /// Move to the next chord in the queue; `played` counts it as completed.
    fn advance_practice(&mut self, played: bool) {
        let Some(run) = self.practice.as_mut() else {
            return;
        };
        let done = run.queue.pop();
        if played {
            run.completed += 1;
        }
        if run.queue.is_empty() {
            let msg = format!("Finished '{}': {} chords played", run.collection, run.completed);
            info!("{}", msg);
            self.notice = Some(msg);
            self.practice = None;
            self.selection = None;
            return;
        }
        self.select_queue_head();
        if let (Some(done), Some(next)) = (done, &self.selection) {
            let outcome = if played { "✓" } else { "skipped" };
            self.notice = Some(format!("{} {} → next: {}", done, outcome, next.name));
        }
    }

    fn check_practice(&mut self) {
        if self.practice.is_none() {
            return;
        }
        if let Some(verdict) = self.verdict() {
            if verdict.complete {
                info!("Chord {} played", verdict.chord);
                self.advance_practice(true);
            }
        }
    }

    fn verdict(&self) -> Option<ChordVerdict> {
        let shape = self.selection.as_ref()?;
        match ChordVerifier::new(&self.tuning).verify(shape, &self.pressed) {
            Ok(v) => Some(v),
            Err(e) => {
                error!("Cannot verify {}: {}", shape.name, e);
                None
            }
        }
    }

    // ─── Output ─────────────────────────────────────────────────────────────

    /// Render the current state and send it downstream. A render failure
    /// skips this frame only.
    fn publish(&mut self) {
        let view = match render(&self.tuning, &self.pressed, self.selection.as_ref()) {
            Ok(view) => view,
            Err(e) => {
                error!("Render aborted: {}", e);
                self.notice = Some(e.to_string());
                return;
            }
        };

        self.seq += 1;
        let frame = FretboardFrame {
            seq: self.seq,
            timestamp_us: self.clock.now_us(),
            status: self.status(),
            devices: self.devices.clone(),
            chords: self.chords.names().into_iter().map(String::from).collect(),
            collections: self.library.names(),
            chord: self.selection.as_ref().map(|s| s.name.to_string()),
            pressed: self.pressed.iter().copied().collect(),
            view,
            verdict: self.verdict(),
            practice: self.practice_progress(),
            notice: self.notice.clone(),
        };
        trace!("{}", frame);

        for tx in &self.frame_txs {
            let _ = tx.send(frame.clone());
        }
    }

    // ─── Inspection ─────────────────────────────────────────────────────────

    pub fn state(&self) -> ShellState {
        if self.connection.is_some() {
            ShellState::Connected
        } else {
            ShellState::Disconnected
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        match &self.connection {
            Some(c) => ConnectionStatus::Connected(c.device().clone()),
            None => ConnectionStatus::Disconnected,
        }
    }

    pub fn pressed(&self) -> &BTreeSet<Note> {
        &self.pressed
    }

    pub fn selection(&self) -> Option<&ChordShape> {
        self.selection.as_ref()
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn practice_progress(&self) -> Option<PracticeProgress> {
        self.practice.as_ref().map(|run| PracticeProgress {
            collection: run.collection.clone(),
            completed: run.completed,
            remaining: run.queue.len(),
        })
    }
}

/// A shell running on its own thread.
pub struct ShellHandle {
    tx: Sender<ShellEvent>,
    thread: JoinHandle<()>,
}

impl ShellHandle {
    /// Build the shell on a new "shell" thread and run it there. Device
    /// connections are opened and closed on that thread only.
    pub fn spawn<F>(tx: Sender<ShellEvent>, build: F) -> Result<Self>
    where
        F: FnOnce() -> Shell + Send + 'static,
    {
        let thread = thread::Builder::new()
            .name("shell".into())
            .spawn(move || build().run())?;
        Ok(Self { tx, thread })
    }

    pub fn sender(&self) -> Sender<ShellEvent> {
        self.tx.clone()
    }

    /// Ask the shell to quit and wait until it has released its device.
    pub fn quit(self) {
        let _ = self.tx.send(ShellEvent::Command(Command::Quit));
        self.join();
    }

    /// Wait for the shell to stop on its own.
    pub fn join(self) {
        if self.thread.join().is_err() {
            error!("Shell thread panicked");
        }
    }
}
