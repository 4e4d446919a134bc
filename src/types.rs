use crate::error::FretError;
use crate::practice::ChordVerdict;
use crate::render::FretboardView;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

// ─── Instrument ─────────────────────────────────────────────────────────────

/// MIDI note number, 0–127.
pub type Note = u8;

pub const STRING_COUNT: usize = 6;
/// Highest fret on the board. Fret 0 is the open string, so each string has
/// `FRET_COUNT + 1` cells.
pub const FRET_COUNT: u8 = 24;

/// Open-string MIDI notes, low E first: E2 A2 D3 G3 B3 E4.
pub const STANDARD_TUNING: [Note; STRING_COUNT] = [40, 45, 50, 55, 59, 64];

/// A string/fret cell on the board. String 0 is the low E string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub string: usize,
    pub fret: u8,
}

impl Position {
    pub fn new(string: usize, fret: u8) -> Self {
        Self { string, fret }
    }

    pub fn is_valid(&self) -> bool {
        self.string < STRING_COUNT && self.fret <= FRET_COUNT
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}f{}", self.string, self.fret)
    }
}

// ─── MIDI input ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoteKind {
    On,
    Off,
}

/// A note message normalized from raw MIDI bytes.
/// Note-on with velocity 0 arrives here as `NoteKind::Off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub channel: u8,
    pub note: Note,
    pub velocity: u8,
    pub kind: NoteKind,
}

impl NoteEvent {
    pub fn on(note: Note, velocity: u8) -> Self {
        Self {
            channel: 0,
            note,
            velocity,
            kind: NoteKind::On,
        }
    }

    pub fn off(note: Note) -> Self {
        Self {
            channel: 0,
            note,
            velocity: 0,
            kind: NoteKind::Off,
        }
    }
}

impl fmt::Display for NoteEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            NoteKind::On => "on ",
            NoteKind::Off => "off",
        };
        write!(
            f,
            "ch{:<2} note {} {:>3} vel {:>3}",
            self.channel + 1,
            kind,
            self.note,
            self.velocity
        )
    }
}

/// An input port as enumerated by a backend. `index` is only meaningful
/// against the listing it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub index: usize,
    pub name: String,
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.index, self.name)
    }
}

// ─── Inter-thread messages ──────────────────────────────────────────────────

/// How the user picks a device to connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSelector {
    /// First device in a fresh listing.
    First,
    Index(usize),
    /// Case-insensitive substring of the port name.
    Name(String),
}

/// User commands, from the console line reader or the web page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ListDevices,
    Connect(DeviceSelector),
    Disconnect,
    /// `None` clears the practice chord.
    SelectChord(Option<String>),
    Practice(String),
    Skip,
    ListChords,
    ListCollections,
    Help,
    Quit,
}

pub const COMMAND_HELP: &str = "\
devices                  list MIDI inputs
connect [index|name]     connect to a device (first device if omitted)
disconnect               release the current device
chord <name>|none        select the practice chord
practice <collection>    practice a chord collection in order
skip                     advance the practice queue
chords | collections     list what can be selected
quit";

impl FromStr for Command {
    type Err = FretError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((w, r)) => (w, r.trim()),
            None => (line, ""),
        };
        let cmd = match word.to_ascii_lowercase().as_str() {
            "devices" | "list" => Command::ListDevices,
            "connect" if rest.is_empty() => Command::Connect(DeviceSelector::First),
            "connect" => match rest.parse::<usize>() {
                Ok(i) => Command::Connect(DeviceSelector::Index(i)),
                Err(_) => Command::Connect(DeviceSelector::Name(rest.to_string())),
            },
            "disconnect" => Command::Disconnect,
            "chord" if rest.is_empty() || rest.eq_ignore_ascii_case("none") => {
                Command::SelectChord(None)
            }
            "chord" => Command::SelectChord(Some(rest.to_string())),
            "practice" if !rest.is_empty() => Command::Practice(rest.to_string()),
            "skip" | "next" => Command::Skip,
            "chords" => Command::ListChords,
            "collections" => Command::ListCollections,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            _ => return Err(FretError::UnknownCommand(line.to_string())),
        };
        Ok(cmd)
    }
}

/// Everything the shell consumes, on one channel.
#[derive(Debug, Clone)]
pub enum ShellEvent {
    /// A note from the connection opened as `session`.
    Midi { session: u64, event: NoteEvent },
    /// The connection opened as `session` failed after connecting.
    DeviceError { session: u64, reason: String },
    Command(Command),
}

// ─── Rendered snapshot ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "device")]
pub enum ConnectionStatus {
    Disconnected,
    Connected(DeviceDescriptor),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PracticeProgress {
    pub collection: String,
    pub completed: usize,
    pub remaining: usize,
}

/// Complete state snapshot, produced by the shell after every change and
/// consumed by the console display and the web page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FretboardFrame {
    pub seq: u64,
    pub timestamp_us: u64,
    pub status: ConnectionStatus,
    pub devices: Vec<DeviceDescriptor>,
    pub chords: Vec<String>,
    pub collections: Vec<String>,
    pub chord: Option<String>,
    pub pressed: Vec<Note>,
    pub view: FretboardView,
    pub verdict: Option<ChordVerdict>,
    pub practice: Option<PracticeProgress>,
    pub notice: Option<String>,
}

impl fmt::Display for FretboardFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match &self.status {
            ConnectionStatus::Disconnected => "disconnected".to_string(),
            ConnectionStatus::Connected(d) => format!("connected {}", d.name),
        };
        write!(
            f,
            "#{} t={}µs {} chord={} pressed={:?}",
            self.seq,
            self.timestamp_us,
            status,
            self.chord.as_deref().unwrap_or("-"),
            self.pressed,
        )
    }
}

// ─── Session clock ──────────────────────────────────────────────────────────

/// Monotonic clock for the monitoring session.
#[derive(Clone)]
pub struct SessionClock {
    start: Instant,
}

impl SessionClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn now_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}
