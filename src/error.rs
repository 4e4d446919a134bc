use std::io;
use thiserror::Error;

/// Everything that can go wrong between the MIDI port and the fretboard.
///
/// None of these end the process: the shell logs them and shows them to the
/// user as a notice. `InvalidPosition` aborts only the render cycle that hit it.
#[derive(Debug, Error)]
pub enum FretError {
    #[error("no MIDI input devices found")]
    NoDevicesFound,

    #[error("MIDI device '{device}' unavailable: {reason}")]
    DeviceUnavailable { device: String, reason: String },

    #[error("unknown chord '{0}'")]
    UnknownChord(String),

    #[error("invalid fretboard position: string {string}, fret {fret}")]
    InvalidPosition { string: usize, fret: u8 },

    #[error("unknown practice collection '{0}'")]
    UnknownCollection(String),

    #[error("unknown command '{0}' (try 'help')")]
    UnknownCommand(String),

    #[error("MIDI backend error: {0}")]
    Backend(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FretError>;
