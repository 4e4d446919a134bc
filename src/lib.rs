pub mod chords;
pub mod console_display;
pub mod console_input;
pub mod error;
pub mod listener;
pub mod midi;
pub mod practice;
pub mod render;
pub mod shell;
pub mod simulator;
pub mod tuning;
pub mod types;
pub mod ws_server;

#[cfg(feature = "midi")]
pub mod midi_input;

#[cfg(feature = "gui")]
pub mod webview_app;
