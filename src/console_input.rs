use crate::types::*;
use crossbeam_channel::Sender;
use log::{debug, info, warn};
use std::io::BufRead;

/// Reads commands one per line and queues them for the shell.
///
/// Blank lines are ignored and unparseable lines are logged and skipped.
/// End of input counts as `quit`.
pub struct ConsoleInput<R> {
    reader: R,
    tx: Sender<ShellEvent>,
}

impl<R: BufRead> ConsoleInput<R> {
    pub fn new(reader: R, tx: Sender<ShellEvent>) -> Self {
        Self { reader, tx }
    }

    /// Returns the number of commands queued.
    pub fn run(self) -> usize {
        let mut sent = 0;
        for line in self.reader.lines() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    warn!("stdin read failed: {}", e);
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            let command = match line.parse::<Command>() {
                Ok(c) => c,
                Err(e) => {
                    warn!("{}", e);
                    continue;
                }
            };
            debug!("console: {:?}", command);
            let quit = command == Command::Quit;
            if self.tx.send(ShellEvent::Command(command)).is_err() {
                return sent;
            }
            sent += 1;
            if quit {
                return sent;
            }
        }
        info!("Console input closed");
        if self.tx.send(ShellEvent::Command(Command::Quit)).is_ok() {
            sent += 1;
        }
        sent
    }
}
