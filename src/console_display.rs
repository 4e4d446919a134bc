use crate::render::{CellMark, FretboardView};
use crate::tuning::note_name;
use crate::types::*;
use crossbeam_channel::Receiver;
use std::io::{self, Write};

/// Redraws a text fretboard in the terminal for every frame.
pub struct ConsoleDisplay {
    rx: Receiver<FretboardFrame>,
    clear: bool,
}

impl ConsoleDisplay {
    pub fn new(rx: Receiver<FretboardFrame>) -> Self {
        Self { rx, clear: true }
    }

    /// Append frames instead of clearing the screen (for piping to a file).
    pub fn scrolling(mut self) -> Self {
        self.clear = false;
        self
    }

    pub fn run(&self) {
        let mut stdout = io::stdout();
        for frame in self.rx.iter() {
            if self.clear {
                // Clear screen and move cursor home
                print!("\x1b[2J\x1b[H");
            }
            print!("{}", render_text(&frame));
            let _ = stdout.flush();
        }
    }
}

fn cell_glyph(mark: CellMark) -> &'static str {
    match mark {
        CellMark::Empty => "─",
        CellMark::Active => "●",
        CellMark::Target => "○",
        CellMark::Both => "◉",
    }
}

/// The whole dashboard as text. High E string on top, as a player sees it.
pub fn render_text(frame: &FretboardFrame) -> String {
    let mut out = String::new();
    let rule = "═".repeat(78);

    out.push_str(&format!("╔{}╗\n", rule));
    out.push_str("  FRET MONITOR\n");
    out.push_str(&format!("╠{}╣\n", rule));

    match &frame.status {
        ConnectionStatus::Disconnected => out.push_str("  Device: (disconnected)\n"),
        ConnectionStatus::Connected(d) => out.push_str(&format!("  Device: {}\n", d)),
    }
    let chord = frame.chord.as_deref().unwrap_or("none");
    match &frame.practice {
        Some(p) => out.push_str(&format!(
            "  Chord:  {}   [{}: {} played, {} to go]\n",
            chord, p.collection, p.completed, p.remaining
        )),
        None => out.push_str(&format!("  Chord:  {}\n", chord)),
    }
    out.push('\n');

    out.push_str(&fret_numbers());
    out.push_str(&board_rows(&frame.view));

    out.push('\n');
    let held: Vec<String> = frame.pressed.iter().map(|&n| note_name(n)).collect();
    out.push_str(&format!(
        "  Held:   {}\n",
        if held.is_empty() { "-".to_string() } else { held.join(" ") }
    ));
    if !frame.view.unplaced.is_empty() {
        let off: Vec<String> = frame.view.unplaced.iter().map(|&n| note_name(n)).collect();
        out.push_str(&format!("  Off the neck: {}\n", off.join(" ")));
    }
    if let Some(v) = &frame.verdict {
        let state = if v.complete { "✓" } else { " " };
        out.push_str(&format!("  Match:  {:>3.0}% {}\n", v.accuracy * 100.0, state));
        for problem in v.errors(&frame.view.labels) {
            out.push_str(&format!("          - {}\n", problem));
        }
    }
    if let Some(notice) = &frame.notice {
        for line in notice.lines() {
            out.push_str(&format!("  » {}\n", line));
        }
    }
    out.push_str(&format!("╚{}╝\n", rule));
    out
}

fn fret_numbers() -> String {
    let mut line = String::from("       ");
    for fret in 0..=FRET_COUNT {
        if fret == 0 || fret % 3 == 0 || fret == 12 {
            line.push_str(&format!("{:<3}", fret));
        } else {
            line.push_str("   ");
        }
    }
    line.truncate(line.trim_end().len());
    line.push('\n');
    line
}

fn board_rows(view: &FretboardView) -> String {
    let mut out = String::new();
    for string in (0..STRING_COUNT).rev() {
        out.push_str(&format!("  {:>3} ", view.labels[string]));
        for fret in 0..=FRET_COUNT {
            let glyph = cell_glyph(view.mark(Position::new(string, fret)));
            // open strings sit left of the nut
            let sep = if fret == 0 { "║" } else { "│" };
            out.push_str(&format!("{}{}{}", glyph, if fret == 0 { "" } else { "─" }, sep));
        }
        out.push('\n');
    }
    out
}
