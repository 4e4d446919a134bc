use crate::chords::ChordShape;
use crate::error::Result;
use crate::tuning::Tuning;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const CELLS_PER_STRING: usize = FRET_COUNT as usize + 1;

/// What a single fretboard cell shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellMark {
    Empty,
    /// A currently pressed note.
    Active,
    /// Part of the practice chord.
    Target,
    /// Pressed and part of the practice chord.
    Both,
}

impl CellMark {
    fn with_active(self) -> Self {
        match self {
            CellMark::Empty | CellMark::Active => CellMark::Active,
            CellMark::Target | CellMark::Both => CellMark::Both,
        }
    }

    fn with_target(self) -> Self {
        match self {
            CellMark::Empty | CellMark::Target => CellMark::Target,
            CellMark::Active | CellMark::Both => CellMark::Both,
        }
    }

    pub fn is_active(self) -> bool {
        matches!(self, CellMark::Active | CellMark::Both)
    }

    pub fn is_target(self) -> bool {
        matches!(self, CellMark::Target | CellMark::Both)
    }
}

/// The full 6 × 25 grid, string 0 (low E) first, fret 0 first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FretboardView {
    pub cells: [[CellMark; CELLS_PER_STRING]; STRING_COUNT],
    /// Open-string names, for labelling rows.
    pub labels: [String; STRING_COUNT],
    /// Pressed notes that no string can reach.
    pub unplaced: Vec<Note>,
}

impl FretboardView {
    pub fn empty(tuning: &Tuning) -> Self {
        Self {
            cells: [[CellMark::Empty; CELLS_PER_STRING]; STRING_COUNT],
            labels: tuning.string_labels(),
            unplaced: Vec::new(),
        }
    }

    /// Mark at `pos`; `Empty` for positions off the board.
    pub fn mark(&self, pos: Position) -> CellMark {
        if !pos.is_valid() {
            return CellMark::Empty;
        }
        self.cells[pos.string][pos.fret as usize]
    }

    pub fn positions_where(&self, pred: impl Fn(CellMark) -> bool) -> Vec<Position> {
        let mut out = Vec::new();
        for (string, row) in self.cells.iter().enumerate() {
            for (fret, &mark) in row.iter().enumerate() {
                if pred(mark) {
                    out.push(Position::new(string, fret as u8));
                }
            }
        }
        out
    }

    pub fn active_positions(&self) -> Vec<Position> {
        self.positions_where(CellMark::is_active)
    }

    pub fn target_positions(&self) -> Vec<Position> {
        self.positions_where(CellMark::is_target)
    }
}

/// Compute the overlay grid for the pressed notes and the practice chord.
///
/// Each pressed note is drawn once. When one of its candidate positions is
/// part of the target shape that one is used, otherwise the candidate
/// nearest the nut (lower string on a tie). A target position outside the
/// board fails the whole render with `InvalidPosition`.
pub fn render(
    tuning: &Tuning,
    pressed: &BTreeSet<Note>,
    target: Option<&ChordShape>,
) -> Result<FretboardView> {
    let mut view = FretboardView::empty(tuning);

    if let Some(shape) = target {
        for pos in shape.positions() {
            tuning.position_to_note(pos)?;
            let cell = &mut view.cells[pos.string][pos.fret as usize];
            *cell = cell.with_target();
        }
    }

    for &note in pressed {
        let candidates = tuning.note_to_positions(note);
        let chosen = candidates
            .iter()
            .find(|p| target.map_or(false, |t| t.contains(**p)))
            .or_else(|| candidates.iter().min_by_key(|p| (p.fret, p.string)));
        match chosen {
            Some(pos) => {
                let cell = &mut view.cells[pos.string][pos.fret as usize];
                *cell = cell.with_active();
            }
            None => view.unplaced.push(note),
        }
    }

    Ok(view)
}
