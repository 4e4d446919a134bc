use crate::error::{FretError, Result};
use crate::types::*;
use serde::{Deserialize, Serialize};

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Open-string pitches of the instrument, lowest string first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tuning {
    pub name: String,
    pub open_strings: [Note; STRING_COUNT],
}

impl Tuning {
    /// Every position on the board that sounds `note`, ordered by string.
    ///
    /// The same pitch is usually reachable on several strings, so this is a
    /// set, not a single answer. Empty when the note is out of range on every
    /// string.
    pub fn note_to_positions(&self, note: Note) -> Vec<Position> {
        self.open_strings
            .iter()
            .enumerate()
            .filter_map(|(string, &open)| {
                let fret = note as i16 - open as i16;
                if (0..=FRET_COUNT as i16).contains(&fret) {
                    Some(Position::new(string, fret as u8))
                } else {
                    None
                }
            })
            .collect()
    }

    /// Pitch sounded at `pos`.
    pub fn position_to_note(&self, pos: Position) -> Result<Note> {
        if !pos.is_valid() {
            return Err(FretError::InvalidPosition {
                string: pos.string,
                fret: pos.fret,
            });
        }
        Ok(self.open_strings[pos.string] + pos.fret)
    }

    /// Lowest and highest playable notes.
    pub fn range(&self) -> (Note, Note) {
        let lo = self.open_strings.iter().copied().min().unwrap_or(0);
        let hi = self.open_strings.iter().copied().max().unwrap_or(0);
        (lo, hi.saturating_add(FRET_COUNT))
    }

    pub fn string_labels(&self) -> [String; STRING_COUNT] {
        self.open_strings.map(note_name)
    }
}

impl Default for Tuning {
    fn default() -> Self {
        standard_tuning()
    }
}

/// Scientific pitch name: 40 → "E2", 61 → "C#4".
pub fn note_name(note: Note) -> String {
    let octave = (note / 12) as i32 - 1;
    format!("{}{}", NOTE_NAMES[(note % 12) as usize], octave)
}

/// Six-string standard tuning: E2 A2 D3 G3 B3 E4.
pub fn standard_tuning() -> Tuning {
    Tuning {
        name: "Standard E".to_string(),
        open_strings: STANDARD_TUNING,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuning() -> Tuning {
        standard_tuning()
    }

    #[test]
    fn test_open_strings() {
        let t = tuning();
        for (s, &open) in STANDARD_TUNING.iter().enumerate() {
            assert_eq!(t.position_to_note(Position::new(s, 0)).unwrap(), open);
        }
    }

    #[test]
    fn test_round_trip_membership_on_whole_board() {
        let t = tuning();
        for string in 0..STRING_COUNT {
            for fret in 0..=FRET_COUNT {
                let p = Position::new(string, fret);
                let note = t.position_to_note(p).unwrap();
                assert!(
                    t.note_to_positions(note).contains(&p),
                    "{} (note {}) missing from its own candidates",
                    p,
                    note
                );
            }
        }
    }

    #[test]
    fn test_low_e_only_on_one_string() {
        assert_eq!(tuning().note_to_positions(40), vec![Position::new(0, 0)]);
    }

    #[test]
    fn test_shared_pitch_enumerates_all_strings() {
        // E4 (64): 24th fret low E, 19 on A, 14 on D, 9 on G, 5 on B, open high E
        let got = tuning().note_to_positions(64);
        assert_eq!(
            got,
            vec![
                Position::new(0, 24),
                Position::new(1, 19),
                Position::new(2, 14),
                Position::new(3, 9),
                Position::new(4, 5),
                Position::new(5, 0),
            ]
        );
    }

    #[test]
    fn test_out_of_range_notes_are_empty() {
        let t = tuning();
        let (lo, hi) = t.range();
        assert_eq!((lo, hi), (40, 88));
        for note in (0..lo).chain(hi + 1..=127) {
            assert!(t.note_to_positions(note).is_empty(), "note {} should be unreachable", note);
        }
    }

    #[test]
    fn test_invalid_positions_rejected() {
        let t = tuning();
        assert!(matches!(
            t.position_to_note(Position::new(6, 0)),
            Err(FretError::InvalidPosition { string: 6, fret: 0 })
        ));
        assert!(matches!(
            t.position_to_note(Position::new(0, 25)),
            Err(FretError::InvalidPosition { string: 0, fret: 25 })
        ));
    }

    #[test]
    fn test_note_names() {
        assert_eq!(note_name(40), "E2");
        assert_eq!(note_name(60), "C4");
        assert_eq!(note_name(61), "C#4");
        assert_eq!(note_name(0), "C-1");
        let labels = tuning().string_labels();
        assert_eq!(labels, ["E2", "A2", "D3", "G3", "B3", "E4"].map(String::from));
    }
}
