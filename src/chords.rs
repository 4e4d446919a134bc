use crate::error::{FretError, Result};
use crate::types::*;
use serde::Serialize;

/// A named fingering: one optional fret per string, low E first.
/// `None` means the string is not played.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChordShape {
    pub name: &'static str,
    pub frets: [Option<u8>; STRING_COUNT],
}

impl ChordShape {
    /// Played positions, ordered by string.
    pub fn positions(&self) -> Vec<Position> {
        self.frets
            .iter()
            .enumerate()
            .filter_map(|(string, fret)| fret.map(|f| Position::new(string, f)))
            .collect()
    }

    pub fn contains(&self, pos: Position) -> bool {
        pos.string < STRING_COUNT && self.frets[pos.string] == Some(pos.fret)
    }

    /// Tab-style fingering, e.g. "x32010".
    pub fn fingering(&self) -> String {
        self.frets
            .iter()
            .map(|f| match f {
                None => "x".to_string(),
                Some(f) if *f < 10 => f.to_string(),
                Some(f) => format!("({})", f),
            })
            .collect()
    }
}

const X: Option<u8> = None;

const fn f(fret: u8) -> Option<u8> {
    Some(fret)
}

/// Built-in open and barre shapes. Adding a chord means adding a row.
static CHORD_TABLE: [ChordShape; 10] = [
    ChordShape {
        name: "E Major",
        frets: [f(0), f(2), f(2), f(1), f(0), f(0)],
    },
    ChordShape {
        name: "A Major",
        frets: [X, f(0), f(2), f(2), f(2), f(0)],
    },
    ChordShape {
        name: "D Major",
        frets: [X, X, f(0), f(2), f(3), f(2)],
    },
    ChordShape {
        name: "G Major",
        frets: [f(3), f(2), f(0), f(0), f(0), f(3)],
    },
    ChordShape {
        name: "C Major",
        frets: [X, f(3), f(2), f(0), f(1), f(0)],
    },
    ChordShape {
        name: "F Major",
        frets: [f(1), f(3), f(3), f(2), f(1), f(1)],
    },
    ChordShape {
        name: "Em",
        frets: [f(0), f(2), f(2), f(0), f(0), f(0)],
    },
    ChordShape {
        name: "Am",
        frets: [X, f(0), f(2), f(2), f(1), f(0)],
    },
    ChordShape {
        name: "Dm",
        frets: [X, X, f(0), f(2), f(3), f(1)],
    },
    ChordShape {
        name: "Gm",
        frets: [f(3), f(5), f(5), f(3), f(3), f(3)],
    },
];

/// Immutable name → shape table.
#[derive(Debug, Clone)]
pub struct ChordLibrary {
    shapes: &'static [ChordShape],
}

impl ChordLibrary {
    pub fn standard() -> Self {
        Self {
            shapes: &CHORD_TABLE,
        }
    }

    /// Exact name first, then an ASCII case-insensitive match.
    pub fn lookup(&self, name: &str) -> Result<&ChordShape> {
        let name = name.trim();
        self.shapes
            .iter()
            .find(|c| c.name == name)
            .or_else(|| self.shapes.iter().find(|c| c.name.eq_ignore_ascii_case(name)))
            .ok_or_else(|| FretError::UnknownChord(name.to_string()))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.shapes.iter().map(|c| c.name).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChordShape> {
        self.shapes.iter()
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}

impl Default for ChordLibrary {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuning::standard_tuning;

    const DOCUMENTED: [&str; 10] = [
        "E Major", "A Major", "D Major", "G Major", "C Major", "F Major", "Em", "Am", "Dm", "Gm",
    ];

    #[test]
    fn test_every_documented_chord_resolves() {
        let lib = ChordLibrary::standard();
        let tuning = standard_tuning();
        for name in DOCUMENTED {
            let shape = lib.lookup(name).unwrap();
            let positions = shape.positions();
            assert!(!positions.is_empty(), "{} has no positions", name);
            assert!(positions.len() <= STRING_COUNT);
            for p in positions {
                assert!(p.fret <= FRET_COUNT);
                tuning.position_to_note(p).unwrap();
            }
        }
        assert_eq!(lib.len(), DOCUMENTED.len());
    }

    #[test]
    fn test_unknown_chord() {
        let lib = ChordLibrary::standard();
        let err = lib.lookup("H Major");
        assert!(matches!(err, Err(FretError::UnknownChord(n)) if n == "H Major"));
    }

    #[test]
    fn test_case_insensitive_fallback() {
        let lib = ChordLibrary::standard();
        assert_eq!(lib.lookup("e major").unwrap().name, "E Major");
        assert_eq!(lib.lookup(" AM ").unwrap().name, "Am");
    }

    #[test]
    fn test_e_major_includes_open_low_e() {
        let e = ChordLibrary::standard().lookup("E Major").unwrap().clone();
        assert!(e.contains(Position::new(0, 0)));
        assert_eq!(e.fingering(), "022100");
    }

    #[test]
    fn test_muted_strings_are_not_positions() {
        let d = ChordLibrary::standard().lookup("D Major").unwrap().clone();
        assert_eq!(d.fingering(), "xx0232");
        assert_eq!(d.positions().len(), 4);
        assert!(!d.contains(Position::new(0, 0)));
    }

    #[test]
    fn test_barre_fingering_past_ninth_fret() {
        let shape = ChordShape {
            name: "test",
            frets: [f(10), X, X, X, X, X],
        };
        assert_eq!(shape.fingering(), "(10)xxxxx");
    }
}
