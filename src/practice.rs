use crate::chords::{ChordLibrary, ChordShape};
use crate::error::{FretError, Result};
use crate::tuning::{note_name, Tuning};
use crate::types::*;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::fs;
use std::path::Path;

// ─── Collections ────────────────────────────────────────────────────────────

/// Named, ordered lists of chords to practice.
#[derive(Debug, Clone, Default)]
pub struct PracticeLibrary {
    collections: Vec<(String, Vec<String>)>,
}

impl PracticeLibrary {
    /// Collections available without any file.
    pub fn builtin(chords: &ChordLibrary) -> Self {
        let all: Vec<String> = chords.names().into_iter().map(String::from).collect();
        let majors = all.iter().filter(|n| n.ends_with("Major")).cloned().collect();
        let minors = all.iter().filter(|n| n.ends_with('m')).cloned().collect();
        Self {
            collections: vec![
                ("Open Majors".to_string(), majors),
                ("Minors".to_string(), minors),
                ("All Chords".to_string(), all),
            ],
        }
    }

    /// Load collections from a JSON file shaped as
    /// `[["Collection", ["E Major", "Am", ...]], ...]`.
    ///
    /// Chords missing from `chords` are dropped with a warning; a collection
    /// left with nothing in it is dropped entirely.
    pub fn load(path: &Path, chords: &ChordLibrary) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let raw: Vec<(String, Vec<String>)> = serde_json::from_str(&text)?;
        info!("Practice library {:?}: {} collections", path, raw.len());
        Ok(Self::from_raw(raw, chords))
    }

    fn from_raw(raw: Vec<(String, Vec<String>)>, chords: &ChordLibrary) -> Self {
        let mut collections = Vec::with_capacity(raw.len());
        for (name, requested) in raw {
            let (known, missing): (Vec<String>, Vec<String>) = requested
                .into_iter()
                .partition(|c| chords.lookup(c).is_ok());
            // store the canonical table names
            let known: Vec<String> = known
                .iter()
                .filter_map(|c| chords.lookup(c).ok())
                .map(|shape| shape.name.to_string())
                .collect();
            if known.is_empty() {
                error!("Collection '{}' has no known chords (requested {:?})", name, missing);
                continue;
            }
            if !missing.is_empty() {
                warn!("Collection '{}' skips unknown chords {:?}", name, missing);
            }
            collections.push((name, known));
        }
        Self { collections }
    }

    /// Exact name, then ASCII case-insensitive.
    pub fn collection(&self, name: &str) -> Result<&[String]> {
        let name = name.trim();
        self.collections
            .iter()
            .find(|(n, _)| n == name)
            .or_else(|| self.collections.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)))
            .map(|(_, chords)| chords.as_slice())
            .ok_or_else(|| FretError::UnknownCollection(name.to_string()))
    }

    /// Canonical spelling of a collection name.
    pub fn canonical_name(&self, name: &str) -> Option<&str> {
        let name = name.trim();
        self.collections
            .iter()
            .map(|(n, _)| n.as_str())
            .find(|n| n.eq_ignore_ascii_case(name))
    }

    pub fn names(&self) -> Vec<String> {
        self.collections.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Unique chords across all collections.
    pub fn total_chords(&self) -> usize {
        self.collections
            .iter()
            .flat_map(|(_, chords)| chords.iter())
            .collect::<HashSet<_>>()
            .len()
    }
}

// ─── Queue ──────────────────────────────────────────────────────────────────

/// FIFO of chord names still to be played.
#[derive(Debug, Clone, Default)]
pub struct ChordQueue {
    queue: VecDeque<String>,
}

impl ChordQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chord: impl Into<String>) {
        self.queue.push_back(chord.into());
    }

    pub fn pop(&mut self) -> Option<String> {
        self.queue.pop_front()
    }

    pub fn peek(&self) -> Option<&str> {
        self.queue.front().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.queue.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ChordQueue {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            queue: iter.into_iter().map(Into::into).collect(),
        }
    }
}

// ─── Verification ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StringCheck {
    /// The target note for this string is held.
    Hit,
    /// The target note for this string is not held.
    Missing,
    /// The shape does not play this string.
    Muted,
}

/// How close the held notes are to a chord shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordVerdict {
    pub chord: String,
    pub strings: [StringCheck; STRING_COUNT],
    /// Held notes that are not in the shape.
    pub extra: Vec<Note>,
    /// Hit strings over played strings, 0.0–1.0.
    pub accuracy: f32,
    /// Every played string hit and nothing extra held.
    pub complete: bool,
}

impl ChordVerdict {
    /// Human-readable problems, one per string, low E first. `labels` names
    /// the strings (see `Tuning::string_labels`).
    pub fn errors(&self, labels: &[String; STRING_COUNT]) -> Vec<String> {
        let mut out: Vec<String> = self
            .strings
            .iter()
            .enumerate()
            .filter(|(_, check)| **check == StringCheck::Missing)
            .map(|(s, _)| format!("string {} ({}) not sounding", s, labels[s]))
            .collect();
        if !self.extra.is_empty() {
            let names: Vec<String> = self.extra.iter().map(|&n| note_name(n)).collect();
            out.push(format!("extra notes: {}", names.join(" ")));
        }
        out
    }
}

/// Grades held notes against a chord shape.
///
/// Only pitches are compared. A note counts for a string when it equals the
/// pitch that string sounds in the shape, whichever string actually played it.
pub struct ChordVerifier<'a> {
    tuning: &'a Tuning,
}

impl<'a> ChordVerifier<'a> {
    pub fn new(tuning: &'a Tuning) -> Self {
        Self { tuning }
    }

    pub fn verify(&self, shape: &ChordShape, pressed: &BTreeSet<Note>) -> Result<ChordVerdict> {
        let mut strings = [StringCheck::Muted; STRING_COUNT];
        let mut target_notes = BTreeSet::new();
        let mut played = 0usize;
        let mut hits = 0usize;

        for pos in shape.positions() {
            let note = self.tuning.position_to_note(pos)?;
            target_notes.insert(note);
            played += 1;
            if pressed.contains(&note) {
                strings[pos.string] = StringCheck::Hit;
                hits += 1;
            } else {
                strings[pos.string] = StringCheck::Missing;
            }
        }

        let extra: Vec<Note> = pressed.difference(&target_notes).copied().collect();
        let accuracy = if played == 0 { 0.0 } else { hits as f32 / played as f32 };

        Ok(ChordVerdict {
            chord: shape.name.to_string(),
            strings,
            complete: played > 0 && hits == played && extra.is_empty(),
            extra,
            accuracy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuning::standard_tuning;
    use std::io::Write;

    fn notes_of(shape: &ChordShape, tuning: &Tuning) -> BTreeSet<Note> {
        shape
            .positions()
            .into_iter()
            .map(|p| tuning.position_to_note(p).unwrap())
            .collect()
    }

    #[test]
    fn test_builtin_collections() {
        let lib = PracticeLibrary::builtin(&ChordLibrary::standard());
        assert_eq!(lib.names(), vec!["Open Majors", "Minors", "All Chords"]);
        assert_eq!(lib.collection("Open Majors").unwrap().len(), 6);
        assert_eq!(lib.collection("minors").unwrap(), ["Em", "Am", "Dm", "Gm"]);
        assert_eq!(lib.total_chords(), 10);
    }

    #[test]
    fn test_unknown_collection() {
        let lib = PracticeLibrary::builtin(&ChordLibrary::standard());
        assert!(matches!(lib.collection("Jazz"), Err(FretError::UnknownCollection(_))));
    }

    #[test]
    fn test_load_skips_unknown_chords_and_empty_collections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                ["Campfire", ["G Major", "c major", "D7", "Em"]],
                ["Blues", ["E7", "A7", "B7"]],
                ["Sad", ["Am", "Dm"]]
            ]"#
        )
        .unwrap();

        let lib = PracticeLibrary::load(file.path(), &ChordLibrary::standard()).unwrap();
        assert_eq!(lib.names(), vec!["Campfire", "Sad"]);
        assert_eq!(lib.collection("Campfire").unwrap(), ["G Major", "C Major", "Em"]);
        assert_eq!(lib.total_chords(), 5);
    }

    #[test]
    fn test_load_reports_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not a list").unwrap();
        let err = PracticeLibrary::load(file.path(), &ChordLibrary::standard()).unwrap_err();
        assert!(matches!(err, FretError::Json(_)));
    }

    #[test]
    fn test_load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = PracticeLibrary::load(&dir.path().join("nope.json"), &ChordLibrary::standard())
            .unwrap_err();
        assert!(matches!(err, FretError::Io(_)));
    }

    #[test]
    fn test_queue_fifo() {
        let mut q: ChordQueue = ["E Major", "Am"].into_iter().collect();
        assert_eq!(q.len(), 2);
        assert_eq!(q.peek(), Some("E Major"));
        q.push("Dm");
        assert_eq!(q.pop().as_deref(), Some("E Major"));
        assert_eq!(q.iter().collect::<Vec<_>>(), vec!["Am", "Dm"]);
        q.clear();
        assert!(q.is_empty());
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn test_exact_grip_is_complete() {
        let t = standard_tuning();
        let lib = ChordLibrary::standard();
        let c = lib.lookup("C Major").unwrap();
        let v = ChordVerifier::new(&t).verify(c, &notes_of(c, &t)).unwrap();
        assert!(v.complete);
        assert_eq!(v.accuracy, 1.0);
        assert_eq!(v.strings[0], StringCheck::Muted);
        assert!(v.errors(&t.string_labels()).is_empty());
    }

    #[test]
    fn test_partial_grip_with_extra_note() {
        let t = standard_tuning();
        let lib = ChordLibrary::standard();
        let am = lib.lookup("Am").unwrap();
        // A2, E3, A3 held plus a stray low E; C4 and E4 missing
        let held: BTreeSet<Note> = [40, 45, 52, 57].into_iter().collect();
        let v = ChordVerifier::new(&t).verify(am, &held).unwrap();
        assert!(!v.complete);
        assert_eq!(v.extra, vec![40]);
        assert_eq!(
            v.strings,
            [
                StringCheck::Muted,
                StringCheck::Hit,
                StringCheck::Hit,
                StringCheck::Hit,
                StringCheck::Missing,
                StringCheck::Missing,
            ]
        );
        assert!((v.accuracy - 0.6).abs() < 1e-6);
        let errors = v.errors(&t.string_labels());
        assert_eq!(errors.len(), 3);
        assert!(errors[2].contains("E2"));
    }

    #[test]
    fn test_nothing_held() {
        let t = standard_tuning();
        let lib = ChordLibrary::standard();
        let v = ChordVerifier::new(&t)
            .verify(lib.lookup("Gm").unwrap(), &BTreeSet::new())
            .unwrap();
        assert_eq!(v.accuracy, 0.0);
        assert!(!v.complete);
    }
}
