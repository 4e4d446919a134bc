use crate::types::{NoteEvent, NoteKind};

const NOTE_OFF: u8 = 0x80;
const NOTE_ON: u8 = 0x90;

/// Parse one raw MIDI message into a note event.
///
/// Only note-on and note-off are of interest; everything else (CC, pitch
/// bend, clock, sysex) yields `None`. Note-on with velocity 0 is a note-off
/// as MIDI defines it. Short messages and data bytes with the high bit set
/// are rejected.
pub fn parse_note_message(bytes: &[u8]) -> Option<NoteEvent> {
    if bytes.len() < 3 {
        return None;
    }
    let status = bytes[0];
    let (note, velocity) = (bytes[1], bytes[2]);
    if note > 0x7F || velocity > 0x7F {
        return None;
    }
    let channel = status & 0x0F;
    let kind = match status & 0xF0 {
        NOTE_ON if velocity > 0 => NoteKind::On,
        NOTE_ON | NOTE_OFF => NoteKind::Off,
        _ => return None,
    };
    Some(NoteEvent {
        channel,
        note,
        velocity: if kind == NoteKind::On { velocity } else { 0 },
        kind,
    })
}

/// Encode a note event back to its 3-byte wire form. Used by the simulator
/// so scripted notes travel the same parse path as hardware input.
pub fn encode_note_message(event: &NoteEvent) -> [u8; 3] {
    let channel = event.channel & 0x0F;
    let note = event.note & 0x7F;
    match event.kind {
        NoteKind::On => [NOTE_ON | channel, note, event.velocity & 0x7F],
        NoteKind::Off => [NOTE_OFF | channel, note, 0],
    }
}
