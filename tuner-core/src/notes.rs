//! # Note/Frequency Mapping Module
//!
//! Equal-tempered conversions between frequencies and note names, anchored at
//! A4 = 440 Hz. The same table backs both the detection path and external
//! reference-tone generation.
//!
//! ## Features
//! - Process-wide note table covering MIDI notes 0-127 (C-1 to G9)
//! - Frequency to nearest note, octave and cents deviation
//! - Note name to frequency parsing (sharps and flats)

use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use thiserror::Error;

/// Reference pitch for A4 in Hz.
pub const A4_FREQUENCY: f64 = 440.0;
/// MIDI note number of A4.
pub const A4_MIDI: i32 = 69;
/// Highest MIDI note number in the table.
pub const MAX_MIDI: i32 = 127;

const PITCH_CLASSES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Represents a single musical note with its name and frequency.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    /// MIDI note number (69 = A4).
    pub midi: u8,
    /// Note name with octave (e.g., "A4", "C#3")
    pub name: String,
    /// Equal-tempered frequency in Hz
    pub frequency: f64,
}

/// Statically computed notes for the full MIDI range.
///
/// Built once on first use and never mutated afterwards.
static NOTES: Lazy<Vec<Note>> = Lazy::new(|| {
    (0..=MAX_MIDI)
        .map(|midi| Note {
            midi: midi as u8,
            name: note_name(midi),
            frequency: midi_to_frequency(midi),
        })
        .collect()
});

/// Static map for quick note name to MIDI number lookups.
static NOTE_MAP: Lazy<BTreeMap<String, u8>> = Lazy::new(|| {
    NOTES.iter().map(|note| (note.name.clone(), note.midi)).collect()
});

/// The nearest equal-tempered note to a frequency.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteReading {
    /// Note name with octave, e.g. "A4".
    pub note_name: String,
    /// Pitch class only, e.g. "A".
    pub note_name_without_octave: String,
    pub octave: i32,
    /// Deviation from the nearest semitone in [-50, 50]. Positive is sharp.
    pub cents: f64,
    /// MIDI number of the nearest note. May fall outside 0-127 for extreme input.
    pub midi: i32,
}

/// Errors produced when parsing a note name.
#[derive(Debug, Error, PartialEq)]
pub enum NoteParseError {
    #[error("note name is empty")]
    Empty,

    #[error("unknown note letter '{0}'")]
    UnknownLetter(char),

    #[error("note '{0}' has no valid octave number")]
    InvalidOctave(String),

    #[error("note '{0}' is outside the supported range C-1..G9")]
    OutOfRange(String),
}

/// Returns the whole process-wide note table, indexed by MIDI number.
pub fn note_table() -> &'static [Note] {
    &NOTES
}

/// Equal-tempered frequency of a MIDI note number.
pub fn midi_to_frequency(midi: i32) -> f64 {
    A4_FREQUENCY * 2.0_f64.powf((midi - A4_MIDI) as f64 / 12.0)
}

/// Sharp-spelled name of a MIDI note number, e.g. 61 -> "C#4".
pub fn note_name(midi: i32) -> String {
    let (pitch_class, octave) = split_midi(midi);
    format!("{}{}", PITCH_CLASSES[pitch_class], octave)
}

fn split_midi(midi: i32) -> (usize, i32) {
    (midi.rem_euclid(12) as usize, midi.div_euclid(12) - 1)
}

/// Maps a frequency to its nearest equal-tempered note.
///
/// Ties at exactly half a semitone round up to the higher note, so the
/// reported cents always fall in [-50, 50).
///
/// # Returns
/// * `None` for non-finite or non-positive frequencies
pub fn frequency_to_note(freq_hz: f64) -> Option<NoteReading> {
    if !freq_hz.is_finite() || freq_hz <= 0.0 {
        return None;
    }

    let raw_semitones = 12.0 * (freq_hz / A4_FREQUENCY).log2();
    let nearest = (raw_semitones + 0.5).floor();
    let cents = (100.0 * (raw_semitones - nearest)).clamp(-50.0, 50.0);

    let midi = A4_MIDI + nearest as i32;
    let (pitch_class, octave) = split_midi(midi);
    let pitch_class = PITCH_CLASSES[pitch_class];

    Some(NoteReading {
        note_name: format!("{pitch_class}{octave}"),
        note_name_without_octave: pitch_class.to_string(),
        octave,
        cents,
        midi,
    })
}

/// Parses a note name such as "A4", "c#3", "Bb2" or "C-1" into a MIDI number.
pub fn parse_note(name: &str) -> Result<u8, NoteParseError> {
    let name = name.trim();
    if let Some(&midi) = NOTE_MAP.get(name) {
        return Ok(midi);
    }

    let mut chars = name.chars();
    let letter = chars.next().ok_or(NoteParseError::Empty)?;
    let mut offset: i32 = match letter.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        other => return Err(NoteParseError::UnknownLetter(other)),
    };

    let rest = chars.as_str();
    let octave_start = rest
        .find(|c: char| c != '#' && c != 'b')
        .unwrap_or(rest.len());
    let (accidentals, octave) = rest.split_at(octave_start);
    for accidental in accidentals.chars() {
        offset = offset.saturating_add(if accidental == '#' { 1 } else { -1 });
    }

    let octave: i32 = octave
        .parse()
        .map_err(|_| NoteParseError::InvalidOctave(name.to_string()))?;

    let midi = octave
        .checked_add(1)
        .and_then(|o| o.checked_mul(12))
        .and_then(|m| m.checked_add(offset))
        .filter(|m| (0..=MAX_MIDI).contains(m))
        .ok_or_else(|| NoteParseError::OutOfRange(name.to_string()))?;
    Ok(midi as u8)
}

/// Equal-tempered frequency for a note name.
///
/// This is the entry point used by reference-tone playback. Flats, lowercase
/// letters and surrounding whitespace are accepted as aliases; mapping the
/// result back with [`frequency_to_note`] yields the sharp spelling, so
/// "Bb2" comes back as "A#2".
pub fn note_to_frequency(name: &str) -> Result<f64, NoteParseError> {
    let midi = parse_note(name)?;
    Ok(NOTES[midi as usize].frequency)
}

/// Calculates the deviation of `freq` from `target_freq` in cents.
///
/// Positive values are sharp, negative values flat.
pub fn cents_between(freq: f64, target_freq: f64) -> f64 {
    1200.0 * (freq / target_freq).log2()
}
