//! Standard tunings for the instruments the tuner targets.
//!
//! Used by reference-tone playback to pick a string's pitch and by consumers
//! that want to show which string is being tuned.

use crate::notes::{cents_between, note_to_frequency};
use std::fmt;
use std::str::FromStr;

const GUITAR_STANDARD: [&str; 6] = ["E2", "A2", "D3", "G3", "B3", "E4"];
const BASS_STANDARD: [&str; 4] = ["E1", "A1", "D2", "G2"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instrument {
    Guitar,
    Bass,
}

/// The string closest to a played frequency.
#[derive(Debug, Clone, PartialEq)]
pub struct StringMatch {
    /// Zero-based string index, lowest string first.
    pub index: usize,
    pub note_name: &'static str,
    pub target_frequency: f64,
    /// Deviation from the string's target in cents.
    pub cents: f64,
}

impl Instrument {
    /// Open-string notes in standard tuning, lowest string first.
    pub fn strings(self) -> &'static [&'static str] {
        match self {
            Instrument::Guitar => &GUITAR_STANDARD,
            Instrument::Bass => &BASS_STANDARD,
        }
    }

    /// Reference frequencies of the open strings, lowest first.
    pub fn reference_frequencies(self) -> Vec<(&'static str, f64)> {
        self.strings()
            .iter()
            // The preset names are all inside the note table.
            .filter_map(|&name| note_to_frequency(name).ok().map(|freq| (name, freq)))
            .collect()
    }

    /// Finds the open string nearest to `freq` in cents.
    pub fn closest_string(self, freq: f64) -> Option<StringMatch> {
        if !freq.is_finite() || freq <= 0.0 {
            return None;
        }
        self.reference_frequencies()
            .into_iter()
            .enumerate()
            .map(|(index, (note_name, target_frequency))| StringMatch {
                index,
                note_name,
                target_frequency,
                cents: cents_between(freq, target_frequency),
            })
            .min_by(|a, b| a.cents.abs().total_cmp(&b.cents.abs()))
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instrument::Guitar => write!(f, "guitar"),
            Instrument::Bass => write!(f, "bass"),
        }
    }
}

impl FromStr for Instrument {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "guitar" => Ok(Instrument::Guitar),
            "bass" => Ok(Instrument::Bass),
            other => Err(format!("unknown instrument '{other}' (expected guitar or bass)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guitar_reference_pitches() {
        let refs = Instrument::Guitar.reference_frequencies();
        assert_eq!(refs.len(), 6);
        assert_eq!(refs[0].0, "E2");
        assert!((refs[0].1 - 82.4069).abs() < 1e-3);
        assert!((refs[5].1 - 329.6276).abs() < 1e-3);
    }

    #[test]
    fn bass_low_string() {
        let refs = Instrument::Bass.reference_frequencies();
        assert!((refs[0].1 - 41.2034).abs() < 1e-3);
    }

    #[test]
    fn closest_string_reports_offset() {
        let hit = Instrument::Guitar.closest_string(111.0).unwrap();
        assert_eq!(hit.index, 1);
        assert_eq!(hit.note_name, "A2");
        assert!(hit.cents > 15.0 && hit.cents < 16.5);

        let hit = Instrument::Guitar.closest_string(80.0).unwrap();
        assert_eq!(hit.note_name, "E2");
        assert!(hit.cents < 0.0);

        assert!(Instrument::Bass.closest_string(0.0).is_none());
    }

    #[test]
    fn parses_names() {
        assert_eq!("Guitar".parse::<Instrument>(), Ok(Instrument::Guitar));
        assert_eq!(" bass".parse::<Instrument>(), Ok(Instrument::Bass));
        assert!("ukulele".parse::<Instrument>().is_err());
        assert_eq!(Instrument::Bass.to_string(), "bass");
    }
}
