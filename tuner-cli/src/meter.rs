//! # Cent Meter
//!
//! Text rendering of a tuning reading for the terminal: a needle on a
//! -50..+50 cent scale plus an accuracy zone label.

use tuner_core::DetectionResult;
use tuner_core::instrument::Instrument;

/// Maximum cent deviation range for the meter display.
const METER_RANGE: f64 = 50.0;
/// Number of cells on each side of the centre mark.
const HALF_WIDTH: usize = 10;

/// Accuracy zone of a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    InTune,
    Close,
    Off,
}

impl Zone {
    pub fn for_cents(cents: f64) -> Self {
        if cents.abs() < 5.0 {
            Zone::InTune
        } else if cents.abs() < 20.0 {
            Zone::Close
        } else {
            Zone::Off
        }
    }

    fn label(self) -> &'static str {
        match self {
            Zone::InTune => "in tune",
            Zone::Close => "close",
            Zone::Off => "off",
        }
    }
}

/// Draws the needle, e.g. `[---------|--*------]`.
pub fn needle(cents: f64) -> String {
    let clamped = cents.clamp(-METER_RANGE, METER_RANGE);
    let cells = 2 * HALF_WIDTH + 1;
    let pos = ((clamped + METER_RANGE) / (2.0 * METER_RANGE) * (cells - 1) as f64).round() as usize;

    let mut bar = String::with_capacity(cells + 2);
    bar.push('[');
    for i in 0..cells {
        bar.push(if i == pos {
            '*'
        } else if i == HALF_WIDTH {
            '|'
        } else {
            '-'
        });
    }
    bar.push(']');
    bar
}

/// One terminal line for a reading, or a placeholder when there is none.
pub fn render(reading: Option<&DetectionResult>, instrument: Option<Instrument>) -> String {
    let Some(r) = reading else {
        return format!("{:<4} {}", "--", needle_idle());
    };

    let mut line = format!(
        "{:<4} {} {:+6.1} cents  {:8.2} Hz  clarity {:.2}  {}",
        r.note_name,
        needle(r.cents),
        r.cents,
        r.frequency_hz,
        r.clarity,
        Zone::for_cents(r.cents).label()
    );
    if let Some(hit) = instrument.and_then(|i| i.closest_string(r.frequency_hz)) {
        line.push_str(&format!(
            "  string {} ({}) {:+.1}",
            hit.index + 1,
            hit.note_name,
            hit.cents
        ));
    }
    line
}

fn needle_idle() -> String {
    let mut bar = "-".repeat(HALF_WIDTH);
    bar.push('|');
    bar.push_str(&"-".repeat(HALF_WIDTH));
    format!("[{bar}]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needle_positions() {
        assert_eq!(needle(0.0), "[----------*----------]");
        assert_eq!(needle(-50.0), "[*---------|----------]");
        assert_eq!(needle(80.0), "[----------|---------*]");
        assert_eq!(needle(25.0), "[----------|----*-----]");
    }

    #[test]
    fn zones() {
        assert_eq!(Zone::for_cents(-3.0), Zone::InTune);
        assert_eq!(Zone::for_cents(12.0), Zone::Close);
        assert_eq!(Zone::for_cents(-35.0), Zone::Off);
    }

    #[test]
    fn placeholder_without_reading() {
        assert_eq!(render(None, None), "--   [----------|----------]");
    }
}
