// tuner-core/src/lib.rs

//! The core logic for the guitar and bass tuner.
//! This crate is responsible for audio capture, pitch detection,
//! and note mapping. It is completely headless
//! and contains no GUI code.

pub mod audio;
pub mod clock;
pub mod config;
pub mod device;
pub mod fft;
pub mod hold;
pub mod instrument;
pub mod notes;
pub mod pitch;
pub mod session;

pub use config::{ConfigError, EstimatorConfig, TunerConfig};
pub use device::{AudioDevice, CaptureError, InputStream};
pub use session::{CaptureSession, CaptureState, StopHandle};

use pitch::RawPitch;

/// Represents the reading for a single analysis frame.
///
/// Only produced from frames the estimator accepted, so a low-confidence
/// reading never exists; silent frames are `None` instead.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct DetectionResult {
    /// The detected fundamental in Hz.
    pub frequency_hz: f64,
    /// The nearest note with octave, e.g. "E2".
    pub note_name: String,
    /// The nearest note without octave, e.g. "E".
    pub note_name_without_octave: String,
    pub octave: i32,
    /// The deviation from the nearest note in cents, in [-50, 50].
    pub cents: f64,
    /// How periodic the frame was (0.0 to 1.0).
    pub clarity: f64,
}

impl DetectionResult {
    pub(crate) fn from_pitch(pitch: RawPitch) -> Option<Self> {
        let reading = notes::frequency_to_note(pitch.frequency_hz)?;
        Some(Self {
            frequency_hz: pitch.frequency_hz,
            note_name: reading.note_name,
            note_name_without_octave: reading.note_name_without_octave,
            octave: reading.octave,
            cents: reading.cents,
            clarity: pitch.clarity,
        })
    }
}
