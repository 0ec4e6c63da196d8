//! # Configuration Module
//!
//! Tuning parameters for the estimator and the capture session. None of these
//! values can be derived from first principles; they are exposed so they can
//! be tuned against real guitar and bass recordings.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default analysis window in samples (~93 ms at 44.1 kHz).
///
/// Large enough that a 30 Hz lag still fits in half the window.
pub const DEFAULT_WINDOW_SIZE: usize = 4096;

/// Errors raised while loading, saving or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("config file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("config file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parameters of the pitch estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Lowest admissible fundamental in Hz.
    pub min_frequency: f64,
    /// Highest admissible fundamental in Hz.
    pub max_frequency: f64,
    /// RMS below which a frame counts as silence.
    pub noise_floor: f64,
    /// A key maximum is "strong" when it reaches this fraction of the highest one.
    pub peak_threshold: f64,
    /// Minimum clarity for a frame to produce a detection.
    pub clarity_threshold: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            min_frequency: 30.0,
            max_frequency: 1200.0,
            noise_floor: 0.01,
            peak_threshold: 0.9,
            clarity_threshold: 0.9,
        }
    }
}

/// Top-level configuration for a capture session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    /// Analysis window length in samples. Must be a power of two.
    pub window_size: usize,
    /// How long the last reading is held across detection gaps, in milliseconds.
    pub hold_ms: u64,
    pub estimator: EstimatorConfig,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            hold_ms: 300,
            estimator: EstimatorConfig::default(),
        }
    }
}

impl TunerConfig {
    pub fn hold_duration(&self) -> Duration {
        Duration::from_millis(self.hold_ms)
    }

    /// Checks that every parameter is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size < 64 || !self.window_size.is_power_of_two() {
            return Err(ConfigError::Invalid(format!(
                "window_size must be a power of two >= 64, got {}",
                self.window_size
            )));
        }
        self.estimator.validate()
    }

    /// Loads a configuration from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut file = File::open(path.as_ref())?;
        let mut data = String::new();
        file.read_to_string(&mut data)?;
        let config: TunerConfig = serde_json::from_str(&data)?;
        config.validate()?;
        log::info!("Loaded tuner config from {}", path.as_ref().display());
        Ok(config)
    }

    /// Saves the configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json_string = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path.as_ref())?;
        file.write_all(json_string.as_bytes())?;
        Ok(())
    }
}

impl EstimatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let finite = [
            self.min_frequency,
            self.max_frequency,
            self.noise_floor,
            self.peak_threshold,
            self.clarity_threshold,
        ]
        .iter()
        .all(|v| v.is_finite());
        if !finite {
            return Err(ConfigError::Invalid("estimator values must be finite".into()));
        }
        if self.min_frequency <= 0.0 || self.min_frequency >= self.max_frequency {
            return Err(ConfigError::Invalid(format!(
                "frequency band {}..{} Hz is empty",
                self.min_frequency, self.max_frequency
            )));
        }
        if self.noise_floor < 0.0 {
            return Err(ConfigError::Invalid("noise_floor must not be negative".into()));
        }
        for (name, value) in [
            ("peak_threshold", self.peak_threshold),
            ("clarity_threshold", self.clarity_threshold),
        ] {
            if value <= 0.0 || value > 1.0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be in (0, 1], got {value}"
                )));
            }
        }
        Ok(())
    }
}
