//! # Pitch Detection Module
//!
//! Monophonic fundamental-frequency estimation for guitar and bass.
//!
//! The estimator computes the normalized square difference function (NSDF),
//! an autocorrelation normalized by the energy of the overlapping segments.
//! Its peak value doubles as the clarity score: 1.0 for a perfectly periodic
//! frame, lower for noisy or inharmonic ones.
//!
//! ## Features
//! - RMS noise gate to filter out silence
//! - FFT-based autocorrelation limited to the configured frequency band
//! - "First strong peak" selection to avoid octave errors
//! - Parabolic interpolation for sub-sample accuracy

use crate::config::EstimatorConfig;
use crate::fft::{Autocorrelator, remove_dc_offset};
use crate::DetectionResult;

/// Frequency and clarity of an accepted frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawPitch {
    pub frequency_hz: f64,
    /// Normalized peak height in [0, 1].
    pub clarity: f64,
}

/// Reusable pitch estimator.
///
/// Holds FFT plans and working buffers between frames; results depend only on
/// the input samples, the sample rate and the configuration.
pub struct PitchEstimator {
    config: EstimatorConfig,
    autocorrelator: Option<Autocorrelator>,
    signal: Vec<f64>,
    nsdf: Vec<f64>,
}

impl PitchEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self {
            config,
            autocorrelator: None,
            signal: Vec::new(),
            nsdf: Vec::new(),
        }
    }

    /// Estimates the fundamental of `samples`.
    ///
    /// # Returns
    /// * `Some(pitch)` - A strongly periodic frame inside the frequency band
    /// * `None` - Silence, noise, out-of-band signal or invalid input
    pub fn estimate(&mut self, samples: &[f64], sample_rate_hz: f64) -> Option<RawPitch> {
        let n = samples.len();
        if n < 4 || !sample_rate_hz.is_finite() || sample_rate_hz <= 0.0 {
            return None;
        }
        if samples.iter().any(|s| !s.is_finite()) {
            log::trace!("Rejecting frame with non-finite samples");
            return None;
        }

        self.signal.clear();
        self.signal.extend_from_slice(samples);
        remove_dc_offset(&mut self.signal);

        // --- Noise gate ---
        let energy: f64 = self.signal.iter().map(|s| s * s).sum();
        let rms = (energy / n as f64).sqrt();
        if rms <= 0.0 || rms < self.config.noise_floor {
            return None;
        }

        // --- Lag band ---
        let min_lag = ((sample_rate_hz / self.config.max_frequency).floor() as usize).max(1);
        let max_lag = ((sample_rate_hz / self.config.min_frequency).ceil() as usize).min(n / 2);
        if min_lag + 2 > max_lag {
            return None;
        }

        self.compute_nsdf(max_lag + 1);

        // --- First strong peak ---
        let candidates: Vec<usize> = find_key_maxima(&self.nsdf)
            .into_iter()
            .filter(|&lag| lag >= min_lag)
            .collect();
        let highest = candidates
            .iter()
            .map(|&lag| self.nsdf[lag])
            .fold(f64::NEG_INFINITY, f64::max);
        if !highest.is_finite() {
            return None;
        }
        let cutoff = self.config.peak_threshold * highest;
        let peak = candidates.into_iter().find(|&lag| self.nsdf[lag] >= cutoff)?;

        // --- Parabolic interpolation ---
        let (refined_lag, peak_value) = interpolate_peak(&self.nsdf, peak);
        let clarity = peak_value.clamp(0.0, 1.0);
        if clarity < self.config.clarity_threshold {
            log::trace!("Peak at lag {peak} too weak: clarity {clarity:.3}");
            return None;
        }

        let frequency_hz = sample_rate_hz / refined_lag;
        if !frequency_hz.is_finite()
            || frequency_hz < self.config.min_frequency
            || frequency_hz > self.config.max_frequency
        {
            return None;
        }

        Some(RawPitch {
            frequency_hz,
            clarity,
        })
    }

    /// Runs [`estimate`](Self::estimate) and maps an accepted frame to its note.
    pub fn detect(&mut self, samples: &[f64], sample_rate_hz: f64) -> Option<DetectionResult> {
        self.estimate(samples, sample_rate_hz)
            .and_then(DetectionResult::from_pitch)
    }

    /// Fills `self.nsdf` with `nsdf(τ) = 2·r(τ) / m(τ)` for `τ in 0..lags`.
    fn compute_nsdf(&mut self, lags: usize) {
        let n = self.signal.len();
        let stale = self
            .autocorrelator
            .as_ref()
            .is_none_or(|ac| ac.signal_len() != n);
        if stale {
            self.autocorrelator = Some(Autocorrelator::new(n));
        }

        self.nsdf.clear();
        self.nsdf.resize(lags, 0.0);
        if let Some(ac) = self.autocorrelator.as_mut() {
            ac.autocorrelate(&self.signal, &mut self.nsdf);
        }

        // m(τ) = Σ x[i]² + x[i+τ]² over the overlap, updated incrementally.
        let mut m: f64 = 2.0 * self.signal.iter().map(|s| s * s).sum::<f64>();
        for tau in 0..lags {
            if tau > 0 {
                let leaving = self.signal[tau - 1];
                let trailing = self.signal[n - tau];
                m -= leaving * leaving + trailing * trailing;
            }
            let r = self.nsdf[tau];
            self.nsdf[tau] = if m > 1e-12 {
                (2.0 * r / m).clamp(-1.0, 1.0)
            } else {
                0.0
            };
        }
    }
}

/// One-shot form of [`PitchEstimator::estimate`].
pub fn estimate(
    samples: &[f64],
    sample_rate_hz: f64,
    config: &EstimatorConfig,
) -> Option<RawPitch> {
    PitchEstimator::new(config.clone()).estimate(samples, sample_rate_hz)
}

/// Returns the lag of the highest point of every positive lobe after the
/// first negative-going zero crossing.
///
/// A lobe still rising at the end of the slice has no peak yet and is dropped.
fn find_key_maxima(nsdf: &[f64]) -> Vec<usize> {
    let len = nsdf.len();
    let mut maxima = Vec::new();
    let mut pos = 1;

    // Skip the lobe around lag 0, then the first negative region.
    while pos < len && nsdf[pos] > 0.0 {
        pos += 1;
    }
    while pos < len && nsdf[pos] <= 0.0 {
        pos += 1;
    }

    let mut current: Option<usize> = None;
    while pos < len {
        if nsdf[pos] > 0.0 {
            if current.is_none_or(|best| nsdf[pos] > nsdf[best]) {
                current = Some(pos);
            }
        } else if let Some(best) = current.take() {
            maxima.push(best);
        }
        pos += 1;
    }
    if let Some(best) = current {
        if best + 1 < len {
            maxima.push(best);
        }
    }
    maxima
}

/// Fits a parabola through `peak` and its neighbours.
///
/// Returns the refined lag and the interpolated peak height.
fn interpolate_peak(nsdf: &[f64], peak: usize) -> (f64, f64) {
    let y1 = nsdf[peak - 1];
    let y2 = nsdf[peak];
    let y3 = nsdf[peak + 1];

    let denominator = y1 - 2.0 * y2 + y3;
    if denominator.abs() < 1e-12 {
        return (peak as f64, y2);
    }
    let shift = (0.5 * (y1 - y3) / denominator).clamp(-0.5, 0.5);
    (peak as f64 + shift, y2 - 0.25 * (y1 - y3) * shift)
}
