//! # Fast Fourier Transform (FFT) Module
//!
//! FFT helpers for the pitch estimator. The autocorrelation of an analysis
//! window is computed in the frequency domain, which keeps a full lag scan of
//! a 4096-sample window well inside one display frame.
//!
//! ## Features
//! - High-performance FFT using RustFFT
//! - DC offset removal
//! - Linear (non-circular) autocorrelation via zero padding

use rustfft::{Fft, FftPlanner, num_complex::Complex};
use std::sync::Arc;

/// Removes the DC offset from a signal by making its average value zero.
///
/// A constant signal (silence with an offset, or a fully clipped input)
/// becomes all zeros.
pub fn remove_dc_offset(signal: &mut [f64]) {
    let len = signal.len();
    if len == 0 {
        return;
    }
    let avg = signal.iter().sum::<f64>() / len as f64;
    if avg.abs() > 1e-12 {
        for sample in signal.iter_mut() {
            *sample -= avg;
        }
    }
}

/// Computes `r(τ) = Σ x[i]·x[i+τ]` for a fixed signal length.
///
/// FFT plans and the complex work buffer are created once and reused for
/// every frame of the same length.
pub struct Autocorrelator {
    signal_len: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    buffer: Vec<Complex<f64>>,
}

impl Autocorrelator {
    /// Plans transforms for signals of `signal_len` samples.
    ///
    /// The transform length is padded to at least twice the signal so the
    /// circular correlation never wraps into the lags we read back.
    pub fn new(signal_len: usize) -> Self {
        let fft_len = (2 * signal_len.max(1)).next_power_of_two();
        let mut planner = FftPlanner::new();
        Self {
            signal_len,
            forward: planner.plan_fft_forward(fft_len),
            inverse: planner.plan_fft_inverse(fft_len),
            buffer: vec![Complex { re: 0.0, im: 0.0 }; fft_len],
        }
    }

    /// Length of the signals this instance was planned for.
    pub fn signal_len(&self) -> usize {
        self.signal_len
    }

    /// Writes `r(τ)` for `τ in 0..out.len()` into `out`.
    ///
    /// # Panics
    /// * If `signal.len()` differs from the planned length
    /// * If `out` is longer than the signal
    pub fn autocorrelate(&mut self, signal: &[f64], out: &mut [f64]) {
        assert_eq!(signal.len(), self.signal_len, "signal length changed");
        assert!(out.len() <= signal.len(), "more lags requested than samples");

        for (slot, &sample) in self.buffer.iter_mut().zip(signal) {
            *slot = Complex { re: sample, im: 0.0 };
        }
        for slot in self.buffer.iter_mut().skip(signal.len()) {
            *slot = Complex { re: 0.0, im: 0.0 };
        }

        self.forward.process(&mut self.buffer);
        for bin in self.buffer.iter_mut() {
            *bin = Complex { re: bin.norm_sqr(), im: 0.0 };
        }
        self.inverse.process(&mut self.buffer);

        // RustFFT does not normalise the inverse transform.
        let scale = 1.0 / self.buffer.len() as f64;
        for (lag, value) in out.iter_mut().enumerate() {
            *value = self.buffer[lag].re * scale;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct(signal: &[f64], lag: usize) -> f64 {
        signal
            .iter()
            .zip(&signal[lag..])
            .map(|(a, b)| a * b)
            .sum()
    }

    #[test]
    fn matches_direct_sum() {
        let signal: Vec<f64> = (0..300)
            .map(|i| (i as f64 * 0.37).sin() + 0.25 * (i as f64 * 1.3).cos())
            .collect();
        let mut out = vec![0.0; 150];
        Autocorrelator::new(signal.len()).autocorrelate(&signal, &mut out);

        for lag in [0, 1, 17, 64, 149] {
            assert!((out[lag] - direct(&signal, lag)).abs() < 1e-8, "lag {lag}");
        }
    }

    #[test]
    fn dc_offset_is_removed() {
        let mut signal = vec![0.8; 64];
        remove_dc_offset(&mut signal);
        assert!(signal.iter().all(|s| s.abs() < 1e-12));

        let mut signal = vec![1.0, -1.0, 3.0, 1.0];
        remove_dc_offset(&mut signal);
        assert_eq!(signal, vec![0.0, -2.0, 2.0, 0.0]);
    }
}
