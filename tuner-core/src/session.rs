//! # Capture Session Module
//!
//! Owns the input stream and the analysis loop. The host drives the loop by
//! calling [`CaptureSession::tick`] from its frame or timer primitive; each
//! tick reads the newest window, estimates its pitch, applies the hold policy
//! and hands the reading to the registered callback.
//!
//! ## Lifecycle
//! `Idle --start()--> Listening --stop()--> Stopped`. `Stopped` is terminal:
//! listening again takes a new session, so a device handle is never shared
//! between two owners.

use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, EstimatorConfig, TunerConfig};
use crate::device::{AudioDevice, CaptureError, InputStream};
use crate::hold::HoldFilter;
use crate::pitch::PitchEstimator;
use crate::DetectionResult;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Lifecycle state of a [`CaptureSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Listening,
    Stopped,
}

/// Fixed-length window of time-domain samples, refilled in place every tick.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: Vec<f64>,
}

impl SampleBuffer {
    pub fn new(len: usize) -> Self {
        Self {
            samples: vec![0.0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.samples
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.samples
    }
}

/// Requests that a session stop.
///
/// Safe to use from inside the result callback: the session tears down before
/// the current `tick()` returns and never invokes the callback again.
#[derive(Debug, Clone)]
pub struct StopHandle {
    requested: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }
}

/// Resources that only exist while listening.
struct ActiveCapture<S> {
    stream: S,
    buffer: SampleBuffer,
    estimator: PitchEstimator,
    sample_rate: f64,
}

type ResultCallback = Box<dyn FnMut(Option<DetectionResult>)>;

/// Continuous pitch analysis against one input device.
pub struct CaptureSession<D: AudioDevice, C: Clock = SystemClock> {
    device: D,
    clock: C,
    config: TunerConfig,
    state: CaptureState,
    active: Option<ActiveCapture<D::Stream>>,
    hold: HoldFilter,
    on_result: ResultCallback,
    stop_requested: Arc<AtomicBool>,
}

impl<D: AudioDevice> CaptureSession<D> {
    /// Creates an idle session using the wall clock.
    pub fn new(
        device: D,
        config: TunerConfig,
        on_result: impl FnMut(Option<DetectionResult>) + 'static,
    ) -> Result<Self, ConfigError> {
        Self::with_clock(device, SystemClock, config, on_result)
    }
}

impl<D: AudioDevice, C: Clock> CaptureSession<D, C> {
    /// Creates an idle session with an explicit time source.
    pub fn with_clock(
        device: D,
        clock: C,
        config: TunerConfig,
        on_result: impl FnMut(Option<DetectionResult>) + 'static,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            device,
            clock,
            hold: HoldFilter::new(config.hold_duration()),
            config,
            state: CaptureState::Idle,
            active: None,
            on_result: Box::new(on_result),
            stop_requested: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Sample rate of the open stream, if listening.
    pub fn sample_rate(&self) -> Option<f64> {
        self.active.as_ref().map(|active| active.sample_rate)
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            requested: Arc::clone(&self.stop_requested),
        }
    }

    /// Opens the device and starts listening.
    ///
    /// On failure the session stays `Idle` and `start()` may be retried.
    /// Calling it while already listening does nothing.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        match self.state {
            CaptureState::Listening => {
                log::debug!("start() ignored: session is already listening");
                return Ok(());
            }
            CaptureState::Stopped => return Err(CaptureError::Terminated),
            CaptureState::Idle => {}
        }

        // Stop requests only apply to a running session.
        self.stop_requested.store(false, Ordering::SeqCst);

        let mut stream = self.device.open(self.config.window_size).inspect_err(|err| {
            log::warn!("Could not start capture: {err}");
        })?;

        let sample_rate = stream.sample_rate();
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            stream.close();
            return Err(CaptureError::DeviceUnavailable(format!(
                "device reported an invalid sample rate ({sample_rate})"
            )));
        }

        let window_size = window_for_rate(
            self.config.window_size,
            sample_rate,
            self.config.estimator.min_frequency,
        );
        if window_size != self.config.window_size {
            log::info!(
                "Widening analysis window from {} to {window_size} samples at {sample_rate} Hz",
                self.config.window_size
            );
        }

        self.active = Some(ActiveCapture {
            stream,
            buffer: SampleBuffer::new(window_size),
            estimator: PitchEstimator::new(self.config.estimator.clone()),
            sample_rate,
        });
        self.hold.clear();
        self.state = CaptureState::Listening;
        log::info!("Listening at {sample_rate} Hz with a {window_size}-sample window");
        Ok(())
    }

    /// Runs one analysis iteration and returns the state afterwards.
    ///
    /// Does nothing unless the session is listening, so a tick the host had
    /// already queued before `stop()` is harmless. A stream failure stops the
    /// session, releases the device and is returned from this call only.
    pub fn tick(&mut self) -> Result<CaptureState, CaptureError> {
        if self.state != CaptureState::Listening {
            return Ok(self.state);
        }
        if self.stop_requested.load(Ordering::SeqCst) {
            self.release();
            return Ok(self.state);
        }

        let now = self.clock.now();
        let Some(active) = self.active.as_mut() else {
            self.release();
            return Ok(self.state);
        };

        let filled = match active.stream.read_latest(active.buffer.as_mut_slice()) {
            Ok(filled) => filled,
            Err(err) => {
                log::error!("Input stream failed, stopping capture: {err}");
                self.release();
                return Err(err);
            }
        };

        let detection = if filled < active.buffer.len() {
            // Still warming up.
            None
        } else {
            let ActiveCapture {
                buffer,
                estimator,
                sample_rate,
                ..
            } = active;
            detect_contained(estimator, &self.config.estimator, |estimator| {
                estimator.detect(buffer.as_slice(), *sample_rate)
            })
        };

        if let Some(result) = &detection {
            log::trace!(
                "{} {:+.1} cents ({:.2} Hz, clarity {:.3})",
                result.note_name,
                result.cents,
                result.frequency_hz,
                result.clarity
            );
        }

        let reported = self.hold.apply(detection, now);
        (self.on_result)(reported);

        if self.stop_requested.load(Ordering::SeqCst) {
            self.release();
        }
        Ok(self.state)
    }

    /// Stops listening and releases the device.
    ///
    /// After this returns the callback is never invoked again. A no-op unless
    /// the session is listening.
    pub fn stop(&mut self) {
        match self.state {
            CaptureState::Listening => self.release(),
            CaptureState::Idle | CaptureState::Stopped => {
                log::debug!("stop() ignored: session is {:?}", self.state);
            }
        }
    }

    fn release(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.stream.close();
        }
        self.hold.clear();
        self.state = CaptureState::Stopped;
        log::info!("Capture stopped, device released");
    }
}

impl<D: AudioDevice, C: Clock> Drop for CaptureSession<D, C> {
    fn drop(&mut self) {
        if self.state == CaptureState::Listening {
            self.release();
        }
    }
}

/// Smallest power-of-two window, at least `configured`, that keeps the longest
/// lag of the band within half the window at `sample_rate`.
///
/// Without this a 96 kHz stream would cap the lowest detectable pitch near
/// 47 Hz with the default 4096 window.
fn window_for_rate(configured: usize, sample_rate: f64, min_frequency: f64) -> usize {
    let max_lag = (sample_rate / min_frequency).ceil();
    if !max_lag.is_finite() || max_lag <= 0.0 {
        return configured;
    }
    let needed = (2 * max_lag as usize).next_power_of_two();
    configured.max(needed)
}

/// Runs one estimation with panics contained.
///
/// A panic reads as no detection and leaves a freshly built estimator behind,
/// so the session keeps going with clean working buffers.
fn detect_contained<F>(
    estimator: &mut PitchEstimator,
    config: &EstimatorConfig,
    detect: F,
) -> Option<DetectionResult>
where
    F: FnOnce(&mut PitchEstimator) -> Option<DetectionResult>,
{
    match panic::catch_unwind(AssertUnwindSafe(|| detect(estimator))) {
        Ok(detection) => detection,
        Err(_) => {
            log::warn!("Pitch estimation panicked; treating the frame as silent");
            *estimator = PitchEstimator::new(config.clone());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sine(freq: f64, sample_rate: f64, len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| 0.5 * (2.0 * PI * freq * i as f64 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn window_grows_with_sample_rate() {
        assert_eq!(window_for_rate(4096, 44_100.0, 30.0), 4096);
        assert_eq!(window_for_rate(4096, 48_000.0, 30.0), 4096);
        assert_eq!(window_for_rate(4096, 96_000.0, 30.0), 8192);
        assert_eq!(window_for_rate(4096, 192_000.0, 30.0), 16384);
        assert_eq!(window_for_rate(16384, 96_000.0, 30.0), 16384);
    }

    #[test]
    fn grown_window_keeps_low_e_at_96k() {
        let config = EstimatorConfig::default();
        let window = window_for_rate(4096, 96_000.0, config.min_frequency);
        let mut estimator = PitchEstimator::new(config);

        let short = sine(41.2, 96_000.0, 4096);
        assert!(estimator.detect(&short, 96_000.0).is_none());

        let result = estimator.detect(&sine(41.2, 96_000.0, window), 96_000.0).unwrap();
        assert_eq!(result.note_name, "E1");
        assert!((result.frequency_hz - 41.2).abs() < 0.2);

        let floor = estimator.estimate(&sine(30.5, 96_000.0, window), 96_000.0).unwrap();
        assert!((floor.frequency_hz - 30.5).abs() < 0.2, "{}", floor.frequency_hz);
    }

    #[test]
    fn panicking_estimation_reads_as_silence() {
        let config = EstimatorConfig::default();
        let mut estimator = PitchEstimator::new(config.clone());

        let outcome = detect_contained(&mut estimator, &config, |_| panic!("bad frame"));
        assert!(outcome.is_none());

        let tone = sine(440.0, 44_100.0, 4096);
        let recovered = detect_contained(&mut estimator, &config, |estimator| {
            estimator.detect(&tone, 44_100.0)
        })
        .unwrap();
        assert_eq!(recovered.note_name, "A4");
    }

    #[test]
    fn panic_after_partial_work_rebuilds_the_estimator() {
        let config = EstimatorConfig::default();
        let mut estimator = PitchEstimator::new(config.clone());
        let tone = sine(110.0, 44_100.0, 4096);

        let outcome = detect_contained(&mut estimator, &config, |estimator| {
            let _ = estimator.detect(&tone, 44_100.0);
            panic!("failed after touching the buffers");
        });
        assert!(outcome.is_none());

        let result = estimator.detect(&tone, 44_100.0).unwrap();
        assert_eq!(result.note_name, "A2");
    }
}
