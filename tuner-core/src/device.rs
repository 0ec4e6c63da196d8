//! Input device capability used by the capture session.
//!
//! The session never talks to a sound API directly. It is handed an
//! [`AudioDevice`], opens it on `start()` and owns the returned
//! [`InputStream`] until `stop()`. [`crate::audio::CpalDevice`] is the native
//! backend; tests supply scripted devices.

use thiserror::Error;

/// Errors surfaced by device acquisition and by a running stream.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    /// The user or the platform refused microphone access.
    #[error("microphone access was denied")]
    PermissionDenied,

    /// The device is missing, busy, or failed for a non-permission reason.
    #[error("audio input device unavailable: {0}")]
    DeviceUnavailable(String),

    /// `start()` was called on a session that has already been stopped.
    #[error("capture session has been stopped; create a new session to listen again")]
    Terminated,
}

/// Something that can open a live mono input stream.
pub trait AudioDevice {
    type Stream: InputStream;

    /// Acquires the device, requesting permission if the platform needs it.
    ///
    /// `window_size` is the number of samples the session reads per frame.
    /// On error, anything acquired so far must already be released.
    fn open(&mut self, window_size: usize) -> Result<Self::Stream, CaptureError>;
}

/// A running input stream owned by one capture session.
pub trait InputStream {
    /// Sample rate of the samples returned by [`read_latest`](Self::read_latest), in Hz.
    fn sample_rate(&self) -> f64;

    /// Copies the newest samples into `buffer`, oldest first.
    ///
    /// When fewer than `buffer.len()` samples have been captured so far, the
    /// available ones are right-aligned and the head is zero-filled. Returns
    /// how many samples in `buffer` are real. Must not block.
    fn read_latest(&mut self, buffer: &mut [f64]) -> Result<usize, CaptureError>;

    /// Stops the stream and releases the device. Called exactly once.
    fn close(&mut self);
}
