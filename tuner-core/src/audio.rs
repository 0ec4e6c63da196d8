//! # Audio Capture Module
//!
//! This module handles real-time audio capture using CPAL (Cross-Platform Audio Library).
//! [`CpalDevice`] implements the [`AudioDevice`] capability the capture session
//! depends on.
//!
//! ## Features
//! - Default or named input device selection
//! - f32, i16 and u16 sample formats, downmixed to mono
//! - Lock-free hand-off from the audio callback thread via a bounded channel
//! - Permission errors kept distinct from other device failures

use crate::device::{AudioDevice, CaptureError, InputStream};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use crossbeam_channel::{Receiver, Sender};
use std::collections::VecDeque;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Number of callback chunks that may queue up between two session ticks.
///
/// When full, new chunks are dropped until the session catches up.
const CHUNK_QUEUE_DEPTH: usize = 64;

/// Rates requested from the device in order of preference.
const PREFERRED_SAMPLE_RATES: [u32; 2] = [44_100, 48_000];

/// Lists the names of the input devices on the default host.
pub fn input_device_names() -> Result<Vec<String>, CaptureError> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;
    Ok(devices.filter_map(|device| device.name().ok()).collect())
}

/// Microphone input on the default CPAL host.
#[derive(Debug, Clone, Default)]
pub struct CpalDevice {
    /// `None` selects the host's default input device.
    device_name: Option<String>,
}

impl CpalDevice {
    pub fn default_input() -> Self {
        Self { device_name: None }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            device_name: Some(name.into()),
        }
    }

    fn find_device(&self) -> Result<cpal::Device, CaptureError> {
        let host = cpal::default_host();
        match &self.device_name {
            None => host
                .default_input_device()
                .ok_or_else(|| CaptureError::DeviceUnavailable("no input device available".into())),
            Some(wanted) => host
                .input_devices()
                .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?
                .find(|device| device.name().is_ok_and(|name| &name == wanted))
                .ok_or_else(|| {
                    CaptureError::DeviceUnavailable(format!("no input device named '{wanted}'"))
                }),
        }
    }
}

impl AudioDevice for CpalDevice {
    type Stream = CpalStream;

    /// Opens the device at 44.1 or 48 kHz when it can, otherwise at its
    /// default input configuration, and starts streaming.
    fn open(&mut self, window_size: usize) -> Result<CpalStream, CaptureError> {
        let device = self.find_device()?;
        log::info!(
            "Using audio input device: {}",
            device.name().unwrap_or_else(|_| "<unnamed>".into())
        );

        let supported = find_supported_config(&device)?;

        let channels = supported.channels() as usize;
        let sample_rate = supported.sample_rate().0;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        log::info!("Selected {sample_rate} Hz, {channels} channel(s), {sample_format:?}");

        let (sender, receiver) = crossbeam_channel::bounded(CHUNK_QUEUE_DEPTH);
        let failed = Arc::new(AtomicBool::new(false));

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, channels, sender, &failed),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, channels, sender, &failed),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, channels, sender, &failed),
            other => {
                return Err(CaptureError::DeviceUnavailable(format!(
                    "unsupported sample format {other:?}"
                )));
            }
        }
        .map_err(|e| match e {
            cpal::BuildStreamError::BackendSpecific { err } => classify(&err.description),
            other => CaptureError::DeviceUnavailable(other.to_string()),
        })?;

        // A stream that fails to play is dropped here, which releases the device.
        stream.play().map_err(|e| match e {
            cpal::PlayStreamError::BackendSpecific { err } => classify(&err.description),
            other => CaptureError::DeviceUnavailable(other.to_string()),
        })?;

        Ok(CpalStream {
            stream: Some(stream),
            receiver,
            history: VecDeque::with_capacity(window_size),
            capacity: window_size,
            sample_rate: sample_rate as f64,
            failed,
        })
    }
}

/// Chooses the stream configuration for `device`.
///
/// The default configuration wins when it already runs at a preferred rate.
/// Otherwise a range of the same sample format covering a preferred rate is
/// used, and the default is the fallback.
fn find_supported_config(
    device: &cpal::Device,
) -> Result<cpal::SupportedStreamConfig, CaptureError> {
    let default = device.default_input_config().map_err(|e| match e {
        cpal::DefaultStreamConfigError::BackendSpecific { err } => classify(&err.description),
        other => CaptureError::DeviceUnavailable(other.to_string()),
    })?;

    let ranges: Vec<cpal::SupportedStreamConfigRange> = match device.supported_input_configs() {
        Ok(configs) => configs
            .filter(|c| c.sample_format() == default.sample_format())
            .collect(),
        Err(err) => {
            log::debug!("Could not list input configurations, using the default: {err}");
            return Ok(default);
        }
    };
    let rate_ranges: Vec<RangeInclusive<u32>> = ranges
        .iter()
        .map(|c| c.min_sample_rate().0..=c.max_sample_rate().0)
        .collect();

    let Some(rate) = preferred_rate(default.sample_rate().0, &rate_ranges) else {
        return Ok(default);
    };
    let chosen = ranges
        .into_iter()
        .filter(|c| (c.min_sample_rate().0..=c.max_sample_rate().0).contains(&rate))
        .min_by_key(|c| c.channels().abs_diff(default.channels()));
    Ok(match chosen {
        Some(range) => range.with_sample_rate(cpal::SampleRate(rate)),
        None => default,
    })
}

/// Returns the preferred rate to request instead of `default_rate`, if any.
fn preferred_rate(default_rate: u32, ranges: &[RangeInclusive<u32>]) -> Option<u32> {
    if PREFERRED_SAMPLE_RATES.contains(&default_rate) {
        return None;
    }
    PREFERRED_SAMPLE_RATES
        .into_iter()
        .find(|rate| ranges.iter().any(|range| range.contains(rate)))
}

/// Builds an input stream that downmixes each callback buffer to mono `f32`
/// and forwards it to the session.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    sender: Sender<Vec<f32>>,
    failed: &Arc<AtomicBool>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = channels.max(1);
    let failed = Arc::clone(failed);
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let mono: Vec<f32> = data
                .chunks(channels)
                .map(|frame| {
                    frame.iter().map(|&s| s.to_sample::<f32>()).sum::<f32>() / frame.len() as f32
                })
                .collect();
            // Ignore a full queue; the session only needs the newest window.
            let _ = sender.try_send(mono);
        },
        move |err| {
            log::error!("An error occurred on the audio stream: {err}");
            failed.store(true, Ordering::SeqCst);
        },
        None,
    )
}

/// Maps a backend error description to a typed capture error.
///
/// CPAL has no dedicated permission error, so the platform message is inspected.
fn classify(description: &str) -> CaptureError {
    let lower = description.to_ascii_lowercase();
    if ["permission", "denied", "not authorized", "unauthorized"]
        .iter()
        .any(|needle| lower.contains(needle))
    {
        CaptureError::PermissionDenied
    } else {
        CaptureError::DeviceUnavailable(description.to_string())
    }
}

/// A running CPAL input stream.
pub struct CpalStream {
    stream: Option<cpal::Stream>,
    receiver: Receiver<Vec<f32>>,
    /// Newest samples, at most `capacity` of them.
    history: VecDeque<f32>,
    capacity: usize,
    sample_rate: f64,
    failed: Arc<AtomicBool>,
}

impl InputStream for CpalStream {
    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn read_latest(&mut self, buffer: &mut [f64]) -> Result<usize, CaptureError> {
        if self.failed.load(Ordering::SeqCst) {
            return Err(CaptureError::DeviceUnavailable(
                "audio input stream failed".into(),
            ));
        }

        for chunk in self.receiver.try_iter() {
            self.history.extend(chunk);
        }
        let keep = self.capacity.max(buffer.len());
        if self.history.len() > keep {
            let excess = self.history.len() - keep;
            self.history.drain(..excess);
        }

        let available = self.history.len().min(buffer.len());
        let pad = buffer.len() - available;
        buffer[..pad].fill(0.0);
        let newest = self.history.iter().skip(self.history.len() - available);
        for (slot, &sample) in buffer[pad..].iter_mut().zip(newest) {
            *slot = sample as f64;
        }
        Ok(available)
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                log::warn!("Error pausing stream: {e}");
            }
            drop(stream);
            log::debug!("Audio input stream released");
        }
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_default_rate_is_kept() {
        assert_eq!(preferred_rate(44_100, &[8_000..=192_000]), None);
        assert_eq!(preferred_rate(48_000, &[8_000..=192_000]), None);
    }

    #[test]
    fn high_default_rate_drops_to_a_standard_one() {
        assert_eq!(preferred_rate(96_000, &[8_000..=192_000]), Some(44_100));
        assert_eq!(preferred_rate(96_000, &[48_000..=48_000, 96_000..=96_000]), Some(48_000));
        assert_eq!(preferred_rate(192_000, &[96_000..=192_000]), None);
        assert_eq!(preferred_rate(96_000, &[]), None);
    }

    #[test]
    fn permission_messages_are_recognised() {
        assert_eq!(
            classify("Microphone access Permission denied by user"),
            CaptureError::PermissionDenied
        );
        assert_eq!(classify("not authorized to record"), CaptureError::PermissionDenied);
        assert_eq!(
            classify("device busy"),
            CaptureError::DeviceUnavailable("device busy".into())
        );
    }

    fn detached_stream(capacity: usize) -> (Sender<Vec<f32>>, CpalStream) {
        let (sender, receiver) = crossbeam_channel::bounded(CHUNK_QUEUE_DEPTH);
        let stream = CpalStream {
            stream: None,
            receiver,
            history: VecDeque::new(),
            capacity,
            sample_rate: 48_000.0,
            failed: Arc::new(AtomicBool::new(false)),
        };
        (sender, stream)
    }

    #[test]
    fn read_latest_right_aligns_partial_windows() {
        let (sender, mut stream) = detached_stream(4);
        sender.send(vec![0.5, 0.25]).unwrap();

        let mut buffer = [9.0; 4];
        assert_eq!(stream.read_latest(&mut buffer).unwrap(), 2);
        assert_eq!(buffer, [0.0, 0.0, 0.5, 0.25]);
    }

    #[test]
    fn read_latest_keeps_newest_samples() {
        let (sender, mut stream) = detached_stream(4);
        sender.send(vec![1.0, 2.0, 3.0]).unwrap();
        sender.send(vec![4.0, 5.0, 6.0]).unwrap();

        let mut buffer = [0.0; 4];
        assert_eq!(stream.read_latest(&mut buffer).unwrap(), 4);
        assert_eq!(buffer, [3.0, 4.0, 5.0, 6.0]);

        // Nothing new arrived: the same window is returned again.
        assert_eq!(stream.read_latest(&mut buffer).unwrap(), 4);
        assert_eq!(buffer, [3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn failed_stream_reports_error() {
        let (_sender, mut stream) = detached_stream(4);
        stream.failed.store(true, Ordering::SeqCst);
        let mut buffer = [0.0; 4];
        assert!(matches!(
            stream.read_latest(&mut buffer),
            Err(CaptureError::DeviceUnavailable(_))
        ));
    }
}
