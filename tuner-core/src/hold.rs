//! Hold policy for detection gaps.
//!
//! Natural micro-gaps in a sustained note (pick noise, string damping) would
//! make a display flicker between a reading and nothing. The filter keeps
//! reporting the last accepted result until the hold window has elapsed.

use crate::DetectionResult;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct HoldFilter {
    hold: Duration,
    held: Option<(DetectionResult, Instant)>,
}

impl HoldFilter {
    pub fn new(hold: Duration) -> Self {
        Self { hold, held: None }
    }

    /// Returns what the consumer should see for this frame.
    ///
    /// A fresh detection always wins and restarts the window. Without one the
    /// held result is repeated while `now` is within the window, then cleared.
    pub fn apply(
        &mut self,
        detection: Option<DetectionResult>,
        now: Instant,
    ) -> Option<DetectionResult> {
        if let Some(result) = detection {
            self.held = Some((result.clone(), now));
            return Some(result);
        }

        let within_window = self
            .held
            .as_ref()
            .is_some_and(|(_, accepted_at)| {
                now.saturating_duration_since(*accepted_at) < self.hold
            });
        if within_window {
            return self.held().cloned();
        }
        if self.held.take().is_some() {
            log::trace!("Hold window elapsed, clearing reading");
        }
        None
    }

    pub fn held(&self) -> Option<&DetectionResult> {
        self.held.as_ref().map(|(result, _)| result)
    }

    pub fn clear(&mut self) {
        self.held = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pitch::RawPitch;

    fn reading(frequency_hz: f64) -> DetectionResult {
        DetectionResult::from_pitch(RawPitch {
            frequency_hz,
            clarity: 0.98,
        })
        .unwrap()
    }

    fn names(reported: &[Option<DetectionResult>]) -> Vec<Option<&str>> {
        reported
            .iter()
            .map(|r| r.as_ref().map(|r| r.note_name.as_str()))
            .collect()
    }

    #[test]
    fn bridges_short_gaps() {
        let mut filter = HoldFilter::new(Duration::from_millis(300));
        let start = Instant::now();
        let frame = Duration::from_millis(16);

        let input = [Some(reading(440.0)), None, None, Some(reading(440.0))];
        let reported: Vec<_> = input
            .into_iter()
            .enumerate()
            .map(|(i, d)| filter.apply(d, start + frame * i as u32))
            .collect();

        assert_eq!(names(&reported), vec![Some("A4"); 4]);
    }

    #[test]
    fn clears_after_the_window() {
        let mut filter = HoldFilter::new(Duration::from_millis(300));
        let start = Instant::now();

        assert!(filter.apply(Some(reading(440.0)), start).is_some());
        assert!(filter.apply(None, start + Duration::from_millis(200)).is_some());
        assert!(filter.apply(None, start + Duration::from_millis(300)).is_none());
        assert!(filter.held().is_none());
        // Cleared for good, even if time went backwards.
        assert!(filter.apply(None, start + Duration::from_millis(100)).is_none());

        let next = filter.apply(Some(reading(110.0)), start + Duration::from_millis(400));
        assert_eq!(next.unwrap().note_name, "A2");
    }

    #[test]
    fn new_detection_resets_the_timer() {
        let mut filter = HoldFilter::new(Duration::from_millis(300));
        let start = Instant::now();

        filter.apply(Some(reading(440.0)), start);
        filter.apply(Some(reading(329.6)), start + Duration::from_millis(250));
        let held = filter.apply(None, start + Duration::from_millis(500)).unwrap();
        assert_eq!(held.note_name, "E4");
    }

    #[test]
    fn zero_hold_passes_gaps_through() {
        let mut filter = HoldFilter::new(Duration::ZERO);
        let now = Instant::now();
        filter.apply(Some(reading(440.0)), now);
        assert!(filter.apply(None, now).is_none());
    }
}
