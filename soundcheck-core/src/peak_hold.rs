//! Peak-hold with decay on timeout.
//!
//! A new sample above the held peak replaces it immediately. Otherwise the
//! held peak survives until it is older than the hold duration, at which
//! point the next sample replaces it whatever its value. The displayed peak
//! is therefore never older than the hold duration.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct PeakHoldTracker {
    hold: Duration,
    peak: f64,
    held_since: Option<Instant>,
}

impl PeakHoldTracker {
    pub fn new(hold: Duration) -> Self {
        Self {
            hold,
            peak: f64::NEG_INFINITY,
            held_since: None,
        }
    }

    /// Feeds the loudness `value` observed at `now` and returns the held peak.
    pub fn update(&mut self, now: Instant, value: f64) -> f64 {
        let expired = match self.held_since {
            Some(since) => now.saturating_duration_since(since) > self.hold,
            None => true,
        };
        if value > self.peak || expired {
            self.peak = value;
            self.held_since = Some(now);
        }
        self.peak
    }

    pub fn peak(&self) -> f64 {
        self.peak
    }

    /// When the current peak was set, if a hold timer is running.
    pub fn held_since(&self) -> Option<Instant> {
        self.held_since
    }

    pub fn hold(&self) -> Duration {
        self.hold
    }

    pub fn reset(&mut self) {
        self.peak = f64::NEG_INFINITY;
        self.held_since = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOLD: Duration = Duration::from_millis(1500);
    const STEP: Duration = Duration::from_millis(85);

    #[test]
    fn starts_empty() {
        let tracker = PeakHoldTracker::new(HOLD);
        assert_eq!(tracker.peak(), f64::NEG_INFINITY);
        assert!(tracker.held_since().is_none());
    }

    #[test]
    fn higher_sample_replaces_peak_immediately() {
        let t0 = Instant::now();
        let mut tracker = PeakHoldTracker::new(HOLD);
        assert_eq!(tracker.update(t0, 50.0), 50.0);
        assert_eq!(tracker.update(t0 + STEP, 70.0), 70.0);
        assert_eq!(tracker.held_since(), Some(t0 + STEP));
        assert_eq!(tracker.update(t0 + STEP * 2, 60.0), 70.0);
    }

    #[test]
    fn peak_decays_after_hold_duration() {
        let t0 = Instant::now();
        let mut tracker = PeakHoldTracker::new(HOLD);
        tracker.update(t0, 90.0);
        assert_eq!(tracker.update(t0 + HOLD, 40.0), 90.0);
        let later = t0 + HOLD + Duration::from_millis(1);
        assert_eq!(tracker.update(later, 40.0), 40.0);
        assert_eq!(tracker.held_since(), Some(later));
    }

    #[test]
    fn silence_decays_to_negative_infinity() {
        let t0 = Instant::now();
        let mut tracker = PeakHoldTracker::new(HOLD);
        tracker.update(t0, 80.0);
        let mut now = t0;
        for _ in 0..30 {
            now += STEP;
            tracker.update(now, f64::NEG_INFINITY);
        }
        assert_eq!(tracker.peak(), f64::NEG_INFINITY);
    }

    #[test]
    fn peak_covers_every_sample_in_trailing_window() {
        // Deterministic pseudo-random levels between 30 and 100 dB.
        let mut seed: u32 = 12345;
        let mut next = move || {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            30.0 + (seed >> 16) as f64 % 70.0
        };

        let t0 = Instant::now();
        let mut tracker = PeakHoldTracker::new(HOLD);
        let mut history: Vec<(Instant, f64)> = Vec::new();
        for i in 0..400u32 {
            let now = t0 + STEP * i;
            let value = next();
            let peak = tracker.update(now, value);
            history.push((now, value));

            // Everything observed since the current peak was set is covered.
            let since = tracker.held_since().unwrap();
            assert!(now.duration_since(since) <= HOLD);
            for &(t, v) in history.iter().filter(|(t, _)| *t >= since) {
                assert!(peak >= v, "peak {peak} < {v} observed at {:?}", t - t0);
            }
        }
    }

    #[test]
    fn reset_returns_to_initial_state() {
        let mut tracker = PeakHoldTracker::new(HOLD);
        tracker.update(Instant::now(), 75.0);
        tracker.reset();
        assert_eq!(tracker.peak(), f64::NEG_INFINITY);
        assert!(tracker.held_since().is_none());
    }
}
