//! # Analysis Module
//!
//! The analysis tick: drains queued blocks, runs the loudness path on every
//! block, runs the (throttled) pitch path, feeds an active recording and
//! produces a complete [`AudioState`] for publication.
//!
//! The [`Analyzer`] owns all stateful pieces of the pipeline and is driven by
//! a single thread, so none of them need locking. Time is passed in by the
//! caller, which keeps the whole pipeline testable without a device or a
//! wall clock.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::AudioState;
use crate::config::{MonitorConfig, PitchSettings};
use crate::error::{MeterError, Result};
use crate::level::calibrated_db;
use crate::peak_hold::PeakHoldTracker;
use crate::pitch::estimate_pitch;
use crate::pitch_window::PitchWindow;
use crate::recording::{Recorder, Report};
use crate::smoothing::TunerSmoother;
use crate::stream_buffer::{AudioBlock, StreamBuffer};
use crate::tuning::{ReferenceNote, nearest_note};

/// What a single [`Analyzer::tick`] did.
#[derive(Debug, Default)]
pub struct TickOutcome {
    /// Blocks consumed from the stream buffer.
    pub blocks: usize,
    /// Whether a pitch estimate was attempted.
    pub pitch_updated: bool,
    /// Report of a session that hit its maximum duration during this tick.
    pub finished_report: Option<Arc<Report>>,
}

pub struct Analyzer {
    sample_rate: u32,
    pitch_settings: PitchSettings,
    references: &'static [ReferenceNote],
    tuner_interval: Duration,
    pitch_window: PitchWindow,
    peak: PeakHoldTracker,
    smoother: TunerSmoother,
    recorder: Recorder,
    last_pitch_update: Option<Instant>,
    /// Set when a block lands in the pitch window, cleared by an estimate.
    window_has_new_audio: bool,
    state: AudioState,
}

impl Analyzer {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            pitch_settings: config.pitch,
            references: config.reference.notes(),
            tuner_interval: config.tuner_update_interval(),
            pitch_window: PitchWindow::new(config.pitch_window, config.min_fill_fraction),
            peak: PeakHoldTracker::new(config.peak_hold()),
            smoother: TunerSmoother::new(config.tuner_ema_alpha),
            recorder: Recorder::new(Duration::from_secs_f64(config.max_record_secs)),
            last_pitch_update: None,
            window_has_new_audio: false,
            state: AudioState::new(config.calibration_offset_db),
        }
    }

    /// The state as of the end of the last processed block or tick.
    pub fn state(&self) -> &AudioState {
        &self.state
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    /// Runs one analysis tick at `now` over everything queued in `buffer`.
    pub fn tick(&mut self, buffer: &StreamBuffer, now: Instant) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        while let Some(block) = buffer.pop_oldest() {
            outcome.blocks += 1;
            if let Some(report) = self.process_block(&block, now) {
                outcome.finished_report = Some(report);
            }
            buffer.recycle(block);
        }
        outcome.pitch_updated = self.update_pitch(now);
        outcome
    }

    /// Loudness path for one block: level, peak hold, recording, and the
    /// block is appended to the pitch window.
    ///
    /// Returns the report if this block ended a recording at its cap.
    pub fn process_block(&mut self, block: &AudioBlock, now: Instant) -> Option<Arc<Report>> {
        let db = calibrated_db(block.samples(), self.state.calibration_offset_db);
        self.state.last_db = db;
        self.state.peak_db = self.peak.update(now, db);
        self.state.peak_timestamp = self.peak.held_since();
        self.pitch_window.extend(block.samples());
        self.window_has_new_audio = true;

        let finished = self.recorder.append_at(now, db);
        self.state.recording = self.recorder.is_recording();
        finished
    }

    /// Pitch path, throttled to the tuner update interval.
    ///
    /// Returns `true` if an estimate was attempted on this call. A window
    /// below its minimum fill, or one that has not changed since the last
    /// estimate, skips the tick and leaves the previous pitch reading in place.
    pub fn update_pitch(&mut self, now: Instant) -> bool {
        if !self.window_has_new_audio {
            return false;
        }
        if let Some(last) = self.last_pitch_update {
            if now.saturating_duration_since(last) < self.tuner_interval {
                return false;
            }
        }

        let window = match self.pitch_window.snapshot() {
            Ok(window) => window,
            Err(MeterError::InsufficientData {
                available,
                required,
            }) => {
                trace!(available, required, "pitch window not ready, skipping tick");
                return false;
            }
            Err(e) => {
                debug!("pitch window unavailable: {e}");
                return false;
            }
        };
        self.last_pitch_update = Some(now);
        self.window_has_new_audio = false;

        let f0 = estimate_pitch(&window, self.sample_rate, &self.pitch_settings);
        self.state.pitch_hz = f0;
        match nearest_note(f0, self.references) {
            Some(m) => {
                self.state.pitch_note_name = Some(m.name);
                self.state.pitch_note_ref_hz = m.reference_hz;
                self.state.pitch_cents = m.cents;
                trace!(hz = f0, note = m.name, cents = m.cents, "pitch estimate");
            }
            None => self.state.clear_pitch(),
        }
        self.state.smoothed_cents = self.smoother.update(self.state.pitch_cents);
        true
    }

    pub fn start_recording(&mut self, now: Instant) -> Result<()> {
        self.recorder.start(now)?;
        self.state.recording = true;
        Ok(())
    }

    pub fn stop_recording(&mut self) -> Result<Arc<Report>> {
        let report = self.recorder.stop()?;
        self.state.recording = false;
        Ok(report)
    }

    /// Changes the calibration offset. Refused while recording so a
    /// session never mixes two calibrations.
    pub fn set_calibration_offset(&mut self, offset_db: f64) -> Result<()> {
        if self.recorder.is_recording() {
            return Err(MeterError::AlreadyRecording);
        }
        if !offset_db.is_finite() {
            return Err(MeterError::Config(format!(
                "calibration offset must be finite, got {offset_db}"
            )));
        }
        debug!(offset_db, "calibration offset changed");
        self.state.calibration_offset_db = offset_db;
        Ok(())
    }

    /// Drops the held peak so the next block starts a new hold.
    pub fn reset_peak(&mut self) {
        self.peak.reset();
        self.state.peak_db = f64::NEG_INFINITY;
        self.state.peak_timestamp = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MonitorConfig {
        MonitorConfig::full()
    }

    fn tone(freq: f64, config: &MonitorConfig, offset: usize, amplitude: f64) -> AudioBlock {
        let sr = config.sample_rate as f64;
        AudioBlock::new(
            (offset..offset + config.block_size)
                .map(|i| {
                    let phase = 2.0 * std::f64::consts::PI * freq * i as f64 / sr;
                    (amplitude * phase.sin()) as f32
                })
                .collect::<Vec<f32>>(),
        )
    }

    #[test]
    fn silent_blocks_report_negative_infinity() {
        let config = config();
        let mut analyzer = Analyzer::new(&config);
        let silent = AudioBlock::new(vec![0.0f32; config.block_size]);
        analyzer.process_block(&silent, Instant::now());
        assert_eq!(analyzer.state().last_db, f64::NEG_INFINITY);
        assert_eq!(analyzer.state().peak_db, f64::NEG_INFINITY);
    }

    #[test]
    fn pitch_waits_for_minimum_fill() {
        let config = config();
        let mut analyzer = Analyzer::new(&config);
        let t0 = Instant::now();
        // One 2048 block is half of the 4096 window, below the 60% fill.
        analyzer.process_block(&tone(110.0, &config, 0, 0.5), t0);
        assert!(!analyzer.update_pitch(t0));
        assert!(analyzer.state().pitch_hz.is_nan());

        analyzer.process_block(&tone(110.0, &config, config.block_size, 0.5), t0);
        assert!(analyzer.update_pitch(t0));
        assert_eq!(analyzer.state().pitch_note_name, Some("A2"));
        assert!(analyzer.state().pitch_cents.abs() < 10.0);
    }

    #[test]
    fn pitch_updates_are_throttled() {
        let config = config();
        let mut analyzer = Analyzer::new(&config);
        let t0 = Instant::now();
        for i in 0..2 {
            analyzer.process_block(&tone(196.0, &config, i * config.block_size, 0.5), t0);
        }
        assert!(analyzer.update_pitch(t0));
        let smoothed = analyzer.state().smoothed_cents;
        analyzer.process_block(&tone(196.0, &config, 2 * config.block_size, 0.5), t0);
        assert!(!analyzer.update_pitch(t0 + Duration::from_millis(100)));
        assert_eq!(analyzer.state().smoothed_cents, smoothed);
        assert!(analyzer.update_pitch(t0 + config.tuner_update_interval()));
    }

    #[test]
    fn unchanged_window_is_not_estimated_again() {
        let config = config();
        let mut analyzer = Analyzer::new(&config);
        let buffer = StreamBuffer::new(config.stream_capacity(), config.min_fill_fraction);
        let t0 = Instant::now();
        for i in 0..2 {
            buffer.push(tone(110.0, &config, i * config.block_size, 0.5));
        }
        assert!(analyzer.tick(&buffer, t0).pitch_updated);
        let smoothed = analyzer.state().smoothed_cents;

        // Ten seconds of ticks without new audio.
        let mut updates = 0;
        for i in 1..=50 {
            let outcome = analyzer.tick(&buffer, t0 + Duration::from_millis(200 * i));
            if outcome.pitch_updated {
                updates += 1;
            }
        }
        assert_eq!(updates, 0);
        assert_eq!(analyzer.state().smoothed_cents, smoothed);
        assert_eq!(analyzer.state().pitch_note_name, Some("A2"));

        buffer.push(tone(110.0, &config, 2 * config.block_size, 0.5));
        assert!(analyzer.tick(&buffer, t0 + Duration::from_secs(11)).pitch_updated);
    }

    #[test]
    fn calibration_change_is_refused_while_recording() {
        let config = config();
        let mut analyzer = Analyzer::new(&config);
        let t0 = Instant::now();
        analyzer.start_recording(t0).unwrap();
        assert!(matches!(
            analyzer.set_calibration_offset(70.0),
            Err(MeterError::AlreadyRecording)
        ));
        analyzer.stop_recording().unwrap();
        analyzer.set_calibration_offset(70.0).unwrap();
        assert_eq!(analyzer.state().calibration_offset_db, 70.0);
        assert!(analyzer.set_calibration_offset(f64::NAN).is_err());
    }

    #[test]
    fn reset_peak_clears_held_value() {
        let config = config();
        let mut analyzer = Analyzer::new(&config);
        analyzer.process_block(&tone(440.0, &config, 0, 0.8), Instant::now());
        assert!(analyzer.state().peak_db.is_finite());
        analyzer.reset_peak();
        assert_eq!(analyzer.state().peak_db, f64::NEG_INFINITY);
        assert!(analyzer.state().peak_timestamp.is_none());
    }
}
