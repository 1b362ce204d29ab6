// soundcheck-core/src/lib.rs

//! The core logic for the sound level meter and instrument tuner.
//! This crate is responsible for audio capture, loudness and pitch
//! estimation, peak hold and session recording. It is completely
//! headless and contains no rendering or network code.
//!
//! ```text
//! cpal callback → StreamBuffer → Analyzer ─┬─ loudness → PeakHoldTracker ─┐
//!                                          └─ PitchWindow → pitch → note ─┴→ AudioState
//!                                                                              │
//!                                                         Recorder (when active) → Report
//! ```

pub mod analysis;
pub mod audio;
pub mod config;
pub mod error;
pub mod fft;
pub mod level;
pub mod monitor;
pub mod peak_hold;
pub mod pitch;
pub mod pitch_window;
pub mod recording;
pub mod smoothing;
pub mod stream_buffer;
pub mod telemetry;
pub mod tuning;

pub use analysis::Analyzer;
pub use config::{MonitorConfig, PitchSettings};
pub use error::{MeterError, Result};
pub use monitor::{Monitor, MonitorHandle};
pub use recording::{Recorder, Report};
pub use stream_buffer::{AudioBlock, StreamBuffer};
pub use telemetry::TelemetrySample;
pub use tuning::ReferenceSet;

use std::time::Instant;

/// Snapshot of everything the analysis thread measures.
///
/// Published whole once per analysis tick. Sentinels mean "no reading":
/// negative infinity for levels, NaN for pitch values. Neither is zero.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioState {
    /// Calibrated level of the latest block in dB.
    pub last_db: f64,
    /// Peak-held level in dB.
    pub peak_db: f64,
    /// When the held peak was set.
    pub peak_timestamp: Option<Instant>,
    /// Latest pitch estimate in Hz.
    pub pitch_hz: f64,
    /// Name of the nearest reference note.
    pub pitch_note_name: Option<&'static str>,
    /// Frequency of the nearest reference note, NaN when there is none.
    pub pitch_note_ref_hz: f64,
    /// Signed deviation from the reference note in cents.
    pub pitch_cents: f64,
    /// Exponentially smoothed cents for the tuner needle.
    pub smoothed_cents: f64,
    /// Offset added to dBFS for the displayed level.
    pub calibration_offset_db: f64,
    /// Whether a recording session is active.
    pub recording: bool,
}

impl AudioState {
    pub fn new(calibration_offset_db: f64) -> Self {
        Self {
            last_db: f64::NEG_INFINITY,
            peak_db: f64::NEG_INFINITY,
            peak_timestamp: None,
            pitch_hz: f64::NAN,
            pitch_note_name: None,
            pitch_note_ref_hz: f64::NAN,
            pitch_cents: f64::NAN,
            smoothed_cents: 0.0,
            calibration_offset_db,
            recording: false,
        }
    }

    /// Clears the pitch fields to "no reading".
    pub fn clear_pitch(&mut self) {
        self.pitch_hz = f64::NAN;
        self.pitch_note_name = None;
        self.pitch_note_ref_hz = f64::NAN;
        self.pitch_cents = f64::NAN;
    }
}

impl Default for AudioState {
    fn default() -> Self {
        Self::new(MonitorConfig::default().calibration_offset_db)
    }
}
