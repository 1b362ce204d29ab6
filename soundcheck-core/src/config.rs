//! # Configuration Module
//!
//! A single [`MonitorConfig`] value is built once at startup and passed by
//! reference into the capture source and the analyzer. There is no global
//! mutable configuration.
//!
//! Two presets mirror the deployment targets: [`MonitorConfig::eco`] for
//! small ARM boards and [`MonitorConfig::full`] for desktops (the default).
//! Choosing between them is left to the integrator.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{MeterError, Result};
use crate::tuning::ReferenceSet;

/// Frequency bounds and thresholds for the autocorrelation pitch estimator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PitchSettings {
    /// Lowest frequency reported, in Hz.
    pub min_frequency: f64,
    /// Highest frequency reported, in Hz.
    pub max_frequency: f64,
    /// Minimum normalized autocorrelation at the chosen lag.
    pub min_correlation: f64,
}

impl Default for PitchSettings {
    fn default() -> Self {
        Self {
            min_frequency: 65.0,
            max_frequency: 1000.0,
            min_correlation: 0.2,
        }
    }
}

/// Complete runtime configuration for the capture and analysis pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Requested capture sample rate in Hz.
    pub sample_rate: u32,
    /// Frames per AudioBlock.
    pub block_size: usize,
    /// Input device name. `None` selects the host default.
    pub device_name: Option<String>,
    /// Length of the sliding pitch window in samples.
    pub pitch_window: usize,
    /// Minimum fill of a pitch window before it is analysed (0.0..=1.0).
    pub min_fill_fraction: f64,
    /// Upper bound on audio queued between capture and analysis.
    pub max_queue_ms: u64,
    /// Added to dBFS to obtain the displayed level.
    pub calibration_offset_db: f64,
    pub pitch: PitchSettings,
    /// Reference notes used by the tuner.
    pub reference: ReferenceSet,
    /// Minimum interval between two pitch estimates.
    pub tuner_update_ms: u64,
    /// EMA factor for the displayed cents deviation.
    pub tuner_ema_alpha: f64,
    pub peak_hold_ms: u64,
    /// Hard cap for a recording session.
    pub max_record_secs: f64,
    /// How long the analysis thread waits for commands when no audio is queued.
    pub analysis_poll_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::full()
    }
}

impl MonitorConfig {
    /// Low-cost preset: 12 kHz, 2048-sample blocks and pitch window.
    pub fn eco() -> Self {
        Self {
            sample_rate: 12_000,
            pitch_window: 2048,
            ..Self::full()
        }
    }

    /// Desktop preset: 24 kHz, 2048-sample blocks, 4096-sample pitch window.
    pub fn full() -> Self {
        Self {
            sample_rate: 24_000,
            block_size: 2048,
            device_name: None,
            pitch_window: 4096,
            min_fill_fraction: 0.6,
            max_queue_ms: 350,
            calibration_offset_db: 60.0,
            pitch: PitchSettings::default(),
            reference: ReferenceSet::GuitarStandard,
            tuner_update_ms: 180,
            tuner_ema_alpha: 0.15,
            peak_hold_ms: 1500,
            max_record_secs: 60.0,
            analysis_poll_ms: 10,
        }
    }

    /// Loads a configuration from a JSON file. Missing fields take the
    /// values of [`MonitorConfig::full`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let config: MonitorConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(MeterError::Config("sample_rate must be positive".into()));
        }
        if self.block_size == 0 {
            return Err(MeterError::Config("block_size must be positive".into()));
        }
        if self.pitch_window < 32 {
            return Err(MeterError::Config(format!(
                "pitch_window must be at least 32 samples, got {}",
                self.pitch_window
            )));
        }
        if !(self.min_fill_fraction > 0.0 && self.min_fill_fraction <= 1.0) {
            return Err(MeterError::Config(format!(
                "min_fill_fraction must be in (0, 1], got {}",
                self.min_fill_fraction
            )));
        }
        let p = &self.pitch;
        if !(p.min_frequency > 0.0 && p.min_frequency < p.max_frequency) {
            return Err(MeterError::Config(format!(
                "invalid pitch bounds [{}, {}]",
                p.min_frequency, p.max_frequency
            )));
        }
        if p.max_frequency >= self.sample_rate as f64 / 2.0 {
            return Err(MeterError::Config(format!(
                "max_frequency {} is above Nyquist for {} Hz",
                p.max_frequency, self.sample_rate
            )));
        }
        if !(self.tuner_ema_alpha > 0.0 && self.tuner_ema_alpha <= 1.0) {
            return Err(MeterError::Config(format!(
                "tuner_ema_alpha must be in (0, 1], got {}",
                self.tuner_ema_alpha
            )));
        }
        if !self.calibration_offset_db.is_finite() {
            return Err(MeterError::Config("calibration_offset_db must be finite".into()));
        }
        if !(self.max_record_secs > 0.0) {
            return Err(MeterError::Config("max_record_secs must be positive".into()));
        }
        Ok(())
    }

    /// Stream buffer capacity in blocks, derived from `max_queue_ms`.
    pub fn stream_capacity(&self) -> usize {
        let queued_samples = self.max_queue_ms as f64 * self.sample_rate as f64 / 1000.0;
        ((queued_samples / self.block_size as f64).floor() as usize).max(1)
    }

    pub fn tuner_update_interval(&self) -> Duration {
        Duration::from_millis(self.tuner_update_ms)
    }

    pub fn peak_hold(&self) -> Duration {
        Duration::from_millis(self.peak_hold_ms)
    }

    pub fn analysis_poll(&self) -> Duration {
        Duration::from_millis(self.analysis_poll_ms)
    }

    /// Duration of a single AudioBlock.
    pub fn block_duration(&self) -> Duration {
        Duration::from_secs_f64(self.block_size as f64 / self.sample_rate as f64)
    }
}
