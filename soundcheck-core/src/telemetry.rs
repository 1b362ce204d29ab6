//! Data shape handed to the telemetry uploader.
//!
//! Values are rounded to two decimals and readings that are not available
//! (infinite or NaN) are left out entirely, both in the struct and in its
//! JSON form. Transport and scheduling belong to the uploader.

use serde::Serialize;

use crate::AudioState;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct TelemetrySample {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_db: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch_hz: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch_cents: Option<f64>,
}

fn reading(value: f64) -> Option<f64> {
    value.is_finite().then(|| (value * 100.0).round() / 100.0)
}

impl TelemetrySample {
    pub fn from_state(state: &AudioState) -> Self {
        Self {
            db: reading(state.last_db),
            peak_db: reading(state.peak_db),
            pitch_hz: reading(state.pitch_hz),
            pitch_cents: reading(state.pitch_cents),
        }
    }

    /// True when no field carries a reading; uploaders skip such samples.
    pub fn is_empty(&self) -> bool {
        self.db.is_none()
            && self.peak_db.is_none()
            && self.pitch_hz.is_none()
            && self.pitch_cents.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_has_no_readings() {
        let sample = TelemetrySample::from_state(&AudioState::new(60.0));
        assert!(sample.is_empty());
        assert_eq!(serde_json::to_string(&sample).unwrap(), "{}");
    }

    #[test]
    fn rounds_and_omits_missing_values() {
        let mut state = AudioState::new(60.0);
        state.last_db = 63.456;
        state.peak_db = 71.004;
        let sample = TelemetrySample::from_state(&state);
        assert_eq!(sample.db, Some(63.46));
        assert_eq!(sample.peak_db, Some(71.0));
        assert!(sample.pitch_hz.is_none());

        let json = serde_json::to_value(sample).unwrap();
        assert_eq!(json, serde_json::json!({ "db": 63.46, "peak_db": 71.0 }));
    }
}
