//! Loudness estimation: RMS in dBFS plus the operator calibration offset.

/// RMS at or below this is treated as silence.
const SILENCE_RMS: f64 = 1e-12;

/// Returns the RMS level of `samples` in dB relative to full scale.
///
/// Empty and silent input yield `f64::NEG_INFINITY`. Squares are
/// accumulated in f64 so long blocks do not lose precision.
pub fn rms_dbfs(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return f64::NEG_INFINITY;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    let rms = (sum_sq / samples.len() as f64).sqrt();
    if rms <= SILENCE_RMS {
        return f64::NEG_INFINITY;
    }
    20.0 * rms.log10()
}

/// Displayed level: dBFS shifted by a fixed calibration offset.
///
/// The offset accounts for microphone sensitivity and the chosen
/// reference level. Silence stays at negative infinity.
pub fn calibrated_db(samples: &[f32], calibration_offset_db: f64) -> f64 {
    rms_dbfs(samples) + calibration_offset_db
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn silence_is_negative_infinity() {
        assert_eq!(rms_dbfs(&[]), f64::NEG_INFINITY);
        assert_eq!(rms_dbfs(&[0.0; 2048]), f64::NEG_INFINITY);
        assert_eq!(calibrated_db(&[0.0; 64], 60.0), f64::NEG_INFINITY);
    }

    #[test]
    fn full_scale_square_wave_is_zero_dbfs() {
        let square: Vec<f32> = (0..1024).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        assert_abs_diff_eq!(rms_dbfs(&square), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn full_scale_sine_is_minus_three_dbfs() {
        let sine: Vec<f32> = (0..4800)
            .map(|i| (2.0 * std::f64::consts::PI * 100.0 * i as f64 / 48_000.0).sin() as f32)
            .collect();
        assert_abs_diff_eq!(rms_dbfs(&sine), -3.0103, epsilon = 1e-3);
    }

    #[test]
    fn calibration_offset_is_added() {
        let block = vec![0.1f32; 256];
        assert_abs_diff_eq!(calibrated_db(&block, 60.0), 40.0, epsilon = 1e-5);
    }
}
