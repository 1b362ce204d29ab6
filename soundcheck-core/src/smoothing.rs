/// Exponential moving average of the tuner's cents deviation.
///
/// Missing readings pull the needle back toward zero instead of freezing it.
#[derive(Debug, Clone)]
pub struct TunerSmoother {
    alpha: f64,
    value: f64,
}

impl TunerSmoother {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            value: 0.0,
        }
    }

    /// Advances the average by one pitch tick and returns it.
    pub fn update(&mut self, cents: f64) -> f64 {
        let target = if cents.is_finite() { cents } else { 0.0 };
        self.value += self.alpha * (target - self.value);
        self.value
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn moves_a_fraction_toward_target() {
        let mut smoother = TunerSmoother::new(0.15);
        assert_abs_diff_eq!(smoother.update(20.0), 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(smoother.update(20.0), 5.55, epsilon = 1e-12);
    }

    #[test]
    fn converges_on_a_steady_reading() {
        let mut smoother = TunerSmoother::new(0.15);
        for _ in 0..200 {
            smoother.update(-12.0);
        }
        assert_abs_diff_eq!(smoother.value(), -12.0, epsilon = 1e-6);
    }

    #[test]
    fn missing_reading_decays_toward_zero() {
        let mut smoother = TunerSmoother::new(0.5);
        smoother.update(40.0);
        assert_abs_diff_eq!(smoother.update(f64::NAN), 10.0, epsilon = 1e-12);
        assert!(smoother.value().is_finite());
    }
}
