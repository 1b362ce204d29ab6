//! # Fast Fourier Transform (FFT) Module
//!
//! Signal conditioning and FFT-based autocorrelation for the pitch
//! estimator.
//!
//! ## Features
//! - High-performance FFT using RustFFT
//! - Hann windowing for reduced edge artifacts
//! - DC offset removal
//! - Linear (non-circular) autocorrelation via zero padding

use rustfft::{FftPlanner, num_complex::Complex};

/// Removes the DC offset from a signal by making its average value zero.
pub fn remove_dc_offset(signal: &mut [f64]) {
    let len = signal.len();
    if len == 0 {
        return;
    }
    let avg = signal.iter().sum::<f64>() / len as f64;
    for sample in signal.iter_mut() {
        *sample -= avg;
    }
}

/// Applies a symmetric Hann window in place.
///
/// The window tapers the signal to zero at both edges so the
/// autocorrelation is not dominated by the abrupt frame boundaries.
pub fn apply_hann_window(buffer: &mut [f64]) {
    let n = buffer.len();
    if n < 2 {
        return;
    }
    let n_minus_1 = (n - 1) as f64;
    for (i, sample) in buffer.iter_mut().enumerate() {
        let multiplier = 0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / n_minus_1).cos());
        *sample *= multiplier;
    }
}

/// Computes the non-negative-lag half of the linear autocorrelation.
///
/// `result[k] = sum_i signal[i] * signal[i + k]` for `k` in `0..signal.len()`,
/// the same values a direct "full" correlation yields from its centre
/// onwards. The signal is zero padded to at least twice its length so the
/// circular correlation computed by the FFT does not wrap around.
pub fn autocorrelation(signal: &[f64]) -> Vec<f64> {
    let n = signal.len();
    if n == 0 {
        return Vec::new();
    }
    let fft_len = (2 * n).next_power_of_two();

    let mut planner = FftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(fft_len);
    let inverse = planner.plan_fft_inverse(fft_len);

    let mut buffer: Vec<Complex<f64>> = signal
        .iter()
        .map(|&re| Complex { re, im: 0.0 })
        .chain(std::iter::repeat(Complex { re: 0.0, im: 0.0 }))
        .take(fft_len)
        .collect();

    forward.process(&mut buffer);
    // Power spectrum: X * conj(X).
    for bin in buffer.iter_mut() {
        *bin = Complex {
            re: bin.norm_sqr(),
            im: 0.0,
        };
    }
    inverse.process(&mut buffer);

    // RustFFT does not normalize the inverse transform.
    let scale = 1.0 / fft_len as f64;
    buffer.iter().take(n).map(|c| c.re * scale).collect()
}
