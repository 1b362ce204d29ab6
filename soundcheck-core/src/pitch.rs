//! # Pitch Detection Module
//!
//! Fundamental frequency estimation for monophonic instrument tuning using
//! normalized autocorrelation with parabolic sub-sample refinement.
//!
//! Every rejection path returns `f64::NAN`; callers treat it as "no reading",
//! never as zero.

use crate::config::PitchSettings;
use crate::fft::{apply_hann_window, autocorrelation, remove_dc_offset};

/// Windows shorter than this are rejected outright.
pub const MIN_PITCH_SAMPLES: usize = 32;

/// A centred signal with every sample within this of zero counts as silent.
const ZERO_SIGNAL_TOLERANCE: f64 = 1e-8;
const MIN_LAG0_ENERGY: f64 = 1e-12;
const DEGENERATE_DENOMINATOR: f64 = 1e-12;
/// Share of the strongest correlation a local maximum needs to count as
/// the period.
const STRONG_PEAK_SHARE: f64 = 0.9;

/// Estimates the fundamental frequency of `signal` in Hz.
///
/// # Arguments
/// * `signal` - Mono samples, typically the contents of the pitch window
/// * `sample_rate` - Sample rate in Hz
/// * `settings` - Frequency bounds and minimum correlation
///
/// # Returns
/// The estimated frequency, or NaN when the window is too short, silent,
/// aperiodic or the result falls outside the configured bounds.
pub fn estimate_pitch(signal: &[f32], sample_rate: u32, settings: &PitchSettings) -> f64 {
    if signal.len() < MIN_PITCH_SAMPLES {
        return f64::NAN;
    }

    // --- Conditioning: DC removal, silence check, Hann window ---
    let mut y: Vec<f64> = signal.iter().map(|&s| s as f64).collect();
    remove_dc_offset(&mut y);
    if y.iter().all(|s| s.abs() <= ZERO_SIGNAL_TOLERANCE) {
        return f64::NAN;
    }
    apply_hann_window(&mut y);

    // --- Normalized autocorrelation ---
    let mut corr = autocorrelation(&y);
    let lag0 = corr[0];
    if lag0 <= MIN_LAG0_ENERGY {
        return f64::NAN;
    }
    for c in corr.iter_mut() {
        *c /= lag0;
    }

    // --- Lag search range from the frequency bounds ---
    let sr = sample_rate as f64;
    let min_lag = ((sr / settings.max_frequency) as usize).max(1);
    let max_lag = ((sr / settings.min_frequency) as usize).min(corr.len() - 1);
    if max_lag <= min_lag + 2 {
        return f64::NAN;
    }

    let Some((peak_lag, peak_val)) = corr[min_lag..max_lag]
        .iter()
        .enumerate()
        .map(|(offset, &c)| (min_lag + offset, c))
        .max_by(|a, b| a.1.total_cmp(&b.1))
    else {
        return f64::NAN;
    };

    // Clarity check: aperiodic input never correlates strongly with itself.
    if peak_val < settings.min_correlation {
        return f64::NAN;
    }

    // Multiples of the period can outscore the period itself when it is not
    // a whole number of samples. Take the first strong peak to avoid octave
    // errors.
    let threshold = peak_val * STRONG_PEAK_SHARE;
    let refined_lag = match first_strong_peak(&corr, min_lag, max_lag, threshold) {
        Some(lag) => refine_peak_lag(&corr, lag),
        // Only a peak on the edge of the range can beat every interior one.
        None => peak_lag as f64,
    };

    let frequency = sr / refined_lag;
    if frequency.is_finite()
        && frequency >= settings.min_frequency
        && frequency <= settings.max_frequency
    {
        frequency
    } else {
        f64::NAN
    }
}

/// First local maximum in `[min_lag, max_lag)` reaching `threshold`.
fn first_strong_peak(
    corr: &[f64],
    min_lag: usize,
    max_lag: usize,
    threshold: f64,
) -> Option<usize> {
    (min_lag.max(1)..max_lag)
        .take_while(|&lag| lag + 1 < corr.len())
        .find(|&lag| {
            let c = corr[lag];
            c >= threshold && c >= corr[lag - 1] && c >= corr[lag + 1]
        })
}

/// Parabolic interpolation around a local correlation maximum.
///
/// Skipped when a neighbour is missing or when the three samples are
/// (numerically) collinear.
fn refine_peak_lag(corr: &[f64], peak_lag: usize) -> f64 {
    if peak_lag == 0 || peak_lag + 1 >= corr.len() {
        return peak_lag as f64;
    }

    let y1 = corr[peak_lag - 1];
    let y2 = corr[peak_lag];
    let y3 = corr[peak_lag + 1];

    let denominator = 2.0 * (y1 - 2.0 * y2 + y3);
    if denominator.abs() <= DEGENERATE_DENOMINATOR {
        return peak_lag as f64;
    }

    let peak_shift = (y1 - y3) / denominator;
    peak_lag as f64 + peak_shift
}
