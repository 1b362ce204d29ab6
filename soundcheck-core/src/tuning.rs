//! # Musical Tuning Module
//!
//! Reference note tables and nearest-note matching for the tuner.
//!
//! ## Features
//! - Standard guitar tuning (E2 A2 D3 G3 B3 E4), the default reference
//! - Chromatic equal-temperament table (C1 to C8, A4 = 440 Hz)
//! - Cent deviation calculations for tuning accuracy

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// A single reference note: name and frequency in Hz.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceNote {
    pub name: &'static str,
    pub frequency: f64,
}

const fn note(name: &'static str, frequency: f64) -> ReferenceNote {
    ReferenceNote { name, frequency }
}

/// Open strings of a six-string guitar in standard tuning, low to high.
pub static GUITAR_STANDARD: [ReferenceNote; 6] = [
    note("E2", 82.41),
    note("A2", 110.00),
    note("D3", 146.83),
    note("G3", 196.00),
    note("B3", 246.94),
    note("E4", 329.63),
];

/// Statically computed chromatic notes from C1 to C8.
///
/// Frequencies use equal temperament with A4 = 440 Hz and are
/// computed once on first use.
static CHROMATIC: Lazy<Vec<ReferenceNote>> = Lazy::new(|| {
    const NOTE_NAMES: [&str; 12] = [
        "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
    ];
    // MIDI numbers: C1 = 24, A4 = 69, C8 = 108.
    (24..=108)
        .map(|midi: i32| {
            let name = NOTE_NAMES[(midi % 12) as usize];
            let octave = midi / 12 - 1;
            // Names are leaked once; the table lives for the whole process.
            let name: &'static str = Box::leak(format!("{name}{octave}").into_boxed_str());
            let frequency = 440.0 * 2f64.powf((midi - 69) as f64 / 12.0);
            ReferenceNote { name, frequency }
        })
        .collect()
});

/// Which reference table the tuner matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceSet {
    #[default]
    GuitarStandard,
    Chromatic,
}

impl ReferenceSet {
    /// The ordered, read-only note table for this set.
    pub fn notes(self) -> &'static [ReferenceNote] {
        match self {
            ReferenceSet::GuitarStandard => &GUITAR_STANDARD,
            ReferenceSet::Chromatic => CHROMATIC.as_slice(),
        }
    }
}

/// The reference note closest to an estimated frequency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteMatch {
    pub name: &'static str,
    pub reference_hz: f64,
    /// Signed deviation, positive when sharp.
    pub cents: f64,
}

/// Calculates the deviation from a target frequency in cents.
///
/// 100 cents make a semitone and 1200 an octave. Positive values
/// indicate sharpness, negative values flatness.
pub fn cents_between(freq: f64, target_freq: f64) -> f64 {
    1200.0 * (freq / target_freq).log2()
}

/// Finds the reference note with the smallest absolute cent deviation.
///
/// Returns `None` for non-finite or non-positive frequencies and for an
/// empty table.
pub fn nearest_note(freq: f64, notes: &[ReferenceNote]) -> Option<NoteMatch> {
    if !freq.is_finite() || freq <= 0.0 {
        return None;
    }

    notes
        .iter()
        .map(|n| NoteMatch {
            name: n.name,
            reference_hz: n.frequency,
            cents: cents_between(freq, n.frequency),
        })
        .min_by(|a, b| a.cents.abs().total_cmp(&b.cents.abs()))
}
