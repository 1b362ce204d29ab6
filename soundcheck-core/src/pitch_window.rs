//! Sliding window of the most recent samples for the pitch path.

use std::collections::VecDeque;

use crate::error::{MeterError, Result};

/// Keeps the last `capacity` samples seen, oldest first.
#[derive(Debug, Clone)]
pub struct PitchWindow {
    samples: VecDeque<f32>,
    capacity: usize,
    min_fill: usize,
}

impl PitchWindow {
    /// `min_fill_fraction` of `capacity` must be present before
    /// [`snapshot`](Self::snapshot) hands out data.
    pub fn new(capacity: usize, min_fill_fraction: f64) -> Self {
        let capacity = capacity.max(1);
        let min_fill = ((capacity as f64) * min_fill_fraction.clamp(0.0, 1.0)).ceil() as usize;
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            min_fill: min_fill.max(1),
        }
    }

    /// Appends new samples, discarding the oldest beyond capacity.
    pub fn extend(&mut self, block: &[f32]) {
        // Only the tail of an oversized block can survive.
        let tail = &block[block.len().saturating_sub(self.capacity)..];
        let overflow = (self.samples.len() + tail.len()).saturating_sub(self.capacity);
        self.samples.drain(..overflow);
        self.samples.extend(tail.iter().copied());
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_ready(&self) -> bool {
        self.samples.len() >= self.min_fill
    }

    /// Copies the window contents out for analysis.
    ///
    /// Fails with [`MeterError::InsufficientData`] while the window is below
    /// its minimum fill.
    pub fn snapshot(&self) -> Result<Vec<f32>> {
        if !self.is_ready() {
            return Err(MeterError::InsufficientData {
                available: self.samples.len(),
                required: self.min_fill,
            });
        }
        Ok(self.samples.iter().copied().collect())
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
