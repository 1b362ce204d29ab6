//! Bounded block queue between the capture callback and the analysis thread.
//!
//! The producer side never waits: [`StreamBuffer::try_push`] gives up when the
//! lock is contended and [`StreamBuffer::push`] evicts the oldest block when
//! the queue is full, so the freshest audio always wins. Consumers only move
//! blocks out under the lock; copying and analysis happen after it is released.
//!
//! Consumed blocks can be handed back with [`StreamBuffer::recycle`], and
//! [`StreamBuffer::try_push_samples`] refills one of those instead of
//! allocating, so a steady capture stream reuses the same few blocks.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

use crate::error::{MeterError, Result};

/// One hardware callback's worth of mono samples. Immutable once captured.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    samples: Box<[f32]>,
}

impl AudioBlock {
    pub fn new(samples: impl Into<Box<[f32]>>) -> Self {
        Self {
            samples: samples.into(),
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Overwrites the samples of a block that is not queued anywhere.
    /// `samples` must have the block's length.
    fn refill(&mut self, samples: &[f32]) {
        self.samples.copy_from_slice(samples);
    }
}

impl From<Vec<f32>> for AudioBlock {
    fn from(samples: Vec<f32>) -> Self {
        Self::new(samples)
    }
}

/// Thread-safe, bounded, drop-oldest queue of [`AudioBlock`]s.
#[derive(Debug)]
pub struct StreamBuffer {
    blocks: Mutex<VecDeque<AudioBlock>>,
    /// Consumed blocks kept for reuse by the producer.
    spares: Mutex<Vec<AudioBlock>>,
    capacity: usize,
    min_fill_fraction: f64,
    dropped: AtomicU64,
}

impl StreamBuffer {
    /// Creates a buffer holding at most `capacity` blocks (at least one).
    ///
    /// `min_fill_fraction` is the share of a requested window that must be
    /// queued before [`pop_window`](Self::pop_window) returns anything.
    pub fn new(capacity: usize, min_fill_fraction: f64) -> Self {
        let capacity = capacity.max(1);
        Self {
            blocks: Mutex::new(VecDeque::with_capacity(capacity + 1)),
            spares: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
            min_fill_fraction: min_fill_fraction.clamp(0.0, 1.0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Inserts a block, evicting the oldest ones if the queue is full.
    pub fn push(&self, block: AudioBlock) {
        let mut blocks = self.blocks.lock();
        self.push_locked(&mut blocks, block);
    }

    /// Like [`push`](Self::push) but never waits for the lock.
    ///
    /// Returns `false` and drops `block` if a consumer currently holds the
    /// lock. Safe to call from the real-time audio callback.
    pub fn try_push(&self, block: AudioBlock) -> bool {
        match self.blocks.try_lock() {
            Some(mut blocks) => {
                self.push_locked(&mut blocks, block);
                true
            }
            None => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Copies `samples` into a recycled block, or a new one if no spare of
    /// that length is available, and queues it like [`try_push`](Self::try_push).
    ///
    /// Never waits for either lock.
    pub fn try_push_samples(&self, samples: &[f32]) -> bool {
        let Some(mut blocks) = self.blocks.try_lock() else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        };
        let spare = self.spares.try_lock().and_then(|mut spares| {
            let idx = spares.iter().rposition(|b| b.len() == samples.len())?;
            Some(spares.swap_remove(idx))
        });
        let block = match spare {
            Some(mut block) => {
                block.refill(samples);
                block
            }
            None => AudioBlock::new(samples),
        };
        self.push_locked(&mut blocks, block);
        true
    }

    /// Hands a consumed block back for reuse by
    /// [`try_push_samples`](Self::try_push_samples). At most `capacity`
    /// spares are kept; the rest are dropped.
    pub fn recycle(&self, block: AudioBlock) {
        let mut spares = self.spares.lock();
        if spares.len() < self.capacity {
            spares.push(block);
        }
    }

    /// Number of blocks waiting to be reused.
    pub fn spare_blocks(&self) -> usize {
        self.spares.lock().len()
    }

    fn push_locked(&self, blocks: &mut VecDeque<AudioBlock>, block: AudioBlock) {
        blocks.push_back(block);
        while blocks.len() > self.capacity {
            if let Some(evicted) = blocks.pop_front() {
                if let Some(mut spares) = self.spares.try_lock() {
                    if spares.len() < self.capacity {
                        spares.push(evicted);
                    }
                }
            }
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Removes and returns the oldest queued block.
    pub fn pop_oldest(&self) -> Option<AudioBlock> {
        self.blocks.lock().pop_front()
    }

    /// Drains blocks from the front until at least `n` samples are gathered
    /// and returns the most recent `n` of them.
    ///
    /// When fewer than `ceil(min_fill_fraction * n)` samples are queued,
    /// nothing is removed and [`MeterError::InsufficientData`] is returned.
    /// Callers must skip the tick in that case rather than zero-fill. When the
    /// queue holds enough for the minimum but less than `n`, every queued
    /// sample is returned.
    pub fn pop_window(&self, n: usize) -> Result<Vec<f32>> {
        let required = ((n as f64) * self.min_fill_fraction).ceil() as usize;

        let drained: Vec<AudioBlock> = {
            let mut blocks = self.blocks.lock();
            let available: usize = blocks.iter().map(AudioBlock::len).sum();
            if n == 0 || available < required.max(1) {
                return Err(MeterError::InsufficientData {
                    available,
                    required: required.max(1),
                });
            }

            let mut gathered = 0;
            let mut count = 0;
            for block in blocks.iter() {
                if gathered >= n {
                    break;
                }
                gathered += block.len();
                count += 1;
            }
            blocks.drain(..count).collect()
        };

        let total: usize = drained.iter().map(AudioBlock::len).sum();
        let skip = total.saturating_sub(n);
        let window: Vec<f32> = drained
            .iter()
            .flat_map(|b| b.samples().iter().copied())
            .skip(skip)
            .collect();
        trace!(requested = n, returned = window.len(), blocks = drained.len(), "popped window");
        for block in drained {
            self.recycle(block);
        }
        Ok(window)
    }

    /// Number of queued blocks.
    pub fn len(&self) -> usize {
        self.blocks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.lock().is_empty()
    }

    /// Total samples across all queued blocks.
    pub fn queued_samples(&self) -> usize {
        self.blocks.lock().iter().map(AudioBlock::len).sum()
    }

    pub fn clear(&self) {
        self.blocks.lock().clear();
    }

    /// Blocks discarded so far, either evicted on overflow or refused by
    /// [`try_push`](Self::try_push).
    pub fn dropped_blocks(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
