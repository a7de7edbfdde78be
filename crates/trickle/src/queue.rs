//! # Byte Queue
//!
//! FIFO of bytes received but not yet emitted. Backed by a `VecDeque`
//! ring that doubles its capacity when full, so pushes are amortized O(1)
//! and never fail or overwrite unread data.

use std::collections::VecDeque;

/// Initial ring capacity, matching roughly two seconds of a 1 KB/s stream.
pub const DEFAULT_CAPACITY: usize = 2048;

/// Result of popping the queue head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pop {
    /// The oldest pending byte.
    Byte(u8),
    /// Nothing pending.
    Empty,
}

/// Growable first-in first-out byte queue.
#[derive(Debug, Default)]
pub struct ByteQueue {
    buf: VecDeque<u8>,
    /// High-water mark of `len()` over the queue's lifetime.
    peak: usize,
}

impl ByteQueue {
    /// Create a queue with [`DEFAULT_CAPACITY`] preallocated.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ByteQueue {
            buf: VecDeque::with_capacity(capacity),
            peak: 0,
        }
    }

    /// Append a byte to the tail, growing the backing storage if needed.
    pub fn push(&mut self, byte: u8) {
        self.buf.push_back(byte);
        self.peak = self.peak.max(self.buf.len());
    }

    /// Remove and return the head byte, or [`Pop::Empty`].
    pub fn pop(&mut self) -> Pop {
        match self.buf.pop_front() {
            Some(b) => Pop::Byte(b),
            None => Pop::Empty,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Largest number of bytes that were pending at once.
    pub fn peak(&self) -> usize {
        self.peak
    }
}
