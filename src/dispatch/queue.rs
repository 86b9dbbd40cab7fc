//! Mutex-guarded FIFO between the receiver thread and the serialized executor.
//!
//! The queue owns each payload from `enqueue` until `dequeue` hands it to the
//! consumer. `enqueue` reports whether the queue was empty beforehand, which
//! is the producer's cue to schedule a drain: a burst of arrivals before the
//! drain runs costs a single scheduling request.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;

/// FIFO of extracted payloads.
#[derive(Debug, Default)]
pub struct DispatchQueue {
    frames: Mutex<VecDeque<Bytes>>,
}

impl DispatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Bytes>> {
        // A VecDeque of owned payloads is valid after any panic.
        self.frames.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a payload at the tail.
    ///
    /// Returns `true` iff the queue was empty before this insertion.
    pub fn enqueue(&self, frame: Bytes) -> bool {
        let mut frames = self.lock();
        let first = frames.is_empty();
        frames.push_back(frame);
        first
    }

    /// Pop the head payload, if any.
    pub fn dequeue(&self) -> Option<Bytes> {
        self.lock().pop_front()
    }

    /// Drop every queued payload. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let mut frames = self.lock();
        let dropped = frames.len();
        frames.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
