//! Thread-safe inbound mailbox.
//!
//! The read activity appends complete message payloads; the caller drains
//! them from any thread via non-blocking polls. The queue is unbounded, so
//! the caller's side of the contract is to drain promptly after each
//! `NextMessage` poke, or memory grows with arrival rate.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// FIFO queue of fully reassembled message payloads.
#[derive(Debug, Default)]
pub struct Mailbox {
    queue: Mutex<VecDeque<Vec<u8>>>,
}

impl Mailbox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<Vec<u8>>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append one complete message. Called only by the read activity.
    pub fn push(&self, payload: Vec<u8>) {
        self.queue().push_back(payload);
    }

    /// Pop the oldest pending message, or `None` if the mailbox is empty.
    /// Never blocks beyond the push/pop critical section.
    pub fn pop(&self) -> Option<Vec<u8>> {
        self.queue().pop_front()
    }

    /// Drop all pending messages. Called during teardown.
    pub fn clear(&self) {
        self.queue().clear();
    }

    /// Number of pending messages.
    pub fn len(&self) -> usize {
        self.queue().len()
    }
}
