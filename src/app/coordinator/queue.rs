//! Shared queue of shard indices waiting to be claimed

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

/// FIFO of not-yet-started shard indices
///
/// Each index is handed out exactly once.
#[derive(Debug)]
pub struct ShardQueue {
    pending: Mutex<VecDeque<usize>>,
}

impl ShardQueue {
    /// Queue holding indices `0..shard_count` in ascending order
    pub fn new(shard_count: usize) -> Self {
        Self {
            pending: Mutex::new((0..shard_count).collect()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<usize>> {
        // A panicking worker cannot leave the deque half-updated
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim the next shard, `None` once the queue is empty
    pub fn claim(&self) -> Option<usize> {
        self.lock().pop_front()
    }

    /// Drop every unclaimed index, returning how many were dropped
    pub fn clear(&self) -> usize {
        let mut pending = self.lock();
        let dropped = pending.len();
        pending.clear();
        dropped
    }

    /// Number of unclaimed shards
    pub fn remaining(&self) -> usize {
        self.lock().len()
    }

    /// Whether every shard has been claimed
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }
}
