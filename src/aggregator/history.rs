//! Bounded history of recent snapshots.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use super::snapshot::Snapshot;

pub const DEFAULT_HISTORY_SIZE: usize = 100;

/// Ring buffer holding the most recent snapshots, oldest first.
pub struct History {
    capacity: usize,
    entries: Mutex<VecDeque<Arc<Snapshot>>>,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Append, dropping the oldest entries past capacity.
    pub fn push(&self, snapshot: Arc<Snapshot>) -> usize {
        let mut entries = self.entries.lock();
        entries.push_back(snapshot);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
        entries.len()
    }

    /// Copy of every entry, oldest to newest.
    pub fn snapshots(&self) -> Vec<Arc<Snapshot>> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE)
    }
}
