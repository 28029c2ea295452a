// Fixed-capacity rolling window
//
// Keeps the most recent N items, newest first. Used by the live feed to retain
// the last records received regardless of how often the consumer is notified.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of live records retained
pub const DEFAULT_WINDOW_CAPACITY: usize = 100;

/// Rolling buffer ordered most-recent-first
#[derive(Debug, Clone)]
pub struct RollingWindow<T> {
    items: VecDeque<T>,
    capacity: usize,
    total_inserted: u64,
}

impl<T> RollingWindow<T> {
    /// Create a window holding at most `capacity` items (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            total_inserted: 0,
        }
    }

    /// Insert at the head, evicting the oldest entries past capacity.
    /// Returns the number of evicted items.
    pub fn push(&mut self, item: T) -> usize {
        self.items.push_front(item);
        self.total_inserted += 1;

        let mut evicted = 0;
        while self.items.len() > self.capacity {
            self.items.pop_back();
            evicted += 1;
        }
        evicted
    }

    /// Most recent item
    pub fn latest(&self) -> Option<&T> {
        self.items.front()
    }

    /// Iterate newest to oldest
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// The newest `n` items
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &T> {
        self.items.iter().take(n)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total items ever inserted, including evicted ones
    pub fn total_inserted(&self) -> u64 {
        self.total_inserted
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn stats(&self) -> WindowStats {
        WindowStats {
            stored: self.items.len(),
            capacity: self.capacity,
            total_inserted: self.total_inserted,
        }
    }
}

impl<T: Clone> RollingWindow<T> {
    /// Copy of the window contents, newest first
    pub fn snapshot(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

impl<T> Default for RollingWindow<T> {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}

/// Occupancy information about a rolling window
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WindowStats {
    pub stored: usize,
    pub capacity: usize,
    pub total_inserted: u64,
}
