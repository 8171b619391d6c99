//! Run-wide queue of delayed notification targets.
//!
//! Targets come out in first-notified order, each at most once per run no
//! matter how many resources notify it.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

/// De-duplicating FIFO of notification targets.
#[derive(Debug, Clone)]
pub struct NotificationQueue<K = String> {
    pending: VecDeque<K>,
    seen: HashSet<K>,
}

impl<K> Default for NotificationQueue<K> {
    fn default() -> Self {
        Self {
            pending: VecDeque::new(),
            seen: HashSet::new(),
        }
    }
}

impl<K: Eq + Hash + Clone> NotificationQueue<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `target`. Returns false if it was already queued (or drained)
    /// during this run; its original position is kept.
    pub fn enqueue(&mut self, target: K) -> bool {
        if !self.seen.insert(target.clone()) {
            return false;
        }
        self.pending.push_back(target);
        true
    }

    /// Take everything queued since the last drain, in first-seen order.
    pub fn drain(&mut self) -> Vec<K> {
        self.pending.drain(..).collect()
    }

    /// Targets waiting to be drained.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
