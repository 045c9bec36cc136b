//! Bounded set of recently closed ids. The oldest id is evicted once `max_size` is exceeded.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

/// Default number of closed sessions remembered.
pub const DEFAULT_RECENT_IDS: usize = 1024;

#[derive(Debug)]
pub struct RecentIds<T> {
    order: VecDeque<T>,
    members: HashSet<T>,
    max_size: usize,
}

impl<T: Copy + Eq + Hash> RecentIds<T> {
    pub fn new(max_size: usize) -> Self {
        Self {
            order: VecDeque::new(),
            members: HashSet::new(),
            max_size: max_size.max(1),
        }
    }

    pub fn insert(&mut self, id: T) {
        if !self.members.insert(id) {
            return;
        }
        self.order.push_back(id);
        if self.order.len() > self.max_size {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
    }

    pub fn contains(&self, id: &T) -> bool {
        self.members.contains(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl<T: Copy + Eq + Hash> Default for RecentIds<T> {
    fn default() -> Self {
        Self::new(DEFAULT_RECENT_IDS)
    }
}
