//! Min-heap of `(fire_at, entry)` timers, polled with an explicit `now`.
//!
//! Cancellation is lazy: cancelled ids are dropped from the live map and their heap
//! entries are discarded when they surface.

use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

#[derive(Debug)]
pub struct TimerQueue<T> {
    heap: BinaryHeap<Reverse<(DateTime<Utc>, TimerId)>>,
    live: HashMap<TimerId, T>,
    next_id: u64,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            live: HashMap::new(),
            next_id: 0,
        }
    }

    /// Arms a timer. Timers with equal `fire_at` pop in scheduling order.
    pub fn schedule(&mut self, fire_at: DateTime<Utc>, payload: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.heap.push(Reverse((fire_at, id)));
        self.live.insert(id, payload);
        id
    }

    /// Removes a pending timer. Returns its payload if it had not fired yet.
    pub fn cancel(&mut self, id: TimerId) -> Option<T> {
        self.live.remove(&id)
    }

    /// Pops every live timer with `fire_at <= now`, earliest first.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Vec<(TimerId, T)> {
        let mut due = Vec::new();
        while let Some(Reverse((fire_at, id))) = self.heap.peek().copied() {
            if fire_at > now {
                break;
            }
            self.heap.pop();
            if let Some(payload) = self.live.remove(&id) {
                due.push((id, payload));
            }
        }
        due
    }

    /// Earliest live deadline, skipping cancelled entries.
    pub fn next_deadline(&mut self) -> Option<DateTime<Utc>> {
        while let Some(Reverse((fire_at, id))) = self.heap.peek().copied() {
            if self.live.contains_key(&id) {
                return Some(fire_at);
            }
            self.heap.pop();
        }
        None
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_pop_due_in_time_order() {
        let mut q = TimerQueue::new();
        q.schedule(t0() + Duration::minutes(30), "start");
        q.schedule(t0() + Duration::minutes(10), "30min");
        q.schedule(t0() + Duration::minutes(20), "20min");

        assert!(q.pop_due(t0()).is_empty());
        let due: Vec<_> = q
            .pop_due(t0() + Duration::minutes(20))
            .into_iter()
            .map(|(_, p)| p)
            .collect();
        assert_eq!(due, vec!["30min", "20min"]);
        assert_eq!(q.len(), 1);
        assert_eq!(q.next_deadline(), Some(t0() + Duration::minutes(30)));
    }

    #[test]
    fn test_equal_deadlines_keep_schedule_order() {
        let mut q = TimerQueue::new();
        for i in 0..5 {
            q.schedule(t0(), i);
        }
        let due: Vec<_> = q.pop_due(t0()).into_iter().map(|(_, p)| p).collect();
        assert_eq!(due, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_cancelled_timer_never_fires() {
        let mut q = TimerQueue::new();
        let a = q.schedule(t0(), 'a');
        q.schedule(t0() + Duration::seconds(1), 'b');
        assert_eq!(q.cancel(a), Some('a'));
        assert_eq!(q.cancel(a), None);
        assert_eq!(q.next_deadline(), Some(t0() + Duration::seconds(1)));
        let due: Vec<_> = q
            .pop_due(t0() + Duration::hours(1))
            .into_iter()
            .map(|(_, p)| p)
            .collect();
        assert_eq!(due, vec!['b']);
        assert!(q.is_empty());
        assert_eq!(q.next_deadline(), None);
    }
}
