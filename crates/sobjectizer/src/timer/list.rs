// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Insertion-sorted list timer queue: O(n) schedule but no heap-sift
//! overhead, suited to many long-lived timers with few expirations (spec
//! §4.7) — most insertions land near the tail (far-future deadlines), most
//! pops come from the head, so the common case stays cheap even without a
//! tree.

use std::collections::VecDeque;
use std::time::Instant;

use super::TimerQueue;

pub struct ListQueue {
    entries: VecDeque<(Instant, u64)>,
}

impl ListQueue {
    pub fn new() -> Self {
        Self { entries: VecDeque::new() }
    }
}

impl Default for ListQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerQueue for ListQueue {
    fn push(&mut self, seq: u64, deadline: Instant) {
        let pos = self.entries.iter().rposition(|(d, _)| *d <= deadline).map(|i| i + 1).unwrap_or(0);
        self.entries.insert(pos, (deadline, seq));
    }

    fn pop_min(&mut self) -> Option<(u64, Instant)> {
        self.entries.pop_front().map(|(d, seq)| (seq, d))
    }

    fn peek_min_deadline(&self) -> Option<Instant> {
        self.entries.front().map(|(d, _)| *d)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn maintains_sorted_order_on_out_of_order_insertion() {
        let base = Instant::now();
        let mut q = ListQueue::new();
        q.push(1, base + Duration::from_millis(30));
        q.push(2, base + Duration::from_millis(10));
        q.push(3, base + Duration::from_millis(20));

        assert_eq!(q.pop_min().unwrap().0, 2);
        assert_eq!(q.pop_min().unwrap().0, 3);
        assert_eq!(q.pop_min().unwrap().0, 1);
    }

    #[test]
    fn empty_queue_has_no_min_deadline() {
        let q = ListQueue::new();
        assert!(q.peek_min_deadline().is_none());
    }
}
