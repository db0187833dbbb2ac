// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Binary-heap timer queue: O(log n) schedule, suited to a moderate number
//! of timers with no particular access pattern (spec §4.7).

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Instant;

use super::TimerQueue;

#[derive(PartialEq, Eq)]
struct Entry(Instant, u64);

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0).then_with(|| self.1.cmp(&other.1))
    }
}

pub struct HeapQueue {
    heap: BinaryHeap<Reverse<Entry>>,
}

impl HeapQueue {
    pub fn new() -> Self {
        Self { heap: BinaryHeap::new() }
    }
}

impl Default for HeapQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerQueue for HeapQueue {
    fn push(&mut self, seq: u64, deadline: Instant) {
        self.heap.push(Reverse(Entry(deadline, seq)));
    }

    fn pop_min(&mut self) -> Option<(u64, Instant)> {
        self.heap.pop().map(|Reverse(Entry(deadline, seq))| (seq, deadline))
    }

    fn peek_min_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|Reverse(Entry(deadline, _))| *deadline)
    }

    fn len(&self) -> usize {
        self.heap.len()
    }
}
