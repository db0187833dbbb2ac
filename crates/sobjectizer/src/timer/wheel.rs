// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hashed timing-wheel queue: deadlines are bucketed by a coarse tick size,
//! suited to large numbers of short-lived timers where a true heap's
//! O(log n) sift starts to show up in profiles (spec §4.7).
//!
//! This is a *hashed* wheel, not a cascading multi-level one: buckets are
//! addressed by `deadline_ticks % slot_count` with no wraparound cursor, so
//! `peek_min`/`pop_min` scan every non-empty bucket rather than advancing a
//! single pointer one tick at a time. That trades the classic wheel's O(1)
//! tick-advance for a much simpler implementation; with a few hundred slots
//! the scan cost stays well below a heap's sift for the timer counts this
//! crate expects to see in-process.

use std::time::{Duration, Instant};

use super::TimerQueue;

const DEFAULT_SLOT_COUNT: usize = 512;
const DEFAULT_TICK: Duration = Duration::from_millis(4);

pub struct WheelQueue {
    slots: Vec<Vec<(Instant, u64)>>,
    tick: Duration,
    len: usize,
}

impl WheelQueue {
    pub fn new() -> Self {
        Self::with_params(DEFAULT_SLOT_COUNT, DEFAULT_TICK)
    }

    pub fn with_params(slot_count: usize, tick: Duration) -> Self {
        Self { slots: (0..slot_count.max(1)).map(|_| Vec::new()).collect(), tick: tick.max(Duration::from_micros(1)), len: 0 }
    }
}

impl Default for WheelQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerQueue for WheelQueue {
    fn push(&mut self, seq: u64, deadline: Instant) {
        let ticks = duration_to_ticks(deadline.duration_since(zero_instant()), self.tick);
        let slot = (ticks % self.slots.len() as u64) as usize;
        self.slots[slot].push((deadline, seq));
        self.len += 1;
    }

    fn pop_min(&mut self) -> Option<(u64, Instant)> {
        let mut best: Option<(usize, usize, Instant, u64)> = None;
        for (slot_idx, bucket) in self.slots.iter().enumerate() {
            for (entry_idx, &(deadline, seq)) in bucket.iter().enumerate() {
                if best.map_or(true, |(_, _, best_deadline, best_seq)| {
                    deadline < best_deadline || (deadline == best_deadline && seq < best_seq)
                }) {
                    best = Some((slot_idx, entry_idx, deadline, seq));
                }
            }
        }
        let (slot_idx, entry_idx, deadline, seq) = best?;
        self.slots[slot_idx].swap_remove(entry_idx);
        self.len -= 1;
        Some((seq, deadline))
    }

    fn peek_min_deadline(&self) -> Option<Instant> {
        self.slots.iter().flatten().map(|(d, _)| *d).min()
    }

    fn len(&self) -> usize {
        self.len
    }
}

/// A fixed epoch so `duration_to_ticks` is deterministic across calls
/// within one process — the absolute value never matters, only that pushes
/// and scans agree on it.
fn zero_instant() -> Instant {
    use std::sync::OnceLock;
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    *EPOCH.get_or_init(Instant::now)
}

fn duration_to_ticks(d: Duration, tick: Duration) -> u64 {
    (d.as_nanos() / tick.as_nanos().max(1)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_deadline_order_across_slots() {
        let base = Instant::now();
        let mut q = WheelQueue::with_params(8, Duration::from_millis(1));
        q.push(1, base + Duration::from_millis(30));
        q.push(2, base + Duration::from_millis(10));
        q.push(3, base + Duration::from_millis(20));

        assert_eq!(q.pop_min().unwrap().0, 2);
        assert_eq!(q.pop_min().unwrap().0, 3);
        assert_eq!(q.pop_min().unwrap().0, 1);
        assert!(q.pop_min().is_none());
    }

    #[test]
    fn len_tracks_pushes_and_pops() {
        let mut q = WheelQueue::new();
        let now = Instant::now();
        q.push(1, now);
        q.push(2, now);
        assert_eq!(q.len(), 2);
        q.pop_min();
        assert_eq!(q.len(), 1);
    }
}
