// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario 5, reduced to the stealing rule itself: a free processor at
//! priority `p` first drains its own queue, and only once that is empty
//! does it look at `p-1`, `p-2`, ... — the scheduling rule from
//! `prio_work_stealing/main.cpp`, exercised here directly against
//! [`sobjectizer::dispatch::Priority`] rather than through a running
//! dispatcher (spec §8 scenario 5).

use std::collections::VecDeque;

use sobjectizer::dispatch::Priority;

const MAX_STEAL_DEPTH: u8 = 5;

struct Lanes {
    queues: Vec<VecDeque<u32>>,
}

impl Lanes {
    fn new() -> Self {
        Self { queues: (0..Priority::LEVELS).map(|_| VecDeque::new()).collect() }
    }

    fn push(&mut self, prio: Priority, id: u32) {
        self.queues[prio.index()].push_back(id);
    }

    /// Mirrors `SchedulingData::try_schedule_work_to` in the demo: returns
    /// the id handed to a processor free at `free_priority`, descending at
    /// most `MAX_STEAL_DEPTH` levels if its own lane is empty.
    fn schedule_for(&mut self, free_priority: Priority) -> Option<u32> {
        let mut probe = free_priority;
        let mut depth = 0u8;
        loop {
            if let Some(id) = self.queues[probe.index()].pop_front() {
                return Some(id);
            }
            if probe.0 == 0 || depth >= MAX_STEAL_DEPTH {
                return None;
            }
            probe = Priority(probe.0 - 1);
            depth += 1;
        }
    }
}

#[test]
fn own_lane_is_preferred_over_stealing() {
    let mut lanes = Lanes::new();
    lanes.push(Priority(3), 1);
    lanes.push(Priority(2), 2);
    assert_eq!(lanes.schedule_for(Priority(3)), Some(1));
}

#[test]
fn steals_from_the_nearest_nonempty_lower_lane() {
    let mut lanes = Lanes::new();
    lanes.push(Priority(2), 42);
    assert_eq!(lanes.schedule_for(Priority(5)), Some(42));
}

#[test]
fn never_steals_from_a_higher_priority_lane() {
    let mut lanes = Lanes::new();
    lanes.push(Priority(6), 99);
    assert_eq!(lanes.schedule_for(Priority(2)), None);
}

#[test]
fn steal_depth_is_bounded() {
    let mut lanes = Lanes::new();
    lanes.push(Priority(0), 7);
    // p7 down to p0 is 7 hops; MAX_STEAL_DEPTH only reaches as far as p2.
    assert_eq!(lanes.schedule_for(Priority(7)), None);
}

#[test]
fn steal_within_depth_bound_succeeds() {
    let mut lanes = Lanes::new();
    lanes.push(Priority(2), 7);
    // p7 -> p6 -> p5 -> p4 -> p3 -> p2 is exactly 5 hops.
    assert_eq!(lanes.schedule_for(Priority(7)), Some(7));
}

#[test]
fn empty_lanes_yield_nothing() {
    let mut lanes = Lanes::new();
    assert_eq!(lanes.schedule_for(Priority::MAX), None);
}
