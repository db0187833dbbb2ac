// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared harness for the scenario tests: a short polling loop standing in
//! for a condvar-based wait wherever the thing being waited on lives behind
//! a plain `Arc<AtomicU32>`/`Arc<Mutex<_>>` rather than the runtime's own
//! blocking primitives. Grounded on the teacher's `tests/specs::CoopProcess`
//! pattern of a small reusable harness crate sitting alongside the binary
//! it drives, reduced here to polling since there is no subprocess to wait
//! on.

use std::time::{Duration, Instant};

/// Polls `condition` every millisecond until it returns `true` or `timeout`
/// elapses. Returns whether the condition was observed true.
pub fn wait_until<F: FnMut() -> bool>(timeout: Duration, mut condition: F) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

pub const SHORT: Duration = Duration::from_secs(5);
