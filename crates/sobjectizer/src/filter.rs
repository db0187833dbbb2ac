// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Delivery filter: a per-subscriber predicate consulted before enqueue on
//! an MPMC mbox (spec §3, §4.1, §4.3).

use crate::message::MessageRef;

/// Predicate evaluated in the sender's thread, before the message-limit
/// counter is touched (spec §4.3).
pub trait DeliveryFilter: Send + Sync {
    fn check(&self, message: &MessageRef) -> bool;
}

impl<F: Fn(&MessageRef) -> bool + Send + Sync> DeliveryFilter for F {
    fn check(&self, message: &MessageRef) -> bool {
        self(message)
    }
}

/// A filter that counts how many messages it has let through — used by the
/// ping-pong scenario (spec §8 scenario 1) to assert exact delivery counts.
pub struct CountingFilter<F> {
    inner: F,
    count: std::sync::atomic::AtomicU64,
}

impl<F: Fn(&MessageRef) -> bool + Send + Sync> CountingFilter<F> {
    pub fn new(inner: F) -> Self {
        Self { inner, count: std::sync::atomic::AtomicU64::new(0) }
    }

    pub fn count(&self) -> u64 {
        self.count.load(std::sync::atomic::Ordering::Acquire)
    }
}

impl<F: Fn(&MessageRef) -> bool + Send + Sync> DeliveryFilter for CountingFilter<F> {
    fn check(&self, message: &MessageRef) -> bool {
        let passed = (self.inner)(message);
        if passed {
            self.count.fetch_add(1, std::sync::atomic::Ordering::AcqRel);
        }
        passed
    }
}
