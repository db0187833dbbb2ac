// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timer subsystem: delayed and periodic message delivery with cancellable
//! handles (spec §3, §4.7).
//!
//! Three backends share one driver loop ([`TimerDriver`]) and differ only in
//! how they order pending deadlines ([`TimerQueue`]): [`heap::HeapQueue`]
//! (binary heap, O(log n) schedule), [`list::ListQueue`] (insertion-sorted
//! list, suited to many long-lived timers with few expirations), and
//! [`wheel::WheelQueue`] (hashed timing wheel, suited to many short timers).
//! Cancellation is lazy: a cancelled entry is simply skipped when the driver
//! pops it, rather than eagerly removed from the queue (spec §4.7:
//! "cancellation is via handle release").

mod heap;
mod list;
mod wheel;

pub use heap::HeapQueue;
pub use list::ListQueue;
pub use wheel::WheelQueue;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{self, Result, SoErrorKind};
use crate::mbox::Mbox;
use crate::message::{MessageRef, MessageType, Mutability, Payload};
use crate::trace::{MboxDescriptor, TraceAction, TraceRecord, Tracer};

/// Reference-counted handle to a scheduled timer (spec glossary). Dropping
/// the last clone cancels a pending single-shot timer and stops a periodic
/// one — there is no explicit `cancel()` method because the handle's
/// refcount *is* the cancellation token: the driver holds only a [`Weak`]
/// reference and treats a failed upgrade as "cancelled".
pub type TimerHandle = Arc<()>;

/// A queue ordering pending deadlines by `(Instant, seq)`, where `seq` is
/// the driver's insertion-order tiebreaker. Implementations only need to
/// support insertion and "pop the earliest" — cancelled entries are
/// filtered out lazily by the driver, so no `remove` is needed.
pub trait TimerQueue: Send {
    fn push(&mut self, seq: u64, deadline: Instant);
    fn pop_min(&mut self) -> Option<(u64, Instant)>;
    fn peek_min_deadline(&self) -> Option<Instant>;
    fn len(&self) -> usize;
}

struct ScheduledEntry {
    deadline: Instant,
    period: Option<Duration>,
    mbox: Arc<dyn Mbox>,
    msg_type: MessageType,
    message: MessageRef,
    mutability: Mutability,
    token: Weak<()>,
}

struct Shared<Q: TimerQueue> {
    queue: Mutex<(Q, HashMap<u64, ScheduledEntry>)>,
    wakeup: Condvar,
    next_seq: AtomicU64,
    stopping: std::sync::atomic::AtomicBool,
    tracer: Arc<dyn Tracer>,
}

/// Drives one [`TimerQueue`] backend with a single background thread that
/// sleeps until the next deadline (spec §5: "the timer manager blocks on a
/// condition variable with timeout equal to the next deadline").
pub struct TimerDriver<Q: TimerQueue + 'static> {
    shared: Arc<Shared<Q>>,
    worker: Option<JoinHandle<()>>,
}

impl<Q: TimerQueue + 'static> TimerDriver<Q> {
    pub fn new(queue: Q, tracer: Arc<dyn Tracer>) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new((queue, HashMap::new())),
            wakeup: Condvar::new(),
            next_seq: AtomicU64::new(0),
            stopping: std::sync::atomic::AtomicBool::new(false),
            tracer,
        });
        let worker_shared = shared.clone();
        let worker = std::thread::spawn(move || run_driver_loop(worker_shared));
        Self { shared, worker: Some(worker) }
    }

    /// Schedule a delivery. `period = None` is single-shot; `Some(p)` repeats
    /// every `p` until the returned handle's last reference is dropped (spec
    /// §4.7). Mutable messages may not be periodic (spec §4.7, §7).
    pub fn schedule(
        &self,
        mbox: Arc<dyn Mbox>,
        msg_type: MessageType,
        message: MessageRef,
        mutability: Mutability,
        pause: Duration,
        period: Option<Duration>,
    ) -> Result<TimerHandle> {
        if mutability == Mutability::Mutable && period.is_some() {
            return error::err(SoErrorKind::MutablePeriodicTimer, "a periodic timer may not carry a mutable message");
        }

        let handle: TimerHandle = Arc::new(());
        let token = Arc::downgrade(&handle);
        let seq = self.shared.next_seq.fetch_add(1, Ordering::AcqRel);
        let deadline = Instant::now() + pause;

        let mut guard = self.shared.queue.lock();
        guard.1.insert(seq, ScheduledEntry { deadline, period, mbox, msg_type, message, mutability, token });
        guard.0.push(seq, deadline);
        drop(guard);
        self.shared.wakeup.notify_one();

        Ok(handle)
    }

    pub fn pending_count(&self) -> usize {
        self.shared.queue.lock().0.len()
    }

    pub fn shutdown(&mut self) {
        self.shared.stopping.store(true, Ordering::Release);
        self.shared.wakeup.notify_all();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl<Q: TimerQueue + 'static> Drop for TimerDriver<Q> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Object-safe face of [`TimerDriver`], so the environment can hold one of
/// the three backends behind a single `Arc<dyn TimerManager>` chosen at
/// construction time instead of being generic over `Q` itself.
pub trait TimerManager: Send + Sync {
    fn schedule(
        &self,
        mbox: Arc<dyn Mbox>,
        msg_type: MessageType,
        message: MessageRef,
        mutability: Mutability,
        pause: Duration,
        period: Option<Duration>,
    ) -> Result<TimerHandle>;

    fn pending_count(&self) -> usize;
}

impl<Q: TimerQueue + 'static> TimerManager for TimerDriver<Q> {
    fn schedule(
        &self,
        mbox: Arc<dyn Mbox>,
        msg_type: MessageType,
        message: MessageRef,
        mutability: Mutability,
        pause: Duration,
        period: Option<Duration>,
    ) -> Result<TimerHandle> {
        TimerDriver::schedule(self, mbox, msg_type, message, mutability, pause, period)
    }

    fn pending_count(&self) -> usize {
        TimerDriver::pending_count(self)
    }
}

fn run_driver_loop<Q: TimerQueue>(shared: Arc<Shared<Q>>) {
    loop {
        let mut guard = shared.queue.lock();
        if shared.stopping.load(Ordering::Acquire) {
            return;
        }

        let Some(next_deadline) = guard.0.peek_min_deadline() else {
            shared.wakeup.wait(&mut guard);
            continue;
        };

        let now = Instant::now();
        if next_deadline > now {
            shared.wakeup.wait_for(&mut guard, next_deadline - now);
            continue;
        }

        let Some((seq, _)) = guard.0.pop_min() else { continue };
        let Some(entry) = guard.1.remove(&seq) else { continue };
        drop(guard);

        if entry.token.upgrade().is_none() {
            // Handle dropped between scheduling and firing: best-effort
            // cancel, spec §4.7 and §8 scenario 6.
            continue;
        }

        fire(&shared, &entry);

        if let Some(period) = entry.period {
            if entry.token.upgrade().is_some() {
                let next_deadline = Instant::now() + period;
                let mut guard = shared.queue.lock();
                guard.0.push(seq, next_deadline);
                guard.1.insert(
                    seq,
                    ScheduledEntry {
                        deadline: next_deadline,
                        period: entry.period,
                        mbox: entry.mbox,
                        msg_type: entry.msg_type,
                        message: entry.message,
                        mutability: entry.mutability,
                        token: entry.token,
                    },
                );
            }
        }
    }
}

fn fire<Q: TimerQueue>(shared: &Shared<Q>, entry: &ScheduledEntry) {
    if entry.mbox.subscriber_count(entry.msg_type) == 0 {
        shared.tracer.trace(TraceRecord {
            thread_id: std::thread::current().id(),
            msg_type: entry.msg_type,
            source_mbox: MboxDescriptor { id: entry.mbox.id(), kind: entry.mbox.kind() },
            target_agent: None,
            envelope_ptr: None,
            payload_ptr: 0,
            mutability: entry.mutability,
            action: TraceAction::TimerFiredNoSubscribers,
        });
        return;
    }
    let _ = entry.mbox.deliver(Payload::Plain(entry.message.clone()), entry.mutability);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mbox::{MpmcMbox, SubscriberHandle};
    use crate::message::MessageInstance;
    use crate::trace::TracingTracer;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    #[test]
    fn single_shot_fires_once() {
        let driver = TimerDriver::new(HeapQueue::new(), Arc::new(TracingTracer));
        let mbox = MpmcMbox::new(1, Arc::new(TracingTracer));
        let hits = Arc::new(AtomicU32::new(0));
        let hits_clone = hits.clone();
        mbox.subscribe(
            SubscriberHandle { subscriber_id: 1, push: Arc::new(move |_m| { hits_clone.fetch_add(1, Ordering::AcqRel); Ok(()) }) },
            MessageType::of::<u32>(),
        )
        .unwrap();

        let msg: MessageRef = Arc::new(MessageInstance::new_message(1u32, Mutability::Immutable));
        let _handle = driver
            .schedule(mbox, MessageType::of::<u32>(), msg, Mutability::Immutable, Duration::from_millis(5), None)
            .unwrap();

        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(hits.load(Ordering::Acquire), 1);
    }

    #[test]
    fn dropping_the_handle_cancels_a_pending_single_shot() {
        let driver = TimerDriver::new(HeapQueue::new(), Arc::new(TracingTracer));
        let mbox = MpmcMbox::new(1, Arc::new(TracingTracer));
        let hits = Arc::new(AtomicU32::new(0));
        let hits_clone = hits.clone();
        mbox.subscribe(
            SubscriberHandle { subscriber_id: 1, push: Arc::new(move |_m| { hits_clone.fetch_add(1, Ordering::AcqRel); Ok(()) }) },
            MessageType::of::<u32>(),
        )
        .unwrap();

        let msg: MessageRef = Arc::new(MessageInstance::new_message(1u32, Mutability::Immutable));
        let handle = driver
            .schedule(mbox, MessageType::of::<u32>(), msg, Mutability::Immutable, Duration::from_millis(50), None)
            .unwrap();
        drop(handle);

        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(hits.load(Ordering::Acquire), 0);
    }

    #[test]
    fn mutable_periodic_timer_is_rejected() {
        let driver = TimerDriver::new(HeapQueue::new(), Arc::new(TracingTracer));
        let mbox = MpmcMbox::new(1, Arc::new(TracingTracer));
        let msg: MessageRef = Arc::new(MessageInstance::new_message(1u32, Mutability::Mutable));
        let err = driver
            .schedule(
                mbox,
                MessageType::of::<u32>(),
                msg,
                Mutability::Mutable,
                Duration::from_millis(5),
                Some(Duration::from_millis(5)),
            )
            .unwrap_err();
        assert_eq!(err.kind(), SoErrorKind::MutablePeriodicTimer);
    }

    #[test]
    fn periodic_timer_fires_more_than_once() {
        let driver = TimerDriver::new(HeapQueue::new(), Arc::new(TracingTracer));
        let mbox = MpmcMbox::new(1, Arc::new(TracingTracer));
        let hits = Arc::new(AtomicU32::new(0));
        let hits_clone = hits.clone();
        mbox.subscribe(
            SubscriberHandle { subscriber_id: 1, push: Arc::new(move |_m| { hits_clone.fetch_add(1, Ordering::AcqRel); Ok(()) }) },
            MessageType::of::<u32>(),
        )
        .unwrap();

        let msg: MessageRef = Arc::new(MessageInstance::new_message(1u32, Mutability::Immutable));
        let _handle = driver
            .schedule(
                mbox,
                MessageType::of::<u32>(),
                msg,
                Mutability::Immutable,
                Duration::from_millis(5),
                Some(Duration::from_millis(10)),
            )
            .unwrap();

        std::thread::sleep(Duration::from_millis(150));
        assert!(hits.load(Ordering::Acquire) >= 2, "expected at least two fires, got {}", hits.load(Ordering::Acquire));
    }
}
