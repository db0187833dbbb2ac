// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message limits: per-agent, per-message-type caps on in-flight demand,
//! with a configurable overlimit reaction (spec §3, §4.3, supplemented from
//! the original `message_limit.hpp`'s drop/abort/redirect/transform
//! policies).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;
use crate::mbox::{MboxDirectory, MboxId};
use crate::message::{MessageRef, Payload};
use crate::trace::{MboxDescriptor, TraceAction, TraceRecord, Tracer};

/// What to do when a message arrives for a (mbox, msg-type) pair that is
/// already at its configured limit.
#[derive(Clone)]
pub enum OverlimitReaction {
    /// Silently drop the message; a trace record is still emitted.
    Drop,
    /// Abort the process. Reserved for limits whose violation indicates a
    /// design error rather than transient back-pressure.
    Abort,
    /// Redirect the message, unmodified, to another mbox.
    Redirect(MboxId),
    /// Transform the message into a different one and deliver that instead,
    /// possibly to a different mbox. The closure returns `None` to fall back
    /// to a plain drop.
    Transform(Arc<dyn Fn(&MessageRef) -> Option<(MboxId, MessageRef)> + Send + Sync>),
}

impl std::fmt::Debug for OverlimitReaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Drop => write!(f, "Drop"),
            Self::Abort => write!(f, "Abort"),
            Self::Redirect(id) => write!(f, "Redirect({id})"),
            Self::Transform(_) => write!(f, "Transform(..)"),
        }
    }
}

/// Cap on the number of undelivered demands of one message type an mbox will
/// hold for a single subscriber before applying [`OverlimitReaction`].
#[derive(Clone)]
pub struct MessageLimit {
    pub max_count: usize,
    pub reaction: OverlimitReaction,
}

impl MessageLimit {
    pub fn new(max_count: usize, reaction: OverlimitReaction) -> Self {
        Self { max_count, reaction }
    }
}

struct Entry {
    limit: MessageLimit,
    current: usize,
}

/// What a reservation attempt against the table resolved to.
pub enum ReserveOutcome {
    /// No limit configured for this type, or the reservation fit under it.
    Admitted,
    /// The limit was exceeded; apply this reaction.
    Overlimit(OverlimitReaction),
}

/// Table of configured [`MessageLimit`]s, keyed by (subscriber id,
/// [`crate::message::MessageType::rank`]).
///
/// One table is shared by every [`crate::sink::AgentSink`] a mbox hands out
/// (via [`crate::mbox::Mbox::limits`]), but the key carries the subscriber's
/// id so each subscriber's counter is independent — a limit configured for
/// one subscriber never throttles, or triggers an overlimit reaction for,
/// any other subscriber of the same mbox and message type (spec §3 "per
/// agent, per message type").
///
/// Counts are reserved on enqueue and released once the corresponding
/// demand has been executed (spec §4.3's "in-flight" definition — a message
/// sitting in a subscriber's queue counts against the limit until its
/// handler has run).
pub struct LimitTable {
    entries: Mutex<HashMap<(u64, u64), Entry>>,
}

impl LimitTable {
    pub fn new() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }

    pub fn set_limit(&self, subscriber_id: u64, msg_type_rank: u64, limit: MessageLimit) {
        let mut entries = self.entries.lock();
        entries.insert((subscriber_id, msg_type_rank), Entry { limit, current: 0 });
    }

    pub fn drop_limit(&self, subscriber_id: u64, msg_type_rank: u64) {
        self.entries.lock().remove(&(subscriber_id, msg_type_rank));
    }

    /// Attempt to reserve one slot for `(subscriber_id, msg_type_rank)`.
    /// Leaves the counter incremented only when admitted.
    pub fn try_reserve(&self, subscriber_id: u64, msg_type_rank: u64) -> ReserveOutcome {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(&(subscriber_id, msg_type_rank)) else {
            return ReserveOutcome::Admitted;
        };
        if entry.current < entry.limit.max_count {
            entry.current += 1;
            ReserveOutcome::Admitted
        } else {
            ReserveOutcome::Overlimit(entry.limit.reaction.clone())
        }
    }

    /// Release a slot reserved by [`Self::try_reserve`], called once the
    /// demand it guarded has finished executing.
    pub fn release(&self, subscriber_id: u64, msg_type_rank: u64) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(&(subscriber_id, msg_type_rank)) {
            entry.current = entry.current.saturating_sub(1);
        }
    }
}

impl Default for LimitTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Guards against an infinite redirect/transform chain (spec §4.3 open
/// question — the C++ original has no such guard; this crate bounds it).
pub const MAX_REDIRECTION_DEPTH: usize = 32;

thread_local! {
    static REDIRECT_DEPTH: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
}

/// RAII guard tracking how many overlimit redirects/transforms have chained
/// within the current call stack, independent of which mbox instance is
/// doing the redirecting — a redirect loop between two distinct mboxes would
/// otherwise dodge a per-mbox counter entirely.
pub struct RedirectGuard {
    depth: usize,
}

impl RedirectGuard {
    /// Enters one more level of redirection. `None` once
    /// [`MAX_REDIRECTION_DEPTH`] is exceeded.
    pub fn enter() -> Option<Self> {
        let depth = REDIRECT_DEPTH.with(|d| {
            let next = d.get() + 1;
            d.set(next);
            next
        });
        if depth > MAX_REDIRECTION_DEPTH {
            REDIRECT_DEPTH.with(|d| d.set(d.get() - 1));
            None
        } else {
            Some(Self { depth })
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}

impl Drop for RedirectGuard {
    fn drop(&mut self) {
        REDIRECT_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

/// Applies an overlimit reaction for one subscriber's [`crate::sink::AgentSink`].
/// Redirect and transform both re-enter delivery — possibly on a different
/// mbox entirely — so both go through [`RedirectGuard`], which bounds the
/// *total* chain length regardless of how many distinct mboxes it hops
/// through.
pub fn apply_overlimit(
    reaction: OverlimitReaction,
    message: &MessageRef,
    source_mbox: MboxDescriptor,
    tracer: &Arc<dyn Tracer>,
    directory: &MboxDirectory,
) -> Result<()> {
    let trace = |action: TraceAction| {
        tracer.trace(TraceRecord {
            thread_id: std::thread::current().id(),
            msg_type: message.msg_type(),
            source_mbox,
            target_agent: None,
            envelope_ptr: None,
            payload_ptr: 0,
            mutability: message.mutability(),
            action,
        });
    };
    match reaction {
        OverlimitReaction::Drop => {
            trace(TraceAction::OverlimitDrop);
            Ok(())
        }
        OverlimitReaction::Abort => {
            trace(TraceAction::OverlimitAbort);
            trigger_abort("message limit overlimit reaction is Abort");
        }
        OverlimitReaction::Redirect(target_id) => {
            trace(TraceAction::OverlimitRedirect);
            let Some(_guard) = RedirectGuard::enter() else {
                trace(TraceAction::RedirectionDepthExceeded);
                return Ok(());
            };
            match directory(target_id) {
                Some(target) => {
                    let mutability = message.mutability();
                    target.deliver(Payload::Plain(message.clone()), mutability)
                }
                None => Ok(()),
            }
        }
        OverlimitReaction::Transform(transform) => {
            trace(TraceAction::OverlimitTransform);
            let Some((target_id, transformed)) = transform(message) else {
                return Ok(());
            };
            let Some(_guard) = RedirectGuard::enter() else {
                trace(TraceAction::RedirectionDepthExceeded);
                return Ok(());
            };
            match directory(target_id) {
                Some(target) => {
                    let mutability = transformed.mutability();
                    target.deliver(Payload::Plain(transformed), mutability)
                }
                None => Ok(()),
            }
        }
    }
}

/// Invoked by a mbox when it resolves `OverlimitReaction::Abort`. Outside
/// tests this logs and aborts the process, matching the C++ original's
/// fatal-reaction semantics (spec §4.3). Under `#[cfg(test)]` it panics
/// instead, so the reaction path is exercisable with `#[should_panic]`
/// without taking down the test binary; tests that reach this path use
/// `serial_test` since it mutates no shared state but reads awkwardly when
/// interleaved with unrelated panics in the harness.
#[cfg(not(test))]
pub(crate) fn trigger_abort(message: &str) -> ! {
    tracing::error!(message, "fatal: overlimit abort reaction triggered");
    std::process::abort();
}

#[cfg(test)]
pub(crate) fn trigger_abort(message: &str) -> ! {
    tracing::error!(message, "fatal: overlimit abort reaction triggered (test build, panicking)");
    panic!("overlimit abort reaction triggered: {message}");
}
