// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `msg_tracing` hook (spec §4.1): every routing decision a mbox makes
//! can emit a structured record, independent of the error logger.

use std::fmt;
use std::sync::Arc;
use std::thread::ThreadId;

use crate::message::{Mutability, MessageType};
use crate::mbox::{MboxId, MboxKind};

/// Descriptor of the mbox a trace record originated from.
#[derive(Debug, Clone, Copy)]
pub struct MboxDescriptor {
    pub id: MboxId,
    pub kind: MboxKind,
}

/// The two-part action name spec §4.1 requires ("delivered",
/// "rejected-by-filter", "no-subscribers", "overlimit:<reaction>").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceAction {
    Delivered,
    RejectedByFilter,
    NoSubscribers,
    OverlimitDrop,
    OverlimitAbort,
    OverlimitRedirect,
    OverlimitTransform,
    RedirectionDepthExceeded,
    TimerFiredNoSubscribers,
}

impl TraceAction {
    pub fn category(self) -> &'static str {
        match self {
            Self::Delivered => "mbox",
            Self::RejectedByFilter => "mbox",
            Self::NoSubscribers => "mbox",
            Self::RedirectionDepthExceeded => "mbox",
            Self::TimerFiredNoSubscribers => "timer",
            Self::OverlimitDrop
            | Self::OverlimitAbort
            | Self::OverlimitRedirect
            | Self::OverlimitTransform => "limit",
        }
    }

    pub fn verb(self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::RejectedByFilter => "rejected-by-filter",
            Self::NoSubscribers => "no-subscribers",
            Self::OverlimitDrop => "overlimit-drop",
            Self::OverlimitAbort => "overlimit-abort",
            Self::OverlimitRedirect => "overlimit-redirect",
            Self::OverlimitTransform => "overlimit-transform",
            Self::RedirectionDepthExceeded => "redirection-depth-exceeded",
            Self::TimerFiredNoSubscribers => "fired-no-subscribers",
        }
    }
}

impl fmt::Display for TraceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.category(), self.verb())
    }
}

/// One structured trace record, emitted for every routing decision a mbox
/// makes (spec §4.1).
#[derive(Debug, Clone)]
pub struct TraceRecord {
    pub thread_id: ThreadId,
    pub msg_type: MessageType,
    pub source_mbox: MboxDescriptor,
    pub target_agent: Option<u64>,
    pub envelope_ptr: Option<usize>,
    pub payload_ptr: usize,
    pub mutability: Mutability,
    pub action: TraceAction,
}

/// A predicate that may suppress individual trace records before they reach
/// the [`Tracer`].
pub trait TraceFilter: Send + Sync {
    fn allow(&self, record: &TraceRecord) -> bool;
}

impl<F: Fn(&TraceRecord) -> bool + Send + Sync> TraceFilter for F {
    fn allow(&self, record: &TraceRecord) -> bool {
        self(record)
    }
}

/// The trace backend consumed from outside the core (spec §6): a structured
/// sink the environment owns, not a global.
pub trait Tracer: Send + Sync {
    fn trace(&self, record: TraceRecord);
}

/// Default tracer: forwards every record to `tracing::trace!`.
pub struct TracingTracer;

impl Tracer for TracingTracer {
    fn trace(&self, record: TraceRecord) {
        tracing::trace!(
            thread = ?record.thread_id,
            msg_type = record.msg_type.name(),
            mbox_id = record.source_mbox.id,
            mbox_kind = ?record.source_mbox.kind,
            target_agent = ?record.target_agent,
            action = %record.action,
            "mbox routing decision"
        );
    }
}

/// Wraps another tracer with a [`TraceFilter`], so the environment can offer
/// one filter knob regardless of which tracer backend is configured (spec
/// §4.1, §6).
pub struct FilteredTracer {
    inner: Arc<dyn Tracer>,
    filter: Arc<dyn TraceFilter>,
}

impl FilteredTracer {
    pub fn new(inner: Arc<dyn Tracer>, filter: Arc<dyn TraceFilter>) -> Self {
        Self { inner, filter }
    }
}

impl Tracer for FilteredTracer {
    fn trace(&self, record: TraceRecord) {
        if self.filter.allow(&record) {
            self.inner.trace(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_display_is_two_part() {
        assert_eq!(TraceAction::Delivered.to_string(), "mbox.delivered");
        assert_eq!(TraceAction::OverlimitDrop.to_string(), "limit.overlimit-drop");
        assert_eq!(TraceAction::TimerFiredNoSubscribers.to_string(), "timer.fired-no-subscribers");
    }

    #[test]
    fn closures_work_as_trace_filters() {
        let filter: &dyn TraceFilter = &(|r: &TraceRecord| r.action == TraceAction::Delivered);
        let rec = TraceRecord {
            thread_id: std::thread::current().id(),
            msg_type: MessageType::of::<u32>(),
            source_mbox: MboxDescriptor { id: 1, kind: MboxKind::Mpmc },
            target_agent: None,
            envelope_ptr: None,
            payload_ptr: 0,
            mutability: Mutability::Immutable,
            action: TraceAction::NoSubscribers,
        };
        assert!(!filter.allow(&rec));
    }
}
