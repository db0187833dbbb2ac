// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message boxes: the addressable routing endpoints agents subscribe to and
//! send through (spec §3, §4.1, §4.3).

mod mpmc;
mod mpsc;

pub use mpmc::MpmcMbox;
pub use mpsc::MpscMbox;

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::filter::DeliveryFilter;
use crate::limit::{LimitTable, MessageLimit};
use crate::message::{MessageRef, MessageType, Mutability, Payload};
use crate::trace::Tracer;

pub type MboxId = u64;

/// Shorthand for the trait object every public API hands around — there is
/// no owned `Mbox` type, only shared handles to one.
pub type MboxRef = Arc<dyn Mbox>;

/// Resolves a [`MboxId`] to a live mbox, for `OverlimitReaction::Redirect`/
/// `Transform` targets. Shared so [`crate::limit::apply_overlimit`] and
/// [`crate::sink::AgentSink`] don't each need a private copy of this shape.
pub type MboxDirectory = Arc<dyn Fn(MboxId) -> Option<MboxRef> + Send + Sync>;

/// The two addressing disciplines an mbox can implement (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MboxKind {
    /// Multi-producer/multi-consumer: any number of subscribers, broadcast
    /// delivery, immutable messages only.
    Mpmc,
    /// Multi-producer/single-consumer: exactly one subscriber (the agent
    /// that owns it), may carry mutable messages.
    Mpsc,
}

/// What an mbox does with a resolved message once a send reaches it: look up
/// subscribers and hand the message to each one's per-agent demand queue.
///
/// Both backends share everything except "how many subscribers can there
/// be" and "are mutable messages allowed" — expressed here as one trait with
/// two implementations rather than duplicating the delivery algorithm.
pub trait Mbox: Send + Sync {
    fn id(&self) -> MboxId;
    fn kind(&self) -> MboxKind;

    /// Register interest from one agent, with its resolved handler slot
    /// already created in the agent's subscription storage. `mbox` only
    /// needs to know a subscriber now exists for `msg_type`, so it can route
    /// future sends to [`Self::deliver`]'s subscriber callback.
    fn subscribe(&self, subscriber: SubscriberHandle, msg_type: MessageType) -> Result<()>;

    /// Undo [`Self::subscribe`]. Returns whether this was the last
    /// subscriber for `msg_type` (spec §4.2 invariant: mbox-side bookkeeping
    /// must agree with the agent-side subscription storage).
    fn unsubscribe(&self, subscriber_id: u64, msg_type: MessageType) -> bool;

    /// Attach a delivery filter for `msg_type`, replacing any previous one
    /// (spec §4.3). Only meaningful on MPMC mboxes.
    fn set_filter(&self, msg_type: MessageType, filter: Arc<dyn DeliveryFilter>);
    fn drop_filter(&self, msg_type: MessageType);

    /// Route one resolved payload to every current subscriber for its
    /// message type, consulting the delivery filter and message limits
    /// along the way. `source_thread` is only used for tracing.
    fn deliver(&self, payload: Payload, mutability: Mutability) -> Result<()>;

    fn subscriber_count(&self, msg_type: MessageType) -> usize;

    /// Release one message-limit slot reserved by the subscriber's
    /// [`crate::sink::AgentSink`]. Called by the dispatcher worker the
    /// moment it pops the corresponding demand off the agent's queue — the
    /// counter guards in-flight (enqueued but not yet executing) demand, not
    /// demand still being handled (spec §4.3: "the counter is incremented
    /// before enqueue and decremented when the demand is popped for
    /// execution").
    fn release_reserved(&self, subscriber_id: u64, msg_type: MessageType);

    /// Configure a message limit for `msg_type` on this mbox, scoped to one
    /// subscriber (spec §3: "per agent, per message type"; §4.1: "the sink
    /// is responsible for incrementing its own limit counter").
    fn set_limit(&self, subscriber_id: u64, msg_type: MessageType, limit: MessageLimit);
    fn drop_limit(&self, subscriber_id: u64, msg_type: MessageType);

    /// The shared table backing this mbox's per-subscriber limits, handed to
    /// each [`crate::sink::AgentSink`] created by [`Self::subscribe`] so it
    /// can reserve/release its own counter directly.
    fn limits(&self) -> Arc<LimitTable>;
}

/// What a mbox hands a matched payload to: the agent's own push path, kept
/// opaque here so `mbox` never needs to know about `agent`'s internals
/// beyond this one callback.
pub struct SubscriberHandle {
    pub subscriber_id: u64,
    pub push: Arc<dyn Fn(MessageRef) -> Result<()> + Send + Sync>,
}

impl fmt::Debug for SubscriberHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberHandle").field("subscriber_id", &self.subscriber_id).finish()
    }
}

/// Shared machinery every mbox backend needs: the limit table and the
/// tracer. Factored out so [`MpmcMbox`] and [`MpscMbox`] only implement the
/// parts that actually differ (spec §3's split between the two kinds).
pub(crate) struct MboxShared {
    pub id: MboxId,
    pub limits: Arc<LimitTable>,
    pub tracer: Arc<dyn Tracer>,
}

impl MboxShared {
    pub fn new(id: MboxId, tracer: Arc<dyn Tracer>) -> Self {
        Self { id, limits: Arc::new(LimitTable::new()), tracer }
    }
}
