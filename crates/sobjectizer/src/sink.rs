// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message sinks: the receiving end a mbox hands a resolved message to.
//! Every subscriber a mbox knows about is, under the hood, a
//! [`MessageSink`] — usually an [`AgentSink`] that turns a delivery into an
//! [`crate::demand::ExecutionDemand`] on the owning agent's queue (spec §3,
//! §4.1; supplemented from `dev/so_5/msinks/transform_then_redirect.hpp`).

use std::sync::Arc;

use crate::agent::AgentId;
use crate::demand::{DemandQueue, ExecutionDemand, HandlerSelector};
use crate::error::Result;
use crate::limit::{LimitTable, ReserveOutcome};
use crate::mbox::{MboxDirectory, MboxId, MboxKind};
use crate::message::{MessageRef, MessageType};
use crate::trace::{MboxDescriptor, Tracer};

/// Anything a mbox can hand a resolved [`MessageRef`] to.
pub trait MessageSink: Send + Sync {
    fn push_event(&self, message: MessageRef) -> Result<()>;

    /// Adapts this sink into the plain closure shape [`crate::mbox::SubscriberHandle`]
    /// stores, so mboxes never need to know about `MessageSink` itself.
    fn into_push_fn(self: Arc<Self>) -> Arc<dyn Fn(MessageRef) -> Result<()> + Send + Sync>
    where
        Self: 'static,
    {
        Arc::new(move |message| self.push_event(message))
    }
}

/// The ordinary case: delivery becomes one [`ExecutionDemand`] enqueued on
/// the owning agent's [`DemandQueue`] — unless this subscriber's own message
/// limit (keyed by `(agent, msg_type)`, spec §3/§4.3) is already exhausted,
/// in which case the configured [`crate::limit::OverlimitReaction`] runs
/// instead. Each `AgentSink` owns its subscriber's share of the mbox's
/// [`LimitTable`] — it never touches another subscriber's counter.
pub struct AgentSink {
    pub agent: AgentId,
    pub mbox_id: MboxId,
    pub mbox_kind: MboxKind,
    pub msg_type: MessageType,
    pub selector: HandlerSelector,
    pub queue: Arc<DemandQueue>,
    pub limits: Arc<LimitTable>,
    pub directory: MboxDirectory,
    pub tracer: Arc<dyn Tracer>,
}

impl MessageSink for AgentSink {
    fn push_event(&self, message: MessageRef) -> Result<()> {
        match self.limits.try_reserve(self.agent, self.msg_type.rank()) {
            ReserveOutcome::Admitted => {
                self.queue.push(ExecutionDemand {
                    agent: self.agent,
                    mbox_id: self.mbox_id,
                    msg_type: Some(self.msg_type),
                    message: Some(message),
                    selector: self.selector,
                });
                Ok(())
            }
            ReserveOutcome::Overlimit(reaction) => crate::limit::apply_overlimit(
                reaction,
                &message,
                MboxDescriptor { id: self.mbox_id, kind: self.mbox_kind },
                &self.tracer,
                &self.directory,
            ),
        }
    }
}

/// Decorates an inner sink with a transformation applied before forwarding
/// (spec supplement: `msinks::transform_then_redirect`). Used by
/// `Agent::transform_in` to reshape one mbox's message into a different
/// type for a single subscriber without an intermediate agent, and by the
/// message-limit `transform` overlimit reaction's subscribe-time sibling.
///
/// Returning `None` from the transform suppresses delivery entirely.
pub struct TransformThenRedirectSink<F> {
    inner: Arc<dyn MessageSink>,
    transform: F,
}

impl<F> TransformThenRedirectSink<F>
where
    F: Fn(&MessageRef) -> Option<MessageRef> + Send + Sync,
{
    pub fn new(inner: Arc<dyn MessageSink>, transform: F) -> Self {
        Self { inner, transform }
    }
}

impl<F> MessageSink for TransformThenRedirectSink<F>
where
    F: Fn(&MessageRef) -> Option<MessageRef> + Send + Sync,
{
    fn push_event(&self, message: MessageRef) -> Result<()> {
        match (self.transform)(&message) {
            Some(transformed) => self.inner.push_event(transformed),
            None => Ok(()),
        }
    }
}

/// One sink bound to one subscription — the common case returned by
/// `Agent::subscribe`.
pub struct SingleSinkBinding {
    pub sink: Arc<dyn MessageSink>,
}

impl SingleSinkBinding {
    pub fn new(sink: Arc<dyn MessageSink>) -> Self {
        Self { sink }
    }
}

/// Several sinks bound together under one logical subscription — used when
/// `Agent::transform_in` fans one incoming message type out to more than one
/// locally-defined handler without re-subscribing to the source mbox per
/// handler.
pub struct MultiSinkBinding {
    pub sinks: Vec<Arc<dyn MessageSink>>,
}

impl MultiSinkBinding {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn push(&mut self, sink: Arc<dyn MessageSink>) {
        self.sinks.push(sink);
    }
}

impl Default for MultiSinkBinding {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MessageInstance, Mutability};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingSink(AtomicU32);

    impl MessageSink for CountingSink {
        fn push_event(&self, _message: MessageRef) -> Result<()> {
            self.0.fetch_add(1, Ordering::AcqRel);
            Ok(())
        }
    }

    #[test]
    fn transform_then_redirect_forwards_transformed_message() {
        let inner = Arc::new(CountingSink(AtomicU32::new(0)));
        let sink = TransformThenRedirectSink::new(inner.clone(), |m: &MessageRef| Some(m.clone()));
        let msg = Arc::new(MessageInstance::new_message(1u32, Mutability::Immutable));
        sink.push_event(msg).unwrap();
        assert_eq!(inner.0.load(Ordering::Acquire), 1);
    }

    #[test]
    fn transform_returning_none_suppresses_delivery() {
        let inner = Arc::new(CountingSink(AtomicU32::new(0)));
        let sink = TransformThenRedirectSink::new(inner.clone(), |_: &MessageRef| None);
        let msg = Arc::new(MessageInstance::new_message(1u32, Mutability::Immutable));
        sink.push_event(msg).unwrap();
        assert_eq!(inner.0.load(Ordering::Acquire), 0);
    }
}
