// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Multi-producer/single-consumer mbox: exactly one subscriber (the owning
//! agent), may carry mutable messages since there is never a second reader
//! to race with (spec §3).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::{Mbox, MboxId, MboxKind, MboxShared, SubscriberHandle};
use crate::error::{self, Result, SoErrorKind};
use crate::filter::DeliveryFilter;
use crate::limit::LimitTable;
use crate::message::{MessageType, Mutability, Payload};
use crate::trace::{MboxDescriptor, TraceAction, TraceRecord};

const NO_OWNER: u64 = u64::MAX;

pub struct MpscMbox {
    shared: MboxShared,
    routes: RwLock<HashMap<u64, SubscriberHandle>>,
    owner: AtomicU64,
}

impl MpscMbox {
    pub fn new(id: MboxId, tracer: Arc<dyn crate::trace::Tracer>) -> Arc<Self> {
        Arc::new(Self { shared: MboxShared::new(id, tracer), routes: RwLock::new(HashMap::new()), owner: AtomicU64::new(NO_OWNER) })
    }

    fn trace(&self, msg_type: MessageType, mutability: Mutability, action: TraceAction) {
        self.shared.tracer.trace(TraceRecord {
            thread_id: std::thread::current().id(),
            msg_type,
            source_mbox: MboxDescriptor { id: self.shared.id, kind: MboxKind::Mpsc },
            target_agent: None,
            envelope_ptr: None,
            payload_ptr: 0,
            mutability,
            action,
        });
    }
}

impl Mbox for MpscMbox {
    fn id(&self) -> MboxId {
        self.shared.id
    }

    fn kind(&self) -> MboxKind {
        MboxKind::Mpsc
    }

    fn subscribe(&self, subscriber: SubscriberHandle, msg_type: MessageType) -> Result<()> {
        let existing_owner = self.owner.load(Ordering::Acquire);
        if existing_owner != NO_OWNER && existing_owner != subscriber.subscriber_id {
            return error::err(
                SoErrorKind::DuplicateSubscription,
                "an MPSC mbox may have only one subscribing agent",
            );
        }
        self.owner.store(subscriber.subscriber_id, Ordering::Release);
        let mut routes = self.routes.write();
        if routes.contains_key(&msg_type.rank()) {
            return error::err(SoErrorKind::DuplicateSubscription, "duplicate (mbox, msg-type) subscription");
        }
        routes.insert(msg_type.rank(), subscriber);
        Ok(())
    }

    fn unsubscribe(&self, subscriber_id: u64, msg_type: MessageType) -> bool {
        let mut routes = self.routes.write();
        let Some(existing) = routes.get(&msg_type.rank()) else {
            return true;
        };
        if existing.subscriber_id != subscriber_id {
            return false;
        }
        routes.remove(&msg_type.rank());
        let now_empty = routes.is_empty();
        if now_empty {
            self.owner.store(NO_OWNER, Ordering::Release);
        }
        true
    }

    fn set_filter(&self, _msg_type: MessageType, _filter: Arc<dyn DeliveryFilter>) {
        // Delivery filters are an MPMC-only concept (spec §4.3): an MPSC
        // mbox has one reader, so there is no fan-out to selectively admit.
    }

    fn drop_filter(&self, _msg_type: MessageType) {}

    fn deliver(&self, payload: Payload, mutability: Mutability) -> Result<()> {
        let Some(resolved) = payload.resolve() else {
            return Ok(());
        };
        let msg_type = resolved.msg_type();
        let rank = msg_type.rank();

        let routes = self.routes.read();
        let Some(subscriber) = routes.get(&rank) else {
            drop(routes);
            self.trace(msg_type, mutability, TraceAction::NoSubscribers);
            return Ok(());
        };

        // The message limit for this one subscriber lives in its own
        // `AgentSink::push_event`, not here (spec §3); an MPSC mbox only
        // ever has the one subscriber, but the reservation still belongs to
        // the sink, not the mbox, for the same reason it does on MPMC.
        let result = (subscriber.push)(resolved.clone());
        drop(routes);
        self.trace(msg_type, mutability, TraceAction::Delivered);
        result
    }

    fn subscriber_count(&self, msg_type: MessageType) -> usize {
        if self.routes.read().contains_key(&msg_type.rank()) {
            1
        } else {
            0
        }
    }

    fn release_reserved(&self, subscriber_id: u64, msg_type: MessageType) {
        self.shared.limits.release(subscriber_id, msg_type.rank());
    }

    fn set_limit(&self, subscriber_id: u64, msg_type: MessageType, limit: crate::limit::MessageLimit) {
        self.shared.limits.set_limit(subscriber_id, msg_type.rank(), limit);
    }

    fn drop_limit(&self, subscriber_id: u64, msg_type: MessageType) {
        self.shared.limits.drop_limit(subscriber_id, msg_type.rank());
    }

    fn limits(&self) -> Arc<LimitTable> {
        self.shared.limits.clone()
    }
}
