// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Multi-producer/multi-consumer mbox: broadcast delivery to any number of
//! subscribers, immutable messages only (spec §3).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{Mbox, MboxId, MboxKind, MboxShared, SubscriberHandle};
use crate::error::{self, Result, SoErrorKind};
use crate::filter::DeliveryFilter;
use crate::limit::LimitTable;
use crate::message::{MessageType, Mutability, Payload};
use crate::trace::{MboxDescriptor, TraceAction, TraceRecord};

struct Route {
    subscribers: Vec<SubscriberHandle>,
    filter: Option<Arc<dyn DeliveryFilter>>,
}

pub struct MpmcMbox {
    shared: MboxShared,
    routes: RwLock<HashMap<u64, Route>>,
}

impl MpmcMbox {
    pub fn new(id: MboxId, tracer: Arc<dyn crate::trace::Tracer>) -> Arc<Self> {
        Arc::new(Self { shared: MboxShared::new(id, tracer), routes: RwLock::new(HashMap::new()) })
    }

    fn trace(&self, msg_type: MessageType, mutability: Mutability, action: TraceAction) {
        self.shared.tracer.trace(TraceRecord {
            thread_id: std::thread::current().id(),
            msg_type,
            source_mbox: MboxDescriptor { id: self.shared.id, kind: MboxKind::Mpmc },
            target_agent: None,
            envelope_ptr: None,
            payload_ptr: 0,
            mutability,
            action,
        });
    }

    fn deliver_inner(&self, payload: Payload, mutability: Mutability) -> Result<()> {
        if mutability == Mutability::Mutable {
            return error::err(SoErrorKind::MutableOnMpmc, "mutable message sent through an MPMC mbox");
        }

        let Some(resolved) = payload.resolve() else {
            return Ok(());
        };
        let msg_type = resolved.msg_type();
        let rank = msg_type.rank();

        let routes = self.routes.read();
        let Some(route) = routes.get(&rank) else {
            drop(routes);
            self.trace(msg_type, mutability, TraceAction::NoSubscribers);
            return Ok(());
        };

        if let Some(filter) = &route.filter {
            if !filter.check(&resolved) {
                drop(routes);
                self.trace(msg_type, mutability, TraceAction::RejectedByFilter);
                return Ok(());
            }
        }

        // Message limits are per-subscriber (spec §3), so they are reserved
        // inside each subscriber's own `AgentSink::push_event`, not here —
        // a broadcast to N subscribers must not share one counter between
        // them.
        for subscriber in &route.subscribers {
            (subscriber.push)(resolved.clone())?;
        }
        drop(routes);
        self.trace(msg_type, mutability, TraceAction::Delivered);
        Ok(())
    }
}

impl Mbox for MpmcMbox {
    fn id(&self) -> MboxId {
        self.shared.id
    }

    fn kind(&self) -> MboxKind {
        MboxKind::Mpmc
    }

    fn subscribe(&self, subscriber: SubscriberHandle, msg_type: MessageType) -> Result<()> {
        let mut routes = self.routes.write();
        let route = routes.entry(msg_type.rank()).or_insert_with(|| Route { subscribers: Vec::new(), filter: None });
        route.subscribers.push(subscriber);
        Ok(())
    }

    fn unsubscribe(&self, subscriber_id: u64, msg_type: MessageType) -> bool {
        let mut routes = self.routes.write();
        let Some(route) = routes.get_mut(&msg_type.rank()) else {
            return true;
        };
        route.subscribers.retain(|s| s.subscriber_id != subscriber_id);
        let now_empty = route.subscribers.is_empty();
        if now_empty {
            routes.remove(&msg_type.rank());
        }
        now_empty
    }

    fn set_filter(&self, msg_type: MessageType, filter: Arc<dyn DeliveryFilter>) {
        let mut routes = self.routes.write();
        let route = routes.entry(msg_type.rank()).or_insert_with(|| Route { subscribers: Vec::new(), filter: None });
        route.filter = Some(filter);
    }

    fn drop_filter(&self, msg_type: MessageType) {
        if let Some(route) = self.routes.write().get_mut(&msg_type.rank()) {
            route.filter = None;
        }
    }

    fn deliver(&self, payload: Payload, mutability: Mutability) -> Result<()> {
        self.deliver_inner(payload, mutability)
    }

    fn subscriber_count(&self, msg_type: MessageType) -> usize {
        self.routes.read().get(&msg_type.rank()).map_or(0, |r| r.subscribers.len())
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
