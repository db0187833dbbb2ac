// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution demand and event queue (spec §3, §4.4).

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::agent::AgentId;
use crate::mbox::MboxId;
use crate::message::{MessageRef, MessageType};

/// Tags which handler a demand must be invoked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerSelector {
    Msg,
    MutableMsg,
    EvtStart,
    EvtFinish,
}

/// One queued unit of work: "run this agent's handler for this message".
///
/// Created on enqueue, consumed on execution (spec §3).
#[derive(Clone)]
pub struct ExecutionDemand {
    pub agent: AgentId,
    pub mbox_id: MboxId,
    pub msg_type: Option<MessageType>,
    pub message: Option<MessageRef>,
    pub selector: HandlerSelector,
}

impl ExecutionDemand {
    pub fn evt_start(agent: AgentId) -> Self {
        Self { agent, mbox_id: 0, msg_type: None, message: None, selector: HandlerSelector::EvtStart }
    }

    pub fn evt_finish(agent: AgentId) -> Self {
        Self { agent, mbox_id: 0, msg_type: None, message: None, selector: HandlerSelector::EvtFinish }
    }
}

/// Per-agent or per-thread FIFO queue of [`ExecutionDemand`]s.
///
/// `push_evt_finish` never fails: the queue has no capacity bound of its own
/// (message-limit back-pressure is enforced earlier, per message type, not
/// here), so the "reserved slot" guarantee spec §4.4/§4.5 describes for the
/// C++ original falls out of this queue's design rather than needing a
/// preallocated ring slot.
pub struct DemandQueue {
    inner: Mutex<VecDeque<ExecutionDemand>>,
    not_empty: Condvar,
    closed: std::sync::atomic::AtomicBool,
}

impl DemandQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(VecDeque::with_capacity(16)),
            not_empty: Condvar::new(),
            closed: std::sync::atomic::AtomicBool::new(false),
        })
    }

    pub fn push(&self, demand: ExecutionDemand) {
        let mut q = self.inner.lock();
        q.push_back(demand);
        self.not_empty.notify_one();
    }

    /// Must never panic or block — callers rely on this to deliver
    /// `evt_finish` even under back-pressure.
    pub fn push_evt_finish(&self, demand: ExecutionDemand) {
        self.push(demand);
    }

    /// Block until a demand is available or the queue is closed.
    pub fn pop_blocking(&self) -> Option<ExecutionDemand> {
        let mut q = self.inner.lock();
        loop {
            if let Some(d) = q.pop_front() {
                return Some(d);
            }
            if self.closed.load(std::sync::atomic::Ordering::Acquire) {
                return None;
            }
            self.not_empty.wait(&mut q);
        }
    }

    /// Non-blocking pop, used by thread-pool workers doing work-stealing.
    pub fn try_pop(&self) -> Option<ExecutionDemand> {
        self.inner.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wake every waiter and make subsequent `pop_blocking` calls return
    /// `None` once drained — used to stop a dispatcher's worker threads.
    pub fn close(&self) {
        self.closed.store(true, std::sync::atomic::Ordering::Release);
        self.not_empty.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_preserved() {
        let q = DemandQueue::new();
        q.push(ExecutionDemand::evt_start(1));
        q.push(ExecutionDemand::evt_finish(1));
        assert_eq!(q.pop_blocking().unwrap().selector, HandlerSelector::EvtStart);
        assert_eq!(q.pop_blocking().unwrap().selector, HandlerSelector::EvtFinish);
    }

    #[test]
    fn close_unblocks_waiters() {
        let q = DemandQueue::new();
        q.close();
        assert!(q.pop_blocking().is_none());
    }

    #[test]
    fn push_evt_finish_never_blocks_or_panics() {
        let q = DemandQueue::new();
        for _ in 0..1000 {
            q.push_evt_finish(ExecutionDemand::evt_finish(7));
        }
        assert_eq!(q.len(), 1000);
    }
}
