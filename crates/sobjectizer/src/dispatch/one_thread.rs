// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single worker thread, one shared queue, strict FIFO across every bound
//! agent (spec §4.5 table, row "one-thread").

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{JoinHandle, ThreadId};

use parking_lot::RwLock;

use super::{AgentInvoker, DispBinder, DispatcherStats, Priority};
use crate::agent::AgentId;
use crate::demand::DemandQueue;
use crate::error::Result;

pub struct OneThreadDispatcher {
    queue: Arc<DemandQueue>,
    invokers: Arc<RwLock<HashMap<AgentId, AgentInvoker>>>,
    worker: JoinHandle<()>,
    worker_thread_id: ThreadId,
    shutting_down: Arc<AtomicBool>,
}

impl OneThreadDispatcher {
    pub fn new() -> Arc<Self> {
        let queue = DemandQueue::new();
        let invokers: Arc<RwLock<HashMap<AgentId, AgentInvoker>>> = Arc::new(RwLock::new(HashMap::new()));
        let shutting_down = Arc::new(AtomicBool::new(false));

        let worker_queue = queue.clone();
        let worker_invokers = invokers.clone();
        let worker = std::thread::spawn(move || {
            while let Some(demand) = worker_queue.pop_blocking() {
                let invoker = worker_invokers.read().get(&demand.agent).cloned();
                if let Some(invoker) = invoker {
                    invoker(demand);
                }
            }
        });
        let worker_thread_id = worker.thread().id();

        Arc::new(Self { queue, invokers, worker, worker_thread_id, shutting_down })
    }

    /// Stops the worker thread. Bound agents still queued are dropped
    /// without running — callers are expected to have already deregistered
    /// every coop bound here.
    pub fn shutdown(self: Arc<Self>) {
        self.shutting_down.store(true, Ordering::Release);
        self.queue.close();
    }
}

impl DispBinder for OneThreadDispatcher {
    fn preallocate_resources(&self, _agent_id: AgentId, _priority: Priority) -> Result<Arc<DemandQueue>> {
        Ok(self.queue.clone())
    }

    fn undo_preallocation(&self, _agent_id: AgentId) {}

    fn bind(&self, agent_id: AgentId, invoker: AgentInvoker) {
        self.invokers.write().insert(agent_id, invoker);
    }

    fn unbind(&self, agent_id: AgentId) {
        self.invokers.write().remove(&agent_id);
    }

    fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            name: "one_thread",
            agents_bound: self.invokers.read().len(),
            queue_depth: self.queue.len(),
            worker_thread_ids: vec![self.worker_thread_id],
        }
    }
}
