// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! N worker threads sharing one demand queue, FIFO per agent via that
//! agent's own queued demands always landing on the same shared queue in
//! submission order (spec §4.5 table, row "thread-pool").
//!
//! Work-stealing falls out of every worker pulling from the same queue
//! rather than owning a private one — there is nothing to steal *from*,
//! every worker already pulls whatever is next.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{JoinHandle, ThreadId};

use parking_lot::RwLock;

use super::{AgentInvoker, DispBinder, DispatcherStats, Priority};
use crate::agent::AgentId;
use crate::demand::DemandQueue;
use crate::error::Result;

pub struct ThreadPoolDispatcher {
    queue: Arc<DemandQueue>,
    invokers: Arc<RwLock<HashMap<AgentId, AgentInvoker>>>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPoolDispatcher {
    pub fn new(worker_count: usize) -> Arc<Self> {
        let queue = DemandQueue::new();
        let invokers: Arc<RwLock<HashMap<AgentId, AgentInvoker>>> = Arc::new(RwLock::new(HashMap::new()));
        let workers = (0..worker_count.max(1))
            .map(|_| {
                let queue = queue.clone();
                let invokers = invokers.clone();
                std::thread::spawn(move || {
                    while let Some(demand) = queue.pop_blocking() {
                        let invoker = invokers.read().get(&demand.agent).cloned();
                        if let Some(invoker) = invoker {
                            invoker(demand);
                        }
                    }
                })
            })
            .collect();
        Arc::new(Self { queue, invokers, workers })
    }
}

impl DispBinder for ThreadPoolDispatcher {
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
            name: "thread_pool",
            agents_bound: self.invokers.read().len(),
            queue_depth: self.queue.len(),
            worker_thread_ids: self.workers.iter().map(|h| h.thread().id()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demand::ExecutionDemand;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[test]
    fn every_bound_agent_is_serviced_across_the_pool() {
        let disp = ThreadPoolDispatcher::new(3);
        let queue = disp.preallocate_resources(1, Priority::NORMAL).unwrap();
        let hits = Arc::new(AtomicU32::new(0));
        for id in 1..=5u64 {
            let hits = hits.clone();
            disp.bind(id, Arc::new(move |_| { hits.fetch_add(1, Ordering::AcqRel); }));
        }
        for id in 1..=5u64 {
            queue.push(ExecutionDemand::evt_start(id));
        }

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while hits.load(Ordering::Acquire) < 5 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(hits.load(Ordering::Acquire), 5);
        assert_eq!(disp.stats().worker_thread_ids.len(), 3);
    }
}
