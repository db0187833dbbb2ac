// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One dedicated worker thread per bound agent, strict FIFO within that
//! agent (spec §4.5 table, row "active-object").

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use super::{AgentInvoker, DispBinder, DispatcherStats, Priority};
use crate::agent::AgentId;
use crate::demand::DemandQueue;
use crate::error::Result;

struct AgentWorker {
    queue: Arc<DemandQueue>,
    handle: Option<JoinHandle<()>>,
}

pub struct ActiveObjDispatcher {
    workers: Mutex<HashMap<AgentId, AgentWorker>>,
}

impl ActiveObjDispatcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { workers: Mutex::new(HashMap::new()) })
    }
}

impl DispBinder for ActiveObjDispatcher {
    fn preallocate_resources(&self, agent_id: AgentId, _priority: Priority) -> Result<Arc<DemandQueue>> {
        let queue = DemandQueue::new();
        self.workers.lock().insert(agent_id, AgentWorker { queue: queue.clone(), handle: None });
        Ok(queue)
    }

    fn undo_preallocation(&self, agent_id: AgentId) {
        self.workers.lock().remove(&agent_id);
    }

    fn bind(&self, agent_id: AgentId, invoker: AgentInvoker) {
        let mut workers = self.workers.lock();
        let Some(worker) = workers.get_mut(&agent_id) else { return };
        let queue = worker.queue.clone();
        worker.handle = Some(std::thread::spawn(move || {
            while let Some(demand) = queue.pop_blocking() {
                invoker(demand);
            }
        }));
    }

    fn unbind(&self, agent_id: AgentId) {
        if let Some(worker) = self.workers.lock().remove(&agent_id) {
            worker.queue.close();
            // The thread drains any remaining demand (including a pending
            // evt_finish) before `pop_blocking` observes the close and
            // returns, so we don't join here — joining from inside a
            // dispatcher call risks deadlocking a worker unbinding itself.
        }
    }

    fn stats(&self) -> DispatcherStats {
        let workers = self.workers.lock();
        DispatcherStats {
            name: "active_obj",
            agents_bound: workers.len(),
            queue_depth: workers.values().map(|w| w.queue.len()).sum(),
            worker_thread_ids: workers.values().filter_map(|w| w.handle.as_ref().map(|h| h.thread().id())).collect(),
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
    fn each_agent_gets_its_own_queue_and_thread() {
        let disp = ActiveObjDispatcher::new();
        let q1 = disp.preallocate_resources(1, Priority::NORMAL).unwrap();
        let q2 = disp.preallocate_resources(2, Priority::NORMAL).unwrap();
        let hits = Arc::new(AtomicU32::new(0));
        for id in [1, 2] {
            let hits = hits.clone();
            disp.bind(id, Arc::new(move |_| { hits.fetch_add(1, Ordering::AcqRel); }));
        }
        q1.push(ExecutionDemand::evt_start(1));
        q2.push(ExecutionDemand::evt_start(2));

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while hits.load(Ordering::Acquire) < 2 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(hits.load(Ordering::Acquire), 2);
        assert_eq!(disp.stats().agents_bound, 2);
    }
}
