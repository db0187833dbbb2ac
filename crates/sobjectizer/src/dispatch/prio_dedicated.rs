// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One dedicated worker thread per priority level, each servicing only its
//! own queue (spec §4.5 table, row "prio dedicated-threads-per-priority").
//!
//! Unlike [`super::prio_one_thread`], a low-priority agent can never starve
//! a high-priority one out of CPU time on the same worker — they simply
//! don't share one. The tradeoff is eight idle threads when most levels go
//! unused, which is the same tradeoff the original makes for this strategy.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{JoinHandle, ThreadId};

use parking_lot::RwLock;

use super::{AgentInvoker, DispBinder, DispatcherStats, Priority};
use crate::agent::AgentId;
use crate::demand::DemandQueue;
use crate::error::Result;

struct Level {
    queue: Arc<DemandQueue>,
    invokers: Arc<RwLock<HashMap<AgentId, AgentInvoker>>>,
    worker: JoinHandle<()>,
}

pub struct PrioDedicatedDispatcher {
    levels: Vec<Level>,
    agent_level: RwLock<HashMap<AgentId, usize>>,
}

impl PrioDedicatedDispatcher {
    pub fn new() -> Arc<Self> {
        let levels = (0..Priority::LEVELS)
            .map(|_| {
                let queue = DemandQueue::new();
                let invokers: Arc<RwLock<HashMap<AgentId, AgentInvoker>>> = Arc::new(RwLock::new(HashMap::new()));
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
                Level { queue, invokers, worker }
            })
            .collect();
        Arc::new(Self { levels, agent_level: RwLock::new(HashMap::new()) })
    }
}

impl DispBinder for PrioDedicatedDispatcher {
    fn preallocate_resources(&self, agent_id: AgentId, priority: Priority) -> Result<Arc<DemandQueue>> {
        let idx = priority.index();
        self.agent_level.write().insert(agent_id, idx);
        Ok(self.levels[idx].queue.clone())
    }

    fn undo_preallocation(&self, agent_id: AgentId) {
        self.agent_level.write().remove(&agent_id);
    }

    fn bind(&self, agent_id: AgentId, invoker: AgentInvoker) {
        let Some(&idx) = self.agent_level.read().get(&agent_id) else { return };
        self.levels[idx].invokers.write().insert(agent_id, invoker);
    }

    fn unbind(&self, agent_id: AgentId) {
        if let Some(idx) = self.agent_level.write().remove(&agent_id) {
            self.levels[idx].invokers.write().remove(&agent_id);
        }
    }

    fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            name: "prio_dedicated",
            agents_bound: self.levels.iter().map(|l| l.invokers.read().len()).sum(),
            queue_depth: self.levels.iter().map(|l| l.queue.len()).sum(),
            worker_thread_ids: self.levels.iter().map(|l| l.worker.thread().id()).collect::<Vec<ThreadId>>(),
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
    fn each_priority_level_runs_on_its_own_thread() {
        let disp = PrioDedicatedDispatcher::new();
        let low_q = disp.preallocate_resources(1, Priority(1)).unwrap();
        let high_q = disp.preallocate_resources(2, Priority(6)).unwrap();
        let hits = Arc::new(AtomicU32::new(0));
        for id in [1u64, 2] {
            let hits = hits.clone();
            disp.bind(id, Arc::new(move |_| { hits.fetch_add(1, Ordering::AcqRel); }));
        }
        low_q.push(ExecutionDemand::evt_start(1));
        high_q.push(ExecutionDemand::evt_start(2));

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while hits.load(Ordering::Acquire) < 2 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(hits.load(Ordering::Acquire), 2);
        assert_eq!(disp.stats().worker_thread_ids.len(), Priority::LEVELS);
    }

    #[test]
    fn undo_preallocation_removes_the_agent_level_mapping() {
        let disp = PrioDedicatedDispatcher::new();
        let _q = disp.preallocate_resources(1, Priority(4)).unwrap();
        disp.undo_preallocation(1);
        disp.bind(1, Arc::new(|_| {}));
        assert_eq!(disp.stats().agents_bound, 0);
    }
}
