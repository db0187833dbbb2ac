// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-worker priority dispatchers: one queue per priority level, one
//! worker thread choosing which level to service next (spec §4.5 table,
//! "prio one-thread strictly-ordered" and "prio one-thread quoted
//! round-robin").
//!
//! [`crate::demand::DemandQueue::pop_blocking`] blocks on exactly one
//! queue, so a worker juggling eight of them polls round the levels rather
//! than waiting on all of them at once; idle ticks back off with a short
//! sleep instead of spinning.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{JoinHandle, ThreadId};
use std::time::Duration;

use parking_lot::RwLock;

use super::{AgentInvoker, DispBinder, DispatcherStats, Priority};
use crate::agent::AgentId;
use crate::demand::DemandQueue;
use crate::error::Result;

const IDLE_BACKOFF: Duration = Duration::from_micros(200);

fn make_level_queues() -> Vec<Arc<DemandQueue>> {
    (0..Priority::LEVELS).map(|_| DemandQueue::new()).collect()
}

struct Shared {
    queues: Vec<Arc<DemandQueue>>,
    invokers: RwLock<HashMap<AgentId, (usize, AgentInvoker)>>,
    stopping: AtomicBool,
}

/// Drains strictly from highest priority to lowest: a level is fully
/// emptied before the worker even looks at the next one down.
pub struct PrioOneThreadStrict {
    shared: Arc<Shared>,
    worker: JoinHandle<()>,
    worker_thread_id: ThreadId,
}

impl PrioOneThreadStrict {
    pub fn new() -> Arc<Self> {
        let shared = Arc::new(Shared {
            queues: make_level_queues(),
            invokers: RwLock::new(HashMap::new()),
            stopping: AtomicBool::new(false),
        });
        let worker_shared = shared.clone();
        let worker = std::thread::spawn(move || {
            while !worker_shared.stopping.load(Ordering::Acquire) {
                let mut serviced = false;
                for level in (0..Priority::LEVELS).rev() {
                    if let Some(demand) = worker_shared.queues[level].try_pop() {
                        let invoker = worker_shared.invokers.read().get(&demand.agent).map(|(_, i)| i.clone());
                        if let Some(invoker) = invoker {
                            invoker(demand);
                        }
                        serviced = true;
                        break;
                    }
                }
                if !serviced {
                    std::thread::sleep(IDLE_BACKOFF);
                }
            }
        });
        let worker_thread_id = worker.thread().id();
        Arc::new(Self { shared, worker, worker_thread_id })
    }

    pub fn shutdown(&self) {
        self.shared.stopping.store(true, Ordering::Release);
    }
}

impl DispBinder for PrioOneThreadStrict {
    fn preallocate_resources(&self, _agent_id: AgentId, priority: Priority) -> Result<Arc<DemandQueue>> {
        Ok(self.shared.queues[priority.index()].clone())
    }

    fn undo_preallocation(&self, _agent_id: AgentId) {}

    fn bind(&self, agent_id: AgentId, invoker: AgentInvoker) {
        // The priority is implied by which queue `preallocate_resources`
        // handed back; recover it by checking which level's queue the
        // caller already holds a clone of is not possible here, so callers
        // must bind right after preallocating at the same priority and we
        // trust that ordering (coop registration always does both for the
        // same agent back-to-back, spec §4.6 steps 3 and 6).
        let priority = self.priority_of(agent_id).unwrap_or(Priority::NORMAL);
        self.shared.invokers.write().insert(agent_id, (priority.index(), invoker));
    }

    fn unbind(&self, agent_id: AgentId) {
        self.shared.invokers.write().remove(&agent_id);
    }

    fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            name: "prio_one_thread_strict",
            agents_bound: self.shared.invokers.read().len(),
            queue_depth: self.shared.queues.iter().map(|q| q.len()).sum(),
            worker_thread_ids: vec![self.worker_thread_id],
        }
    }
}

impl PrioOneThreadStrict {
    fn priority_of(&self, agent_id: AgentId) -> Option<Priority> {
        self.shared.invokers.read().get(&agent_id).map(|(idx, _)| Priority(*idx as u8))
    }
}

/// Visits every non-empty level in descending order each round, taking up
/// to `quota` demands per level before moving on, so lower-priority agents
/// still make progress instead of starving (spec §4.5 table, "quoted
/// round-robin").
pub struct PrioOneThreadRoundRobin {
    shared: Arc<Shared>,
    quota: usize,
    worker: JoinHandle<()>,
    worker_thread_id: ThreadId,
}

impl PrioOneThreadRoundRobin {
    pub fn new(quota_per_level: usize) -> Arc<Self> {
        let quota = quota_per_level.max(1);
        let shared = Arc::new(Shared {
            queues: make_level_queues(),
            invokers: RwLock::new(HashMap::new()),
            stopping: AtomicBool::new(false),
        });
        let worker_shared = shared.clone();
        let worker = std::thread::spawn(move || {
            while !worker_shared.stopping.load(Ordering::Acquire) {
                let mut serviced_any = false;
                for level in (0..Priority::LEVELS).rev() {
                    for _ in 0..quota {
                        let Some(demand) = worker_shared.queues[level].try_pop() else { break };
                        let invoker = worker_shared.invokers.read().get(&demand.agent).map(|(_, i)| i.clone());
                        if let Some(invoker) = invoker {
                            invoker(demand);
                        }
                        serviced_any = true;
                    }
                }
                if !serviced_any {
                    std::thread::sleep(IDLE_BACKOFF);
                }
            }
        });
        let worker_thread_id = worker.thread().id();
        Arc::new(Self { shared, quota, worker, worker_thread_id })
    }

    pub fn shutdown(&self) {
        self.shared.stopping.store(true, Ordering::Release);
    }

    fn priority_of(&self, agent_id: AgentId) -> Option<Priority> {
        self.shared.invokers.read().get(&agent_id).map(|(idx, _)| Priority(*idx as u8))
    }
}

impl DispBinder for PrioOneThreadRoundRobin {
    fn preallocate_resources(&self, _agent_id: AgentId, priority: Priority) -> Result<Arc<DemandQueue>> {
        Ok(self.shared.queues[priority.index()].clone())
    }

    fn undo_preallocation(&self, _agent_id: AgentId) {}

    fn bind(&self, agent_id: AgentId, invoker: AgentInvoker) {
        let priority = self.priority_of(agent_id).unwrap_or(Priority::NORMAL);
        self.shared.invokers.write().insert(agent_id, (priority.index(), invoker));
    }

    fn unbind(&self, agent_id: AgentId) {
        self.shared.invokers.write().remove(&agent_id);
    }

    fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            name: "prio_one_thread_round_robin",
            agents_bound: self.shared.invokers.read().len(),
            queue_depth: self.shared.queues.iter().map(|q| q.len()).sum(),
            worker_thread_ids: vec![self.worker_thread_id],
        }
    }
}
