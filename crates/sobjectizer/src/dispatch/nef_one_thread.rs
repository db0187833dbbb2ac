// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single worker thread, strict FIFO, with every bound agent's `evt_finish`
//! slot reserved up front (spec §4.5 table, row "nef-one-thread" — "noexcept
//! finish").
//!
//! [`crate::demand::DemandQueue::push_evt_finish`] already never blocks or
//! panics, so the only thing left for this dispatcher to guarantee is that
//! `undo_preallocation` can't be called on an agent whose finish slot was
//! already consumed: `preallocate_resources` marks the slot reserved, `bind`
//! leaves it reserved until `unbind` retires it. A coop whose registration
//! rolls back (spec §4.6 step 3) always calls `undo_preallocation` before
//! any demand is ever queued, so there is no finish demand to lose.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{JoinHandle, ThreadId};

use parking_lot::RwLock;

use super::{AgentInvoker, DispBinder, DispatcherStats, Priority};
use crate::agent::AgentId;
use crate::demand::DemandQueue;
use crate::error::Result;

struct ReservedSlot {
    invoker: Option<AgentInvoker>,
}

pub struct NefOneThreadDispatcher {
    queue: Arc<DemandQueue>,
    reserved: Arc<RwLock<HashMap<AgentId, ReservedSlot>>>,
    worker: JoinHandle<()>,
    worker_thread_id: ThreadId,
    shutting_down: Arc<AtomicBool>,
}

impl NefOneThreadDispatcher {
    pub fn new() -> Arc<Self> {
        let queue = DemandQueue::new();
        let reserved: Arc<RwLock<HashMap<AgentId, ReservedSlot>>> = Arc::new(RwLock::new(HashMap::new()));
        let shutting_down = Arc::new(AtomicBool::new(false));

        let worker_queue = queue.clone();
        let worker_reserved = reserved.clone();
        let worker = std::thread::spawn(move || {
            while let Some(demand) = worker_queue.pop_blocking() {
                let invoker = worker_reserved.read().get(&demand.agent).and_then(|s| s.invoker.clone());
                if let Some(invoker) = invoker {
                    invoker(demand);
                }
            }
        });
        let worker_thread_id = worker.thread().id();

        Arc::new(Self { queue, reserved, worker, worker_thread_id, shutting_down })
    }

    pub fn shutdown(self: Arc<Self>) {
        self.shutting_down.store(true, Ordering::Release);
        self.queue.close();
    }
}

impl DispBinder for NefOneThreadDispatcher {
    fn preallocate_resources(&self, agent_id: AgentId, _priority: Priority) -> Result<Arc<DemandQueue>> {
        self.reserved.write().insert(agent_id, ReservedSlot { invoker: None });
        Ok(self.queue.clone())
    }

    fn undo_preallocation(&self, agent_id: AgentId) {
        self.reserved.write().remove(&agent_id);
    }

    fn bind(&self, agent_id: AgentId, invoker: AgentInvoker) {
        if let Some(slot) = self.reserved.write().get_mut(&agent_id) {
            slot.invoker = Some(invoker);
        }
    }

    fn unbind(&self, agent_id: AgentId) {
        self.reserved.write().remove(&agent_id);
    }

    fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            name: "nef_one_thread",
            agents_bound: self.reserved.read().values().filter(|s| s.invoker.is_some()).count(),
            queue_depth: self.queue.len(),
            worker_thread_ids: vec![self.worker_thread_id],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demand::ExecutionDemand;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    #[test]
    fn evt_finish_is_delivered_even_under_heavy_backlog() {
        let disp = NefOneThreadDispatcher::new();
        let queue = disp.preallocate_resources(1, Priority::NORMAL).unwrap();
        let finishes = Arc::new(AtomicU32::new(0));
        let finishes_clone = finishes.clone();
        disp.bind(1, Arc::new(move |demand| {
            if demand.selector == crate::demand::HandlerSelector::EvtFinish {
                finishes_clone.fetch_add(1, Ordering::AcqRel);
            }
        }));

        for _ in 0..500 {
            queue.push(ExecutionDemand::evt_start(1));
        }
        queue.push_evt_finish(ExecutionDemand::evt_finish(1));

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while finishes.load(Ordering::Acquire) == 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(finishes.load(Ordering::Acquire), 1);
    }

    #[test]
    fn rolled_back_preallocation_leaves_no_reserved_slot() {
        let disp = NefOneThreadDispatcher::new();
        let _queue = disp.preallocate_resources(1, Priority::NORMAL).unwrap();
        disp.undo_preallocation(1);
        assert_eq!(disp.stats().agents_bound, 0);
    }
}
