// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatcher family: the `disp_binder` contract plus six interchangeable
//! scheduling strategies (spec §3, §4.5).
//!
//! Every dispatcher owns its own [`crate::demand::DemandQueue`](s) and
//! worker thread(s); agents never talk to threads directly. Registration
//! goes through [`DispBinder`] in two phases — `preallocate_resources`
//! (fallible, reversible) followed by `bind` (infallible) — so a coop's
//! registration can be all-or-nothing across every agent it contains
//! (spec §4.6 step 3/6).

mod active_obj;
mod nef_one_thread;
mod one_thread;
mod prio_dedicated;
mod prio_one_thread;
mod thread_pool;

pub use active_obj::ActiveObjDispatcher;
pub use nef_one_thread::NefOneThreadDispatcher;
pub use one_thread::OneThreadDispatcher;
pub use prio_dedicated::PrioDedicatedDispatcher;
pub use prio_one_thread::{PrioOneThreadRoundRobin, PrioOneThreadStrict};
pub use thread_pool::ThreadPoolDispatcher;

use std::sync::Arc;
use std::thread::ThreadId;

use crate::agent::AgentId;
use crate::demand::{DemandQueue, ExecutionDemand};
use crate::error::Result;

/// Agent scheduling priority: 8 levels, matching the original's `p0`
/// (lowest) through `p7` (highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub u8);

impl Priority {
    pub const MIN: Priority = Priority(0);
    pub const NORMAL: Priority = Priority(3);
    pub const MAX: Priority = Priority(7);

    pub const LEVELS: usize = 8;

    pub fn index(self) -> usize {
        self.0.min(7) as usize
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::NORMAL
    }
}

/// Callback a dispatcher invokes for a popped demand. Wraps a
/// `Mutex<AgentCore>::invoke` (or equivalent) so dispatchers never need to
/// know about `AgentCore` itself — only that demands can be handed back for
/// execution.
pub type AgentInvoker = Arc<dyn Fn(ExecutionDemand) + Send + Sync>;

/// Runtime stats a dispatcher publishes for its own data source (spec
/// §4.5: "agents bound, queue depth, thread id, activity intervals").
#[derive(Debug, Clone)]
pub struct DispatcherStats {
    pub name: &'static str,
    pub agents_bound: usize,
    pub queue_depth: usize,
    pub worker_thread_ids: Vec<ThreadId>,
}

/// The two-phase binding contract every dispatcher implements (spec §4.5).
///
/// `preallocate_resources` must be reversible: if any agent in a coop fails
/// to preallocate, every already-preallocated agent in that coop is rolled
/// back via `undo_preallocation` and the coop never registers (spec §4.6
/// step 3). `bind` is the infallible second phase: it is only ever called
/// after every agent's resources have been preallocated successfully.
pub trait DispBinder: Send + Sync {
    /// Reserve whatever this dispatcher needs to eventually run `agent_id`
    /// (typically a demand queue, and for per-agent dispatchers a worker
    /// thread slot) and hand back the queue the agent should enqueue its
    /// own demands on.
    fn preallocate_resources(&self, agent_id: AgentId, priority: Priority) -> Result<Arc<DemandQueue>>;

    /// Undo a successful `preallocate_resources` for an agent that will
    /// never be bound (a sibling's preallocation failed).
    fn undo_preallocation(&self, agent_id: AgentId);

    /// Finish binding: the agent's event-queue pointer is now live and
    /// `invoker` will be called for every demand popped for it. Spec §4.6
    /// step 6 requires this step itself never fail.
    fn bind(&self, agent_id: AgentId, invoker: AgentInvoker);

    /// Stop scheduling demand for `agent_id` (coop deregistration/finalization).
    fn unbind(&self, agent_id: AgentId);

    fn stats(&self) -> DispatcherStats;
}
