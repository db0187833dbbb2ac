// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The environment: owns every mbox, dispatcher, coop, and the timer
//! manager, and drives coop registration/deregistration through the steps
//! spec §4.6 describes (spec §3, §5, §6).

mod layer;
mod mt;
mod params;
mod simple_mtsafe;
mod simple_not_mtsafe;
mod wrapped;

pub use layer::LayerStorage;
pub use params::{EnvParams, InfrastructureFlavor, TimerBackend};
pub use wrapped::WrappedEnv;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::agent::{AgentCore, AgentId, AgentLogic};
use crate::coop::{CoopAgentEntry, CoopId, CoopRepository, DeregReason, ExceptionReaction, UsageDrop};
use crate::demand::{ExecutionDemand, HandlerSelector};
use crate::dispatch::{AgentInvoker, DispBinder, DispatcherStats, Priority};
use crate::error::{self, Result, SoError, SoErrorKind};
use crate::mbox::{MboxId, MboxRef, MpmcMbox, MpscMbox};
use crate::subscription::SubscriptionStorageKind;
use crate::timer::{HeapQueue, ListQueue, TimerDriver, TimerManager, WheelQueue};
use crate::trace::{FilteredTracer, Tracer};

/// One agent to register as part of a coop (spec §4.6).
pub struct AgentSpec {
    pub logic: Box<dyn AgentLogic>,
    pub priority: Priority,
    pub dispatcher: String,
    pub storage_kind: Option<SubscriptionStorageKind>,
}

impl AgentSpec {
    pub fn new(logic: impl AgentLogic + 'static, dispatcher: impl Into<String>) -> Self {
        Self { logic: Box::new(logic), priority: Priority::default(), dispatcher: dispatcher.into(), storage_kind: None }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn storage_kind(mut self, kind: SubscriptionStorageKind) -> Self {
        self.storage_kind = Some(kind);
        self
    }
}

/// Builds up one coop registration call (spec §3, §4.6).
pub struct CoopBuilder {
    name: String,
    parent: Option<CoopId>,
    exception_reaction: ExceptionReaction,
    agents: Vec<AgentSpec>,
}

impl CoopBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), parent: None, exception_reaction: ExceptionReaction::InheritExceptionReaction, agents: Vec::new() }
    }

    pub fn with_parent(mut self, parent: CoopId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_exception_reaction(mut self, reaction: ExceptionReaction) -> Self {
        self.exception_reaction = reaction;
        self
    }

    pub fn add_agent(mut self, spec: AgentSpec) -> Self {
        self.agents.push(spec);
        self
    }
}

/// Handle returned by [`Environment::register_coop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoopHandle(CoopId);

impl CoopHandle {
    pub fn id(self) -> CoopId {
        self.0
    }
}

struct AgentEntry {
    core: Arc<Mutex<AgentCore>>,
    dispatcher_name: String,
    direct_mbox_id: MboxId,
}

/// Owns every piece of runtime state: mboxes, dispatchers, coops, agents,
/// the timer manager, and the layer registry (spec §3).
pub struct Environment {
    self_weak: Weak<Environment>,

    mboxes: Arc<RwLock<HashMap<MboxId, MboxRef>>>,
    next_mbox_id: AtomicU64,
    mbox_directory: Arc<dyn Fn(MboxId) -> Option<MboxRef> + Send + Sync>,

    coop_repo: CoopRepository,
    dispatchers: RwLock<HashMap<String, Arc<dyn DispBinder>>>,

    agents: RwLock<HashMap<AgentId, AgentEntry>>,
    agent_coop: RwLock<HashMap<AgentId, CoopId>>,
    next_agent_id: AtomicU64,

    default_exception_reaction: ExceptionReaction,
    error_logger: Arc<dyn Fn(&str, &str) + Send + Sync>,
    tracer: Arc<dyn Tracer>,
    default_storage_kind: SubscriptionStorageKind,

    timer: Arc<dyn TimerManager>,
    layers: LayerStorage,

    autoshutdown_when_idle: bool,
    shutting_down: AtomicBool,
}

impl Environment {
    pub fn new(params: EnvParams) -> Arc<Self> {
        let effective_tracer: Arc<dyn Tracer> = match &params.trace_filter {
            Some(filter) => Arc::new(FilteredTracer::new(params.tracer.clone(), filter.clone())),
            None => params.tracer.clone(),
        };

        let dispatchers = match params.infrastructure {
            InfrastructureFlavor::Mt => mt::build_dispatchers(&params),
            InfrastructureFlavor::SimpleMtSafe => simple_mtsafe::build_dispatchers(&params),
            InfrastructureFlavor::SimpleNotMtSafe => simple_not_mtsafe::build_dispatchers(&params),
        };

        let timer: Arc<dyn TimerManager> = match params.timer_backend {
            TimerBackend::Heap => Arc::new(TimerDriver::new(HeapQueue::new(), effective_tracer.clone())),
            TimerBackend::List => Arc::new(TimerDriver::new(ListQueue::new(), effective_tracer.clone())),
            TimerBackend::Wheel => Arc::new(TimerDriver::new(WheelQueue::new(), effective_tracer.clone())),
        };

        Arc::new_cyclic(|weak: &Weak<Environment>| {
            let mboxes: Arc<RwLock<HashMap<MboxId, MboxRef>>> = Arc::new(RwLock::new(HashMap::new()));
            let directory_mboxes = Arc::downgrade(&mboxes);
            let mbox_directory: Arc<dyn Fn(MboxId) -> Option<MboxRef> + Send + Sync> = Arc::new(move |id| {
                directory_mboxes.upgrade().and_then(|mboxes| mboxes.read().get(&id).cloned())
            });

            Self {
                self_weak: weak.clone(),
                mboxes,
                next_mbox_id: AtomicU64::new(1),
                mbox_directory,
                coop_repo: CoopRepository::new(),
                dispatchers: RwLock::new(dispatchers),
                agents: RwLock::new(HashMap::new()),
                agent_coop: RwLock::new(HashMap::new()),
                next_agent_id: AtomicU64::new(1),
                default_exception_reaction: params.default_exception_reaction,
                error_logger: params.error_logger,
                tracer: effective_tracer,
                default_storage_kind: params.default_storage_kind,
                timer,
                layers: LayerStorage::new(),
                autoshutdown_when_idle: params.autoshutdown_when_idle,
                shutting_down: AtomicBool::new(false),
            }
        })
    }

    fn alloc_mbox_id(&self) -> MboxId {
        self.next_mbox_id.fetch_add(1, Ordering::AcqRel)
    }

    /// Creates a broadcast (MPMC) mbox, registered so it can be resolved as
    /// an `OverlimitReaction::Redirect` target (spec §3, §4.3).
    pub fn create_mpmc_mbox(&self) -> MboxRef {
        let id = self.alloc_mbox_id();
        let mbox = MpmcMbox::new(id, self.tracer.clone());
        self.mboxes.write().insert(id, mbox.clone());
        mbox
    }

    /// Creates a single-consumer (MPSC) mbox. Not inserted into the
    /// redirect-resolvable registry by this method — agents get one
    /// automatically as their direct mbox when registered.
    pub fn create_mpsc_mbox(&self) -> MboxRef {
        let id = self.alloc_mbox_id();
        MpscMbox::new(id, self.tracer.clone())
    }

    pub fn register_dispatcher(&self, name: impl Into<String>, dispatcher: Arc<dyn DispBinder>) {
        self.dispatchers.write().insert(name.into(), dispatcher);
    }

    pub fn dispatcher(&self, name: &str) -> Option<Arc<dyn DispBinder>> {
        self.dispatchers.read().get(name).cloned()
    }

    pub fn dispatcher_stats(&self) -> Vec<DispatcherStats> {
        self.dispatchers.read().values().map(|d| d.stats()).collect()
    }

    pub fn layers(&self) -> &LayerStorage {
        &self.layers
    }

    pub fn timer_manager(&self) -> &Arc<dyn TimerManager> {
        &self.timer
    }

    pub fn is_idle(&self) -> bool {
        self.coop_repo.is_idle()
    }

    pub fn registered_coop_count(&self) -> usize {
        self.coop_repo.registered_count()
    }

    /// Registers every agent in `builder` as one atomic unit (spec §4.6
    /// steps 1-7): preallocate dispatcher resources for every agent, run
    /// `define_agent` for every agent, register with the coop repository,
    /// then bind and start each agent. Any failure before the repository
    /// step rolls back every already-preallocated agent and registers
    /// nothing.
    pub fn register_coop(&self, builder: CoopBuilder) -> Result<CoopHandle> {
        if self.shutting_down.load(Ordering::Acquire) {
            return error::err(SoErrorKind::EnvironmentShuttingDown, "environment is shutting down");
        }

        let coop_id = self.coop_repo.alloc_id();
        let exception_reaction = builder.exception_reaction;

        struct Built {
            agent_id: AgentId,
            priority: Priority,
            dispatcher_name: String,
            core: Arc<Mutex<AgentCore>>,
            direct_mbox: MboxRef,
            queue: Arc<crate::demand::DemandQueue>,
        }
        let mut built: Vec<Built> = Vec::new();
        let rollback = |built: &[Built], env: &Environment| {
            for agent in built {
                if let Some(disp) = env.dispatcher(&agent.dispatcher_name) {
                    disp.undo_preallocation(agent.agent_id);
                }
            }
        };

        for spec in builder.agents {
            let agent_id = self.next_agent_id.fetch_add(1, Ordering::AcqRel);

            let Some(disp) = self.dispatcher(&spec.dispatcher) else {
                rollback(&built, self);
                return error::err(
                    SoErrorKind::DispatcherBindFailed,
                    format!("no dispatcher registered under {:?}", spec.dispatcher),
                );
            };

            let queue = match disp.preallocate_resources(agent_id, spec.priority) {
                Ok(queue) => queue,
                Err(e) => {
                    rollback(&built, self);
                    return Err(e);
                }
            };

            let direct_mbox = MpscMbox::new(self.alloc_mbox_id(), self.tracer.clone());
            let dereg_hook = self.make_deregister_hook();
            let on_exception = self.make_exception_hook();
            let storage_kind = spec.storage_kind.unwrap_or(self.default_storage_kind);

            let core = AgentCore::new(
                agent_id,
                coop_id,
                direct_mbox.clone(),
                queue.clone(),
                spec.logic,
                self.mbox_directory.clone(),
                self.tracer.clone(),
                dereg_hook,
                on_exception,
                storage_kind,
            );

            built.push(Built {
                agent_id,
                priority: spec.priority,
                dispatcher_name: spec.dispatcher,
                core: Arc::new(Mutex::new(core)),
                direct_mbox,
                queue,
            });
        }

        for agent in &built {
            if let Err(e) = agent.core.lock().run_define_agent() {
                rollback(&built, self);
                return error::err(SoErrorKind::CoopDefineAgentFailed, e.message().to_string());
            }
        }

        let agent_entries: Vec<CoopAgentEntry> =
            built.iter().map(|a| CoopAgentEntry { agent_id: a.agent_id, priority: a.priority }).collect();
        if let Err(e) = self.coop_repo.register(coop_id, builder.name, builder.parent, agent_entries, exception_reaction) {
            rollback(&built, self);
            return Err(e);
        }

        for agent in built {
            let Some(disp) = self.dispatcher(&agent.dispatcher_name) else {
                continue;
            };
            let invoker = self.make_invoker(agent.core.clone());
            disp.bind(agent.agent_id, invoker);
            agent.queue.push(ExecutionDemand::evt_start(agent.agent_id));

            self.mboxes.write().insert(agent.direct_mbox.id(), agent.direct_mbox.clone());
            self.agents.write().insert(
                agent.agent_id,
                AgentEntry { core: agent.core, dispatcher_name: agent.dispatcher_name, direct_mbox_id: agent.direct_mbox.id() },
            );
            self.agent_coop.write().insert(agent.agent_id, coop_id);
        }

        Ok(CoopHandle(coop_id))
    }

    /// Begins deregistering `id` and every descendant coop (spec §4.6):
    /// pushes an `evt_finish` demand for every bound agent, root-first.
    /// Finalization itself happens asynchronously as each agent's
    /// `evt_finish` actually runs and lowers the usage counter to zero.
    pub fn deregister_coop(&self, id: CoopId, reason: DeregReason) {
        let collected = self.coop_repo.begin_deregistration(id, reason);
        for coop in &collected {
            for agent in coop.agents() {
                let queue = {
                    let agents = self.agents.read();
                    agents.get(&agent.agent_id).map(|entry| entry.core.lock().queue().clone())
                };
                if let Some(queue) = queue {
                    queue.push_evt_finish(ExecutionDemand::evt_finish(agent.agent_id));
                }
            }
        }
    }

    /// Stops every root coop (spec §4.6 `EnvironmentShutdown` reason). Does
    /// not block for teardown to complete; call [`Self::is_idle`] to poll.
    pub fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }
        for id in self.coop_repo.all_registered_ids() {
            if let Some(coop) = self.coop_repo.lookup(id) {
                if coop.parent().is_none() {
                    self.deregister_coop(id, DeregReason::EnvironmentShutdown);
                }
            }
        }
    }

    fn make_deregister_hook(&self) -> Arc<dyn Fn(AgentId, DeregReason) + Send + Sync> {
        let weak_env = self.self_weak.clone();
        Arc::new(move |agent_id, reason| {
            if let Some(env) = weak_env.upgrade() {
                env.handle_agent_deregister_request(agent_id, reason);
            }
        })
    }

    fn make_exception_hook(&self) -> Arc<dyn Fn(AgentId, CoopId, &SoError) + Send + Sync> {
        let weak_env = self.self_weak.clone();
        Arc::new(move |agent_id, coop_id, err: &SoError| {
            if let Some(env) = weak_env.upgrade() {
                env.handle_exception(agent_id, coop_id, err);
            }
        })
    }

    fn make_invoker(&self, core: Arc<Mutex<AgentCore>>) -> AgentInvoker {
        let weak_env = self.self_weak.clone();
        Arc::new(move |demand: ExecutionDemand| {
            if matches!(demand.selector, HandlerSelector::Msg | HandlerSelector::MutableMsg) {
                if let (Some(msg_type), Some(env)) = (demand.msg_type, weak_env.upgrade()) {
                    if let Some(mbox) = (env.mbox_directory)(demand.mbox_id) {
                        mbox.release_reserved(demand.agent, msg_type);
                    }
                }
            }
            let is_finish = demand.selector == HandlerSelector::EvtFinish;
            let agent_id = demand.agent;
            let _ = core.lock().invoke(demand);
            if is_finish {
                if let Some(env) = weak_env.upgrade() {
                    env.finish_agent(agent_id);
                }
            }
        })
    }

    /// Runs once per agent `evt_finish`: unbinds from its dispatcher, tears
    /// down its direct mbox, and cascades the coop's usage counter (spec
    /// §4.6).
    fn finish_agent(&self, agent_id: AgentId) {
        let Some(entry) = self.agents.write().remove(&agent_id) else { return };
        let coop_id = self.agent_coop.write().remove(&agent_id);
        self.mboxes.write().remove(&entry.direct_mbox_id);
        if let Some(disp) = self.dispatcher(&entry.dispatcher_name) {
            disp.unbind(agent_id);
        }
        if let Some(coop_id) = coop_id {
            self.cascade_finalize(coop_id);
        }
    }

    /// Decrements `coop_id`'s usage counter and, every time that finalizes a
    /// coop, decrements its parent's in turn — the parent must be captured
    /// via `lookup` *before* `decrement_usage` runs, since a finalized coop
    /// is removed from the repository entirely (spec §4.6 invariant 3).
    fn cascade_finalize(&self, coop_id: CoopId) {
        let mut current = coop_id;
        loop {
            let parent = self.coop_repo.lookup(current).and_then(|c| c.parent());
            match self.coop_repo.decrement_usage(current) {
                UsageDrop::StillActive => return,
                UsageDrop::ReadyToFinalize => match parent {
                    Some(parent_id) => current = parent_id,
                    None => return,
                },
            }
        }
    }

    fn handle_agent_deregister_request(&self, agent_id: AgentId, reason: DeregReason) {
        let Some(coop_id) = self.agent_coop.read().get(&agent_id).copied() else { return };
        self.deregister_coop(coop_id, reason);
    }

    fn handle_exception(&self, _agent_id: AgentId, coop_id: CoopId, err: &SoError) {
        let coop_reaction = self.coop_repo.lookup(coop_id).map(|c| c.exception_reaction());
        let effective = match coop_reaction {
            Some(ExceptionReaction::InheritExceptionReaction) | None => self.default_exception_reaction,
            Some(other) => other,
        };

        (self.error_logger)(err.kind().as_str(), err.message());

        match effective {
            ExceptionReaction::AbortOnException => crate::limit::trigger_abort("unhandled exception reaction is abort"),
            ExceptionReaction::ShutdownSobjectizerOnException => self.shutdown(),
            ExceptionReaction::DeregisterCoopOnException => {
                self.deregister_coop(coop_id, DeregReason::UnhandledException(err.message().to_string()))
            }
            ExceptionReaction::IgnoreException | ExceptionReaction::InheritExceptionReaction => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::EvtCtx;
    use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

    struct Greeter {
        hits: Arc<AtomicU32>,
    }

    impl AgentLogic for Greeter {
        fn evt_start(&mut self, _ctx: &mut EvtCtx<'_>) {
            self.hits.fetch_add(1, AtomicOrdering::AcqRel);
        }
    }

    fn wait_for(predicate: impl Fn() -> bool) {
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        while !predicate() && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
    }

    #[test]
    fn register_coop_runs_evt_start() {
        let env = Environment::new(EnvParams::new());
        let hits = Arc::new(AtomicU32::new(0));
        let spec = AgentSpec::new(Greeter { hits: hits.clone() }, "default");
        let handle = env.register_coop(CoopBuilder::new("greeters").add_agent(spec)).unwrap();
        wait_for(|| hits.load(AtomicOrdering::Acquire) == 1);
        assert_eq!(hits.load(AtomicOrdering::Acquire), 1);
        assert!(handle.id() > 0);
    }

    #[test]
    fn deregister_coop_eventually_makes_the_environment_idle() {
        let env = Environment::new(EnvParams::new());
        let hits = Arc::new(AtomicU32::new(0));
        let spec = AgentSpec::new(Greeter { hits: hits.clone() }, "default");
        let handle = env.register_coop(CoopBuilder::new("transient").add_agent(spec)).unwrap();
        wait_for(|| hits.load(AtomicOrdering::Acquire) == 1);

        env.deregister_coop(handle.id(), DeregReason::Normal);
        wait_for(|| env.is_idle());
        assert!(env.is_idle());
    }

    #[test]
    fn duplicate_dispatcher_name_registration_overrides() {
        let env = Environment::new(EnvParams::new());
        let before = env.dispatcher_stats().len();
        env.register_dispatcher("custom", crate::dispatch::OneThreadDispatcher::new());
        assert_eq!(env.dispatcher_stats().len(), before + 1);
        assert!(env.dispatcher("custom").is_some());
    }

    #[test]
    fn unknown_dispatcher_name_fails_registration_cleanly() {
        let env = Environment::new(EnvParams::new());
        let spec = AgentSpec::new(Greeter { hits: Arc::new(AtomicU32::new(0)) }, "does_not_exist");
        let err = env.register_coop(CoopBuilder::new("broken").add_agent(spec)).unwrap_err();
        assert_eq!(err.kind(), SoErrorKind::DispatcherBindFailed);
        assert_eq!(env.registered_coop_count(), 0);
    }
}
