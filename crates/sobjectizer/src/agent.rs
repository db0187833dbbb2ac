// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The agent object: subscriptions, statechart, and the execution loop that
//! pulls demand off its queue and invokes user logic (spec §3, §4.4).

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::coop::{CoopId, DeregReason};
use crate::demand::{DemandQueue, ExecutionDemand, HandlerSelector};
use crate::error::{self, Result, SoError, SoErrorKind};
use crate::mbox::{Mbox, MboxId, SubscriberHandle};
use crate::message::{Message, MessageInstance, MessageRef, MessageType, MutableMessage, Mutability};
use crate::sink::AgentSink;
use crate::state::{StateId, StateMachine};
use crate::subscription::{make_storage, HandlerKind, RemovalOutcome, StoredHandler, SubscriptionKey, SubscriptionStorage, SubscriptionStorageKind, ThreadSafety};
use crate::trace::Tracer;

pub type AgentId = u64;

/// User-defined agent behavior, invoked by the runtime rather than
/// overriding virtuals (spec §9 design note, resolved for Rust in
/// `SPEC_FULL.md` §6): `define_agent` runs once during coop registration to
/// set up states and subscriptions, `evt_start`/`evt_finish` bracket the
/// agent's active lifetime.
pub trait AgentLogic: Send {
    fn define_agent(&mut self, ctx: &mut DefineCtx<'_>) -> Result<()> {
        let _ = ctx;
        Ok(())
    }

    fn evt_start(&mut self, ctx: &mut EvtCtx<'_>) {
        let _ = ctx;
    }

    fn evt_finish(&mut self, ctx: &mut EvtCtx<'_>) {
        let _ = ctx;
    }
}

type MboxDirectory = Arc<dyn Fn(MboxId) -> Option<Arc<dyn Mbox>> + Send + Sync>;
type ExceptionHook = Arc<dyn Fn(AgentId, CoopId, &SoError) + Send + Sync>;
type DeregisterHook = Arc<dyn Fn(AgentId, DeregReason) + Send + Sync>;

/// A no-op placeholder swapped into a [`StoredHandler`] slot while its real
/// closure is on loan to [`AgentCore::invoke`] (see that method's doc
/// comment for why the swap is necessary).
fn vacant_handler() -> Box<dyn FnMut(&mut EvtCtx<'_>, &MessageRef) -> Result<()> + Send> {
    Box::new(|_ctx, _msg| Ok(()))
}

/// Everything the runtime needs to drive one agent: its subscriptions,
/// statechart, and the user logic object.
pub struct AgentCore {
    id: AgentId,
    coop: CoopId,
    direct_mbox: Arc<dyn Mbox>,
    queue: Arc<DemandQueue>,
    storage: Box<dyn SubscriptionStorage>,
    states: StateMachine,
    transfer_table: HashMap<(StateId, u64), StateId>,
    logic: Box<dyn AgentLogic>,
    mbox_directory: MboxDirectory,
    tracer: Arc<dyn Tracer>,
    deregister_hook: DeregisterHook,
    on_exception: ExceptionHook,
}

impl AgentCore {
    pub fn new(
        id: AgentId,
        coop: CoopId,
        direct_mbox: Arc<dyn Mbox>,
        queue: Arc<DemandQueue>,
        logic: Box<dyn AgentLogic>,
        mbox_directory: MboxDirectory,
        tracer: Arc<dyn Tracer>,
        deregister_hook: DeregisterHook,
        on_exception: ExceptionHook,
        storage_kind: SubscriptionStorageKind,
    ) -> Self {
        Self {
            id,
            coop,
            direct_mbox,
            queue,
            storage: make_storage(storage_kind),
            states: StateMachine::new(),
            transfer_table: HashMap::new(),
            logic,
            mbox_directory,
            tracer,
            deregister_hook,
            on_exception,
        }
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn coop(&self) -> CoopId {
        self.coop
    }

    pub fn direct_mbox(&self) -> &Arc<dyn Mbox> {
        &self.direct_mbox
    }

    pub fn queue(&self) -> &Arc<DemandQueue> {
        &self.queue
    }

    /// Runs `define_agent` once, during coop registration (spec §4.6 step
    /// 2). Failures here abort the whole coop's registration.
    pub fn run_define_agent(&mut self) -> Result<()> {
        let mut ctx = DefineCtx {
            states: &mut self.states,
            storage: &mut *self.storage,
            transfer_table: &mut self.transfer_table,
            agent_id: self.id,
            direct_mbox: &self.direct_mbox,
            mbox_directory: &self.mbox_directory,
            tracer: &self.tracer,
            queue: &self.queue,
        };
        self.logic.define_agent(&mut ctx)
    }

    fn find_handler_state(&self, mbox_id: MboxId, msg_type: MessageType) -> Result<Option<StateId>> {
        let current = self.states.current();
        if let Some(found) = self.walk_hierarchy(mbox_id, msg_type, current) {
            return Ok(Some(found));
        }
        let Some(&declared_target) = self.transfer_table.get(&(current, msg_type.rank())) else {
            return Ok(None);
        };
        let resolved = self
            .states
            .follow_transfers(declared_target, |s| self.transfer_table.get(&(s, msg_type.rank())).copied())?;
        Ok(self.walk_hierarchy(mbox_id, msg_type, resolved))
    }

    fn walk_hierarchy(&self, mbox_id: MboxId, msg_type: MessageType, start: StateId) -> Option<StateId> {
        let mut state = start;
        loop {
            if self.storage.find(mbox_id, msg_type, state).is_some() {
                return Some(state);
            }
            state = self.states.parent_of(state)?;
        }
    }

    /// Execute one demand pulled off this agent's queue.
    ///
    /// A user handler that panics is caught here via `catch_unwind` and
    /// turned into `SoErrorKind::UserHandlerPanic`, routed through the
    /// `on_exception` hook (the coop's exception-reaction policy) rather
    /// than unwinding into the dispatcher worker loop — one misbehaving
    /// agent must not take its worker thread down with it (spec §4.4,
    /// §4.6).
    ///
    /// While the handler runs, its [`StoredHandler`] slot is temporarily
    /// swapped for a no-op placeholder. This is what lets the handler's
    /// `&mut EvtCtx` borrow every other field of `self` (statechart,
    /// direct mbox, hooks) without also holding a live borrow of
    /// `self.storage` — the handler closure itself is on loan, not stored,
    /// for the duration of the call.
    pub fn invoke(&mut self, demand: ExecutionDemand) -> Result<()> {
        let result = match demand.selector {
            HandlerSelector::EvtStart => self.invoke_lifecycle(true),
            HandlerSelector::EvtFinish => self.invoke_lifecycle(false),
            HandlerSelector::Msg | HandlerSelector::MutableMsg => self.invoke_message(demand),
        };
        if let Err(err) = &result {
            (self.on_exception)(self.id, self.coop, err);
        }
        Ok(())
    }

    fn invoke_lifecycle(&mut self, start: bool) -> Result<()> {
        let mut ctx = EvtCtx {
            states: &mut self.states,
            direct_mbox: &self.direct_mbox,
            mbox_directory: &self.mbox_directory,
            deregister_hook: &self.deregister_hook,
            agent_id: self.id,
            coop: self.coop,
        };
        let logic = &mut self.logic;
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            if start {
                logic.evt_start(&mut ctx);
            } else {
                logic.evt_finish(&mut ctx);
            }
        }));
        match outcome {
            Ok(()) => Ok(()),
            Err(payload) => error::err(SoErrorKind::UserHandlerPanic, panic_message(&payload)),
        }
    }

    fn invoke_message(&mut self, demand: ExecutionDemand) -> Result<()> {
        let Some(msg_type) = demand.msg_type else {
            return error::err(SoErrorKind::Internal, "message demand missing a message type");
        };
        let Some(message) = demand.message else {
            return Ok(());
        };

        let Some(handler_state) = self.find_handler_state(demand.mbox_id, msg_type)? else {
            return Ok(());
        };

        let Some(stored) = self.storage.find_mut(demand.mbox_id, msg_type, handler_state) else {
            return Ok(());
        };
        if demand.selector == HandlerSelector::MutableMsg && stored.handler_kind != HandlerKind::MutableMsg {
            return error::err(SoErrorKind::Internal, "mutable demand matched a non-mutable handler");
        }
        let mut handler = std::mem::replace(&mut stored.handler, vacant_handler());

        let mut ctx = EvtCtx {
            states: &mut self.states,
            direct_mbox: &self.direct_mbox,
            mbox_directory: &self.mbox_directory,
            deregister_hook: &self.deregister_hook,
            agent_id: self.id,
            coop: self.coop,
        };
        let outcome = catch_unwind(AssertUnwindSafe(|| handler(&mut ctx, &message)));

        if let Some(stored) = self.storage.find_mut(demand.mbox_id, msg_type, handler_state) {
            stored.handler = handler;
        }

        match outcome {
            Ok(inner) => inner,
            Err(payload) => error::err(SoErrorKind::UserHandlerPanic, panic_message(&payload)),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Context available to `AgentLogic::define_agent`: build the statechart and
/// wire up subscriptions before the agent ever runs (spec §4.4).
pub struct DefineCtx<'a> {
    states: &'a mut StateMachine,
    storage: &'a mut dyn SubscriptionStorage,
    transfer_table: &'a mut HashMap<(StateId, u64), StateId>,
    agent_id: AgentId,
    direct_mbox: &'a Arc<dyn Mbox>,
    mbox_directory: &'a MboxDirectory,
    tracer: &'a Arc<dyn Tracer>,
    queue: &'a Arc<DemandQueue>,
}

impl<'a> DefineCtx<'a> {
    pub fn direct_mbox(&self) -> &Arc<dyn Mbox> {
        self.direct_mbox
    }

    pub fn add_state(&mut self, name: &'static str) -> StateId {
        self.states.add_root(name)
    }

    pub fn add_nested_state(&mut self, name: &'static str, parent: StateId) -> Result<StateId> {
        self.states.add_nested(name, parent)
    }

    pub fn set_on_enter(&mut self, state: StateId, hook: Box<dyn FnMut() + Send>) {
        self.states.set_on_enter(state, hook);
    }

    pub fn set_on_exit(&mut self, state: StateId, hook: Box<dyn FnMut() + Send>) {
        self.states.set_on_exit(state, hook);
    }

    /// Declares the agent's initial state. Must be called, if at all, before
    /// `define_agent` returns; it does not run enter/exit hooks.
    pub fn set_initial_state(&mut self, state: StateId) {
        self.states.force_initial(state);
    }

    /// Declares `initial` as the sub-state `composite` resolves to whenever
    /// a `change_state` targets it (spec §3: "a composite state must have an
    /// initial sub-state; the 'current state' is always a leaf").
    pub fn set_initial_substate(&mut self, composite: StateId, initial: StateId) -> Result<()> {
        self.states.set_initial_substate(composite, initial)
    }

    /// Declares that a message unhandled in `from_state` should be looked up
    /// again starting from `to_state` (spec §4.4 `transfer_to_state`).
    pub fn transfer_to_state(&mut self, from_state: StateId, msg_type: MessageType, to_state: StateId) {
        self.transfer_table.insert((from_state, msg_type.rank()), to_state);
    }

    /// Subscribes to an immutable message at `state` on `mbox`.
    pub fn subscribe<M, F>(&mut self, mbox: &Arc<dyn Mbox>, state: StateId, mut handler: F) -> Result<()>
    where
        M: Message,
        F: FnMut(&mut EvtCtx<'_>, &M) + Send + 'static,
    {
        self.subscribe_with_kind::<M, F>(mbox, state, HandlerKind::Msg, HandlerSelector::Msg, move |ctx, msg| {
            handler(ctx, msg)
        })
    }

    /// Subscribes to a mutable message at `state`. Only permitted on an MPSC
    /// mbox (spec §4.1/§4.3: mutable messages are never broadcast).
    pub fn subscribe_mutable<M, F>(&mut self, mbox: &Arc<dyn Mbox>, state: StateId, handler: F) -> Result<()>
    where
        M: MutableMessage,
        F: FnMut(&mut EvtCtx<'_>, &M) + Send + 'static,
    {
        if mbox.kind() != crate::mbox::MboxKind::Mpsc {
            return error::err(SoErrorKind::MutableOnMpmc, "mutable subscription attempted on an MPMC mbox");
        }
        self.subscribe_with_kind::<M, F>(mbox, state, HandlerKind::MutableMsg, HandlerSelector::MutableMsg, handler)
    }

    fn subscribe_with_kind<M, F>(
        &mut self,
        mbox: &Arc<dyn Mbox>,
        state: StateId,
        handler_kind: HandlerKind,
        selector: HandlerSelector,
        mut handler: F,
    ) -> Result<()>
    where
        M: Message,
        F: FnMut(&mut EvtCtx<'_>, &M) + Send + 'static,
    {
        let msg_type = MessageType::of::<M>();
        let key = SubscriptionKey::new(mbox.id(), msg_type, state);
        let wrapped: Box<dyn FnMut(&mut EvtCtx<'_>, &MessageRef) -> Result<()> + Send> =
            Box::new(move |ctx, msg: &MessageRef| match msg.downcast::<M>() {
                Some(payload) => {
                    handler(ctx, payload);
                    Ok(())
                }
                None => error::err(SoErrorKind::Internal, "message payload downcast failed"),
            });
        self.storage
            .create(key, StoredHandler { thread_safety: ThreadSafety::NotThreadSafe, handler_kind, handler: wrapped })
            .map_err(|_| SoError::new(SoErrorKind::DuplicateSubscription, "duplicate (mbox, msg-type, state) subscription"))?;

        let sink = Arc::new(AgentSink {
            agent: self.agent_id,
            mbox_id: mbox.id(),
            mbox_kind: mbox.kind(),
            msg_type,
            selector,
            queue: self.queue.clone(),
            limits: mbox.limits(),
            directory: self.mbox_directory.clone(),
            tracer: self.tracer.clone(),
        });
        mbox.subscribe(SubscriberHandle { subscriber_id: self.agent_id, push: sink.into_push_fn() }, msg_type)
    }

    /// Swallows `M` at `state` without invoking any handler (spec §4.4
    /// `suppress`) — just a subscription whose handler does nothing.
    pub fn suppress<M: Message>(&mut self, mbox: &Arc<dyn Mbox>, state: StateId) -> Result<()> {
        self.subscribe::<M, _>(mbox, state, |_ctx, _msg: &M| {})
    }

    /// Switches to `target` on `M` at `state` without running a user
    /// handler (spec §4.4 `just_switch_to`).
    pub fn just_switch_to<M: Message>(&mut self, mbox: &Arc<dyn Mbox>, state: StateId, target: StateId) -> Result<()> {
        self.subscribe::<M, _>(mbox, state, move |ctx, _msg: &M| {
            let _ = ctx.change_state(target);
        })
    }

    /// Removes a subscription created by [`Self::subscribe`] or
    /// [`Self::subscribe_mutable`].
    pub fn unsubscribe<M: Message>(&mut self, mbox: &Arc<dyn Mbox>, state: StateId) {
        let msg_type = MessageType::of::<M>();
        if self.storage.drop_for_state(mbox.id(), msg_type, state) == RemovalOutcome::RemovedLastForMboxMsgType {
            mbox.unsubscribe(self.agent_id, msg_type);
        }
    }

    /// Reshapes an incoming `From` into a `To` and redelivers it to this
    /// agent's own direct mbox, so a normal `subscribe::<To>` handler
    /// processes it (spec supplement, `bind_transformer_helpers`).
    pub fn transform_in<From, To, F>(&mut self, mbox: &Arc<dyn Mbox>, state: StateId, f: F) -> Result<()>
    where
        From: Message,
        To: Message,
        F: Fn(&From) -> To + Send + Sync + 'static,
    {
        let queue = self.queue.clone();
        let direct_mbox = self.direct_mbox.clone();
        let agent_id = self.agent_id;
        self.subscribe::<From, _>(mbox, state, move |_ctx, payload: &From| {
            let transformed = f(payload);
            let message: MessageRef = Arc::new(MessageInstance::new_message(transformed, Mutability::Immutable));
            queue.push(ExecutionDemand {
                agent: agent_id,
                mbox_id: direct_mbox.id(),
                msg_type: Some(MessageType::of::<To>()),
                message: Some(message),
                selector: HandlerSelector::Msg,
            });
        })
    }

    /// Configures a message limit on `mbox` for `msg_type`, scoped to this
    /// agent (spec §3, §4.3).
    pub fn set_message_limit(&self, mbox: &Arc<dyn Mbox>, msg_type: MessageType, limit: crate::limit::MessageLimit) {
        mbox.set_limit(self.agent_id, msg_type, limit);
    }
}

/// Context available inside `evt_start`/`evt_finish`/message handlers:
/// change state, inspect the current one, reach this agent's own mbox or any
/// other by id, or deregister the owning coop (spec §4.4).
pub struct EvtCtx<'a> {
    states: &'a mut StateMachine,
    direct_mbox: &'a Arc<dyn Mbox>,
    mbox_directory: &'a MboxDirectory,
    deregister_hook: &'a DeregisterHook,
    agent_id: AgentId,
    coop: CoopId,
}

impl<'a> EvtCtx<'a> {
    pub fn current_state(&self) -> StateId {
        self.states.current()
    }

    pub fn state_name(&self, state: StateId) -> &'static str {
        self.states.name_of(state)
    }

    pub fn change_state(&mut self, state: StateId) -> Result<()> {
        self.states.change_state(state)
    }

    pub fn self_mbox(&self) -> &Arc<dyn Mbox> {
        self.direct_mbox
    }

    pub fn mbox(&self, id: MboxId) -> Option<Arc<dyn Mbox>> {
        (self.mbox_directory)(id)
    }

    pub fn agent_id(&self) -> AgentId {
        self.agent_id
    }

    pub fn coop_id(&self) -> CoopId {
        self.coop
    }

    pub fn deregister_coop(&self, reason: DeregReason) {
        (self.deregister_hook)(self.agent_id, reason)
    }
}
