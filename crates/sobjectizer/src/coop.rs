// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cooperation (coop) repository: grouped registration/deregistration of
//! agents, parent-child relations, usage-counter driven finalization
//! (spec §3, §4.6).
//!
//! This module owns the *bookkeeping* half of coop lifecycle — names,
//! parent/child links, the usage counter, resource teardown order, and
//! notificator lists. The *mechanical* half (binding agents to dispatchers,
//! running `define_agent`, enqueuing `evt_start`/`evt_finish`) lives in
//! [`crate::env`], which drives this repository through the steps described
//! in spec §4.6.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::agent::AgentId;
use crate::dispatch::Priority;
use crate::error::{self, Result, SoErrorKind};

pub type CoopId = u64;

/// Why a coop is being torn down (spec §4.6).
#[derive(Debug, Clone)]
pub enum DeregReason {
    /// Requested through the ordinary API, or the last bound agent's
    /// `evt_finish` lowered the coop's usage counter to zero on its own.
    Normal,
    /// A user handler threw and the coop's exception reaction is
    /// `deregister_coop_on_exception`.
    UnhandledException(String),
    /// The parent coop is itself deregistering.
    ParentDeregistered,
    /// The whole environment is shutting down.
    EnvironmentShutdown,
}

/// How a coop (and, by inheritance, its agents) reacts to a user handler
/// exception (spec §4.4). Looked up agent → coop → environment, stopping at
/// the first entry that isn't `InheritExceptionReaction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionReaction {
    AbortOnException,
    ShutdownSobjectizerOnException,
    DeregisterCoopOnException,
    IgnoreException,
    InheritExceptionReaction,
}

impl Default for ExceptionReaction {
    fn default() -> Self {
        ExceptionReaction::InheritExceptionReaction
    }
}

/// One agent as the repository sees it: just enough to drive registration
/// order and dispatcher binding, never the agent's own state.
#[derive(Debug, Clone, Copy)]
pub struct CoopAgentEntry {
    pub agent_id: AgentId,
    pub priority: Priority,
}

/// Outcome of decrementing a coop's usage counter (spec §4.6: "a coop is
/// scheduled for final deregistration" once this reaches zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageDrop {
    StillActive,
    ReadyToFinalize,
}

/// One registered (or deregistering) coop. `usage_count` starts at the
/// number of bound agents plus the number of currently-registered direct
/// children; every agent `evt_finish` and every child's finalization
/// decrements it by one (spec §3 invariant 3).
pub struct Coop {
    id: CoopId,
    name: String,
    parent: Option<CoopId>,
    children: Mutex<HashSet<CoopId>>,
    agents: Vec<CoopAgentEntry>,
    usage_count: AtomicUsize,
    exception_reaction: ExceptionReaction,
    dereg_reason: Mutex<Option<DeregReason>>,
    reg_notificators: Mutex<Vec<Box<dyn Fn(CoopId) + Send>>>,
    dereg_notificators: Mutex<Vec<Box<dyn Fn(CoopId, &DeregReason) + Send>>>,
    /// User resources bound via `take_under_control`, destroyed in reverse
    /// construction order on finalization (spec §3, §4.6).
    resources: Mutex<Vec<Box<dyn Any + Send>>>,
}

impl Coop {
    pub fn id(&self) -> CoopId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<CoopId> {
        self.parent
    }

    pub fn agents(&self) -> &[CoopAgentEntry] {
        &self.agents
    }

    pub fn exception_reaction(&self) -> ExceptionReaction {
        self.exception_reaction
    }

    pub fn add_reg_notificator(&self, f: Box<dyn Fn(CoopId) + Send>) {
        self.reg_notificators.lock().push(f);
    }

    pub fn add_dereg_notificator(&self, f: Box<dyn Fn(CoopId, &DeregReason) + Send>) {
        self.dereg_notificators.lock().push(f);
    }

    pub fn take_under_control(&self, resource: Box<dyn Any + Send>) {
        self.resources.lock().push(resource);
    }

    fn run_reg_notificators(&self) {
        for f in self.reg_notificators.lock().iter() {
            f(self.id);
        }
    }

    /// Destroys user resources in reverse construction order and runs
    /// dereg notificators. Called once, exactly when `usage_count` reaches
    /// zero (spec §4.6).
    fn finalize(&self, reason: &DeregReason) {
        let mut resources = self.resources.lock();
        while resources.pop().is_some() {}
        for f in self.dereg_notificators.lock().iter() {
            f(self.id, reason);
        }
    }
}

/// Group of agents registered as one unit (spec §3, §4.6).
///
/// Owns every agent-scoped registration rule: unique stable names, atomic
/// all-or-nothing registration, parent/child usage-counter propagation.
pub struct CoopRepository {
    next_id: AtomicU64,
    names: Mutex<HashSet<String>>,
    registered: RwLock<HashMap<CoopId, Arc<Coop>>>,
    deregistering: RwLock<HashMap<CoopId, Arc<Coop>>>,
}

impl CoopRepository {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            names: Mutex::new(HashSet::new()),
            registered: RwLock::new(HashMap::new()),
            deregistering: RwLock::new(HashMap::new()),
        }
    }

    pub fn alloc_id(&self) -> CoopId {
        self.next_id.fetch_add(1, Ordering::AcqRel)
    }

    /// Stage 5 of spec §4.6: acquire the repository and register with the
    /// parent coop, atomically. Fails if the name collides or the parent is
    /// itself mid-deregistration (spec §8 invariant: "registering a coop
    /// under a parent that is in deregistration fails and leaves no partial
    /// state").
    pub fn register(
        &self,
        id: CoopId,
        name: String,
        parent: Option<CoopId>,
        agents: Vec<CoopAgentEntry>,
        exception_reaction: ExceptionReaction,
    ) -> Result<Arc<Coop>> {
        if let Some(parent_id) = parent {
            if self.deregistering.read().contains_key(&parent_id) {
                return error::err(SoErrorKind::ParentCoopDeregistering, "parent coop is already deregistering");
            }
        }

        let mut names = self.names.lock();
        if names.contains(&name) {
            return error::err(SoErrorKind::DuplicateCoopName, format!("coop name {name:?} already registered"));
        }

        let agent_count = agents.len();
        let coop = Arc::new(Coop {
            id,
            name: name.clone(),
            parent,
            children: Mutex::new(HashSet::new()),
            agents,
            usage_count: AtomicUsize::new(agent_count.max(1)),
            exception_reaction,
            dereg_reason: Mutex::new(None),
            reg_notificators: Mutex::new(Vec::new()),
            dereg_notificators: Mutex::new(Vec::new()),
            resources: Mutex::new(Vec::new()),
        });

        if let Some(parent_id) = parent {
            let registered = self.registered.read();
            let Some(parent_coop) = registered.get(&parent_id) else {
                drop(registered);
                names.remove(&name);
                return error::err(SoErrorKind::Internal, "parent coop not found");
            };
            parent_coop.children.lock().insert(id);
            parent_coop.usage_count.fetch_add(1, Ordering::AcqRel);
        }

        names.insert(name);
        drop(names);
        self.registered.write().insert(id, coop.clone());
        coop.run_reg_notificators();
        Ok(coop)
    }

    pub fn lookup(&self, id: CoopId) -> Option<Arc<Coop>> {
        self.registered.read().get(&id).cloned().or_else(|| self.deregistering.read().get(&id).cloned())
    }

    /// Roll back a registration that failed before stage 5 (preallocation
    /// or `define_agent` failure) — nothing has been inserted yet in that
    /// case, so this is a no-op kept only for symmetry with the C++
    /// original's rollback language; present so callers don't need to
    /// special-case "failed before vs. after insertion".
    pub fn abandon_unregistered(&self, _id: CoopId) {}

    /// Begin deregistering `id` and every transitive descendant. Moves each
    /// from `registered` to `deregistering` atomically and returns them in
    /// root-first order, matching spec §4.6's "enqueues a shutdown —
    /// root first —" ordering for the `evt_finish` signal. Final teardown
    /// (actually running `finalize`) still happens leaves-first, driven
    /// purely by [`Self::decrement_usage`] as each coop's own agents finish.
    pub fn begin_deregistration(&self, id: CoopId, reason: DeregReason) -> Vec<Arc<Coop>> {
        let mut registered = self.registered.write();
        let mut deregistering = self.deregistering.write();
        let mut collected = Vec::new();
        let mut frontier = vec![id];
        while let Some(next) = frontier.pop() {
            let Some(coop) = registered.remove(&next) else { continue };
            frontier.extend(coop.children.lock().iter().copied());
            *coop.dereg_reason.lock() = Some(clone_reason(&reason));
            deregistering.insert(next, coop.clone());
            collected.push(coop);
        }
        collected.sort_by_key(|c| c.id != id);
        collected
    }

    pub fn is_deregistering(&self, id: CoopId) -> bool {
        self.deregistering.read().contains_key(&id)
    }

    /// Decrement a coop's usage counter by one — called once per agent
    /// `evt_finish` and once per finalized direct child (spec §3 invariant
    /// 3, §4.6). When it reaches zero, runs [`Coop::finalize`], removes the
    /// coop's name so it can be reused, drops it from `deregistering`, and
    /// reports [`UsageDrop::ReadyToFinalize`] so the caller can cascade into
    /// the parent.
    pub fn decrement_usage(&self, id: CoopId) -> UsageDrop {
        let Some(coop) = self.deregistering.read().get(&id).cloned() else {
            return UsageDrop::StillActive;
        };
        let remaining = coop.usage_count.fetch_sub(1, Ordering::AcqRel) - 1;
        if remaining != 0 {
            return UsageDrop::StillActive;
        }

        let reason = coop.dereg_reason.lock().take().unwrap_or(DeregReason::Normal);
        coop.finalize(&reason);
        self.names.lock().remove(&coop.name);
        self.deregistering.write().remove(&id);
        UsageDrop::ReadyToFinalize
    }

    pub fn registered_count(&self) -> usize {
        self.registered.read().len()
    }

    pub fn is_idle(&self) -> bool {
        self.registered.read().is_empty() && self.deregistering.read().is_empty()
    }

    pub fn all_registered_ids(&self) -> Vec<CoopId> {
        self.registered.read().keys().copied().collect()
    }
}

fn clone_reason(reason: &DeregReason) -> DeregReason {
    match reason {
        DeregReason::Normal => DeregReason::Normal,
        DeregReason::UnhandledException(s) => DeregReason::UnhandledException(s.clone()),
        DeregReason::ParentDeregistered => DeregReason::ParentDeregistered,
        DeregReason::EnvironmentShutdown => DeregReason::EnvironmentShutdown,
    }
}

impl Default for CoopRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Priority;

    fn entries(n: u64) -> Vec<CoopAgentEntry> {
        (0..n).map(|i| CoopAgentEntry { agent_id: i + 1, priority: Priority::NORMAL }).collect()
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let repo = CoopRepository::new();
        let id1 = repo.alloc_id();
        repo.register(id1, "alpha".into(), None, entries(1), ExceptionReaction::InheritExceptionReaction).unwrap();
        let id2 = repo.alloc_id();
        let err = repo
            .register(id2, "alpha".into(), None, entries(1), ExceptionReaction::InheritExceptionReaction)
            .unwrap_err();
        assert_eq!(err.kind(), SoErrorKind::DuplicateCoopName);
    }

    #[test]
    fn registering_under_deregistering_parent_fails() {
        let repo = CoopRepository::new();
        let parent_id = repo.alloc_id();
        repo.register(parent_id, "parent".into(), None, entries(1), ExceptionReaction::InheritExceptionReaction)
            .unwrap();
        repo.begin_deregistration(parent_id, DeregReason::Normal);

        let child_id = repo.alloc_id();
        let err = repo
            .register(
                child_id,
                "child".into(),
                Some(parent_id),
                entries(1),
                ExceptionReaction::InheritExceptionReaction,
            )
            .unwrap_err();
        assert_eq!(err.kind(), SoErrorKind::ParentCoopDeregistering);
    }

    #[test]
    fn usage_counter_reaches_zero_only_after_every_agent_finishes() {
        let repo = CoopRepository::new();
        let id = repo.alloc_id();
        repo.register(id, "two_agents".into(), None, entries(2), ExceptionReaction::InheritExceptionReaction).unwrap();
        repo.begin_deregistration(id, DeregReason::Normal);
        assert_eq!(repo.decrement_usage(id), UsageDrop::StillActive);
        assert_eq!(repo.decrement_usage(id), UsageDrop::ReadyToFinalize);
    }

    #[test]
    fn child_finalization_cascades_into_parent_usage() {
        let repo = CoopRepository::new();
        let parent_id = repo.alloc_id();
        repo.register(parent_id, "parent".into(), None, entries(1), ExceptionReaction::InheritExceptionReaction)
            .unwrap();
        let child_id = repo.alloc_id();
        repo.register(
            child_id,
            "child".into(),
            Some(parent_id),
            entries(1),
            ExceptionReaction::InheritExceptionReaction,
        )
        .unwrap();

        let collected = repo.begin_deregistration(parent_id, DeregReason::Normal);
        assert_eq!(collected.len(), 2);
        assert_eq!(collected[0].id(), parent_id, "root must be collected first");

        assert_eq!(repo.decrement_usage(child_id), UsageDrop::ReadyToFinalize);
        assert_eq!(repo.decrement_usage(parent_id), UsageDrop::ReadyToFinalize);
    }

    #[test]
    fn finalized_coop_name_can_be_reused() {
        let repo = CoopRepository::new();
        let id = repo.alloc_id();
        repo.register(id, "reusable".into(), None, entries(1), ExceptionReaction::InheritExceptionReaction).unwrap();
        repo.begin_deregistration(id, DeregReason::Normal);
        assert_eq!(repo.decrement_usage(id), UsageDrop::ReadyToFinalize);

        let id2 = repo.alloc_id();
        assert!(repo
            .register(id2, "reusable".into(), None, entries(1), ExceptionReaction::InheritExceptionReaction)
            .is_ok());
    }
}
