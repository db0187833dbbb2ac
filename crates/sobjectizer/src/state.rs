// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hierarchical statechart (spec §3, §4.4): each agent owns an arena of
//! [`StateNode`]s, referenced by [`StateId`] index rather than pointer, and
//! tracks which one is current.

use crate::error::{self, Result, SoErrorKind};

pub type StateId = usize;

/// Maximum nesting depth a statechart may reach (spec §3: "nesting depth is
/// bounded (default 16)").
pub const MAX_STATE_NESTING_DEPTH: usize = 16;

/// One node in an agent's statechart arena.
pub struct StateNode {
    pub name: &'static str,
    pub parent: Option<StateId>,
    /// The sub-state a transition into this state resolves to when this
    /// state is composite (spec §3: "a composite state must have an initial
    /// sub-state; the 'current state' is always a leaf"). `None` for a leaf.
    pub initial_substate: Option<StateId>,
    /// Run when this state is entered, innermost-last during a transition
    /// (i.e. ancestors enter before descendants).
    pub on_enter: Option<Box<dyn FnMut() + Send>>,
    /// Run when this state is exited, innermost-first.
    pub on_exit: Option<Box<dyn FnMut() + Send>>,
}

impl StateNode {
    pub fn root(name: &'static str) -> Self {
        Self { name, parent: None, initial_substate: None, on_enter: None, on_exit: None }
    }

    pub fn nested(name: &'static str, parent: StateId) -> Self {
        Self { name, parent, initial_substate: None, on_enter: None, on_exit: None }
    }
}

/// Owns every [`StateNode`] an agent defines and tracks which one is
/// current. `define_agent` populates the arena once; `change_state` mutates
/// only `current` (plus running enter/exit hooks) afterwards.
pub struct StateMachine {
    nodes: Vec<StateNode>,
    current: StateId,
    /// Guards against `change_state` being called re-entrantly from within
    /// an `on_enter`/`on_exit` hook (spec §4.4 edge case).
    transitioning: bool,
}

impl StateMachine {
    /// Always starts with one root "default" state at index 0, matching the
    /// implicit default state every agent has before `define_agent` adds more.
    pub fn new() -> Self {
        Self { nodes: vec![StateNode::root("default")], current: 0, transitioning: false }
    }

    pub fn add_root(&mut self, name: &'static str) -> StateId {
        self.nodes.push(StateNode::root(name));
        self.nodes.len() - 1
    }

    pub fn add_nested(&mut self, name: &'static str, parent: StateId) -> Result<StateId> {
        if self.depth_of(parent) + 1 >= MAX_STATE_NESTING_DEPTH {
            return error::err(SoErrorKind::StateNestingTooDeep, "state nesting exceeds the configured maximum");
        }
        self.nodes.push(StateNode::nested(name, parent));
        Ok(self.nodes.len() - 1)
    }

    pub fn set_on_enter(&mut self, state: StateId, hook: Box<dyn FnMut() + Send>) {
        if let Some(node) = self.nodes.get_mut(state) {
            node.on_enter = Some(hook);
        }
    }

    pub fn set_on_exit(&mut self, state: StateId, hook: Box<dyn FnMut() + Send>) {
        if let Some(node) = self.nodes.get_mut(state) {
            node.on_exit = Some(hook);
        }
    }

    /// Declares `initial` as the sub-state a transition into `composite`
    /// resolves to (spec §3/§4.4). `initial` must already be a direct or
    /// transitive child of `composite`.
    pub fn set_initial_substate(&mut self, composite: StateId, initial: StateId) -> Result<()> {
        if !self.is_descendant(initial, composite) {
            return error::err(
                SoErrorKind::ForeignState,
                "initial sub-state must be a descendant of the composite state it is declared on",
            );
        }
        if let Some(node) = self.nodes.get_mut(composite) {
            node.initial_substate = Some(initial);
        }
        Ok(())
    }

    fn is_descendant(&self, candidate: StateId, ancestor: StateId) -> bool {
        let mut cursor = self.nodes.get(candidate).and_then(|n| n.parent);
        while let Some(s) = cursor {
            if s == ancestor {
                return true;
            }
            cursor = self.nodes.get(s).and_then(|n| n.parent);
        }
        false
    }

    fn has_children(&self, state: StateId) -> bool {
        self.nodes.iter().any(|n| n.parent == Some(state))
    }

    /// Follows `initial_substate` links from `state` down to a leaf (spec
    /// §4.4: "`change_state(new)` ... updates current state to the leaf of
    /// the initial-substate chain of the target"). Fails if a composite
    /// state along the way has no declared initial sub-state, or if the
    /// chain does not terminate.
    fn resolve_to_leaf(&self, state: StateId) -> Result<StateId> {
        let mut cursor = state;
        for _ in 0..=self.nodes.len() {
            match self.nodes[cursor].initial_substate {
                Some(next) => cursor = next,
                None if self.has_children(cursor) => {
                    return error::err(
                        SoErrorKind::MissingInitialSubstate,
                        "composite state has no declared initial sub-state",
                    );
                }
                None => return Ok(cursor),
            }
        }
        error::err(SoErrorKind::TransferLoop, "initial-substate chain does not converge")
    }

    pub fn current(&self) -> StateId {
        self.current
    }

    pub fn name_of(&self, state: StateId) -> &'static str {
        self.nodes.get(state).map_or("<unknown>", |n| n.name)
    }

    pub fn contains(&self, state: StateId) -> bool {
        state < self.nodes.len()
    }

    pub fn parent_of(&self, state: StateId) -> Option<StateId> {
        self.nodes.get(state).and_then(|n| n.parent)
    }

    /// Sets the current state directly, without running any enter/exit
    /// hooks. Only meaningful before `evt_start` runs, to establish the
    /// agent's declared initial state (spec §4.4).
    pub fn force_initial(&mut self, state: StateId) {
        self.current = state;
    }

    fn depth_of(&self, state: StateId) -> usize {
        let mut depth = 0;
        let mut cursor = Some(state);
        while let Some(s) = cursor {
            cursor = self.nodes.get(s).and_then(|n| n.parent);
            depth += 1;
        }
        depth
    }

    /// Ancestor chain from the root down to (and including) `state`.
    fn path_from_root(&self, state: StateId) -> Vec<StateId> {
        let mut path = vec![state];
        let mut cursor = self.nodes.get(state).and_then(|n| n.parent);
        while let Some(s) = cursor {
            path.push(s);
            cursor = self.nodes.get(s).and_then(|n| n.parent);
        }
        path.reverse();
        path
    }

    /// Transition to `target`. Runs `on_exit` for every state left
    /// (innermost-first) and `on_enter` for every state entered
    /// (outermost-first), skipping the common ancestor prefix shared with
    /// the current state (spec §4.4: "transition runs exit hooks up to the
    /// common ancestor, then enter hooks down to the target").
    pub fn change_state(&mut self, target: StateId) -> Result<()> {
        if !self.contains(target) {
            return error::err(SoErrorKind::ForeignState, "change_state target does not belong to this agent");
        }
        if self.transitioning {
            return error::err(SoErrorKind::ReentrantStateChange, "change_state called reentrantly");
        }
        let target = self.resolve_to_leaf(target)?;
        if target == self.current {
            return Ok(());
        }

        self.transitioning = true;

        let from_path = self.path_from_root(self.current);
        let to_path = self.path_from_root(target);
        let common_len = from_path.iter().zip(to_path.iter()).take_while(|(a, b)| a == b).count();

        for &state in from_path[common_len..].iter().rev() {
            if let Some(hook) = self.nodes[state].on_exit.as_mut() {
                hook();
            }
        }
        for &state in &to_path[common_len..] {
            if let Some(hook) = self.nodes[state].on_enter.as_mut() {
                hook();
            }
        }

        self.current = target;
        self.transitioning = false;
        Ok(())
    }

    /// Follows `transfer_to_state` redirections (spec §4.4): if the target
    /// state declares a transfer target instead of handling the message
    /// itself, repeat until a state that handles it (or none) is found.
    /// `follow` returns the next hop, or `None` to stop. Detects cycles by
    /// capping the number of hops at the arena size.
    pub fn follow_transfers<F>(&self, start: StateId, mut follow: F) -> Result<StateId>
    where
        F: FnMut(StateId) -> Option<StateId>,
    {
        let mut current = start;
        for _ in 0..=self.nodes.len() {
            match follow(current) {
                Some(next) if next == current => return Ok(current),
                Some(next) => current = next,
                None => return Ok(current),
            }
        }
        error::err(SoErrorKind::TransferLoop, "transfer_to_state chain does not converge")
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
