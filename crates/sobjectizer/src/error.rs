// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error kinds produced by the runtime.
//!
//! Mirrors the teacher's `ErrorCode`/`MuxError` convention: a plain enum of
//! machine-readable kinds plus a human message, rather than a `thiserror`
//! derive tree.

use std::fmt;

/// Machine-readable error kind. See spec §7 for the taxonomy this follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoErrorKind {
    /// (mbox, msg-type, sink) already subscribed.
    DuplicateSubscription,
    /// Subscribe/unsubscribe attempted on an mbox whose environment has shut down.
    SubscriptionOnClosedMbox,
    /// State nesting would exceed the configured maximum depth.
    StateNestingTooDeep,
    /// `change_state` called with a state that doesn't belong to this agent.
    ForeignState,
    /// A mutable message was sent through (or subscribed for) an MPMC mbox.
    MutableOnMpmc,
    /// A periodic timer was scheduled with a mutable message.
    MutablePeriodicTimer,
    /// Following `transfer_to_state` declarations does not converge.
    TransferLoop,
    /// `change_state` called reentrantly from within a state change.
    ReentrantStateChange,
    /// A composite state was resolved to a leaf but has no declared
    /// initial sub-state.
    MissingInitialSubstate,
    /// `define_agent` failed for one or more agents during coop registration.
    CoopDefineAgentFailed,
    /// Registering a coop under a parent that is already deregistering.
    ParentCoopDeregistering,
    /// A dispatcher's `preallocate_resources` failed.
    DispatcherPreallocationFailed,
    /// A dispatcher's `bind`/registration step failed irrecoverably.
    DispatcherBindFailed,
    /// A coop name collided with an already-registered coop.
    DuplicateCoopName,
    /// A user handler panicked; routed through the exception-reaction policy.
    UserHandlerPanic,
    /// An unknown/non-downcastable panic payload from a user handler.
    UnknownUserException,
    /// An operation was attempted after the environment began shutting down.
    EnvironmentShuttingDown,
    /// Too many layers of a single type registered (fixed small slot budget).
    TooManyLayers,
    /// Catch-all for invariant violations not covered above.
    Internal,
}

impl SoErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DuplicateSubscription => "DUPLICATE_SUBSCRIPTION",
            Self::SubscriptionOnClosedMbox => "SUBSCRIPTION_ON_CLOSED_MBOX",
            Self::StateNestingTooDeep => "STATE_NESTING_TOO_DEEP",
            Self::ForeignState => "FOREIGN_STATE",
            Self::MutableOnMpmc => "MUTABLE_ON_MPMC",
            Self::MutablePeriodicTimer => "MUTABLE_PERIODIC_TIMER",
            Self::TransferLoop => "TRANSFER_LOOP",
            Self::ReentrantStateChange => "REENTRANT_STATE_CHANGE",
            Self::MissingInitialSubstate => "MISSING_INITIAL_SUBSTATE",
            Self::CoopDefineAgentFailed => "COOP_DEFINE_AGENT_FAILED",
            Self::ParentCoopDeregistering => "PARENT_COOP_DEREGISTERING",
            Self::DispatcherPreallocationFailed => "DISPATCHER_PREALLOCATION_FAILED",
            Self::DispatcherBindFailed => "DISPATCHER_BIND_FAILED",
            Self::DuplicateCoopName => "DUPLICATE_COOP_NAME",
            Self::UserHandlerPanic => "USER_HANDLER_PANIC",
            Self::UnknownUserException => "UNKNOWN_USER_EXCEPTION",
            Self::EnvironmentShuttingDown => "ENVIRONMENT_SHUTTING_DOWN",
            Self::TooManyLayers => "TOO_MANY_LAYERS",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for SoErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error produced by the runtime: a [`SoErrorKind`] plus a human message.
#[derive(Debug, Clone)]
pub struct SoError {
    kind: SoErrorKind,
    message: String,
}

impl SoError {
    pub fn new(kind: SoErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn kind(&self) -> SoErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for SoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for SoError {}

pub type Result<T> = std::result::Result<T, SoError>;

/// Shorthand for constructing an `Err(SoError::new(..))`.
pub(crate) fn err<T>(kind: SoErrorKind, message: impl Into<String>) -> Result<T> {
    Err(SoError::new(kind, message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_message() {
        let e = SoError::new(SoErrorKind::ForeignState, "state not owned by agent");
        let s = e.to_string();
        assert!(s.contains("FOREIGN_STATE"));
        assert!(s.contains("state not owned by agent"));
    }
}
