// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment construction parameters (spec §5, §6): everything that
//! differs between `Environment::new` calls without needing a different
//! type.

use std::sync::Arc;

use crate::coop::ExceptionReaction;
use crate::subscription::SubscriptionStorageKind;
use crate::trace::{TraceFilter, Tracer, TracingTracer};

/// Which [`crate::timer`] backend the environment's single timer manager
/// uses (spec §4.7). Picked once at construction; there is no per-timer
/// override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerBackend {
    Heap,
    List,
    Wheel,
}

impl Default for TimerBackend {
    fn default() -> Self {
        TimerBackend::Heap
    }
}

/// Which default dispatcher registry an environment starts with (spec §6's
/// `mt`/`simple_mt_safe`/`simple_not_mt_safe` infrastructure flavors,
/// resolved for this crate in `DESIGN.md`: the "not mt-safe" variant is kept
/// for API parity — every dispatcher here is `parking_lot`-backed and
/// therefore always thread-safe, so the three flavors differ only in which
/// dispatchers get preregistered, never in locking strategy).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfrastructureFlavor {
    /// Full registry: one_thread, active_obj, thread_pool, both prio
    /// one-thread variants, prio_dedicated, nef_one_thread.
    Mt,
    /// Only a single `"default"` one-thread dispatcher preregistered.
    SimpleMtSafe,
    /// Same preregistration as `SimpleMtSafe`; kept distinct so application
    /// code can name its intent even though the runtime behavior is
    /// identical (spec §6, §9 open question).
    SimpleNotMtSafe,
}

impl Default for InfrastructureFlavor {
    fn default() -> Self {
        InfrastructureFlavor::Mt
    }
}

/// Builder for the knobs `Environment::new` accepts (spec §5, §6). Every
/// setter consumes and returns `self`, matching the teacher's builder
/// convention.
pub struct EnvParams {
    pub(crate) autoshutdown_when_idle: bool,
    pub(crate) default_exception_reaction: ExceptionReaction,
    pub(crate) error_logger: Arc<dyn Fn(&str, &str) + Send + Sync>,
    pub(crate) tracer: Arc<dyn Tracer>,
    pub(crate) trace_filter: Option<Arc<dyn TraceFilter>>,
    pub(crate) timer_backend: TimerBackend,
    pub(crate) infrastructure: InfrastructureFlavor,
    pub(crate) thread_pool_size: usize,
    pub(crate) prio_round_robin_quota: usize,
    pub(crate) default_storage_kind: SubscriptionStorageKind,
}

impl EnvParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, the environment's `is_idle()` becoming true (no coops left)
    /// is treated as a request to stop every dispatcher worker thread (spec
    /// §6 "autoshutdown_when_idle" flag). Off by default: most embeddings
    /// keep the environment alive for their own process lifetime.
    pub fn autoshutdown_when_idle(mut self, value: bool) -> Self {
        self.autoshutdown_when_idle = value;
        self
    }

    pub fn default_exception_reaction(mut self, reaction: ExceptionReaction) -> Self {
        self.default_exception_reaction = reaction;
        self
    }

    /// Overrides where uncaught errors are reported (spec §6). Receives the
    /// `SoErrorKind` string and the message.
    pub fn error_logger(mut self, logger: impl Fn(&str, &str) + Send + Sync + 'static) -> Self {
        self.error_logger = Arc::new(logger);
        self
    }

    pub fn tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = tracer;
        self
    }

    pub fn trace_filter(mut self, filter: Arc<dyn TraceFilter>) -> Self {
        self.trace_filter = Some(filter);
        self
    }

    pub fn timer_backend(mut self, backend: TimerBackend) -> Self {
        self.timer_backend = backend;
        self
    }

    pub fn infrastructure(mut self, flavor: InfrastructureFlavor) -> Self {
        self.infrastructure = flavor;
        self
    }

    pub fn thread_pool_size(mut self, size: usize) -> Self {
        self.thread_pool_size = size.max(1);
        self
    }

    pub fn prio_round_robin_quota(mut self, quota: usize) -> Self {
        self.prio_round_robin_quota = quota.max(1);
        self
    }

    pub fn default_storage_kind(mut self, kind: SubscriptionStorageKind) -> Self {
        self.default_storage_kind = kind;
        self
    }
}

fn default_error_logger(kind: &str, message: &str) {
    tracing::error!(kind, message, "unhandled sobjectizer error");
}

impl Default for EnvParams {
    fn default() -> Self {
        Self {
            autoshutdown_when_idle: false,
            default_exception_reaction: ExceptionReaction::AbortOnException,
            error_logger: Arc::new(default_error_logger),
            tracer: Arc::new(TracingTracer),
            trace_filter: None,
            timer_backend: TimerBackend::default(),
            infrastructure: InfrastructureFlavor::default(),
            thread_pool_size: 4,
            prio_round_robin_quota: 4,
            default_storage_kind: SubscriptionStorageKind::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_fallbacks() {
        let params = EnvParams::new();
        assert_eq!(params.timer_backend, TimerBackend::Heap);
        assert_eq!(params.infrastructure, InfrastructureFlavor::Mt);
        assert!(!params.autoshutdown_when_idle);
    }

    #[test]
    fn builder_setters_compose() {
        let params = EnvParams::new().autoshutdown_when_idle(true).thread_pool_size(0).timer_backend(TimerBackend::Wheel);
        assert!(params.autoshutdown_when_idle);
        assert_eq!(params.thread_pool_size, 1, "zero is clamped up to one worker");
        assert_eq!(params.timer_backend, TimerBackend::Wheel);
    }
}
