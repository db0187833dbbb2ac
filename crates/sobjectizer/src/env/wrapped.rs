// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A convenience RAII wrapper around [`Environment`] (spec supplement, from
//! `wrapped_env.hpp`): shuts down every root coop and blocks until the
//! environment is idle when dropped, the same way a test harness kills its
//! subprocess on drop rather than leaving it running.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{EnvParams, Environment};

/// Owns an [`Environment`] and tears it down on drop. Most embeddings keep
/// the environment alive for the process lifetime and never need this;
/// it exists for short-lived scopes (tests, one-shot tools, demos) that
/// want a guarantee nothing keeps running past the end of a block.
pub struct WrappedEnv {
    env: Arc<Environment>,
    shutdown_timeout: Duration,
}

impl WrappedEnv {
    pub fn new(params: EnvParams) -> Self {
        Self { env: Environment::new(params), shutdown_timeout: Duration::from_secs(5) }
    }

    /// How long [`Drop`] waits for `is_idle()` to become true before giving
    /// up and returning anyway. Default 5 seconds.
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn env(&self) -> &Arc<Environment> {
        &self.env
    }
}

impl std::ops::Deref for WrappedEnv {
    type Target = Environment;
    fn deref(&self) -> &Environment {
        &self.env
    }
}

impl Drop for WrappedEnv {
    fn drop(&mut self) {
        self.env.shutdown();
        let deadline = Instant::now() + self.shutdown_timeout;
        while !self.env.is_idle() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentLogic, EvtCtx};
    use crate::env::{AgentSpec, CoopBuilder};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Flag(Arc<AtomicBool>);
    impl AgentLogic for Flag {
        fn evt_start(&mut self, _ctx: &mut EvtCtx<'_>) {
            self.0.store(true, Ordering::Release);
        }
    }

    #[test]
    fn dropping_a_wrapped_env_shuts_everything_down() {
        let started = Arc::new(AtomicBool::new(false));
        let wrapped = WrappedEnv::new(EnvParams::new());
        wrapped
            .env()
            .register_coop(CoopBuilder::new("scoped").add_agent(AgentSpec::new(Flag(started.clone()), "default")))
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while !started.load(Ordering::Acquire) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(started.load(Ordering::Acquire));

        let env = wrapped.env().clone();
        drop(wrapped);
        assert!(env.is_idle());
    }
}
