// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `mt` infrastructure flavor: the full dispatcher registry (spec §6).
//!
//! Every built-in dispatcher is preregistered under a fixed name so
//! application code can pick a scheduling strategy per coop without wiring
//! up its own registry.

use std::collections::HashMap;
use std::sync::Arc;

use crate::dispatch::{
    ActiveObjDispatcher, DispBinder, NefOneThreadDispatcher, OneThreadDispatcher, PrioDedicatedDispatcher,
    PrioOneThreadRoundRobin, PrioOneThreadStrict, ThreadPoolDispatcher,
};

use super::params::EnvParams;

pub fn build_dispatchers(params: &EnvParams) -> HashMap<String, Arc<dyn DispBinder>> {
    let mut registry: HashMap<String, Arc<dyn DispBinder>> = HashMap::new();
    registry.insert("default".into(), OneThreadDispatcher::new());
    registry.insert("one_thread".into(), OneThreadDispatcher::new());
    registry.insert("active_obj".into(), ActiveObjDispatcher::new());
    registry.insert("thread_pool".into(), ThreadPoolDispatcher::new(params.thread_pool_size));
    registry.insert("prio_strict".into(), PrioOneThreadStrict::new());
    registry.insert("prio_round_robin".into(), PrioOneThreadRoundRobin::new(params.prio_round_robin_quota));
    registry.insert("prio_dedicated".into(), PrioDedicatedDispatcher::new());
    registry.insert("nef_one_thread".into(), NefOneThreadDispatcher::new());
    registry
}
