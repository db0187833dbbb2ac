// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `simple_mt_safe` infrastructure flavor: a single preregistered
//! `"default"` dispatcher, for applications that only ever need one
//! scheduling strategy (spec §6).

use std::collections::HashMap;
use std::sync::Arc;

use crate::dispatch::{DispBinder, OneThreadDispatcher};

use super::params::EnvParams;

pub fn build_dispatchers(_params: &EnvParams) -> HashMap<String, Arc<dyn DispBinder>> {
    let mut registry: HashMap<String, Arc<dyn DispBinder>> = HashMap::new();
    registry.insert("default".into(), OneThreadDispatcher::new());
    registry
}
