// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `simple_not_mt_safe` infrastructure flavor (spec §6).
//!
//! The C++ original pairs this flavor with a dispatcher that skips locking
//! because it promises never to be touched from more than one thread. Every
//! dispatcher in this crate is `parking_lot`-backed and therefore always
//! safe to touch from multiple threads, so there is no unsynchronized
//! counterpart to offer — this flavor preregisters the same single
//! `"default"` dispatcher as [`super::simple_mtsafe`] and exists only so
//! application code ported from the original can name its intent (see
//! `DESIGN.md`'s note on this open question).

use std::collections::HashMap;
use std::sync::Arc;

use crate::dispatch::DispBinder;

use super::params::EnvParams;

pub fn build_dispatchers(params: &EnvParams) -> HashMap<String, Arc<dyn DispBinder>> {
    super::simple_mtsafe::build_dispatchers(params)
}
