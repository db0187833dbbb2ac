// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment-wide layers: one instance per distinct type, shared across
//! every coop and agent (spec §3, §9 "layer" glossary entry).
//!
//! A layer is whatever cross-cutting state an application wants reachable
//! from any agent without threading it through every `AgentLogic` by hand —
//! a metrics registry, a shared connection pool, a config snapshot. The slot
//! budget is fixed and small: this is meant for a handful of
//! application-wide singletons, not a general type-keyed cache.

use std::any::{Any, TypeId};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{self, Result, SoErrorKind};

const MAX_LAYER_SLOTS: usize = 32;

/// TypeId-keyed storage for environment layers.
pub struct LayerStorage {
    slots: Mutex<Vec<(TypeId, Arc<dyn Any + Send + Sync>)>>,
}

impl LayerStorage {
    pub fn new() -> Self {
        Self { slots: Mutex::new(Vec::new()) }
    }

    /// Installs `layer`, replacing any previous instance of the same type.
    /// Fails once the slot budget is exhausted by distinct types (spec §9
    /// open question: resolved here as a fixed small budget rather than an
    /// unbounded registry — see `DESIGN.md`).
    pub fn add<L: Any + Send + Sync + 'static>(&self, layer: L) -> Result<()> {
        let type_id = TypeId::of::<L>();
        let mut slots = self.slots.lock();
        if let Some(entry) = slots.iter_mut().find(|(id, _)| *id == type_id) {
            entry.1 = Arc::new(layer);
            return Ok(());
        }
        if slots.len() >= MAX_LAYER_SLOTS {
            return error::err(
                SoErrorKind::TooManyLayers,
                format!("layer storage is limited to {MAX_LAYER_SLOTS} distinct types"),
            );
        }
        slots.push((type_id, Arc::new(layer)));
        Ok(())
    }

    pub fn get<L: Any + Send + Sync + 'static>(&self) -> Option<Arc<L>> {
        let type_id = TypeId::of::<L>();
        let found = self.slots.lock().iter().find(|(id, _)| *id == type_id).map(|(_, v)| v.clone())?;
        found.downcast::<L>().ok()
    }

    pub fn remove<L: Any + Send + Sync + 'static>(&self) {
        let type_id = TypeId::of::<L>();
        self.slots.lock().retain(|(id, _)| *id != type_id);
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }
}

impl Default for LayerStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Metrics(u32);
    struct Config(&'static str);

    #[test]
    fn get_roundtrips_a_stored_layer() {
        let storage = LayerStorage::new();
        storage.add(Metrics(7)).unwrap();
        assert_eq!(storage.get::<Metrics>().unwrap().0, 7);
        assert!(storage.get::<Config>().is_none());
    }

    #[test]
    fn adding_the_same_type_twice_replaces_it() {
        let storage = LayerStorage::new();
        storage.add(Metrics(1)).unwrap();
        storage.add(Metrics(2)).unwrap();
        assert_eq!(storage.len(), 1);
        assert_eq!(storage.get::<Metrics>().unwrap().0, 2);
    }

    #[test]
    fn slot_budget_is_enforced_across_distinct_types() {
        struct Marker<const N: usize>;
        let storage = LayerStorage::new();
        macro_rules! fill {
            ($($n:literal),*) => { $( storage.add(Marker::<$n>).unwrap(); )* };
        }
        fill!(
            0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28,
            29, 30, 31
        );
        let err = storage.add(Marker::<32>).unwrap_err();
        assert_eq!(err.kind(), SoErrorKind::TooManyLayers);
    }
}
