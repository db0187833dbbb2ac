// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Flat-set subscription storage: a sorted vector with batched, lazy
//! re-sorting. Lookup is O(log n) once sorted; inserts are pushed
//! unsorted and only merged back in on the next lookup, giving O(n)
//! *amortized* insert/erase with deterministic, contiguous memory use
//! (spec §4.2) — as opposed to [`super::VectorStorage`], which keeps the
//! vector sorted on every single insert.

use super::{RemovalOutcome, SubscriptionKey, SubscriptionStorage, StoredHandler};
use crate::mbox::MboxId;
use crate::message::MessageType;
use crate::state::StateId;

pub struct FlatSetStorage {
    sorted: Vec<(SubscriptionKey, StoredHandler)>,
    pending: Vec<(SubscriptionKey, StoredHandler)>,
}

impl FlatSetStorage {
    pub fn new() -> Self {
        Self { sorted: Vec::new(), pending: Vec::new() }
    }

    fn settle(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        self.sorted.append(&mut self.pending);
        self.sorted.sort_by_key(|(k, _)| *k);
    }

    fn contains_key(&self, key: &SubscriptionKey) -> bool {
        self.sorted.binary_search_by_key(key, |(k, _)| *k).is_ok()
            || self.pending.iter().any(|(k, _)| k == key)
    }
}

impl Default for FlatSetStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionStorage for FlatSetStorage {
    fn create(&mut self, key: SubscriptionKey, handler: StoredHandler) -> Result<(), ()> {
        if self.contains_key(&key) {
            return Err(());
        }
        self.pending.push((key, handler));
        Ok(())
    }

    fn drop_for_state(&mut self, mbox_id: MboxId, msg_type: MessageType, state: StateId) -> RemovalOutcome {
        self.settle();
        let key = SubscriptionKey::new(mbox_id, msg_type, state);
        match self.sorted.binary_search_by_key(&key, |(k, _)| *k) {
            Err(_) => RemovalOutcome::NotFound,
            Ok(pos) => {
                self.sorted.remove(pos);
                if self.has_any_for_mbox_msg_type(mbox_id, msg_type) {
                    RemovalOutcome::RemovedOthersRemain
                } else {
                    RemovalOutcome::RemovedLastForMboxMsgType
                }
            }
        }
    }

    fn drop_for_mbox_msg_type(&mut self, mbox_id: MboxId, msg_type: MessageType) -> usize {
        self.settle();
        let rank = msg_type.rank();
        let before = self.sorted.len();
        self.sorted.retain(|(k, _)| !(k.mbox_id == mbox_id && k.msg_type_rank == rank));
        before - self.sorted.len()
    }

    fn drop_all(&mut self) {
        self.sorted.clear();
        self.pending.clear();
    }

    fn find(&self, mbox_id: MboxId, msg_type: MessageType, state: StateId) -> Option<&StoredHandler> {
        let key = SubscriptionKey::new(mbox_id, msg_type, state);
        if let Ok(pos) = self.sorted.binary_search_by_key(&key, |(k, _)| *k) {
            return Some(&self.sorted[pos].1);
        }
        self.pending.iter().find(|(k, _)| *k == key).map(|(_, h)| h)
    }

    fn find_mut(&mut self, mbox_id: MboxId, msg_type: MessageType, state: StateId) -> Option<&mut StoredHandler> {
        self.settle();
        let key = SubscriptionKey::new(mbox_id, msg_type, state);
        match self.sorted.binary_search_by_key(&key, |(k, _)| *k) {
            Ok(pos) => Some(&mut self.sorted[pos].1),
            Err(_) => None,
        }
    }

    fn len(&self) -> usize {
        self.sorted.len() + self.pending.len()
    }

    fn has_any_for_mbox_msg_type(&self, mbox_id: MboxId, msg_type: MessageType) -> bool {
        let rank = msg_type.rank();
        self.sorted.iter().any(|(k, _)| k.mbox_id == mbox_id && k.msg_type_rank == rank)
            || self.pending.iter().any(|(k, _)| k.mbox_id == mbox_id && k.msg_type_rank == rank)
    }
}
