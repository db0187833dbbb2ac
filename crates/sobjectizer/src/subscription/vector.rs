// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sorted-`Vec` subscription storage: O(log n) lookup via binary search,
//! O(n) insert/erase. Preferred for agents with very few subscriptions —
//! cache-friendly, no allocation per entry beyond the backing buffer.

use super::{RemovalOutcome, SubscriptionKey, SubscriptionStorage, StoredHandler};
use crate::mbox::MboxId;
use crate::message::MessageType;
use crate::state::StateId;

pub struct VectorStorage {
    entries: Vec<(SubscriptionKey, StoredHandler)>,
}

impl VectorStorage {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    fn search(&self, key: &SubscriptionKey) -> Result<usize, usize> {
        self.entries.binary_search_by_key(key, |(k, _)| *k)
    }

    /// Drain every stored entry, for migration into another backend.
    pub(super) fn drain_all(&mut self) -> Vec<(SubscriptionKey, StoredHandler)> {
        self.entries.drain(..).collect()
    }
}

impl Default for VectorStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionStorage for VectorStorage {
    fn create(&mut self, key: SubscriptionKey, handler: StoredHandler) -> Result<(), ()> {
        match self.search(&key) {
            Ok(_) => Err(()),
            Err(pos) => {
                self.entries.insert(pos, (key, handler));
                Ok(())
            }
        }
    }

    fn drop_for_state(&mut self, mbox_id: MboxId, msg_type: MessageType, state: StateId) -> RemovalOutcome {
        let key = SubscriptionKey::new(mbox_id, msg_type, state);
        match self.search(&key) {
            Err(_) => RemovalOutcome::NotFound,
            Ok(pos) => {
                self.entries.remove(pos);
                if self.has_any_for_mbox_msg_type(mbox_id, msg_type) {
                    RemovalOutcome::RemovedOthersRemain
                } else {
                    RemovalOutcome::RemovedLastForMboxMsgType
                }
            }
        }
    }

    fn drop_for_mbox_msg_type(&mut self, mbox_id: MboxId, msg_type: MessageType) -> usize {
        let rank = msg_type.rank();
        let before = self.entries.len();
        self.entries.retain(|(k, _)| !(k.mbox_id == mbox_id && k.msg_type_rank == rank));
        before - self.entries.len()
    }

    fn drop_all(&mut self) {
        self.entries.clear();
    }

    fn find(&self, mbox_id: MboxId, msg_type: MessageType, state: StateId) -> Option<&StoredHandler> {
        let key = SubscriptionKey::new(mbox_id, msg_type, state);
        self.search(&key).ok().map(|pos| &self.entries[pos].1)
    }

    fn find_mut(&mut self, mbox_id: MboxId, msg_type: MessageType, state: StateId) -> Option<&mut StoredHandler> {
        let key = SubscriptionKey::new(mbox_id, msg_type, state);
        match self.search(&key) {
            Ok(pos) => Some(&mut self.entries[pos].1),
            Err(_) => None,
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn has_any_for_mbox_msg_type(&self, mbox_id: MboxId, msg_type: MessageType) -> bool {
        let rank = msg_type.rank();
        self.entries.iter().any(|(k, _)| k.mbox_id == mbox_id && k.msg_type_rank == rank)
    }
}
