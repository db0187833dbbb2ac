// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hash-table subscription storage: expected O(1) lookup/insert/erase.
//! Preferred for lookup-heavy agents with many subscriptions (spec §4.2).

use std::collections::HashMap;

use super::{RemovalOutcome, SubscriptionKey, SubscriptionStorage, StoredHandler};
use crate::mbox::MboxId;
use crate::message::MessageType;
use crate::state::StateId;

pub struct HashStorage {
    entries: HashMap<SubscriptionKey, StoredHandler>,
}

impl HashStorage {
    pub fn new() -> Self {
        Self { entries: HashMap::new() }
    }
}

impl Default for HashStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionStorage for HashStorage {
    fn create(&mut self, key: SubscriptionKey, handler: StoredHandler) -> Result<(), ()> {
        if self.entries.contains_key(&key) {
            return Err(());
        }
        self.entries.insert(key, handler);
        Ok(())
    }

    fn drop_for_state(&mut self, mbox_id: MboxId, msg_type: MessageType, state: StateId) -> RemovalOutcome {
        let key = SubscriptionKey::new(mbox_id, msg_type, state);
        if self.entries.remove(&key).is_none() {
            RemovalOutcome::NotFound
        } else if self.has_any_for_mbox_msg_type(mbox_id, msg_type) {
            RemovalOutcome::RemovedOthersRemain
        } else {
            RemovalOutcome::RemovedLastForMboxMsgType
        }
    }

    fn drop_for_mbox_msg_type(&mut self, mbox_id: MboxId, msg_type: MessageType) -> usize {
        let rank = msg_type.rank();
        let keys: Vec<_> =
            self.entries.keys().filter(|k| k.mbox_id == mbox_id && k.msg_type_rank == rank).copied().collect();
        for k in &keys {
            self.entries.remove(k);
        }
        keys.len()
    }

    fn drop_all(&mut self) {
        self.entries.clear();
    }

    fn find(&self, mbox_id: MboxId, msg_type: MessageType, state: StateId) -> Option<&StoredHandler> {
        self.entries.get(&SubscriptionKey::new(mbox_id, msg_type, state))
    }

    fn find_mut(&mut self, mbox_id: MboxId, msg_type: MessageType, state: StateId) -> Option<&mut StoredHandler> {
        self.entries.get_mut(&SubscriptionKey::new(mbox_id, msg_type, state))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn has_any_for_mbox_msg_type(&self, mbox_id: MboxId, msg_type: MessageType) -> bool {
        let rank = msg_type.rank();
        self.entries.keys().any(|k| k.mbox_id == mbox_id && k.msg_type_rank == rank)
    }
}
