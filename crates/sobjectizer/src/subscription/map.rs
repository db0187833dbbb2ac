// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ordered-tree (`BTreeMap`) subscription storage: O(log n) lookup, insert
//! and erase. Preferred for a moderate number of subscriptions with
//! frequent churn (spec §4.2).

use std::collections::BTreeMap;

use super::{RemovalOutcome, SubscriptionKey, SubscriptionStorage, StoredHandler};
use crate::mbox::MboxId;
use crate::message::MessageType;
use crate::state::StateId;

pub struct MapStorage {
    entries: BTreeMap<SubscriptionKey, StoredHandler>,
}

impl MapStorage {
    pub fn new() -> Self {
        Self { entries: BTreeMap::new() }
    }
}

impl Default for MapStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionStorage for MapStorage {
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
        let before = self.entries.len();
        self.entries.retain(|k, _| !(k.mbox_id == mbox_id && k.msg_type_rank == rank));
        before - self.entries.len()
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::{HandlerKind, ThreadSafety};

    fn handler() -> StoredHandler {
        StoredHandler { thread_safety: ThreadSafety::NotThreadSafe, handler_kind: HandlerKind::Msg, handler: Box::new(|_, _| Ok(())) }
    }

    #[test]
    fn duplicate_insert_rejected() {
        let mut s = MapStorage::new();
        let key = SubscriptionKey::new(1, MessageType::of::<u32>(), 0);
        assert!(s.create(key, handler()).is_ok());
        assert!(s.create(key, handler()).is_err());
    }

    #[test]
    fn churn_keeps_correct_count() {
        let mut s = MapStorage::new();
        let mt = MessageType::of::<u32>();
        for i in 0..50 {
            s.create(SubscriptionKey::new(1, mt, i), handler()).unwrap();
        }
        for i in 0..25 {
            s.drop_for_state(1, mt, i);
        }
        assert_eq!(s.len(), 25);
    }
}
