// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-agent subscription storage: an index from (mbox, msg-type, state) to
//! handler, with four interchangeable backends (spec §4.2).

mod flat_set;
mod hash;
mod map;
mod vector;

pub use flat_set::FlatSetStorage;
pub use hash::HashStorage;
pub use map::MapStorage;
pub use vector::VectorStorage;

use crate::agent::EvtCtx;
use crate::error::Result;
use crate::mbox::MboxId;
use crate::message::{MessageRef, MessageType};
use crate::state::StateId;

/// Thread-safety tag carried by every handler (spec §5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadSafety {
    NotThreadSafe,
    ThreadSafe,
}

impl Default for ThreadSafety {
    fn default() -> Self {
        ThreadSafety::NotThreadSafe
    }
}

/// What kind of handler this entry carries — mirrors
/// [`crate::demand::HandlerSelector`] but only the two message variants are
/// ever stored in subscription storage (`evt_start`/`evt_finish` are
/// dispatched directly by the agent, never looked up here).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Msg,
    MutableMsg,
}

/// Opaque key subscription storage is indexed by: (mbox, msg-type, state).
///
/// `msg_type_rank` is [`MessageType::rank`] — a surrogate total order, since
/// `TypeId` itself has no `Ord` impl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionKey {
    pub mbox_id: MboxId,
    pub msg_type_rank: u64,
    pub state: StateId,
}

impl SubscriptionKey {
    pub fn new(mbox_id: MboxId, msg_type: MessageType, state: StateId) -> Self {
        Self { mbox_id, msg_type_rank: msg_type.rank(), state }
    }
}

/// A stored handler entry plus its thread-safety tag and kind.
pub struct StoredHandler {
    pub thread_safety: ThreadSafety,
    pub handler_kind: HandlerKind,
    pub handler: Box<dyn FnMut(&mut EvtCtx<'_>, &MessageRef) -> Result<()> + Send>,
}

/// Result of removing one (mbox, msg-type, state) entry: tells the caller
/// whether any state-specific entry remains for that (mbox, msg-type) pair,
/// so the agent knows whether to notify the mbox to drop its own
/// subscription record (spec §4.2 invariant).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalOutcome {
    NotFound,
    RemovedLastForMboxMsgType,
    RemovedOthersRemain,
}

/// Common contract every backend implements (spec §4.2 table).
pub trait SubscriptionStorage: Send {
    /// Insert a new entry. Rejects duplicate (mbox, msg-type, state) keys.
    fn create(&mut self, key: SubscriptionKey, handler: StoredHandler) -> Result<(), ()>;

    /// Remove the entry for an exact (mbox, msg-type, state) key.
    fn drop_for_state(&mut self, mbox_id: MboxId, msg_type: MessageType, state: StateId) -> RemovalOutcome;

    /// Remove every state-specific entry for a (mbox, msg-type) pair —
    /// used on coop shutdown.
    fn drop_for_mbox_msg_type(&mut self, mbox_id: MboxId, msg_type: MessageType) -> usize;

    fn drop_all(&mut self);

    /// Look up the handler for (mbox, msg-type, state), walking up the
    /// state hierarchy is the *caller's* job (agent.rs); storage only ever
    /// resolves one exact key.
    fn find(&self, mbox_id: MboxId, msg_type: MessageType, state: StateId) -> Option<&StoredHandler>;
    fn find_mut(&mut self, mbox_id: MboxId, msg_type: MessageType, state: StateId) -> Option<&mut StoredHandler>;

    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether any state-specific entry still exists for (mbox, msg-type),
    /// regardless of which state — used by the mbox-side "last subscriber
    /// gone" notification.
    fn has_any_for_mbox_msg_type(&self, mbox_id: MboxId, msg_type: MessageType) -> bool;
}

/// Recommended vector→map crossover for [`SubscriptionStorageKind::Auto`]
/// (spec §4.2, §9 open question — picked here, not copied from the C++
/// literal default).
pub const DEFAULT_AUTO_SWITCH_THRESHOLD: usize = 16;

/// Which backend an agent should use for its subscription storage.
#[derive(Debug, Clone, Copy)]
pub enum SubscriptionStorageKind {
    Vector,
    Map,
    Hash,
    FlatSet,
    /// Starts as `Vector`, switches to `Map` once `len() >= switch_at`.
    Auto { switch_at: usize },
}

impl Default for SubscriptionStorageKind {
    fn default() -> Self {
        SubscriptionStorageKind::Auto { switch_at: DEFAULT_AUTO_SWITCH_THRESHOLD }
    }
}

pub fn make_storage(kind: SubscriptionStorageKind) -> Box<dyn SubscriptionStorage> {
    match kind {
        SubscriptionStorageKind::Vector => Box::new(VectorStorage::new()),
        SubscriptionStorageKind::Map => Box::new(MapStorage::new()),
        SubscriptionStorageKind::Hash => Box::new(HashStorage::new()),
        SubscriptionStorageKind::FlatSet => Box::new(FlatSetStorage::new()),
        SubscriptionStorageKind::Auto { switch_at } => Box::new(AutoStorage::new(switch_at)),
    }
}

/// Starts as a [`VectorStorage`] (cheap for the common case of a handful of
/// subscriptions) and migrates its entries into a [`MapStorage`] once the
/// entry count reaches `switch_at`. Never migrates back.
struct AutoStorage {
    switch_at: usize,
    backend: AutoBackend,
}

enum AutoBackend {
    Small(VectorStorage),
    Large(MapStorage),
}

impl AutoStorage {
    fn new(switch_at: usize) -> Self {
        Self { switch_at, backend: AutoBackend::Small(VectorStorage::new()) }
    }

    fn maybe_migrate(&mut self) {
        if let AutoBackend::Small(v) = &mut self.backend {
            if v.len() >= self.switch_at {
                let mut large = MapStorage::new();
                for (key, handler) in v.drain_all() {
                    let _ = large.create(key, handler);
                }
                self.backend = AutoBackend::Large(large);
            }
        }
    }
}

impl SubscriptionStorage for AutoStorage {
    fn create(&mut self, key: SubscriptionKey, handler: StoredHandler) -> Result<(), ()> {
        let r = match &mut self.backend {
            AutoBackend::Small(v) => v.create(key, handler),
            AutoBackend::Large(m) => m.create(key, handler),
        };
        if r.is_ok() {
            self.maybe_migrate();
        }
        r
    }

    fn drop_for_state(&mut self, mbox_id: MboxId, msg_type: MessageType, state: StateId) -> RemovalOutcome {
        match &mut self.backend {
            AutoBackend::Small(v) => v.drop_for_state(mbox_id, msg_type, state),
            AutoBackend::Large(m) => m.drop_for_state(mbox_id, msg_type, state),
        }
    }

    fn drop_for_mbox_msg_type(&mut self, mbox_id: MboxId, msg_type: MessageType) -> usize {
        match &mut self.backend {
            AutoBackend::Small(v) => v.drop_for_mbox_msg_type(mbox_id, msg_type),
            AutoBackend::Large(m) => m.drop_for_mbox_msg_type(mbox_id, msg_type),
        }
    }

    fn drop_all(&mut self) {
        match &mut self.backend {
            AutoBackend::Small(v) => v.drop_all(),
            AutoBackend::Large(m) => m.drop_all(),
        }
    }

    fn find(&self, mbox_id: MboxId, msg_type: MessageType, state: StateId) -> Option<&StoredHandler> {
        match &self.backend {
            AutoBackend::Small(v) => v.find(mbox_id, msg_type, state),
            AutoBackend::Large(m) => m.find(mbox_id, msg_type, state),
        }
    }

    fn find_mut(&mut self, mbox_id: MboxId, msg_type: MessageType, state: StateId) -> Option<&mut StoredHandler> {
        match &mut self.backend {
            AutoBackend::Small(v) => v.find_mut(mbox_id, msg_type, state),
            AutoBackend::Large(m) => m.find_mut(mbox_id, msg_type, state),
        }
    }

    fn len(&self) -> usize {
        match &self.backend {
            AutoBackend::Small(v) => v.len(),
            AutoBackend::Large(m) => m.len(),
        }
    }

    fn has_any_for_mbox_msg_type(&self, mbox_id: MboxId, msg_type: MessageType) -> bool {
        match &self.backend {
            AutoBackend::Small(v) => v.has_any_for_mbox_msg_type(mbox_id, msg_type),
            AutoBackend::Large(m) => m.has_any_for_mbox_msg_type(mbox_id, msg_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler() -> StoredHandler {
        StoredHandler {
            thread_safety: ThreadSafety::NotThreadSafe,
            handler_kind: HandlerKind::Msg,
            handler: Box::new(|_ctx, _msg| Ok(())),
        }
    }

    #[test]
    fn auto_storage_migrates_past_threshold() {
        let mut s = AutoStorage::new(4);
        for i in 0..4 {
            let key = SubscriptionKey::new(1, MessageType::of::<u32>(), i);
            assert!(s.create(key, handler()).is_ok());
        }
        assert!(matches!(s.backend, AutoBackend::Large(_)));
        assert_eq!(s.len(), 4);
    }

    #[test]
    fn auto_storage_stays_small_below_threshold() {
        let mut s = AutoStorage::new(4);
        let key = SubscriptionKey::new(1, MessageType::of::<u32>(), 0);
        assert!(s.create(key, handler()).is_ok());
        assert!(matches!(s.backend, AutoBackend::Small(_)));
    }
}
