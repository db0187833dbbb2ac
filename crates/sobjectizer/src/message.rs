// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message, signal, mutability and envelope types (spec §3, §4.1).

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

/// Marker for any type that can be carried as a message payload.
///
/// Blanket-implemented for every `Send + Sync + 'static` type, matching the
/// teacher's habit of leaning on trait bounds rather than a closed registry.
pub trait Message: Send + Sync + 'static {}
impl<T: Send + Sync + 'static> Message for T {}

/// Marker for message types that carry no meaningful payload — a *signal*.
///
/// Implement this for a unit struct (or any zero-sized type) to send it with
/// [`crate::send_signal`] without constructing a value.
pub trait Signal: Message {}

/// Marker for message types that may be sent mutably through an MPSC mbox.
///
/// Types that do not implement this are always delivered immutably; sending
/// one mutably (or subscribing for it mutably on an MPMC mbox) fails with
/// [`crate::error::SoErrorKind::MutableOnMpmc`].
pub trait MutableMessage: Message {}

/// Stable per-type tag used as the routing key everywhere in the crate.
///
/// Equality and hashing are by [`TypeId`]; the name is carried only for
/// tracing and diagnostics and never participates in routing decisions.
#[derive(Clone, Copy)]
pub struct MessageType {
    type_id: TypeId,
    name: &'static str,
}

impl MessageType {
    pub fn of<M: Message>() -> Self {
        Self { type_id: TypeId::of::<M>(), name: std::any::type_name::<M>() }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// A stable, totally-ordered surrogate for this type, assigned the
    /// first time each distinct `TypeId` is seen (a process-wide monotonic
    /// counter, not a hash — so distinct types never collide). `TypeId`
    /// itself has no `Ord` impl; subscription storage backends that need a
    /// sort order (the sorted-vector and flat-set backends, spec §4.2) key
    /// on this instead.
    pub fn rank(&self) -> u64 {
        static RANKS: OnceLock<Mutex<(HashMap<TypeId, u64>, u64)>> = OnceLock::new();
        let lock = RANKS.get_or_init(|| Mutex::new((HashMap::new(), 0)));
        let mut guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(r) = guard.0.get(&self.type_id) {
            return *r;
        }
        let next = guard.1;
        guard.1 += 1;
        guard.0.insert(self.type_id, next);
        next
    }
}

impl PartialEq for MessageType {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}
impl Eq for MessageType {}

impl std::hash::Hash for MessageType {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Whether a message instance may be mutated by its (single) recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutability {
    Immutable,
    Mutable,
}

/// A type-erased, reference-counted message instance.
///
/// `payload` is `None` exactly when the instance represents a signal — only
/// its [`MessageType`] matters in that case.
pub struct MessageInstance {
    msg_type: MessageType,
    payload: Option<Arc<dyn Any + Send + Sync>>,
    mutability: Mutability,
}

impl MessageInstance {
    pub fn new_message<M: Message>(msg: M, mutability: Mutability) -> Self {
        Self { msg_type: MessageType::of::<M>(), payload: Some(Arc::new(msg)), mutability }
    }

    pub fn new_signal<M: Signal>() -> Self {
        Self { msg_type: MessageType::of::<M>(), payload: None, mutability: Mutability::Immutable }
    }

    pub fn msg_type(&self) -> MessageType {
        self.msg_type
    }

    pub fn mutability(&self) -> Mutability {
        self.mutability
    }

    pub fn is_signal(&self) -> bool {
        self.payload.is_none()
    }

    /// Downcast the payload to `M`. Returns `None` for signals or a type mismatch.
    pub fn downcast<M: Message>(&self) -> Option<&M> {
        self.payload.as_ref().and_then(|p| p.downcast_ref::<M>())
    }
}

impl fmt::Debug for MessageInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageInstance")
            .field("msg_type", &self.msg_type)
            .field("is_signal", &self.is_signal())
            .field("mutability", &self.mutability)
            .finish()
    }
}

/// Reference-counted handle to a message instance; cheap to clone, shared
/// across every subscriber a delivery reaches.
pub type MessageRef = Arc<MessageInstance>;

/// A wrapper message that can observe or transform delivery of its payload
/// (spec §3, §4.1). Transparent to type-based subscription: the mbox always
/// routes by the *inner* message's [`MessageType`].
pub trait Envelope: Send + Sync + fmt::Debug {
    /// The wrapped message. Access is read-only — envelopes inspect, they
    /// don't mutate in place.
    fn payload(&self) -> &MessageRef;

    /// Called by the mbox immediately before attempting delivery, and again
    /// after the handler has run, purely for observation.
    fn access_hook(&self, _mode: AccessMode) {}

    /// Called once, before the first delivery attempt, to let the envelope
    /// transform or suppress its payload. Returning `None` suppresses
    /// delivery entirely (the message never reaches a handler).
    fn transformation_hook(&self) -> Option<MessageRef> {
        Some(self.payload().clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    BeforeDeliveryAttempt,
    AfterHandlerInvocation,
}

/// What a sender actually hands to an mbox: a plain message or one wrapped
/// in an [`Envelope`]. Routing always resolves to the inner [`MessageRef`]
/// before the mbox looks anything up.
#[derive(Clone)]
pub enum Payload {
    Plain(MessageRef),
    Enveloped(Arc<dyn Envelope>),
}

impl Payload {
    /// Extract the message actually delivered, running the envelope's
    /// transformation hook if present. `None` means delivery is suppressed.
    pub fn resolve(&self) -> Option<MessageRef> {
        match self {
            Payload::Plain(m) => Some(m.clone()),
            Payload::Enveloped(e) => {
                e.access_hook(AccessMode::BeforeDeliveryAttempt);
                e.transformation_hook()
            }
        }
    }
}
