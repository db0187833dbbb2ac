// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Free functions applications actually call to push a message through a
//! mbox (spec §3, §4.1, §4.7). Everything here is a thin wrapper: the real
//! work lives in [`crate::mbox::Mbox::deliver`] and [`crate::timer`].

use std::time::Duration;

use crate::env::Environment;
use crate::error::Result;
use crate::mbox::MboxRef;
use crate::message::{Message, MessageInstance, Mutability, Payload, Signal};
use crate::timer::TimerHandle;

/// Sends an immutable message (spec §4.1). Valid on both mbox kinds.
pub fn send<M: Message>(mbox: &MboxRef, msg: M) -> Result<()> {
    let instance = MessageInstance::new_message(msg, Mutability::Immutable);
    mbox.deliver(Payload::Plain(std::sync::Arc::new(instance)), Mutability::Immutable)
}

/// Sends a mutable message (spec §4.1). Only an MPSC mbox accepts this; an
/// MPMC mbox rejects it with `SoErrorKind::MutableOnMpmc` since a mutation
/// visible to one subscriber would be invisible (or racy) for any other.
pub fn send_mutable<M: crate::message::MutableMessage>(mbox: &MboxRef, msg: M) -> Result<()> {
    let instance = MessageInstance::new_message(msg, Mutability::Mutable);
    mbox.deliver(Payload::Plain(std::sync::Arc::new(instance)), Mutability::Mutable)
}

/// Sends a signal: a message type carrying no payload (spec §4.1).
pub fn send_signal<M: Signal>(mbox: &MboxRef) -> Result<()> {
    let instance = MessageInstance::new_signal::<M>();
    mbox.deliver(Payload::Plain(std::sync::Arc::new(instance)), Mutability::Immutable)
}

/// Schedules a single-shot delayed delivery of `msg` to `mbox`, `pause` from
/// now (spec §4.7). The returned handle cancels the timer when dropped.
pub fn send_delayed<M: Message>(env: &Environment, mbox: &MboxRef, msg: M, pause: Duration) -> Result<TimerHandle> {
    let instance = MessageInstance::new_message(msg, Mutability::Immutable);
    env.timer_manager().schedule(mbox.clone(), instance.msg_type(), std::sync::Arc::new(instance), Mutability::Immutable, pause, None)
}

/// Schedules a periodic delivery of `msg`, first firing `pause` from now and
/// repeating every `period` thereafter (spec §4.7). Rejected for mutable
/// message types: a single shared mutable instance replayed to every period
/// would violate the "exactly one mutator" invariant spec §4.1 establishes
/// for mutable messages.
pub fn send_periodic<M: Message>(env: &Environment, mbox: &MboxRef, msg: M, pause: Duration, period: Duration) -> Result<TimerHandle> {
    let instance = MessageInstance::new_message(msg, Mutability::Immutable);
    env.timer_manager().schedule(
        mbox.clone(),
        instance.msg_type(),
        std::sync::Arc::new(instance),
        Mutability::Immutable,
        pause,
        Some(period),
    )
}
