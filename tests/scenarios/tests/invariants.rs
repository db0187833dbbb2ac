// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-cutting invariants from spec §7: `MessageType::rank()` stability
//! and injectivity, subscription-storage backend interchangeability, and
//! priority index clamping at the boundary.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use serial_test::serial;
use sobjectizer::agent::{AgentLogic, DefineCtx};
use sobjectizer::dispatch::Priority;
use sobjectizer::env::{AgentSpec, CoopBuilder, EnvParams, Environment};
use sobjectizer::mbox::MboxRef;
use sobjectizer::subscription::SubscriptionStorageKind;
use sobjectizer::{send, MessageType, Result};
use sobjectizer_scenarios::{wait_until, SHORT};

struct Echo(u32);

struct Counter {
    inbox: MboxRef,
    received: Arc<AtomicU32>,
}

impl AgentLogic for Counter {
    fn define_agent(&mut self, ctx: &mut DefineCtx<'_>) -> Result<()> {
        let received = self.received.clone();
        ctx.subscribe::<Echo, _>(&self.inbox, 0, move |_ctx, echo: &Echo| {
            received.fetch_add(echo.0, Ordering::AcqRel);
        })
    }
}

fn run_with_backend(kind: SubscriptionStorageKind) -> Result<u32> {
    let env = Environment::new(EnvParams::new());
    let inbox = env.create_mpmc_mbox();
    let received = Arc::new(AtomicU32::new(0));

    let agent = AgentSpec::new(Counter { inbox: inbox.clone(), received: received.clone() }, "default").storage_kind(kind);
    env.register_coop(CoopBuilder::new("backend-test").add_agent(agent))?;

    for value in 1..=10u32 {
        let _ = send(&inbox, Echo(value));
    }
    assert!(wait_until(SHORT, || received.load(Ordering::Acquire) == 55));
    Ok(received.load(Ordering::Acquire))
}

#[yare::parameterized(
    vector = { SubscriptionStorageKind::Vector },
    map = { SubscriptionStorageKind::Map },
    hash = { SubscriptionStorageKind::Hash },
    flat_set = { SubscriptionStorageKind::FlatSet },
    auto_below_switch = { SubscriptionStorageKind::Auto { switch_at: 64 } },
    auto_switches_immediately = { SubscriptionStorageKind::Auto { switch_at: 0 } },
)]
fn every_subscription_storage_backend_delivers_the_same_messages(kind: SubscriptionStorageKind) -> Result<()> {
    assert_eq!(run_with_backend(kind)?, 55);
    Ok(())
}

#[test]
fn priority_index_clamps_at_the_top() {
    assert_eq!(Priority(7).index(), 7);
    assert_eq!(Priority(200).index(), 7, "an out-of-range priority must clamp, not panic or wrap");
    assert_eq!(Priority::MIN.index(), 0);
    assert_eq!(Priority::MAX.index(), 7);
}

struct RankA;
struct RankB;
struct RankC;

#[test]
#[serial]
fn message_type_rank_is_stable_and_injective() {
    let a1 = MessageType::of::<RankA>().rank();
    let b = MessageType::of::<RankB>().rank();
    let a2 = MessageType::of::<RankA>().rank();
    let c = MessageType::of::<RankC>().rank();

    assert_eq!(a1, a2, "rank must be stable across calls for the same type");
    assert_ne!(a1, b, "distinct types must never share a rank");
    assert_ne!(b, c, "distinct types must never share a rank");
    assert_ne!(a1, c, "distinct types must never share a rank");
}

proptest! {
    #[test]
    fn priority_index_never_exceeds_the_level_count(raw in 0u8..=u8::MAX) {
        let index = Priority(raw).index();
        prop_assert!(index < Priority::LEVELS);
    }
}

proptest! {
    #[test]
    fn sending_any_count_of_echoes_sums_correctly(values in proptest::collection::vec(1u32..50, 0..20)) {
        let env = Environment::new(EnvParams::new());
        let inbox = env.create_mpmc_mbox();
        let received = Arc::new(AtomicU32::new(0));
        let expected: u32 = values.iter().sum();

        let agent = AgentSpec::new(Counter { inbox: inbox.clone(), received: received.clone() }, "default");
        prop_assert!(env.register_coop(CoopBuilder::new("proptest-echo").add_agent(agent)).is_ok());

        for value in &values {
            let _ = send(&inbox, Echo(*value));
        }
        prop_assert!(wait_until(Duration::from_secs(2), || received.load(Ordering::Acquire) == expected));
    }
}
