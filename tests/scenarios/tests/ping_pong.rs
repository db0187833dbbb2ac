// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario 1: a fixed number of ping/pong round trips delivers exactly
//! that many of each message, and the coop fully deregisters afterwards
//! (spec §8 scenario 1; spec §4.6's usage-count-driven teardown).

use std::sync::Arc;
use std::time::Duration;

use sobjectizer::agent::{AgentLogic, DefineCtx, EvtCtx};
use sobjectizer::coop::DeregReason;
use sobjectizer::env::{AgentSpec, CoopBuilder, EnvParams, Environment};
use sobjectizer::filter::CountingFilter;
use sobjectizer::mbox::MboxRef;
use sobjectizer::{send, MessageType, Result};
use sobjectizer_scenarios::{wait_until, SHORT};

struct Ping(u32);
struct Pong(u32);

struct PlayerA {
    own_inbox: MboxRef,
    peer_inbox: MboxRef,
    rounds: u32,
}

impl AgentLogic for PlayerA {
    fn define_agent(&mut self, ctx: &mut DefineCtx<'_>) -> Result<()> {
        let rounds = self.rounds;
        let peer_inbox = self.peer_inbox.clone();
        ctx.subscribe::<Pong, _>(&self.own_inbox, 0, move |ctx, pong: &Pong| {
            if pong.0 >= rounds {
                ctx.deregister_coop(DeregReason::Normal);
                return;
            }
            let _ = send(&peer_inbox, Ping(pong.0 + 1));
        })
    }

    fn evt_start(&mut self, _ctx: &mut EvtCtx<'_>) {
        let _ = send(&self.peer_inbox, Ping(1));
    }
}

struct PlayerB {
    own_inbox: MboxRef,
    peer_inbox: MboxRef,
}

impl AgentLogic for PlayerB {
    fn define_agent(&mut self, ctx: &mut DefineCtx<'_>) -> Result<()> {
        let peer_inbox = self.peer_inbox.clone();
        ctx.subscribe::<Ping, _>(&self.own_inbox, 0, move |_ctx, ping: &Ping| {
            let _ = send(&peer_inbox, Pong(ping.0));
        })
    }
}

#[test]
fn exact_round_count_then_idle() -> Result<()> {
    let rounds = 20u32;
    let env = Environment::new(EnvParams::new());
    let a_inbox = env.create_mpmc_mbox();
    let b_inbox = env.create_mpmc_mbox();

    let ping_count = Arc::new(CountingFilter::new(|_| true));
    let pong_count = Arc::new(CountingFilter::new(|_| true));
    b_inbox.set_filter(MessageType::of::<Ping>(), ping_count.clone());
    a_inbox.set_filter(MessageType::of::<Pong>(), pong_count.clone());

    let a = AgentSpec::new(PlayerA { own_inbox: a_inbox.clone(), peer_inbox: b_inbox.clone(), rounds }, "default");
    let b = AgentSpec::new(PlayerB { own_inbox: b_inbox, peer_inbox: a_inbox }, "default");

    env.register_coop(CoopBuilder::new("ping-pong-test").add_agent(a).add_agent(b))?;

    assert!(wait_until(SHORT, || env.is_idle()), "environment never went idle");
    assert_eq!(ping_count.count(), u64::from(rounds));
    assert_eq!(pong_count.count(), u64::from(rounds));
    assert_eq!(env.registered_coop_count(), 0, "coop must fully deregister once idle");
    Ok(())
}

#[test]
fn idempotent_empty_round_count_is_immediately_idle() -> Result<()> {
    let env = Environment::new(EnvParams::new());
    let a_inbox = env.create_mpmc_mbox();
    let b_inbox = env.create_mpmc_mbox();

    let a = AgentSpec::new(PlayerA { own_inbox: a_inbox.clone(), peer_inbox: b_inbox.clone(), rounds: 0 }, "default");
    let b = AgentSpec::new(PlayerB { own_inbox: b_inbox, peer_inbox: a_inbox }, "default");

    env.register_coop(CoopBuilder::new("ping-pong-zero").add_agent(a).add_agent(b))?;

    assert!(wait_until(Duration::from_secs(2), || env.is_idle()));
    Ok(())
}
