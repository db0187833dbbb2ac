// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenario 1 (spec §8): two agents volley `ping`/`pong` a fixed
//! number of times, then deregister their coop and let the environment
//! drain. A [`CountingFilter`] attached to both inboxes asserts the exact
//! delivery count spec §8 scenario 1 requires.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use sobjectizer::agent::{AgentLogic, DefineCtx, EvtCtx};
use sobjectizer::coop::DeregReason;
use sobjectizer::env::{AgentSpec, CoopBuilder, EnvParams, Environment};
use sobjectizer::filter::CountingFilter;
use sobjectizer::mbox::MboxRef;
use sobjectizer::{send, Result};

#[derive(Parser)]
struct Cli {
    /// Number of ping/pong round trips before the coop deregisters.
    #[arg(long, default_value_t = 100)]
    rounds: u32,
}

struct Ping(u32);
struct Pong(u32);

/// Player A owns `own_inbox` (where `Pong` arrives) and knows `peer_inbox`
/// (where it sends `Ping`). Both inboxes are created up front by `main` so
/// each side can subscribe on exactly the mbox the other already knows how
/// to address — an agent's own `ctx.direct_mbox()` is only assigned once
/// registration begins, too late for the peer to have learned it.
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

#[allow(clippy::expect_used)]
fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let cli = Cli::parse();

    let env = Environment::new(EnvParams::new());

    let a_inbox = env.create_mpmc_mbox();
    let b_inbox = env.create_mpmc_mbox();

    let ping_count = Arc::new(CountingFilter::new(|_| true));
    let pong_count = Arc::new(CountingFilter::new(|_| true));
    b_inbox.set_filter(sobjectizer::MessageType::of::<Ping>(), ping_count.clone());
    a_inbox.set_filter(sobjectizer::MessageType::of::<Pong>(), pong_count.clone());

    let a = AgentSpec::new(PlayerA { own_inbox: a_inbox.clone(), peer_inbox: b_inbox.clone(), rounds: cli.rounds }, "default");
    let b = AgentSpec::new(PlayerB { own_inbox: b_inbox, peer_inbox: a_inbox }, "default");

    let handle = env
        .register_coop(CoopBuilder::new("ping-pong").add_agent(a).add_agent(b))
        .expect("coop registration must succeed");
    tracing::info!(coop = handle.id(), "registered ping-pong coop");

    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    while !env.is_idle() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }

    println!(
        "pings={} pongs={} idle={}",
        ping_count.count(),
        pong_count.count(),
        env.is_idle()
    );
    assert_eq!(ping_count.count(), u64::from(cli.rounds));
    assert_eq!(pong_count.count(), u64::from(cli.rounds));
}
