// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenario 3 (spec §8): a producer pushes raw sensor readings
//! faster than a deliberately slow consumer can drain them. Once the
//! consumer mbox's message limit for `Celsius` is reached, the overlimit
//! reaction transforms the excess reading into a `Rejected` reply and
//! redirects it back to the producer's own mbox instead of dropping it
//! silently (spec §4.3's `Transform` reaction, supplemented from
//! `transform_then_redirect.hpp`).
//!
//! The consumer runs on its own dispatcher (`active_obj`) rather than
//! sharing `default` with the producer/validator, so its slow handler
//! genuinely overlaps with the validator still forwarding readings instead
//! of serializing behind it on one worker thread.
//!
//! The limit is configured from inside `Consumer::define_agent` rather than
//! from `main` before the coop exists: a message limit is scoped to one
//! subscriber (spec §3), so it can only be set once that subscriber's agent
//! id is known.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use sobjectizer::agent::{AgentLogic, DefineCtx};
use sobjectizer::env::{AgentSpec, CoopBuilder, EnvParams, Environment};
use sobjectizer::limit::{MessageLimit, OverlimitReaction};
use sobjectizer::mbox::{MboxId, MboxRef};
use sobjectizer::message::{MessageInstance, MessageRef, MessageType, Mutability};
use sobjectizer::{send, Result};

#[derive(Parser)]
struct Cli {
    /// How many raw readings the producer pushes.
    #[arg(long, default_value_t = 40)]
    readings: u32,
    /// How long the consumer takes to process one reading.
    #[arg(long, default_value_t = 15)]
    consume_ms: u64,
    /// How many `Celsius` readings the consumer mbox will hold before the
    /// overlimit reaction kicks in.
    #[arg(long, default_value_t = 3)]
    limit: usize,
}

struct Raw {
    id: u32,
    fahrenheit: f64,
}

struct Celsius {
    id: u32,
    value: f64,
}

struct Rejected {
    id: u32,
}

struct Validator {
    raw_inbox: MboxRef,
    consumer_inbox: MboxRef,
}

impl AgentLogic for Validator {
    fn define_agent(&mut self, ctx: &mut DefineCtx<'_>) -> Result<()> {
        let consumer_inbox = self.consumer_inbox.clone();
        ctx.subscribe::<Raw, _>(&self.raw_inbox, 0, move |_ctx, raw: &Raw| {
            let celsius = (raw.fahrenheit - 32.0) * 5.0 / 9.0;
            let _ = send(&consumer_inbox, Celsius { id: raw.id, value: celsius });
        })
    }
}

struct Consumer {
    consumer_inbox: MboxRef,
    processing: Duration,
    consumed: Arc<AtomicU32>,
    limit: usize,
    rejection_target: MboxId,
}

impl AgentLogic for Consumer {
    fn define_agent(&mut self, ctx: &mut DefineCtx<'_>) -> Result<()> {
        let rejection_target = self.rejection_target;
        ctx.set_message_limit(
            &self.consumer_inbox,
            MessageType::of::<Celsius>(),
            MessageLimit::new(
                self.limit,
                OverlimitReaction::Transform(Arc::new(move |msg: &MessageRef| {
                    let reading: &Celsius = msg.downcast()?;
                    let rejected = MessageInstance::new_message(Rejected { id: reading.id }, Mutability::Immutable);
                    Some((rejection_target, Arc::new(rejected)))
                })),
            ),
        );

        let processing = self.processing;
        let consumed = self.consumed.clone();
        ctx.subscribe::<Celsius, _>(&self.consumer_inbox, 0, move |_ctx, _reading: &Celsius| {
            std::thread::sleep(processing);
            consumed.fetch_add(1, Ordering::AcqRel);
        })
    }
}

struct RejectedObserver {
    producer_inbox: MboxRef,
    rejected: Arc<AtomicU32>,
}

impl AgentLogic for RejectedObserver {
    fn define_agent(&mut self, ctx: &mut DefineCtx<'_>) -> Result<()> {
        let rejected = self.rejected.clone();
        ctx.subscribe::<Rejected, _>(&self.producer_inbox, 0, move |_ctx, _evt: &Rejected| {
            rejected.fetch_add(1, Ordering::AcqRel);
        })
    }
}

#[allow(clippy::expect_used)]
fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let cli = Cli::parse();
    let processing = Duration::from_millis(cli.consume_ms);

    let env = Environment::new(EnvParams::new());

    let raw_inbox = env.create_mpmc_mbox();
    let consumer_inbox = env.create_mpmc_mbox();
    let producer_inbox = env.create_mpmc_mbox();

    let consumed = Arc::new(AtomicU32::new(0));
    let rejected = Arc::new(AtomicU32::new(0));

    let builder = CoopBuilder::new("limit-transform-pipeline")
        .add_agent(AgentSpec::new(
            Validator { raw_inbox: raw_inbox.clone(), consumer_inbox: consumer_inbox.clone() },
            "default",
        ))
        .add_agent(AgentSpec::new(
            Consumer {
                consumer_inbox: consumer_inbox.clone(),
                processing,
                consumed: consumed.clone(),
                limit: cli.limit,
                rejection_target: producer_inbox.id(),
            },
            "active_obj",
        ))
        .add_agent(AgentSpec::new(
            RejectedObserver { producer_inbox: producer_inbox.clone(), rejected: rejected.clone() },
            "default",
        ));

    let handle = env.register_coop(builder).expect("coop registration must succeed");
    tracing::info!(coop = handle.id(), "limit-transform-pipeline running");

    for id in 0..cli.readings {
        let fahrenheit = 60.0 + f64::from(id % 10);
        let _ = send(&raw_inbox, Raw { id, fahrenheit });
    }

    let expected_total = u64::from(cli.readings);
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    while u64::from(consumed.load(Ordering::Acquire)) + u64::from(rejected.load(Ordering::Acquire)) < expected_total
        && std::time::Instant::now() < deadline
    {
        std::thread::sleep(Duration::from_millis(5));
    }

    let consumed_count = consumed.load(Ordering::Acquire);
    let rejected_count = rejected.load(Ordering::Acquire);
    println!("consumed={consumed_count} rejected={rejected_count} produced={}", cli.readings);

    assert_eq!(u64::from(consumed_count) + u64::from(rejected_count), expected_total);
    assert!(rejected_count > 0, "producer must outrun the consumer's limit at least once");
}
