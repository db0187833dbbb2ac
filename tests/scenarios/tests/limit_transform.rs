// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario 3: once a mbox's message limit for a type is reached, the
//! configured `Transform` reaction fires instead of a silent drop — and
//! every message is accounted for as either consumed or rejected, never
//! both and never neither (spec §8 scenario 3; spec §4.3).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sobjectizer::agent::{AgentLogic, DefineCtx};
use sobjectizer::env::{AgentSpec, CoopBuilder, EnvParams, Environment};
use sobjectizer::limit::{MessageLimit, OverlimitReaction};
use sobjectizer::mbox::{MboxId, MboxRef};
use sobjectizer::message::{MessageInstance, MessageRef, MessageType, Mutability};
use sobjectizer::{send, Result};
use sobjectizer_scenarios::{wait_until, SHORT};

struct Accepted {
    id: u32,
}
struct Rejected {
    id: u32,
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
            MessageType::of::<Accepted>(),
            MessageLimit::new(
                self.limit,
                OverlimitReaction::Transform(Arc::new(move |msg: &MessageRef| {
                    let accepted: &Accepted = msg.downcast()?;
                    let rejected = MessageInstance::new_message(Rejected { id: accepted.id }, Mutability::Immutable);
                    Some((rejection_target, Arc::new(rejected)))
                })),
            ),
        );

        let processing = self.processing;
        let consumed = self.consumed.clone();
        ctx.subscribe::<Accepted, _>(&self.consumer_inbox, 0, move |_ctx, _msg: &Accepted| {
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

#[test]
fn overlimit_transform_accounts_for_every_message() -> Result<()> {
    let total = 30u32;
    let limit = 2usize;
    let env = Environment::new(EnvParams::new());

    let consumer_inbox = env.create_mpmc_mbox();
    let producer_inbox = env.create_mpmc_mbox();

    let consumed = Arc::new(AtomicU32::new(0));
    let rejected = Arc::new(AtomicU32::new(0));

    let builder = CoopBuilder::new("limit-transform-test")
        .add_agent(AgentSpec::new(
            Consumer {
                consumer_inbox: consumer_inbox.clone(),
                processing: Duration::from_millis(10),
                consumed: consumed.clone(),
                limit,
                rejection_target: producer_inbox.id(),
            },
            "active_obj",
        ))
        .add_agent(AgentSpec::new(RejectedObserver { producer_inbox: producer_inbox.clone(), rejected: rejected.clone() }, "default"));

    env.register_coop(builder)?;

    for id in 0..total {
        let _ = send(&consumer_inbox, Accepted { id });
    }

    assert!(
        wait_until(SHORT, || u64::from(consumed.load(Ordering::Acquire)) + u64::from(rejected.load(Ordering::Acquire))
            == u64::from(total)),
        "not every message was accounted for as consumed or rejected"
    );
    assert!(rejected.load(Ordering::Acquire) > 0, "a burst larger than the limit must trigger at least one transform");
    Ok(())
}

#[test]
fn below_limit_nothing_is_rejected() -> Result<()> {
    let env = Environment::new(EnvParams::new());
    let consumer_inbox = env.create_mpmc_mbox();
    let producer_inbox = env.create_mpmc_mbox();

    let consumed = Arc::new(AtomicU32::new(0));
    let rejected = Arc::new(AtomicU32::new(0));
    let builder = CoopBuilder::new("limit-transform-below")
        .add_agent(AgentSpec::new(
            Consumer {
                consumer_inbox: consumer_inbox.clone(),
                processing: Duration::from_millis(1),
                consumed: consumed.clone(),
                limit: 100,
                rejection_target: producer_inbox.id(),
            },
            "default",
        ))
        .add_agent(AgentSpec::new(RejectedObserver { producer_inbox, rejected: rejected.clone() }, "default"));
    env.register_coop(builder)?;

    for id in 0..5 {
        let _ = send(&consumer_inbox, Accepted { id });
    }

    assert!(wait_until(SHORT, || consumed.load(Ordering::Acquire) == 5));
    assert_eq!(rejected.load(Ordering::Acquire), 0);
    Ok(())
}
