// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario 4, reduced to its transition primitives: `transfer_to_state`
//! (unconditional, no handler), `suppress` (declared and silently ignored),
//! and an explicit handler calling `change_state`, composed over a small
//! three-state machine (`idle` -> `armed` -> `unlocked`) rather than the
//! full intercom panel — the full panel is exercised end to end by the
//! `intercom_statechart` demo (spec §8 scenario 4; spec §4.4).

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sobjectizer::agent::{AgentLogic, DefineCtx};
use sobjectizer::env::{AgentSpec, CoopBuilder, EnvParams, Environment};
use sobjectizer::mbox::MboxRef;
use sobjectizer::{send_signal, MessageType, Result, Signal, SoError, SoErrorKind};
use sobjectizer_scenarios::{wait_until, SHORT};

struct Arm;
impl Signal for Arm {}
struct Disarm;
impl Signal for Disarm {}
struct Unlock;
impl Signal for Unlock {}

struct Lock {
    inbox: MboxRef,
    observed: Arc<Mutex<&'static str>>,
}

impl AgentLogic for Lock {
    fn define_agent(&mut self, ctx: &mut DefineCtx<'_>) -> Result<()> {
        let idle = ctx.add_state("idle");
        let armed = ctx.add_state("armed");
        let unlocked = ctx.add_state("unlocked");
        ctx.set_initial_state(idle);

        for (id, name) in [(idle, "idle"), (armed, "armed"), (unlocked, "unlocked")] {
            let observed = self.observed.clone();
            ctx.set_on_enter(id, Box::new(move || *observed.lock() = name));
        }

        // Unconditional, handler-less transition.
        ctx.transfer_to_state(idle, MessageType::of::<Arm>(), armed);
        // Declared but deliberately inert in `idle` — arming twice is a no-op.
        ctx.suppress::<Arm>(&self.inbox, idle)?;
        ctx.suppress::<Disarm>(&self.inbox, idle)?;

        ctx.just_switch_to::<Disarm>(&self.inbox, armed, idle)?;
        ctx.subscribe::<Unlock, _>(&self.inbox, armed, move |ctx, _| {
            let _ = ctx.change_state(unlocked);
        })?;

        ctx.just_switch_to::<Disarm>(&self.inbox, unlocked, idle)?;
        ctx.suppress::<Arm>(&self.inbox, unlocked)?;
        ctx.suppress::<Unlock>(&self.inbox, unlocked)?;

        Ok(())
    }
}

fn run_sequence(signals: &[&str]) -> Result<&'static str> {
    let env = Environment::new(EnvParams::new());
    let inbox = env.create_mpmc_mbox();
    let observed = Arc::new(Mutex::new("unset"));

    env.register_coop(
        CoopBuilder::new("lock-test")
            .add_agent(AgentSpec::new(Lock { inbox: inbox.clone(), observed: observed.clone() }, "default")),
    )?;

    assert!(wait_until(SHORT, || *observed.lock() == "idle"));

    for signal in signals {
        match *signal {
            "arm" => {
                let _ = send_signal::<Arm>(&inbox);
            }
            "disarm" => {
                let _ = send_signal::<Disarm>(&inbox);
            }
            "unlock" => {
                let _ = send_signal::<Unlock>(&inbox);
            }
            other => return Err(SoError::new(SoErrorKind::Internal, format!("unknown signal in test table: {other}"))),
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    Ok(*observed.lock())
}

#[yare::parameterized(
    arm_only = { &["arm"], "armed" },
    arm_then_disarm = { &["arm", "disarm"], "idle" },
    arm_then_unlock = { &["arm", "unlock"], "unlocked" },
    unlock_without_arming_is_suppressed = { &["unlock"], "idle" },
    double_arm_is_a_no_op = { &["arm", "arm", "unlock"], "unlocked" },
    full_cycle_back_to_idle = { &["arm", "unlock", "disarm"], "idle" },
    unlocked_ignores_arm_and_unlock = { &["arm", "unlock", "arm", "unlock", "disarm"], "idle" },
)]
fn transition_table(signals: &[&str], expected_final_state: &str) -> Result<()> {
    assert_eq!(run_sequence(signals)?, expected_final_state);
    Ok(())
}
