// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenario 4 (spec §8): a single `Controller` agent drives a
//! hierarchical statechart mirroring an intercom panel — digit entry,
//! apartment dialling with a no-answer timeout, and a service-code unlock
//! path that holds the door open for a fixed window. Grounded on
//! `intercom_statechart/main.cpp`'s `controller` agent, reduced to the parts
//! that exercise `transfer_to_state`, `suppress`, `just_switch_to`, and
//! timed self-signals (the cosmetic `keyboard_lights`/`display`/`ringer`
//! agents are not ported — they only print, they never gate a transition).

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use parking_lot::Mutex;
use sobjectizer::agent::{AgentLogic, DefineCtx, EvtCtx};
use sobjectizer::env::{AgentSpec, CoopBuilder, EnvParams, Environment};
use sobjectizer::mbox::MboxRef;
use sobjectizer::timer::TimerHandle;
use sobjectizer::{send, send_signal, Result, Signal};

#[derive(Parser)]
struct Cli {
    #[arg(long, default_value_t = 300)]
    dial_timeout_ms: u64,
    #[arg(long, default_value_t = 150)]
    no_answer_timeout_ms: u64,
    #[arg(long, default_value_t = 200)]
    door_timeout_ms: u64,
}

struct KeyDigit(char);
struct KeyBell;
impl Signal for KeyBell {}
struct KeyGrid;
impl Signal for KeyGrid {}
struct KeyCancel;
impl Signal for KeyCancel {}
struct Deactivate;
impl Signal for Deactivate {}
/// Fires for whichever of `dial_apartment`/`no_answer`/`door_unlocked` is
/// current — the subscription key is `(mbox, msg_type, state)`, so one
/// signal type safely serves all three without cross-firing.
struct Timeout;
impl Signal for Timeout {}

const ACTUAL_SERVICE_CODE: &str = "12345";

struct Controller {
    env: Arc<Environment>,
    inbox: MboxRef,
    apartments: Vec<(&'static str, &'static str)>,
    dial_timeout: Duration,
    no_answer_timeout: Duration,
    door_timeout: Duration,
    observed_state: Arc<Mutex<&'static str>>,
}

impl AgentLogic for Controller {
    fn define_agent(&mut self, ctx: &mut DefineCtx<'_>) -> Result<()> {
        let inactive = ctx.add_state("inactive");
        let active = ctx.add_state("active");
        let wait_activity = ctx.add_nested_state("wait_activity", active)?;
        let number_selection = ctx.add_nested_state("number_selection", active)?;
        let dialling = ctx.add_nested_state("dialling", active)?;
        let dial_apartment = ctx.add_nested_state("dial_apartment", dialling)?;
        let no_answer = ctx.add_nested_state("no_answer", dialling)?;
        let service_code_selection = ctx.add_nested_state("service_code_selection", active)?;
        let door_unlocked = ctx.add_nested_state("door_unlocked", active)?;
        ctx.set_initial_state(inactive);

        let named_states: &[(usize, &'static str)] = &[
            (inactive, "inactive"),
            (active, "active"),
            (wait_activity, "wait_activity"),
            (number_selection, "number_selection"),
            (dialling, "dialling"),
            (dial_apartment, "dial_apartment"),
            (no_answer, "no_answer"),
            (service_code_selection, "service_code_selection"),
            (door_unlocked, "door_unlocked"),
        ];
        for &(id, name) in named_states {
            let observed = self.observed_state.clone();
            ctx.set_on_enter(id, Box::new(move || *observed.lock() = name));
        }

        ctx.transfer_to_state(inactive, sobjectizer::MessageType::of::<KeyDigit>(), wait_activity);
        ctx.transfer_to_state(inactive, sobjectizer::MessageType::of::<KeyBell>(), wait_activity);
        ctx.transfer_to_state(inactive, sobjectizer::MessageType::of::<KeyGrid>(), wait_activity);
        ctx.transfer_to_state(inactive, sobjectizer::MessageType::of::<KeyCancel>(), wait_activity);
        ctx.transfer_to_state(wait_activity, sobjectizer::MessageType::of::<KeyDigit>(), number_selection);

        ctx.subscribe::<KeyCancel, _>(&self.inbox, active, move |ctx, _| {
            let _ = ctx.change_state(wait_activity);
        })?;
        ctx.subscribe::<KeyGrid, _>(&self.inbox, active, move |ctx, _| {
            let _ = ctx.change_state(service_code_selection);
        })?;
        ctx.just_switch_to::<Deactivate>(&self.inbox, active, inactive)?;

        let apartment_number = Arc::new(Mutex::new(String::new()));
        let apartments = self.apartments.clone();

        let accumulator = apartment_number.clone();
        ctx.set_on_enter(number_selection, Box::new(move || accumulator.lock().clear()));
        let accumulator = apartment_number.clone();
        ctx.subscribe::<KeyDigit, _>(&self.inbox, number_selection, move |_ctx, digit: &KeyDigit| {
            let mut number = accumulator.lock();
            if number.len() < 3 {
                number.push(digit.0);
            }
            tracing::info!(apartment_number = %number, "display");
        })?;
        let accumulator = apartment_number.clone();
        ctx.subscribe::<KeyBell, _>(&self.inbox, number_selection, move |ctx, _| {
            let number = accumulator.lock().clone();
            if apartments.iter().any(|(n, _)| *n == number) {
                let _ = ctx.change_state(dial_apartment);
            } else {
                tracing::info!("display: Err");
                let _ = ctx.change_state(wait_activity);
            }
        })?;
        ctx.suppress::<KeyGrid>(&self.inbox, number_selection)?;

        ctx.suppress::<KeyGrid>(&self.inbox, dialling)?;
        ctx.suppress::<KeyBell>(&self.inbox, dialling)?;
        ctx.suppress::<KeyDigit>(&self.inbox, dialling)?;

        let pending_timer: Arc<Mutex<Option<TimerHandle>>> = Arc::new(Mutex::new(None));

        let env = self.env.clone();
        let inbox = self.inbox.clone();
        let timer_slot = pending_timer.clone();
        let accumulator = apartment_number.clone();
        let dial_timeout = self.dial_timeout;
        ctx.set_on_enter(dial_apartment, Box::new(move || {
            tracing::info!(apartment = %accumulator.lock(), "ringing");
            if let Ok(handle) = sobjectizer::send_delayed::<Timeout>(&env, &inbox, Timeout, dial_timeout) {
                *timer_slot.lock() = Some(handle);
            }
        }));
        ctx.subscribe::<Timeout, _>(&self.inbox, dial_apartment, move |ctx, _| {
            let _ = ctx.change_state(no_answer);
        })?;

        let env = self.env.clone();
        let inbox = self.inbox.clone();
        let timer_slot = pending_timer.clone();
        let no_answer_timeout = self.no_answer_timeout;
        ctx.set_on_enter(no_answer, Box::new(move || {
            tracing::info!("display: No Answer");
            if let Ok(handle) = sobjectizer::send_delayed::<Timeout>(&env, &inbox, Timeout, no_answer_timeout) {
                *timer_slot.lock() = Some(handle);
            }
        }));
        ctx.subscribe::<Timeout, _>(&self.inbox, no_answer, move |ctx, _| {
            let _ = ctx.change_state(wait_activity);
        })?;
        ctx.suppress::<KeyCancel>(&self.inbox, no_answer)?;

        let service_code = Arc::new(Mutex::new(String::new()));
        let accumulator = service_code.clone();
        ctx.set_on_enter(service_code_selection, Box::new(move || accumulator.lock().clear()));
        let accumulator = service_code.clone();
        ctx.subscribe::<KeyDigit, _>(&self.inbox, service_code_selection, move |_ctx, digit: &KeyDigit| {
            let mut code = accumulator.lock();
            if code.len() < 5 {
                code.push(digit.0);
            }
            tracing::info!(masked = "#".repeat(code.len()), "display");
        })?;
        let accumulator = service_code.clone();
        ctx.subscribe::<KeyGrid, _>(&self.inbox, service_code_selection, move |ctx, _| {
            let code = accumulator.lock().clone();
            if !code.is_empty() {
                if code == ACTUAL_SERVICE_CODE {
                    let _ = ctx.change_state(door_unlocked);
                } else {
                    tracing::info!("display: Err");
                    let _ = ctx.change_state(wait_activity);
                }
            }
        })?;

        let env = self.env.clone();
        let inbox = self.inbox.clone();
        let timer_slot = pending_timer.clone();
        let door_timeout = self.door_timeout;
        ctx.set_on_enter(door_unlocked, Box::new(move || {
            tracing::info!("display: unlocked");
            if let Ok(handle) = sobjectizer::send_delayed::<Timeout>(&env, &inbox, Timeout, door_timeout) {
                *timer_slot.lock() = Some(handle);
            }
        }));
        ctx.subscribe::<Timeout, _>(&self.inbox, door_unlocked, move |ctx, _| {
            let _ = ctx.change_state(wait_activity);
        })?;
        ctx.suppress::<KeyGrid>(&self.inbox, door_unlocked)?;
        ctx.suppress::<KeyBell>(&self.inbox, door_unlocked)?;
        ctx.suppress::<KeyDigit>(&self.inbox, door_unlocked)?;
        ctx.suppress::<KeyCancel>(&self.inbox, door_unlocked)?;

        Ok(())
    }

    fn evt_start(&mut self, _ctx: &mut EvtCtx<'_>) {
        *self.observed_state.lock() = "inactive";
    }
}

#[allow(clippy::expect_used)]
fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let cli = Cli::parse();

    let env = Environment::new(EnvParams::new());
    let inbox = env.create_mpmc_mbox();
    let observed_state = Arc::new(Mutex::new("default"));

    let controller = Controller {
        env: env.clone(),
        inbox: inbox.clone(),
        apartments: vec![("101", "1011"), ("102", "1022")],
        dial_timeout: Duration::from_millis(cli.dial_timeout_ms),
        no_answer_timeout: Duration::from_millis(cli.no_answer_timeout_ms),
        door_timeout: Duration::from_millis(cli.door_timeout_ms),
        observed_state: observed_state.clone(),
    };

    let handle = env
        .register_coop(CoopBuilder::new("intercom").add_agent(AgentSpec::new(controller, "default")))
        .expect("coop registration must succeed");
    tracing::info!(coop = handle.id(), "intercom running");

    let settle = Duration::from_millis(40);

    for digit in ['1', '0', '1'] {
        let _ = send(&inbox, KeyDigit(digit));
        std::thread::sleep(settle);
    }
    let _ = send_signal::<KeyBell>(&inbox);
    std::thread::sleep(settle);
    assert_eq!(*observed_state.lock(), "dial_apartment");

    std::thread::sleep(Duration::from_millis(cli.dial_timeout_ms) + settle);
    assert_eq!(*observed_state.lock(), "no_answer");

    std::thread::sleep(Duration::from_millis(cli.no_answer_timeout_ms) + settle);
    assert_eq!(*observed_state.lock(), "wait_activity");

    let _ = send_signal::<KeyGrid>(&inbox);
    std::thread::sleep(settle);
    for digit in ACTUAL_SERVICE_CODE.chars() {
        let _ = send(&inbox, KeyDigit(digit));
        std::thread::sleep(settle);
    }
    let _ = send_signal::<KeyGrid>(&inbox);
    std::thread::sleep(settle);
    assert_eq!(*observed_state.lock(), "door_unlocked");

    std::thread::sleep(Duration::from_millis(cli.door_timeout_ms) + settle);
    assert_eq!(*observed_state.lock(), "wait_activity");

    let _ = send_signal::<Deactivate>(&inbox);
    std::thread::sleep(settle);
    assert_eq!(*observed_state.lock(), "inactive");

    println!("intercom demo finished in state {}", observed_state.lock());
}
