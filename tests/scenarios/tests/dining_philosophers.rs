// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario 2: an arbiter grants forks to philosophers such that no two
//! adjacent philosophers ever eat at once, and every philosopher eventually
//! gets to eat (spec §8 scenario 2 — no starvation, no deadlock).

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sobjectizer::agent::{AgentLogic, DefineCtx, EvtCtx};
use sobjectizer::env::{AgentSpec, CoopBuilder, EnvParams, Environment};
use sobjectizer::mbox::MboxRef;
use sobjectizer::{send, send_signal, Result, Signal};

struct StartEatingRequest(usize);
struct StartEating;
impl Signal for StartEating {}
struct EatingFinished(usize);
struct StartThinking;
impl Signal for StartThinking {}

#[derive(Clone, Copy, Default)]
struct ForkState {
    in_use: bool,
    someone_waiting: bool,
}

struct ArbiterState {
    forks: Vec<ForkState>,
    philosopher_inboxes: Vec<MboxRef>,
    eat_counts: Arc<Vec<AtomicU32>>,
    invariant_ok: Arc<AtomicBool>,
}

impl ArbiterState {
    fn left(&self, i: usize) -> usize {
        if i == 0 {
            self.forks.len() - 1
        } else {
            i - 1
        }
    }

    fn right(&self, i: usize) -> usize {
        (i + 1) % self.forks.len()
    }

    fn try_allow_to_eat(&mut self, philosopher: usize) {
        let left = self.left(philosopher);
        if self.forks[left].in_use {
            self.forks[left].someone_waiting = true;
            return;
        }
        self.forks[left].in_use = true;

        let right = self.right(philosopher);
        if self.forks[right].in_use {
            self.forks[right].someone_waiting = true;
            return;
        }
        self.forks[right].in_use = true;
        self.enable_eating(philosopher);
    }

    fn enable_eating(&self, philosopher: usize) {
        if self.forks.len() > 1 {
            let left_neighbor = self.left(philosopher);
            let left_neighbor_pair = self.left(left_neighbor);
            let right_neighbor = self.right(philosopher);
            let right_neighbor_pair = self.right(right_neighbor);
            let left_eating = self.forks[left_neighbor].in_use && self.forks[left_neighbor_pair].in_use;
            let right_eating = self.forks[right_neighbor].in_use && self.forks[right_neighbor_pair].in_use;
            if left_eating || right_eating {
                self.invariant_ok.store(false, Ordering::Release);
            }
        }
        self.eat_counts[philosopher].fetch_add(1, Ordering::AcqRel);
        let _ = send_signal::<StartEating>(&self.philosopher_inboxes[philosopher]);
    }

    fn eating_finished(&mut self, philosopher: usize) {
        let left = self.left(philosopher);
        self.forks[left].in_use = false;
        if self.forks[left].someone_waiting {
            self.forks[left].someone_waiting = false;
            self.forks[left].in_use = true;
            self.try_allow_to_eat(self.left(left));
        }

        let right = self.right(philosopher);
        self.forks[right].in_use = false;
        if self.forks[right].someone_waiting {
            self.forks[right].someone_waiting = false;
            self.try_allow_to_eat(right);
        }
    }
}

struct ArbiterAgent {
    inbox: MboxRef,
    state: Arc<parking_lot::Mutex<ArbiterState>>,
}

impl AgentLogic for ArbiterAgent {
    fn define_agent(&mut self, ctx: &mut DefineCtx<'_>) -> Result<()> {
        let state = self.state.clone();
        ctx.subscribe::<StartEatingRequest, _>(&self.inbox, 0, move |_ctx, req: &StartEatingRequest| {
            state.lock().try_allow_to_eat(req.0);
        })?;
        let state = self.state.clone();
        ctx.subscribe::<EatingFinished, _>(&self.inbox, 0, move |_ctx, evt: &EatingFinished| {
            state.lock().eating_finished(evt.0);
        })
    }
}

struct Philosopher {
    index: usize,
    own_inbox: MboxRef,
    arbiter_inbox: MboxRef,
}

impl AgentLogic for Philosopher {
    fn define_agent(&mut self, ctx: &mut DefineCtx<'_>) -> Result<()> {
        let index = self.index;
        let arbiter_inbox = self.arbiter_inbox.clone();
        ctx.subscribe::<StartThinking, _>(&self.own_inbox, 0, move |_ctx, _| {
            let _ = send(&arbiter_inbox, StartEatingRequest(index));
        })?;
        let arbiter_inbox = self.arbiter_inbox.clone();
        let own_inbox = self.own_inbox.clone();
        ctx.subscribe::<StartEating, _>(&self.own_inbox, 0, move |_ctx, _| {
            let _ = send(&arbiter_inbox, EatingFinished(index));
            let _ = send_signal::<StartThinking>(&own_inbox);
        })
    }

    fn evt_start(&mut self, _ctx: &mut EvtCtx<'_>) {
        let _ = send(&self.arbiter_inbox, StartEatingRequest(self.index));
    }
}

#[test]
fn no_adjacent_pair_eats_simultaneously_and_nobody_starves() -> Result<()> {
    let philosophers = 5usize;
    let env = Environment::new(EnvParams::new());

    let arbiter_inbox = env.create_mpmc_mbox();
    let philosopher_inboxes: Vec<MboxRef> = (0..philosophers).map(|_| env.create_mpmc_mbox()).collect();
    let eat_counts: Arc<Vec<AtomicU32>> = Arc::new((0..philosophers).map(|_| AtomicU32::new(0)).collect());
    let invariant_ok = Arc::new(AtomicBool::new(true));

    let arbiter_state = Arc::new(parking_lot::Mutex::new(ArbiterState {
        forks: vec![ForkState::default(); philosophers],
        philosopher_inboxes: philosopher_inboxes.clone(),
        eat_counts: eat_counts.clone(),
        invariant_ok: invariant_ok.clone(),
    }));

    let arbiter = AgentSpec::new(ArbiterAgent { inbox: arbiter_inbox.clone(), state: arbiter_state }, "default");
    let mut builder = CoopBuilder::new("dining-philosophers-test").add_agent(arbiter);
    for (index, inbox) in philosopher_inboxes.iter().enumerate() {
        builder = builder.add_agent(AgentSpec::new(
            Philosopher { index, own_inbox: inbox.clone(), arbiter_inbox: arbiter_inbox.clone() },
            "default",
        ));
    }

    env.register_coop(builder)?;
    std::thread::sleep(Duration::from_millis(400));

    assert!(invariant_ok.load(Ordering::Acquire), "adjacency invariant violated");
    for (i, count) in eat_counts.iter().enumerate() {
        assert!(count.load(Ordering::Acquire) > 0, "philosopher {i} never got to eat");
    }
    Ok(())
}
