// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenario 5 (spec §8): requests land in one of eight
//! priority-keyed queues; a scheduler hands each free processor agent the
//! next request at its own priority, or — if that queue is empty — steals
//! from the next lower priority, descending at most
//! [`MAX_STEAL_DEPTH`] levels. Grounded on `prio_work_stealing/main.cpp`'s
//! `request_acceptor`/`request_scheduler`/processor trio: the acceptor and
//! scheduler run on a `prio_one_thread::strictly_ordered` dispatcher, the
//! eight processors each get their own thread via
//! `prio_dedicated_threads::one_per_prio`.
//!
//! `main` drives a hand-crafted timeline rather than the original's random
//! request generator, so the steal it exercises (processor `p3` idle,
//! `p3`'s own queue empty, `p2`'s queue not) is deterministic instead of
//! depending on a random dimension distribution.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use parking_lot::Mutex;
use sobjectizer::agent::{AgentLogic, DefineCtx};
use sobjectizer::dispatch::Priority;
use sobjectizer::env::{AgentSpec, CoopBuilder, EnvParams, Environment};
use sobjectizer::mbox::MboxRef;
use sobjectizer::{send, Result};

/// How many priority levels down a free processor is willing to look for
/// stolen work before giving up (spec §8 scenario 5: "search depth is
/// bounded at 5").
const MAX_STEAL_DEPTH: u8 = 5;

#[derive(Parser)]
struct Cli {
    /// Simulated processing time for one request, in milliseconds.
    #[arg(long, default_value_t = 60)]
    processing_ms: u64,
}

struct NewRequest {
    id: u32,
    dimension: u32,
}

struct GenerationRequest {
    id: u32,
    dimension: u32,
    queue_prio: Priority,
}

struct GenerationResult {
    id: u32,
    queue_prio: Priority,
    processor_prio: Priority,
}

struct ProcessorCanBeLoaded {
    priority: Priority,
}

struct AskForWork {
    priority: Priority,
}

/// Maps a request's `dimension` (0..=max_dimension) onto a priority level,
/// the same proportional-bucketing the original uses — bigger images are
/// lower priority.
fn queue_prio_for(dimension: u32) -> Priority {
    const MAX_DIMENSION: u32 = 10_000;
    let step = f64::from(MAX_DIMENSION + 1) / f64::from(Priority::LEVELS as u32);
    let bucket = (f64::from(dimension) / step) as u32;
    Priority((Priority::MAX.0).saturating_sub(bucket.min(Priority::MAX.0.into()) as u8))
}

struct QueuedRequest {
    id: u32,
    dimension: u32,
    queue_prio: Priority,
}

struct ProcessorSlot {
    mbox: Option<MboxRef>,
    queue: VecDeque<QueuedRequest>,
    free: bool,
}

impl Default for ProcessorSlot {
    fn default() -> Self {
        Self { mbox: None, queue: VecDeque::new(), free: true }
    }
}

struct SchedulingData {
    processors: Vec<ProcessorSlot>,
}

impl SchedulingData {
    fn new() -> Self {
        Self { processors: (0..Priority::LEVELS).map(|_| ProcessorSlot::default()).collect() }
    }

    /// Descends from `free_priority` looking for pending work, stopping
    /// after [`MAX_STEAL_DEPTH`] hops or the bottom of the ladder, whichever
    /// comes first.
    fn try_schedule_work_to(&mut self, free_priority: Priority) {
        let mut probe = free_priority;
        let mut depth = 0u8;
        loop {
            if let Some(req) = self.processors[probe.index()].queue.pop_front() {
                if let Some(mbox) = self.processors[free_priority.index()].mbox.clone() {
                    let _ = send(&mbox, GenerationRequest { id: req.id, dimension: req.dimension, queue_prio: req.queue_prio });
                }
                self.processors[free_priority.index()].free = false;
                return;
            }
            if probe.0 == 0 || depth >= MAX_STEAL_DEPTH {
                return;
            }
            probe = Priority(probe.0 - 1);
            depth += 1;
        }
    }
}

struct RequestAcceptor {
    interaction: MboxRef,
    data: Arc<Mutex<SchedulingData>>,
}

impl AgentLogic for RequestAcceptor {
    fn define_agent(&mut self, ctx: &mut DefineCtx<'_>) -> Result<()> {
        let data = self.data.clone();
        let interaction = self.interaction.clone();
        ctx.subscribe::<NewRequest, _>(&self.interaction, 0, move |_ctx, req: &NewRequest| {
            let prio = queue_prio_for(req.dimension);
            let mut guard = data.lock();
            let slot = &mut guard.processors[prio.index()];
            let should_notify = slot.queue.is_empty() && slot.free;
            slot.queue.push_back(QueuedRequest { id: req.id, dimension: req.dimension, queue_prio: prio });
            drop(guard);
            if should_notify {
                let _ = send(&interaction, ProcessorCanBeLoaded { priority: prio });
            }
        })
    }
}

struct RequestScheduler {
    interaction: MboxRef,
    data: Arc<Mutex<SchedulingData>>,
}

impl AgentLogic for RequestScheduler {
    fn define_agent(&mut self, ctx: &mut DefineCtx<'_>) -> Result<()> {
        let data = self.data.clone();
        ctx.subscribe::<ProcessorCanBeLoaded, _>(&self.interaction, 0, move |_ctx, evt: &ProcessorCanBeLoaded| {
            let mut guard = data.lock();
            if guard.processors[evt.priority.index()].free {
                guard.try_schedule_work_to(evt.priority);
            }
        })?;
        let data = self.data.clone();
        ctx.subscribe::<AskForWork, _>(&self.interaction, 0, move |_ctx, evt: &AskForWork| {
            let mut guard = data.lock();
            guard.processors[evt.priority.index()].free = true;
            guard.try_schedule_work_to(evt.priority);
        })
    }
}

struct Processor {
    priority: Priority,
    interaction: MboxRef,
    data: Arc<Mutex<SchedulingData>>,
    processing: Duration,
    results: Arc<Mutex<Vec<(u32, Priority, Priority)>>>,
}

impl AgentLogic for Processor {
    fn define_agent(&mut self, ctx: &mut DefineCtx<'_>) -> Result<()> {
        let own_mbox = ctx.direct_mbox().clone();
        self.data.lock().processors[self.priority.index()].mbox = Some(own_mbox.clone());

        let priority = self.priority;
        let interaction = self.interaction.clone();
        let processing = self.processing;
        let results = self.results.clone();
        ctx.subscribe::<GenerationRequest, _>(&own_mbox, 0, move |_ctx, req: &GenerationRequest| {
            std::thread::sleep(processing);
            results.lock().push((req.id, req.queue_prio, priority));
            let _ = send(&interaction, GenerationResult { id: req.id, queue_prio: req.queue_prio, processor_prio: priority });
            let _ = send(&interaction, AskForWork { priority });
        })
    }
}

struct ResultObserver {
    interaction: MboxRef,
}

impl AgentLogic for ResultObserver {
    fn define_agent(&mut self, ctx: &mut DefineCtx<'_>) -> Result<()> {
        ctx.subscribe::<GenerationResult, _>(&self.interaction, 0, move |_ctx, evt: &GenerationResult| {
            tracing::info!(id = evt.id, queue_prio = evt.queue_prio.0, processor_prio = evt.processor_prio.0, "generation result");
        })
    }
}

#[allow(clippy::expect_used)]
fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let cli = Cli::parse();
    let processing = Duration::from_millis(cli.processing_ms);

    let env = Environment::new(EnvParams::new());
    let interaction = env.create_mpmc_mbox();
    let data = Arc::new(Mutex::new(SchedulingData::new()));
    let results = Arc::new(Mutex::new(Vec::new()));

    let mut builder = CoopBuilder::new("prio-work-stealing")
        .add_agent(AgentSpec::new(RequestAcceptor { interaction: interaction.clone(), data: data.clone() }, "prio_strict").priority(Priority(0)))
        .add_agent(AgentSpec::new(RequestScheduler { interaction: interaction.clone(), data: data.clone() }, "prio_strict").priority(Priority(1)))
        .add_agent(AgentSpec::new(ResultObserver { interaction: interaction.clone() }, "default"));
    for level in 0..Priority::LEVELS as u8 {
        builder = builder.add_agent(
            AgentSpec::new(
                Processor {
                    priority: Priority(level),
                    interaction: interaction.clone(),
                    data: data.clone(),
                    processing,
                    results: results.clone(),
                },
                "prio_dedicated",
            )
            .priority(Priority(level)),
        );
    }

    let handle = env.register_coop(builder).expect("coop registration must succeed");
    tracing::info!(coop = handle.id(), "prio-work-stealing running");

    // Dimension 7000 lands every request at queue priority p2 (see
    // `queue_prio_for`). The first request is scheduled to the p2 processor
    // immediately; the second arrives while that processor is still busy, so
    // it sits queued at p2.
    let _ = send(&interaction, NewRequest { id: 1, dimension: 7000 });
    std::thread::sleep(processing / 3);
    let _ = send(&interaction, NewRequest { id: 2, dimension: 7000 });
    std::thread::sleep(processing / 3);

    // Simulate processor p3 going idle and asking for work of its own: its
    // queue is empty, so the scheduler steals the pending p2 request.
    let _ = send(&interaction, AskForWork { priority: Priority(3) });

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while results.lock().len() < 2 && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }

    let recorded = results.lock().clone();
    println!("results: {:?}", recorded.iter().map(|(id, qp, pp)| (*id, qp.0, pp.0)).collect::<Vec<_>>());

    let stolen = recorded.iter().find(|(id, _, _)| *id == 2).expect("request 2 must have been processed");
    assert_eq!(stolen.1, Priority(2), "stolen request keeps its original queue priority");
    assert_eq!(stolen.2, Priority(3), "request 2 must be processed by the p3 processor that stole it");
}
