//! Cycle driver for `citybot run`.
//!
//! One cycle is: detect, let the state machine react, fall back to the task
//! manager when the machine took no action, persist the ledger, sleep. The
//! same shape drives the tutorial loop, which only ever runs the tutorial
//! behaviour and stops as soon as the ledger records completion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::device::Device;
use crate::io::ledger_store::LedgerStore;
use crate::machine::{GameStateMachine, ViewState};
use crate::tasks::TaskManager;

/// Granularity at which sleeps notice a shutdown request.
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Who acted during a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleAction {
    Idle,
    StateMachine,
    Task,
}

/// Per-cycle summary handed to the caller's observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// 1-based.
    pub cycle: u64,
    pub state: ViewState,
    pub action: CycleAction,
    pub detections: usize,
}

/// Reason why [`run_cycles`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStop {
    /// The configured number of cycles ran.
    MaxCycles,
    /// The shutdown flag was raised.
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    pub cycles_run: u64,
    pub actions: u64,
    pub stop: CycleStop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleOptions {
    /// `0` runs until shutdown.
    pub max_cycles: u64,
    pub refresh_interval: Duration,
}

/// React to one screen: state machine first, tasks only if it stayed idle.
pub fn run_cycle(
    machine: &mut GameStateMachine,
    tasks: &mut TaskManager,
    device: &Device<'_>,
    now: DateTime<Utc>,
) -> CycleAction {
    let detections = device.detect();
    if machine.update(device, detections) {
        return CycleAction::StateMachine;
    }
    let mut ctx = machine.task_context(device, now);
    if tasks.execute_highest_priority_task(&mut ctx) {
        CycleAction::Task
    } else {
        CycleAction::Idle
    }
}

/// Run cycles until `options.max_cycles` is reached or `shutdown` is set.
///
/// The ledger is saved after every cycle (failures are logged) and once more
/// on the way out (failures are returned).
#[instrument(skip_all, fields(instance = %machine.ledger().id, device = %device.id()))]
pub fn run_cycles<F: FnMut(&CycleReport)>(
    machine: &mut GameStateMachine,
    tasks: &mut TaskManager,
    device: &Device<'_>,
    store: &LedgerStore,
    options: &CycleOptions,
    shutdown: &AtomicBool,
    mut on_cycle: F,
) -> Result<CycleOutcome> {
    let mut cycles_run = 0u64;
    let mut actions = 0u64;
    let stop = loop {
        if shutdown.load(Ordering::SeqCst) {
            break CycleStop::Shutdown;
        }
        if options.max_cycles > 0 && cycles_run >= options.max_cycles {
            break CycleStop::MaxCycles;
        }

        let action = run_cycle(machine, tasks, device, Utc::now());
        cycles_run += 1;
        if action != CycleAction::Idle {
            actions += 1;
        }
        if let Err(err) = store.save(machine.ledger()) {
            warn!(cycle = cycles_run, err = %format!("{err:#}"), "failed to save ledger");
        }

        let report = CycleReport {
            cycle: cycles_run,
            state: machine.state(),
            action,
            detections: machine.detections().len(),
        };
        debug!(cycle = report.cycle, state = %report.state, action = ?report.action, "cycle finished");
        on_cycle(&report);

        if options.max_cycles == 0 || cycles_run < options.max_cycles {
            sleep_unless_shutdown(options.refresh_interval, shutdown);
        }
    };

    store
        .save(machine.ledger())
        .with_context(|| format!("save ledger to {}", store.path().display()))?;
    info!(cycles_run, actions, stop = ?stop, "cycle loop stopped");
    Ok(CycleOutcome {
        cycles_run,
        actions,
        stop,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TutorialRun {
    pub iterations: u32,
    pub completed: bool,
}

/// Drive the tutorial until the ledger records completion, the iteration
/// bound is hit, or `shutdown` is set. `device` should observe the screen
/// through the tutorial model.
#[instrument(skip_all, fields(instance = %machine.ledger().id))]
pub fn run_tutorial(
    machine: &mut GameStateMachine,
    device: &Device<'_>,
    store: &LedgerStore,
    max_iterations: u32,
    refresh_interval: Duration,
    shutdown: &AtomicBool,
) -> Result<TutorialRun> {
    let mut iterations = 0;
    while !machine.ledger().tutorial_completed
        && iterations < max_iterations
        && !shutdown.load(Ordering::SeqCst)
    {
        iterations += 1;
        let detections = device.detect();
        let acted = machine.run_tutorial_step(device, detections);
        debug!(iteration = iterations, acted, "tutorial step");
        if let Err(err) = store.save(machine.ledger()) {
            warn!(iteration = iterations, err = %format!("{err:#}"), "failed to save ledger");
        }
        if !machine.ledger().tutorial_completed {
            sleep_unless_shutdown(refresh_interval, shutdown);
        }
    }

    store
        .save(machine.ledger())
        .with_context(|| format!("save ledger to {}", store.path().display()))?;
    let completed = machine.ledger().tutorial_completed;
    if completed {
        info!(iterations, "tutorial completed");
    } else {
        warn!(iterations, max_iterations, "tutorial not completed");
    }
    Ok(TutorialRun {
        iterations,
        completed,
    })
}

fn sleep_unless_shutdown(total: Duration, shutdown: &AtomicBool) {
    let deadline = Instant::now() + total;
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::sleep(SHUTDOWN_POLL.min(deadline - now));
    }
}
