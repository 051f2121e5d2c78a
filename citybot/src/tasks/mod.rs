//! Priority- and cooldown-driven background tasks.
//!
//! When the state machine takes no action in a cycle, the [`TaskManager`]
//! walks its tasks from highest to lowest priority and runs the first one
//! that is off cooldown and reports that it acted. Handler errors are logged
//! and count as "no action"; they never abort the cycle.

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, warn};

use crate::core::detection::Detection;
use crate::core::ledger::InstanceLedger;
use crate::core::view::GameView;
use crate::device::Device;
use crate::io::config::TaskSettings;

pub mod build_order;
pub mod quests;

/// Everything a task may look at or change during one cycle.
pub struct TaskContext<'a> {
    pub device: &'a Device<'a>,
    pub game_view: GameView,
    pub detections: &'a [Detection],
    pub ledger: &'a mut InstanceLedger,
    pub now: DateTime<Utc>,
}

/// Per-task tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskConfig {
    pub claim_only_main_quest: bool,
    pub max_builds_per_cycle: u32,
    pub skip_cooldown: TimeDelta,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self::from_settings(&TaskSettings::default())
    }
}

impl TaskConfig {
    pub fn from_settings(settings: &TaskSettings) -> Self {
        Self {
            claim_only_main_quest: settings.claim_only_main_quest,
            max_builds_per_cycle: settings.max_builds_per_cycle,
            skip_cooldown: settings.skip_cooldown(),
        }
    }
}

/// Body of a task. Returns `Ok(true)` when it performed an action.
pub trait TaskHandler {
    fn run(&self, ctx: &mut TaskContext<'_>, config: &TaskConfig) -> anyhow::Result<bool>;
}

pub struct Task {
    pub name: String,
    /// Higher runs first.
    pub priority: i32,
    /// Minimum time between two successful runs.
    pub cooldown: TimeDelta,
    pub config: TaskConfig,
    /// Time of the last run that acted.
    pub last_executed: Option<DateTime<Utc>>,
    handler: Box<dyn TaskHandler>,
}

impl Task {
    pub fn new(
        name: impl Into<String>,
        priority: i32,
        cooldown: TimeDelta,
        handler: impl TaskHandler + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            priority,
            cooldown,
            config: TaskConfig::default(),
            last_executed: None,
            handler: Box::new(handler),
        }
    }

    pub fn with_config(mut self, config: TaskConfig) -> Self {
        self.config = config;
        self
    }

    fn ready(&self, now: DateTime<Utc>) -> bool {
        match self.last_executed {
            Some(at) => now - at >= self.cooldown,
            None => true,
        }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("cooldown", &self.cooldown)
            .field("last_executed", &self.last_executed)
            .finish_non_exhaustive()
    }
}

/// Tasks kept in descending priority order; equal priorities keep insertion order.
#[derive(Debug, Default)]
pub struct TaskManager {
    tasks: Vec<Task>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stock task set: quest collection, then build-order advancement.
    pub fn with_default_tasks(settings: &TaskSettings) -> Self {
        let config = TaskConfig::from_settings(settings);
        let mut manager = Self::new();
        manager.add_task(
            Task::new(
                quests::TASK_NAME,
                quests::PRIORITY,
                TimeDelta::zero(),
                quests::CollectQuests,
            )
            .with_config(config.clone()),
        );
        manager.add_task(
            Task::new(
                build_order::TASK_NAME,
                build_order::PRIORITY,
                TimeDelta::seconds(build_order::COOLDOWN_SECS),
                build_order::AdvanceBuildOrder,
            )
            .with_config(config),
        );
        manager
    }

    pub fn add_task(&mut self, task: Task) {
        let idx = self
            .tasks
            .iter()
            .position(|t| t.priority < task.priority)
            .unwrap_or(self.tasks.len());
        debug!(task = %task.name, priority = task.priority, "task registered");
        self.tasks.insert(idx, task);
    }

    /// Remove every task named `name`. Returns whether any was removed.
    pub fn remove_task(&mut self, name: &str) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.name != name);
        self.tasks.len() != before
    }

    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn task(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.name == name)
    }

    /// Run the first ready task that acts. Returns whether one did.
    pub fn execute_highest_priority_task(&mut self, ctx: &mut TaskContext<'_>) -> bool {
        let now = ctx.now;
        for task in &mut self.tasks {
            if !task.ready(now) {
                continue;
            }
            match task.handler.run(ctx, &task.config) {
                Ok(true) => {
                    task.last_executed = Some(now);
                    info!(task = %task.name, "task acted");
                    return true;
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(task = %task.name, err = %format!("{err:#}"), "task failed");
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use anyhow::anyhow;

    use super::*;
    use crate::device::Pacing;
    use crate::test_support::{RecordingTransport, ScriptedDetector, fixed_now};

    type Log = Rc<RefCell<Vec<String>>>;

    /// Appends its name to a shared log and reports a fixed outcome.
    struct Recording {
        name: &'static str,
        log: Log,
        acts: bool,
    }

    impl TaskHandler for Recording {
        fn run(&self, _ctx: &mut TaskContext<'_>, _config: &TaskConfig) -> anyhow::Result<bool> {
            self.log.borrow_mut().push(self.name.to_string());
            Ok(self.acts)
        }
    }

    struct Broken;

    impl TaskHandler for Broken {
        fn run(&self, _ctx: &mut TaskContext<'_>, _config: &TaskConfig) -> anyhow::Result<bool> {
            Err(anyhow!("boom"))
        }
    }

    fn task(name: &'static str, priority: i32, cooldown_secs: i64, log: &Log, acts: bool) -> Task {
        let handler = Recording {
            name,
            log: Rc::clone(log),
            acts,
        };
        Task::new(name, priority, TimeDelta::seconds(cooldown_secs), handler)
    }

    fn run(manager: &mut TaskManager, now: DateTime<Utc>) -> bool {
        let detector = ScriptedDetector::default();
        let transport = RecordingTransport::default();
        let device = Device::new("dev", &detector, &transport).with_pacing(Pacing::Instant);
        let mut ledger = InstanceLedger::new("i", "dev");
        let mut ctx = TaskContext {
            device: &device,
            game_view: GameView::City,
            detections: &[],
            ledger: &mut ledger,
            now,
        };
        manager.execute_highest_priority_task(&mut ctx)
    }

    #[test]
    fn tasks_are_sorted_by_priority_stably() {
        let log = Log::default();
        let mut manager = TaskManager::new();
        manager.add_task(task("low", 1, 0, &log, false));
        manager.add_task(task("high", 10, 0, &log, false));
        manager.add_task(task("mid_a", 5, 0, &log, false));
        manager.add_task(task("mid_b", 5, 0, &log, false));
        assert_eq!(manager.task_names(), vec!["high", "mid_a", "mid_b", "low"]);
    }

    #[test]
    fn first_acting_task_stops_the_scan_and_is_stamped() {
        let log = Log::default();
        let mut manager = TaskManager::new();
        manager.add_task(task("idle", 10, 0, &log, false));
        manager.add_task(task("acts", 5, 0, &log, true));
        manager.add_task(task("never", 1, 0, &log, true));

        assert!(run(&mut manager, fixed_now()));
        assert_eq!(*log.borrow(), vec!["idle", "acts"]);
        assert_eq!(manager.task("acts").and_then(|t| t.last_executed), Some(fixed_now()));
        assert_eq!(manager.task("idle").and_then(|t| t.last_executed), None);
    }

    #[test]
    fn cooldown_skips_recent_tasks() {
        let log = Log::default();
        let mut manager = TaskManager::new();
        manager.add_task(task("slow", 10, 5, &log, true));
        manager.add_task(task("fallback", 1, 0, &log, true));

        assert!(run(&mut manager, fixed_now()));
        assert!(run(&mut manager, fixed_now() + TimeDelta::seconds(4)));
        assert!(run(&mut manager, fixed_now() + TimeDelta::seconds(5)));
        assert_eq!(*log.borrow(), vec!["slow", "fallback", "slow"]);
    }

    #[test]
    fn handler_errors_are_contained() {
        let log = Log::default();
        let mut manager = TaskManager::new();
        manager.add_task(Task::new("broken", 10, TimeDelta::zero(), Broken));
        manager.add_task(task("next", 1, 0, &log, true));

        assert!(run(&mut manager, fixed_now()));
        assert_eq!(*log.borrow(), vec!["next"]);
        assert_eq!(manager.task("broken").and_then(|t| t.last_executed), None);
    }

    #[test]
    fn nothing_ready_means_no_action() {
        let mut manager = TaskManager::new();
        assert!(!run(&mut manager, fixed_now()));

        let log = Log::default();
        manager.add_task(task("idle", 1, 0, &log, false));
        assert!(!run(&mut manager, fixed_now()));
    }

    #[test]
    fn remove_task_by_name() {
        let mut manager = TaskManager::with_default_tasks(&TaskSettings::default());
        assert_eq!(manager.task_names(), vec!["collect_quests", "build_order"]);
        assert!(manager.remove_task("collect_quests"));
        assert!(!manager.remove_task("collect_quests"));
        assert_eq!(manager.task_names(), vec!["build_order"]);
    }
}
