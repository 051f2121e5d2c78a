//! Ordered building tasks and the policy that walks them.
//!
//! The queue lives on the [`InstanceLedger`]; the operations here are pure
//! functions of the task list, its cursor and an injected clock value:
//!
//! - a completed task is never revisited;
//! - a failed task is skipped, stamped, and becomes eligible again once its
//!   cooldown has elapsed and the cursor has run off the end of the queue;
//! - among eligible skipped tasks the earliest one in queue order wins.

use anyhow::{Result, bail};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::detection::Detection;
use crate::core::ledger::InstanceLedger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildKind {
    /// Place a building that does not exist yet.
    BuildNew,
    #[default]
    Upgrade,
}

/// One entry of the build order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildTask {
    #[serde(rename = "type")]
    pub kind: BuildKind,
    pub building: String,
    /// Labels that locate the building (or its menu entry); see [`DetectMatcher`].
    pub detect_class: String,
    pub completed: bool,
    pub skipped_attempts: u32,
    pub last_skipped: Option<DateTime<Utc>>,
}

impl BuildTask {
    pub fn upgrade(building: &str) -> Self {
        Self {
            kind: BuildKind::Upgrade,
            building: building.to_string(),
            detect_class: building.to_string(),
            ..Self::default()
        }
    }

    pub fn build_new(building: &str, detect_class: &str) -> Self {
        Self {
            kind: BuildKind::BuildNew,
            building: building.to_string(),
            detect_class: detect_class.to_string(),
            ..Self::default()
        }
    }

    pub fn matcher(&self) -> Result<DetectMatcher> {
        DetectMatcher::parse(&self.detect_class)
    }

    fn retry_eligible(&self, cooldown: TimeDelta, now: DateTime<Utc>) -> bool {
        if self.completed || self.skipped_attempts == 0 {
            return false;
        }
        // A skip without a timestamp never cools down.
        self.last_skipped.is_some_and(|at| now - at >= cooldown)
    }
}

/// Tab of the construction menu a new building is listed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildCategory {
    Economic,
    Military,
}

impl BuildCategory {
    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "economic" => Some(Self::Economic),
            "military" => Some(Self::Military),
            _ => None,
        }
    }
}

/// Parsed form of [`BuildTask::detect_class`].
///
/// `"economic:build_lumber_mill"` carries a menu category; `"farm, farm_b"`
/// lists acceptable labels in preference order. A prefix before `:` must
/// name a known category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectMatcher {
    pub category: Option<BuildCategory>,
    pub labels: Vec<String>,
}

impl DetectMatcher {
    pub fn parse(spec: &str) -> Result<Self> {
        let (category, rest) = match spec.split_once(':') {
            Some((prefix, rest)) => match BuildCategory::from_prefix(prefix.trim()) {
                Some(category) => (Some(category), rest),
                None => bail!("unknown build category {:?} in {spec:?}", prefix.trim()),
            },
            None => (None, spec),
        };
        let labels = rest
            .split(',')
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        Ok(Self { category, labels })
    }

    /// First detection matching one of the labels, label order first.
    pub fn find<'a>(&self, detections: &'a [Detection], min_confidence: f64) -> Option<&'a Detection> {
        self.labels.iter().find_map(|label| {
            detections
                .iter()
                .find(|d| d.class_name() == label && d.is_confident_at(min_confidence))
        })
    }

    /// Construction-menu entry: each label, or its `build_`-prefixed form.
    pub fn find_build_option<'a>(
        &self,
        detections: &'a [Detection],
        min_confidence: f64,
    ) -> Option<&'a Detection> {
        self.labels.iter().find_map(|label| {
            let prefixed = format!("build_{label}");
            detections.iter().find(|d| {
                (d.class_name() == label || d.class_name() == prefixed)
                    && d.is_confident_at(min_confidence)
            })
        })
    }
}

/// Opening build order for a new account.
pub fn default_build_queue() -> Vec<BuildTask> {
    vec![
        BuildTask::upgrade("cityhall"),
        BuildTask::upgrade("barracks"),
        BuildTask::upgrade("scout_camp"),
        BuildTask::upgrade("farm"),
        BuildTask::upgrade("tavern"),
        BuildTask::upgrade("farm"),
        BuildTask::upgrade("hospital"),
        BuildTask::build_new("lumber_mill", "economic:build_lumber_mill"),
        BuildTask::upgrade("wall"),
        BuildTask::upgrade("lumber_mill"),
        BuildTask::upgrade("cityhall"),
        BuildTask::upgrade("lumber_mill"),
        BuildTask::upgrade("archery_range"),
        BuildTask::upgrade("barracks"),
        BuildTask::build_new("stable", "military:build_stable"),
        BuildTask::upgrade("scout_camp"),
        BuildTask::upgrade("hospital"),
        BuildTask::upgrade("lumber_mill"),
    ]
}

impl InstanceLedger {
    /// Install the default queue if none exists. Idempotent.
    pub fn initialize_build_queue(&mut self) {
        if self.building_tasks.is_empty() {
            self.building_tasks = default_build_queue();
            self.current_task_index = 0;
        }
    }

    pub fn current_build_task(&self) -> Option<&BuildTask> {
        self.building_tasks.get(self.current_task_index)
    }

    pub fn queue_exhausted(&self) -> bool {
        self.current_task_index >= self.building_tasks.len()
    }

    pub fn complete_current_task(&mut self) {
        let idx = self.current_task_index;
        let Some(task) = self.building_tasks.get_mut(idx) else {
            return;
        };
        task.completed = true;
        info!(index = idx, building = %task.building, "build task completed");
        self.current_task_index = idx + 1;
    }

    /// Skip the task at the cursor. Running off the end triggers a retry scan.
    pub fn skip_current_task(&mut self, cooldown: TimeDelta, now: DateTime<Utc>) {
        let idx = self.current_task_index;
        let Some(task) = self.building_tasks.get_mut(idx) else {
            return;
        };
        task.skipped_attempts += 1;
        task.last_skipped = Some(now);
        info!(
            index = idx,
            building = %task.building,
            skipped_attempts = task.skipped_attempts,
            "build task skipped"
        );
        self.current_task_index = idx + 1;
        if self.queue_exhausted() {
            self.reset_to_skipped_task(cooldown, now);
        }
    }

    /// Move the cursor to the earliest skipped task whose cooldown elapsed,
    /// or park it at the end of the queue.
    pub fn reset_to_skipped_task(&mut self, cooldown: TimeDelta, now: DateTime<Utc>) {
        let next = self
            .building_tasks
            .iter()
            .position(|t| t.retry_eligible(cooldown, now));
        match next {
            Some(idx) => {
                debug!(index = idx, "retrying skipped build task");
                self.current_task_index = idx;
            }
            None => self.current_task_index = self.building_tasks.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> InstanceLedger {
        InstanceLedger::new("instance1", "emulator-5554")
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .expect("timestamp")
            .with_timezone(&Utc)
    }

    fn cooldown() -> TimeDelta {
        TimeDelta::seconds(600)
    }

    #[test]
    fn initialize_installs_default_and_is_idempotent() {
        let mut ledger = InstanceLedger::default();
        ledger.initialize_build_queue();
        assert_eq!(ledger.building_tasks, default_build_queue());

        ledger.building_tasks[0].completed = true;
        ledger.current_task_index = 4;
        ledger.initialize_build_queue();
        assert!(ledger.building_tasks[0].completed);
        assert_eq!(ledger.current_task_index, 4);
    }

    #[test]
    fn default_queue_order_and_matchers() {
        let queue = default_build_queue();
        assert_eq!(queue.len(), 18);
        assert_eq!(queue[0].building, "cityhall");
        assert_eq!(queue[7].kind, BuildKind::BuildNew);
        assert_eq!(queue[7].detect_class, "economic:build_lumber_mill");
        assert_eq!(queue[14].detect_class, "military:build_stable");
        for task in queue.iter().filter(|t| t.kind == BuildKind::Upgrade) {
            assert_eq!(task.detect_class, task.building);
        }
    }

    #[test]
    fn complete_advances_by_one_and_is_noop_at_end() {
        let mut ledger = ledger();
        ledger.current_task_index = 3;
        ledger.complete_current_task();
        assert!(ledger.building_tasks[3].completed);
        assert_eq!(ledger.current_task_index, 4);

        let len = ledger.building_tasks.len();
        ledger.current_task_index = len;
        let before = ledger.clone();
        ledger.complete_current_task();
        assert_eq!(ledger, before);
    }

    #[test]
    fn skip_increments_exactly_one_counter() {
        let mut ledger = ledger();
        ledger.current_task_index = 2;
        ledger.skip_current_task(cooldown(), t0());
        assert_eq!(ledger.current_task_index, 3);
        let skipped: Vec<u32> = ledger.building_tasks.iter().map(|t| t.skipped_attempts).collect();
        assert_eq!(skipped.iter().sum::<u32>(), 1);
        assert_eq!(ledger.building_tasks[2].skipped_attempts, 1);
        assert_eq!(ledger.building_tasks[2].last_skipped, Some(t0()));
    }

    #[test]
    fn skipping_last_task_runs_retry_scan() {
        let mut ledger = ledger();
        let len = ledger.building_tasks.len();
        ledger.building_tasks[1].skipped_attempts = 1;
        ledger.building_tasks[1].last_skipped = Some(t0() - TimeDelta::seconds(601));
        ledger.current_task_index = len - 1;

        ledger.skip_current_task(cooldown(), t0());
        assert_eq!(ledger.current_task_index, 1);
    }

    #[test]
    fn retry_scan_picks_lowest_eligible_index() {
        let mut ledger = ledger();
        for idx in [5, 2, 9] {
            ledger.building_tasks[idx].skipped_attempts = 2;
            ledger.building_tasks[idx].last_skipped = Some(t0() - TimeDelta::seconds(900));
        }
        ledger.reset_to_skipped_task(cooldown(), t0());
        assert_eq!(ledger.current_task_index, 2);
    }

    #[test]
    fn retry_scan_respects_cooldown_and_skip_count() {
        let mut ledger = ledger();
        ledger.building_tasks[0].last_skipped = Some(t0() - TimeDelta::seconds(3600));
        ledger.building_tasks[4].skipped_attempts = 1;
        ledger.building_tasks[4].last_skipped = Some(t0() - TimeDelta::seconds(30));
        ledger.reset_to_skipped_task(cooldown(), t0());
        assert_eq!(ledger.current_task_index, ledger.building_tasks.len());

        ledger.reset_to_skipped_task(cooldown(), t0() + TimeDelta::seconds(600));
        assert_eq!(ledger.current_task_index, 4);
    }

    #[test]
    fn completed_tasks_are_never_retried() {
        let mut ledger = ledger();
        ledger.building_tasks[3].skipped_attempts = 1;
        ledger.building_tasks[3].last_skipped = Some(t0() - TimeDelta::seconds(900));
        ledger.building_tasks[3].completed = true;
        ledger.reset_to_skipped_task(TimeDelta::zero(), t0());
        assert_eq!(ledger.current_task_index, ledger.building_tasks.len());
    }

    #[test]
    fn matcher_parses_category_and_label_lists() {
        let m = DetectMatcher::parse("economic:build_lumber_mill").expect("matcher");
        assert_eq!(m.category, Some(BuildCategory::Economic));
        assert_eq!(m.labels, vec!["build_lumber_mill".to_string()]);

        let m = DetectMatcher::parse("farm, farm_level2 ,").expect("matcher");
        assert_eq!(m.category, None);
        assert_eq!(m.labels, vec!["farm".to_string(), "farm_level2".to_string()]);
    }

    #[test]
    fn matcher_rejects_unknown_category() {
        let err = DetectMatcher::parse("naval:build_dock").expect_err("unknown category");
        assert!(err.to_string().contains("naval"), "{err}");
        assert!(BuildTask::build_new("dock", "naval:build_dock").matcher().is_err());
    }

    #[test]
    fn skip_without_timestamp_is_not_retried() {
        let mut ledger = ledger();
        ledger.building_tasks[2].skipped_attempts = 3;
        ledger.building_tasks[2].last_skipped = None;
        ledger.reset_to_skipped_task(TimeDelta::zero(), t0());
        assert_eq!(ledger.current_task_index, ledger.building_tasks.len());
    }

    #[test]
    fn build_option_accepts_prefixed_label() {
        let detections = vec![Detection::new("build_stable", 40.0, 50.0, 10.0, 10.0, 0.8)];
        let m = DetectMatcher::parse("military:stable").expect("matcher");
        assert!(m.find(&detections, 0.7).is_none());
        let hit = m.find_build_option(&detections, 0.7).expect("option");
        assert_eq!(hit.class_name(), "build_stable");
    }

    #[test]
    fn task_serializes_kind_under_type_key() {
        let task = BuildTask::build_new("stable", "military:build_stable");
        let value = serde_json::to_value(&task).expect("serialize");
        assert_eq!(value["type"], "build_new");
        assert_eq!(value["last_skipped"], serde_json::Value::Null);
    }
}
