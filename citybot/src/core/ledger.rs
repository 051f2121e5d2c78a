//! Durable per-instance progress record.
//!
//! One [`InstanceLedger`] exists per configured game instance. It is the only
//! state that survives a restart: tutorial handshake flags, one-time
//! milestones, the build queue with its cursor, and remembered positions of
//! buildings the game shows more than once.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::build_queue::BuildTask;
use crate::core::detection::Point;

/// Building types that exist several times in a city. Their first seen
/// position is remembered so later upgrades hit the same instance.
pub const MULTI_INSTANCE_BUILDINGS: &[&str] = &["farm", "quarry", "lumber_mill", "goldmine", "hospital"];

pub fn is_multi_instance(building: &str) -> bool {
    MULTI_INSTANCE_BUILDINGS.contains(&building)
}

/// Missing fields default so that older or partially written files load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceLedger {
    pub id: String,
    pub device_id: String,
    pub tutorial_completed: bool,
    /// Tutorial step A: the "upgrade complete" banner was acknowledged.
    pub tutorial_upgrade_complete_clicked: bool,
    /// Tutorial step B: the final highlighted target was tapped.
    pub tutorial_final_arrow_clicked: bool,
    pub tree_clearing_completed: bool,
    /// Next tree to clear; equal to the table length once all were visited.
    pub tree_clearing_index: usize,
    /// The mid-run camera reset of tree clearing already happened.
    pub tree_view_reset_done: bool,
    pub second_builder_added: bool,
    pub city_hall_level: u32,
    pub building_tasks: Vec<BuildTask>,
    /// Cursor into `building_tasks`; `building_tasks.len()` means exhausted.
    pub current_task_index: usize,
    pub building_positions: BTreeMap<String, Point>,
}

impl Default for InstanceLedger {
    fn default() -> Self {
        Self {
            id: String::new(),
            device_id: String::new(),
            tutorial_completed: false,
            tutorial_upgrade_complete_clicked: false,
            tutorial_final_arrow_clicked: false,
            tree_clearing_completed: false,
            tree_clearing_index: 0,
            tree_view_reset_done: false,
            second_builder_added: false,
            city_hall_level: 1,
            building_tasks: Vec::new(),
            current_task_index: 0,
            building_positions: BTreeMap::new(),
        }
    }
}

impl InstanceLedger {
    /// Fresh ledger with the default build queue.
    pub fn new(id: impl Into<String>, device_id: impl Into<String>) -> Self {
        let mut ledger = Self {
            id: id.into(),
            device_id: device_id.into(),
            ..Self::default()
        };
        ledger.initialize_build_queue();
        ledger
    }

    /// Restore invariants after loading data written by another version.
    pub fn normalize(&mut self) {
        if self.current_task_index > self.building_tasks.len() {
            self.current_task_index = self.building_tasks.len();
        }
        if self.city_hall_level == 0 {
            self.city_hall_level = 1;
        }
        self.refresh_tutorial_completion();
        self.building_positions.retain(|_, p| !p.is_origin());
    }

    pub fn mark_upgrade_complete_clicked(&mut self) {
        self.tutorial_upgrade_complete_clicked = true;
        self.refresh_tutorial_completion();
    }

    pub fn mark_final_arrow_clicked(&mut self) {
        self.tutorial_final_arrow_clicked = true;
        self.refresh_tutorial_completion();
    }

    /// Alternate completion path (explicit completion screen, terminal
    /// build prompt, or operator skip).
    pub fn complete_tutorial(&mut self) {
        self.tutorial_completed = true;
    }

    fn refresh_tutorial_completion(&mut self) {
        if self.tutorial_upgrade_complete_clicked && self.tutorial_final_arrow_clicked {
            self.tutorial_completed = true;
        }
    }

    pub fn building_position(&self, building: &str) -> Option<Point> {
        self.building_positions
            .get(building)
            .copied()
            .filter(|p| !p.is_origin())
    }

    /// Remember where a multi-instance building was first found. Returns
    /// `true` when the position was recorded by this call.
    pub fn remember_building_position(&mut self, building: &str, point: Point) -> bool {
        if !is_multi_instance(building) || point.is_origin() {
            return false;
        }
        if self.building_position(building).is_some() {
            return false;
        }
        self.building_positions.insert(building.to_string(), point);
        true
    }

    pub fn tasks_remaining(&self) -> usize {
        self.building_tasks.iter().filter(|t| !t.completed).count()
    }
}
