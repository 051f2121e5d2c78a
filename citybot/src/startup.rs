//! One-time account setup after the tutorial: clearing the trees around the
//! starting city and hiring the second builder.
//!
//! Progress is kept on the ledger after every step, so an interrupted run
//! resumes where it stopped.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, instrument, warn};

use crate::core::detection::{Detection, Point};
use crate::core::elements::{SCREEN_CENTER, UiElement, best, find};
use crate::core::ledger::InstanceLedger;
use crate::core::view::GameView;
use crate::device::{Device, LONG_SETTLE_MS, SETTLE_MS};
use crate::io::ledger_store::LedgerStore;

/// Attempts at hiring the second builder before giving up for this run.
const SECOND_BUILDER_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartupOptions {
    pub skip_tree_clearing: bool,
    pub skip_second_builder: bool,
    /// Upper bound on tree-clearing steps in one run.
    pub tree_clearing_max_attempts: u32,
}

impl Default for StartupOptions {
    fn default() -> Self {
        Self {
            skip_tree_clearing: false,
            skip_second_builder: false,
            tree_clearing_max_attempts: 30,
        }
    }
}

/// Which milestones are done after [`run_startup_tasks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartupReport {
    pub tree_clearing_completed: bool,
    pub second_builder_added: bool,
}

impl StartupReport {
    pub fn succeeded(&self) -> bool {
        self.tree_clearing_completed && self.second_builder_added
    }
}

/// Trees blocking the starting city, in clearing order.
///
/// Coordinates are screen pixels for the default city camera (the zoom and
/// orientation the game shows after two home taps) and are not re-derived
/// from detections. `HARVEST_POINTS[i]` is the harvest button that appears
/// after tapping `TREE_POINTS[i]`.
pub const TREE_POINTS: [Point; 19] = [
    Point::new(134, 137),
    Point::new(195, 169),
    Point::new(261, 217),
    Point::new(243, 173),
    Point::new(292, 216),
    Point::new(325, 235),
    Point::new(333, 204),
    Point::new(371, 225),
    Point::new(378, 196),
    Point::new(415, 215),
    Point::new(479, 278),
    Point::new(590, 363),
    Point::new(521, 388),
    Point::new(574, 261),
    Point::new(352, 417),
    Point::new(368, 391),
    Point::new(299, 411),
    Point::new(203, 382),
    Point::new(176, 354),
];

pub const HARVEST_POINTS: [Point; 19] = [
    Point::new(158, 256),
    Point::new(218, 256),
    Point::new(286, 256),
    Point::new(268, 257),
    Point::new(319, 269),
    Point::new(356, 292),
    Point::new(364, 249),
    Point::new(399, 275),
    Point::new(406, 244),
    Point::new(441, 269),
    Point::new(504, 324),
    Point::new(582, 415),
    Point::new(548, 429),
    Point::new(600, 314),
    Point::new(375, 467),
    Point::new(393, 439),
    Point::new(327, 462),
    Point::new(228, 426),
    Point::new(203, 406),
];

/// The camera drifts after the first batch of harvests; re-centre once here.
const TREE_VIEW_RESET_INDEX: usize = 13;

/// Result of one tree-clearing step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeStep {
    /// Tree tapped and harvested (or attempted); index advanced.
    Harvested,
    /// Camera re-centred; no tree touched this step.
    ViewReset,
    /// All trees visited; milestone recorded.
    Finished,
}

/// Clear the next tree. Always advances, even if a tap failed, so a bad
/// coordinate cannot wedge the sequence.
pub fn clear_next_tree(device: &Device<'_>, ledger: &mut InstanceLedger) -> TreeStep {
    let idx = ledger.tree_clearing_index;
    if ledger.tree_clearing_completed || idx >= TREE_POINTS.len() {
        if !ledger.tree_clearing_completed {
            device.reset_view();
            ledger.tree_clearing_completed = true;
            info!("tree clearing completed");
        }
        return TreeStep::Finished;
    }

    if idx == 0 {
        for _ in 0..2 {
            device.press_home();
            device.settle(LONG_SETTLE_MS);
        }
    }
    if idx == TREE_VIEW_RESET_INDEX && !ledger.tree_view_reset_done {
        debug!(index = idx, "re-centring camera mid clearing");
        device.reset_view();
        ledger.tree_view_reset_done = true;
        return TreeStep::ViewReset;
    }

    let tree = TREE_POINTS[idx];
    let harvest = HARVEST_POINTS[idx];
    if device.tap(tree) {
        device.settle(SETTLE_MS);
        if !device.tap(harvest) {
            warn!(index = idx, %harvest, "harvest tap failed");
        }
        device.settle(SETTLE_MS);
    } else {
        warn!(index = idx, %tree, "tree tap failed");
    }
    ledger.tree_clearing_index = idx + 1;
    debug!(index = idx, "tree cleared");
    TreeStep::Harvested
}

/// Hire the second builder from the builders' hut. Returns `true` once the
/// milestone is recorded.
pub fn recruit_second_builder(
    device: &Device<'_>,
    detections: &[Detection],
    ledger: &mut InstanceLedger,
) -> bool {
    if ledger.second_builder_added {
        return true;
    }
    if GameView::from_detections(detections) != GameView::City {
        debug!("second builder needs the city view");
        return false;
    }
    let Some(hut) = best(detections, UiElement::BuildersHut) else {
        debug!("builders hut not visible");
        return false;
    };
    if !device.tap_detection(hut) {
        return false;
    }
    device.settle(SETTLE_MS);

    let screen = device.detect();
    let Some(button) = find(&screen, UiElement::BuildersHutButton) else {
        debug!("builders hut button not shown");
        return false;
    };
    if !device.tap_detection(button) {
        return false;
    }
    device.settle(LONG_SETTLE_MS);

    let screen = device.detect();
    let Some(hire) = find(&screen, UiElement::BuildersHutHire) else {
        debug!("hire button not shown");
        return false;
    };
    if !device.tap_detection(hire) {
        return false;
    }
    device.settle(LONG_SETTLE_MS);

    let screen = device.detect();
    match find(&screen, UiElement::ExitDialog) {
        Some(exit) => device.tap_detection(exit),
        None => device.tap(SCREEN_CENTER),
    };
    device.settle(SETTLE_MS);

    ledger.second_builder_added = true;
    info!("second builder hired");
    device.reset_view();
    true
}

/// Bring the account through the one-time setup milestones.
///
/// A skipped milestone is recorded as done. The ledger is saved after every
/// step; save failures are logged and the run continues, since the next save
/// rewrites the whole entry anyway. Once `shutdown` is set no further
/// gestures are issued.
#[instrument(skip_all, fields(instance = %ledger.id))]
pub fn run_startup_tasks(
    device: &Device<'_>,
    ledger: &mut InstanceLedger,
    store: &LedgerStore,
    options: &StartupOptions,
    shutdown: &AtomicBool,
) -> StartupReport {
    if options.skip_tree_clearing && !ledger.tree_clearing_completed {
        info!("tree clearing skipped");
        ledger.tree_clearing_completed = true;
        persist(store, ledger);
    }
    let mut attempts = 0;
    while !ledger.tree_clearing_completed && attempts < options.tree_clearing_max_attempts {
        if shutdown.load(Ordering::SeqCst) {
            info!(
                index = ledger.tree_clearing_index,
                "shutdown requested during tree clearing"
            );
            return report(ledger);
        }
        attempts += 1;
        clear_next_tree(device, ledger);
        persist(store, ledger);
    }
    if !ledger.tree_clearing_completed {
        warn!(
            attempts,
            index = ledger.tree_clearing_index,
            "tree clearing did not finish"
        );
    }

    if options.skip_second_builder && !ledger.second_builder_added {
        info!("second builder skipped");
        ledger.second_builder_added = true;
        persist(store, ledger);
    }
    for attempt in 1..=SECOND_BUILDER_ATTEMPTS {
        if ledger.second_builder_added {
            break;
        }
        if shutdown.load(Ordering::SeqCst) {
            info!("shutdown requested before hiring second builder");
            break;
        }
        let screen = device.detect();
        if recruit_second_builder(device, &screen, ledger) {
            persist(store, ledger);
        } else {
            debug!(attempt, "second builder not hired, resetting view");
            device.reset_view();
        }
    }

    report(ledger)
}

fn report(ledger: &InstanceLedger) -> StartupReport {
    StartupReport {
        tree_clearing_completed: ledger.tree_clearing_completed,
        second_builder_added: ledger.second_builder_added,
    }
}

fn persist(store: &LedgerStore, ledger: &InstanceLedger) {
    if let Err(err) = store.save(ledger) {
        warn!(err = %format!("{err:#}"), "failed to save ledger");
    }
}
