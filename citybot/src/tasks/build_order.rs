//! Advance the ledger's build queue while builders are idle.
//!
//! One run checks the builders' hut for free construction queues, then works
//! through up to that many queue entries. A task that succeeds is completed;
//! one that fails at any step is skipped with a timestamp so the queue
//! policy can retry it after its cooldown.

use tracing::{debug, info, warn};

use crate::core::build_queue::{BuildCategory, BuildKind, BuildTask};
use crate::core::detection::{DEFAULT_MIN_CONFIDENCE, Detection};
use crate::core::elements::{UiElement, best, find, present};
use crate::core::ledger::InstanceLedger;
use crate::core::view::GameView;
use crate::device::{Device, LONG_SETTLE_MS, SETTLE_MS};
use crate::tasks::{TaskConfig, TaskContext, TaskHandler};

pub const TASK_NAME: &str = "build_order";
pub const PRIORITY: i32 = 90;
pub const COOLDOWN_SECS: i64 = 5;

pub struct AdvanceBuildOrder;

impl TaskHandler for AdvanceBuildOrder {
    fn run(&self, ctx: &mut TaskContext<'_>, config: &TaskConfig) -> anyhow::Result<bool> {
        Ok(advance_build_order(ctx, config))
    }
}

pub fn advance_build_order(ctx: &mut TaskContext<'_>, config: &TaskConfig) -> bool {
    let device = ctx.device;
    let ledger = &mut *ctx.ledger;

    ledger.initialize_build_queue();
    if ledger.queue_exhausted() {
        ledger.reset_to_skipped_task(config.skip_cooldown, ctx.now);
        if ledger.queue_exhausted() {
            debug!("build queue exhausted");
            return false;
        }
    }
    if ctx.game_view != GameView::City {
        debug!(view = %ctx.game_view, "build order needs the city view");
        return false;
    }

    let queues = builder_queues_available(device, ctx.detections);
    if queues == 0 {
        debug!("no idle builders");
        return false;
    }

    let mut built = 0u32;
    for _ in 0..queues.min(config.max_builds_per_cycle) {
        let Some(task) = ledger.current_build_task().cloned() else {
            break;
        };
        let screen = device.detect();
        let succeeded = match task.kind {
            BuildKind::BuildNew => place_new_building(device, &task, &screen),
            BuildKind::Upgrade => upgrade_building(device, &task, &screen, ledger),
        };
        if succeeded {
            if task.kind == BuildKind::Upgrade && task.building == "cityhall" {
                ledger.city_hall_level += 1;
                info!(level = ledger.city_hall_level, "city hall upgraded");
            }
            ledger.complete_current_task();
            built += 1;
        } else {
            ledger.skip_current_task(config.skip_cooldown, ctx.now);
        }
        device.reset_view();
    }
    built > 0
}

/// Number of free construction queues (0, 1 or 2), read from the builders'
/// hut dialog. Leaves the camera in the default city view.
pub fn builder_queues_available(device: &Device<'_>, detections: &[Detection]) -> u32 {
    // A button already on screen may belong to a stale panel; the hut wins.
    let button = match best(detections, UiElement::BuildersHut) {
        Some(hut) => tap_and_look(device, hut, SETTLE_MS)
            .and_then(|screen| find(&screen, UiElement::BuildersHutButton).map(Detection::center)),
        None => find(detections, UiElement::BuildersHutButton).map(Detection::center),
    };
    let Some(button) = button else {
        debug!("builders hut not visible");
        return 0;
    };
    if !device.tap(button) {
        return 0;
    }
    device.settle(LONG_SETTLE_MS);

    let dialog = device.detect();
    let queues = if present(&dialog, UiElement::TwoQueuesAvailable) {
        2
    } else if present(&dialog, UiElement::OneQueueAvailable) {
        1
    } else {
        0
    };
    debug!(queues, "builder queues checked");

    match find(&dialog, UiElement::ExitDialog) {
        Some(exit) => device.tap_detection(exit),
        None => device.press_home(),
    };
    device.settle(SETTLE_MS);
    device.reset_view();
    queues
}

/// Construction menu → category tab → building entry → accept placement.
pub fn place_new_building(device: &Device<'_>, task: &BuildTask, detections: &[Detection]) -> bool {
    let matcher = match task.matcher() {
        Ok(matcher) => matcher,
        Err(err) => {
            warn!(building = %task.building, err = %format!("{err:#}"), "unusable detect class");
            return false;
        }
    };
    let Some(menu) = find(detections, UiElement::BuildMenu) else {
        debug!(building = %task.building, "construction menu not visible");
        return false;
    };
    let Some(mut screen) = tap_and_look(device, menu, SETTLE_MS) else {
        return false;
    };

    if let Some(category) = matcher.category {
        let tab = match category {
            BuildCategory::Economic => UiElement::EconomicTab,
            BuildCategory::Military => UiElement::MilitaryTab,
        };
        let Some(next) = find(&screen, tab).and_then(|t| tap_and_look(device, t, SETTLE_MS)) else {
            debug!(building = %task.building, ?category, "category tab not found");
            return false;
        };
        screen = next;
    }

    let Some(screen) = matcher
        .find_build_option(&screen, DEFAULT_MIN_CONFIDENCE)
        .and_then(|option| tap_and_look(device, option, LONG_SETTLE_MS))
    else {
        debug!(building = %task.building, "building not offered in menu");
        return false;
    };

    let Some(accept) = find(&screen, UiElement::AcceptBuildLocation) else {
        debug!(building = %task.building, "placement prompt not shown");
        return false;
    };
    if !device.tap_detection(accept) {
        return false;
    }
    device.settle(LONG_SETTLE_MS);
    info!(building = %task.building, "new building placed");
    true
}

/// Building → upgrade button → confirm, then ask the alliance for help.
pub fn upgrade_building(
    device: &Device<'_>,
    task: &BuildTask,
    detections: &[Detection],
    ledger: &mut InstanceLedger,
) -> bool {
    let target = match ledger.building_position(&task.building) {
        Some(remembered) => remembered,
        None => {
            let matcher = match task.matcher() {
                Ok(matcher) => matcher,
                Err(err) => {
                    warn!(building = %task.building, err = %format!("{err:#}"), "unusable detect class");
                    return false;
                }
            };
            let Some(found) = matcher.find(detections, DEFAULT_MIN_CONFIDENCE) else {
                debug!(building = %task.building, "building not visible");
                return false;
            };
            let point = found.center();
            if ledger.remember_building_position(&task.building, point) {
                debug!(building = %task.building, %point, "building position remembered");
            }
            point
        }
    };
    if !device.tap(target) {
        return false;
    }
    device.settle(SETTLE_MS);

    let screen = device.detect();
    let Some(screen) = find(&screen, UiElement::UpgradeButton)
        .and_then(|button| tap_and_look(device, button, LONG_SETTLE_MS))
    else {
        debug!(building = %task.building, "upgrade button not found");
        return false;
    };

    if present(&screen, UiElement::UpgradeNotAvailable) {
        if let Some(exit) = find(&screen, UiElement::ExitDialog) {
            device.tap_detection(exit);
            device.settle(SETTLE_MS);
        }
        info!(building = %task.building, "upgrade requirements not met");
        return false;
    }

    let Some(after) = find(&screen, UiElement::UpgradeConfirm)
        .and_then(|confirm| tap_and_look(device, confirm, LONG_SETTLE_MS))
    else {
        debug!(building = %task.building, "upgrade confirmation not found");
        return false;
    };

    if let Some(help) = find(&after, UiElement::AllianceHelpButton)
        && device.tap_detection(help)
    {
        device.settle(SETTLE_MS);
    }
    info!(building = %task.building, "upgrade started");
    true
}

/// Tap `target`, wait, and return the next screen. `None` if the tap failed.
fn tap_and_look(device: &Device<'_>, target: &Detection, settle_ms: u64) -> Option<Vec<Detection>> {
    if !device.tap_detection(target) {
        return None;
    }
    device.settle(settle_ms);
    Some(device.detect())
}
