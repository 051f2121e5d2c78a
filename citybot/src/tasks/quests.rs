//! Claim finished quests from the quest panel.

use tracing::info;

use crate::core::detection::Detection;
use crate::core::elements::{SIDE_QUEST_CLAIM_OFFSET_Y, UiElement, present};
use crate::device::{Device, SETTLE_MS};
use crate::tasks::{TaskConfig, TaskContext, TaskHandler};

pub const TASK_NAME: &str = "collect_quests";
pub const PRIORITY: i32 = 100;

pub struct CollectQuests;

impl TaskHandler for CollectQuests {
    fn run(&self, ctx: &mut TaskContext<'_>, config: &TaskConfig) -> anyhow::Result<bool> {
        Ok(collect_quests(
            ctx.device,
            ctx.detections,
            config.claim_only_main_quest,
        ))
    }
}

/// Tap the first claimable quest on screen.
///
/// A main-quest indicator is tapped directly. The generic quest indicator
/// only leads to a claim when a side quest is actually claimable; its claim
/// button sits a fixed distance below the indicator.
pub fn collect_quests(device: &Device<'_>, detections: &[Detection], claim_only_main: bool) -> bool {
    let side_quest_ready = present(detections, UiElement::SideQuestClaimable);

    for detection in detections.iter().filter(|d| d.is_confident()) {
        let label = detection.class_name();
        if UiElement::MainQuestClaimable.matches(label) {
            if device.tap_detection(detection) {
                info!("main quest claimed");
                device.settle(SETTLE_MS);
                return true;
            }
        } else if UiElement::QuestsClaimable.matches(label)
            && !claim_only_main
            && side_quest_ready
        {
            let claim = detection.center().offset(0, SIDE_QUEST_CLAIM_OFFSET_Y);
            if device.tap(claim) {
                info!(%claim, "side quest claimed");
                device.settle(SETTLE_MS);
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::detection::Point;
    use crate::device::Pacing;
    use crate::test_support::{RecordingTransport, ScriptedDetector, det};

    fn claim(detections: &[Detection], claim_only_main: bool) -> (bool, Vec<Point>) {
        let detector = ScriptedDetector::default();
        let transport = RecordingTransport::default();
        let device = Device::new("dev", &detector, &transport).with_pacing(Pacing::Instant);
        let acted = collect_quests(&device, detections, claim_only_main);
        (acted, transport.taps())
    }

    #[test]
    fn main_quest_is_tapped_at_its_center() {
        let (acted, taps) = claim(&[det("main_quest_claimable", 100.0, 200.0, 0.9)], false);
        assert!(acted);
        assert_eq!(taps, vec![Point::new(100, 200)]);
    }

    #[test]
    fn generic_indicator_without_side_quest_is_ignored() {
        let (acted, taps) = claim(&[det("quests_claimable", 100.0, 200.0, 0.9)], false);
        assert!(!acted);
        assert!(taps.is_empty());
    }

    #[test]
    fn side_quest_claim_is_offset_below_indicator() {
        let screen = vec![
            det("quests_claimable", 60.0, 150.0, 0.9),
            det("side_quest_claimable", 60.0, 230.0, 0.8),
        ];
        let (acted, taps) = claim(&screen, false);
        assert!(acted);
        assert_eq!(taps, vec![Point::new(60, 228)]);

        let (acted, taps) = claim(&screen, true);
        assert!(!acted);
        assert!(taps.is_empty());
    }

    #[test]
    fn low_confidence_indicators_are_ignored() {
        let (acted, _) = claim(&[det("main_quest_claimable", 100.0, 200.0, 0.5)], false);
        assert!(!acted);
    }
}
