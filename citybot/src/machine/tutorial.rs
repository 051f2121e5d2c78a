//! Tutorial walkthrough.
//!
//! The tutorial is a scripted sequence of highlighted targets, counselor
//! dialogs and banners. It is handled reactively: each cycle looks at the
//! current screen and performs the single most relevant tap. Completion is a
//! two-step handshake recorded on the ledger (the "upgrade complete" banner,
//! then the final highlighted target), with two alternate terminal screens.
//!
//! Counters that only matter within one process run (stuck detection,
//! civilization scrolling) live on [`TutorialHandler`]; everything that must
//! survive a restart lives on the ledger.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::core::detection::{Detection, Point, find_class};
use crate::core::elements::{
    NOTIFICATION_CENTER, SCREEN_CENTER, UiElement, best, find, is_civilization, present,
    selected_label,
};
use crate::core::ledger::InstanceLedger;
use crate::device::{Device, LONG_SETTLE_MS, SETTLE_MS, SHORT_SETTLE_MS};

/// Same screen for this many cycles in a row means the script is stuck.
const STUCK_PHASE_CYCLES: u32 = 20;
/// Cycles without any tap before a blind dismiss tap.
const STUCK_IDLE_CYCLES: u32 = 30;
/// Random recovery taps land in this square.
const RECOVERY_MIN: i32 = 200;
const RECOVERY_MAX: i32 = 400;

/// Civilization icons are small and often partially occluded.
const CIVILIZATION_MIN_CONFIDENCE: f64 = 0.5;
/// A selection screen shows at least this many civilizations.
const CIVILIZATION_SCREEN_MIN: usize = 3;
const MAX_CIVILIZATION_SCROLLS: u32 = 5;
const SCROLL_DURATION_MS: u64 = 300;

/// Result of one tutorial step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TutorialOutcome {
    /// Nothing on screen warranted a tap.
    Idle,
    Acted,
    /// The tutorial is over; the ledger says so.
    Completed,
}

/// Coarse classification of a tutorial screen, for stuck detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Blank,
    CivilizationSelect,
    Banner,
    Target,
    Arrow,
    Dialog,
    Other,
}

impl Phase {
    fn classify(detections: &[Detection]) -> Self {
        if !detections.iter().any(Detection::is_confident) {
            Phase::Blank
        } else if civilization_count(detections) >= CIVILIZATION_SCREEN_MIN {
            Phase::CivilizationSelect
        } else if present(detections, UiElement::UpgradeComplete)
            || present(detections, UiElement::NewFeatureUnlock)
        {
            Phase::Banner
        } else if present(detections, UiElement::ClickTarget) {
            Phase::Target
        } else if present(detections, UiElement::ClickArrow) {
            Phase::Arrow
        } else if present(detections, UiElement::CounselorBubble)
            || present(detections, UiElement::SkipButton)
            || present(detections, UiElement::ConfirmButton)
        {
            Phase::Dialog
        } else {
            Phase::Other
        }
    }
}

pub struct TutorialHandler {
    preferred_civilization: String,
    last_phase: Option<Phase>,
    same_phase_cycles: u32,
    idle_cycles: u32,
    scroll_attempts: u32,
    rng: StdRng,
}

impl TutorialHandler {
    pub fn new(preferred_civilization: impl Into<String>) -> Self {
        Self::with_rng(preferred_civilization, StdRng::from_entropy())
    }

    /// Deterministic recovery taps, for tests.
    pub fn with_seed(preferred_civilization: impl Into<String>, seed: u64) -> Self {
        Self::with_rng(preferred_civilization, StdRng::seed_from_u64(seed))
    }

    fn with_rng(preferred_civilization: impl Into<String>, rng: StdRng) -> Self {
        Self {
            preferred_civilization: preferred_civilization.into().to_lowercase(),
            last_phase: None,
            same_phase_cycles: 0,
            idle_cycles: 0,
            scroll_attempts: 0,
            rng,
        }
    }

    /// Handle one tutorial screen.
    pub fn step(
        &mut self,
        device: &Device<'_>,
        detections: &[Detection],
        ledger: &mut InstanceLedger,
    ) -> TutorialOutcome {
        let outcome = self.step_inner(device, detections, ledger);
        match outcome {
            TutorialOutcome::Idle => self.idle_cycles += 1,
            TutorialOutcome::Acted => self.idle_cycles = 0,
            TutorialOutcome::Completed => {
                info!(device = device.id(), "tutorial completed");
                self.reset_counters();
            }
        }
        outcome
    }

    fn reset_counters(&mut self) {
        self.last_phase = None;
        self.same_phase_cycles = 0;
        self.idle_cycles = 0;
        self.scroll_attempts = 0;
    }

    fn step_inner(
        &mut self,
        device: &Device<'_>,
        detections: &[Detection],
        ledger: &mut InstanceLedger,
    ) -> TutorialOutcome {
        if ledger.tutorial_upgrade_complete_clicked && ledger.tutorial_final_arrow_clicked {
            ledger.complete_tutorial();
            return TutorialOutcome::Completed;
        }
        if present(detections, UiElement::TutorialComplete) {
            ledger.complete_tutorial();
            return TutorialOutcome::Completed;
        }

        if let Some(outcome) = self.recover_if_stuck(device, detections) {
            return outcome;
        }

        // Final handshake step: the target shown after the upgrade banner.
        if ledger.tutorial_upgrade_complete_clicked
            && let Some(target) = best(detections, UiElement::ClickTarget)
            && device.tap_detection(target)
        {
            ledger.mark_final_arrow_clicked();
            device.settle(SETTLE_MS);
            return TutorialOutcome::Completed;
        }

        if present(detections, UiElement::UpgradeComplete) && device.tap(NOTIFICATION_CENTER) {
            ledger.mark_upgrade_complete_clicked();
            debug!("upgrade-complete banner acknowledged");
            device.settle(SETTLE_MS);
            return TutorialOutcome::Acted;
        }

        if is_terminal_build_prompt(detections)
            && let Some(confirm) = find(detections, UiElement::BuildConfirm)
            && device.tap_detection(confirm)
        {
            ledger.complete_tutorial();
            device.settle(LONG_SETTLE_MS);
            return TutorialOutcome::Completed;
        }

        for element in [UiElement::SkipButton, UiElement::CounselorBubble] {
            if let Some(hit) = find(detections, element)
                && device.tap_detection(hit)
            {
                device.settle(SETTLE_MS);
                return TutorialOutcome::Acted;
            }
        }

        if civilization_count(detections) >= CIVILIZATION_SCREEN_MIN {
            return self.select_civilization(device, detections);
        }

        if present(detections, UiElement::NewFeatureUnlock) && device.tap(NOTIFICATION_CENTER) {
            device.settle(SETTLE_MS);
            return TutorialOutcome::Acted;
        }

        if let Some(confirm) = find(detections, UiElement::ConfirmButton)
            && device.tap_detection(confirm)
        {
            device.settle(SETTLE_MS);
            return TutorialOutcome::Acted;
        }

        if let Some(target) = best(detections, UiElement::ClickTarget)
            && device.tap_detection(target)
        {
            device.settle(SETTLE_MS);
            return TutorialOutcome::Acted;
        }

        if present(detections, UiElement::ClickArrow) && device.tap(SCREEN_CENTER) {
            device.settle(SHORT_SETTLE_MS);
            return TutorialOutcome::Acted;
        }

        TutorialOutcome::Idle
    }

    /// Blind taps when the same screen keeps coming back or nothing matches.
    fn recover_if_stuck(
        &mut self,
        device: &Device<'_>,
        detections: &[Detection],
    ) -> Option<TutorialOutcome> {
        let phase = Phase::classify(detections);
        if self.last_phase == Some(phase) {
            self.same_phase_cycles += 1;
        } else {
            self.last_phase = Some(phase);
            self.same_phase_cycles = 1;
        }

        if self.same_phase_cycles > STUCK_PHASE_CYCLES {
            let point = Point::new(
                self.rng.gen_range(RECOVERY_MIN..=RECOVERY_MAX),
                self.rng.gen_range(RECOVERY_MIN..=RECOVERY_MAX),
            );
            warn!(
                phase = ?phase,
                cycles = self.same_phase_cycles,
                %point,
                "tutorial stuck on one screen, random tap"
            );
            self.same_phase_cycles = 0;
            let tapped = device.tap(point);
            device.settle(SETTLE_MS);
            return Some(if tapped {
                TutorialOutcome::Acted
            } else {
                TutorialOutcome::Idle
            });
        }

        if self.idle_cycles > STUCK_IDLE_CYCLES {
            warn!(cycles = self.idle_cycles, "tutorial idle too long, dismiss tap");
            self.idle_cycles = 0;
            let tapped = device.tap(NOTIFICATION_CENTER);
            device.settle(SETTLE_MS);
            return Some(if tapped {
                TutorialOutcome::Acted
            } else {
                TutorialOutcome::Idle
            });
        }
        None
    }

    fn select_civilization(
        &mut self,
        device: &Device<'_>,
        detections: &[Detection],
    ) -> TutorialOutcome {
        let preferred = self.preferred_civilization.as_str();

        let selected = selected_label(preferred);
        if find_class(detections, &selected, CIVILIZATION_MIN_CONFIDENCE).is_some()
            && let Some(confirm) = find(detections, UiElement::ConfirmButton)
            && device.tap_detection(confirm)
        {
            info!(civilization = preferred, "civilization confirmed");
            self.scroll_attempts = 0;
            device.settle(LONG_SETTLE_MS);
            return TutorialOutcome::Acted;
        }

        if let Some(civ) = find_class(detections, preferred, CIVILIZATION_MIN_CONFIDENCE)
            && device.tap_detection(civ)
        {
            debug!(civilization = preferred, "preferred civilization tapped");
            device.settle(SETTLE_MS);
            return TutorialOutcome::Acted;
        }

        if self.scroll_attempts >= MAX_CIVILIZATION_SCROLLS {
            warn!(
                civilization = preferred,
                attempts = self.scroll_attempts,
                "preferred civilization not found after scrolling"
            );
            self.scroll_attempts = 0;
            return TutorialOutcome::Idle;
        }

        let (Some(rightmost), Some(leftmost)) = (
            civilizations(detections).max_by(|a, b| a.x().total_cmp(&b.x())),
            civilizations(detections).min_by(|a, b| a.x().total_cmp(&b.x())),
        ) else {
            return TutorialOutcome::Idle;
        };
        self.scroll_attempts += 1;
        debug!(attempt = self.scroll_attempts, "scrolling civilization list");
        if device.swipe(rightmost.center(), leftmost.center(), SCROLL_DURATION_MS) {
            device.settle(SETTLE_MS);
            TutorialOutcome::Acted
        } else {
            TutorialOutcome::Idle
        }
    }
}

fn civilizations(detections: &[Detection]) -> impl Iterator<Item = &Detection> {
    detections
        .iter()
        .filter(|d| is_civilization(d.class_name()) && d.is_confident_at(CIVILIZATION_MIN_CONFIDENCE))
}

fn civilization_count(detections: &[Detection]) -> usize {
    civilizations(detections).count()
}

/// Alternate end of the tutorial: the archery-range build prompt with no
/// highlighted guidance left on screen.
fn is_terminal_build_prompt(detections: &[Detection]) -> bool {
    present(detections, UiElement::BuildArcheryRange)
        && present(detections, UiElement::BuildConfirm)
        && present(detections, UiElement::BuildReject)
        && !present(detections, UiElement::ClickArrow)
        && !present(detections, UiElement::ClickTarget)
}
