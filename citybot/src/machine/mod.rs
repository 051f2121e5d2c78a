//! Game state machine.
//!
//! Tracks which broad screen the game is on and performs the state's
//! reaction to the latest detections. The machine owns the instance ledger
//! for the duration of a run, together with the detections and view label
//! of the current cycle, so tasks can borrow all three through
//! [`GameStateMachine::task_context`].

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::core::detection::{Detection, Point};
use crate::core::elements::{HOME_BUTTON, TUTORIAL_TRIGGERS, UiElement, find, present};
use crate::core::ledger::InstanceLedger;
use crate::core::view::GameView;
use crate::device::{Device, LONG_SETTLE_MS, SETTLE_MS};
use crate::tasks::TaskContext;

pub mod tutorial;

use tutorial::{TutorialHandler, TutorialOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    Unknown,
    Tutorial,
    CityView,
    MapView,
}

impl std::fmt::Display for ViewState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ViewState::Unknown => "unknown",
            ViewState::Tutorial => "tutorial",
            ViewState::CityView => "city_view",
            ViewState::MapView => "map_view",
        };
        f.write_str(name)
    }
}

pub struct GameStateMachine {
    state: ViewState,
    ledger: InstanceLedger,
    detections: Vec<Detection>,
    game_view: GameView,
    tutorial: TutorialHandler,
}

impl GameStateMachine {
    pub fn new(ledger: InstanceLedger, tutorial: TutorialHandler) -> Self {
        Self {
            state: ViewState::Unknown,
            ledger,
            detections: Vec::new(),
            game_view: GameView::Unknown,
            tutorial,
        }
    }

    pub fn state(&self) -> ViewState {
        self.state
    }

    pub fn ledger(&self) -> &InstanceLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut InstanceLedger {
        &mut self.ledger
    }

    pub fn into_ledger(self) -> InstanceLedger {
        self.ledger
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn game_view(&self) -> GameView {
        self.game_view
    }

    pub fn transition_to(&mut self, next: ViewState) {
        if self.state != next {
            info!(from = %self.state, to = %next, "state transition");
            self.state = next;
        }
    }

    /// Record a new screen without reacting to it.
    pub fn observe(&mut self, detections: Vec<Detection>) {
        self.game_view = GameView::from_detections(&detections);
        self.detections = detections;
    }

    /// React to one screen. Returns whether an action was taken.
    ///
    /// Precedence: an unfinished tutorial pre-empts everything; then feature
    /// banners are dismissed; then an unknown state is resolved from the
    /// view label (which counts as an action); finally the current state's
    /// behaviour runs.
    pub fn update(&mut self, device: &Device<'_>, detections: Vec<Detection>) -> bool {
        self.observe(detections);

        if !self.ledger.tutorial_completed
            && TUTORIAL_TRIGGERS
                .iter()
                .any(|element| present(&self.detections, *element))
        {
            self.transition_to(ViewState::Tutorial);
            return self.execute(device);
        }

        if present(&self.detections, UiElement::NewFeatureUnlock) && device.tap(HOME_BUTTON) {
            debug!("feature banner dismissed");
            device.settle(SETTLE_MS);
            return true;
        }

        let resolved = self.state == ViewState::Unknown && self.resolve_from_view();
        let acted = self.execute(device);
        resolved || acted
    }

    /// Run the tutorial behaviour regardless of the current screen.
    pub fn run_tutorial_step(&mut self, device: &Device<'_>, detections: Vec<Detection>) -> bool {
        self.observe(detections);
        self.transition_to(ViewState::Tutorial);
        self.execute(device)
    }

    fn resolve_from_view(&mut self) -> bool {
        match self.game_view {
            GameView::City => {
                self.transition_to(ViewState::CityView);
                true
            }
            GameView::Map => {
                self.transition_to(ViewState::MapView);
                true
            }
            GameView::Unknown => false,
        }
    }

    fn execute(&mut self, device: &Device<'_>) -> bool {
        match self.state {
            ViewState::Unknown => {
                if self.resolve_from_view() {
                    return true;
                }
                let tapped = device.tap(HOME_BUTTON);
                if tapped {
                    device.settle(LONG_SETTLE_MS);
                }
                tapped
            }
            ViewState::Tutorial => {
                if self.ledger.tutorial_completed {
                    self.transition_to(ViewState::CityView);
                    return false;
                }
                match self
                    .tutorial
                    .step(device, &self.detections, &mut self.ledger)
                {
                    TutorialOutcome::Completed => {
                        self.transition_to(ViewState::CityView);
                        true
                    }
                    TutorialOutcome::Acted => true,
                    TutorialOutcome::Idle => false,
                }
            }
            ViewState::CityView => {
                if self.game_view == GameView::Map {
                    self.transition_to(ViewState::MapView);
                }
                false
            }
            ViewState::MapView => {
                if self.game_view == GameView::City {
                    self.transition_to(ViewState::CityView);
                    return false;
                }
                let button: Option<Point> =
                    find(&self.detections, UiElement::ReturnToCity).map(Detection::center);
                match button {
                    Some(point) if device.tap(point) => {
                        device.settle(LONG_SETTLE_MS);
                        self.transition_to(ViewState::CityView);
                        true
                    }
                    _ => false,
                }
            }
        }
    }

    /// Borrow the cycle's state for the task manager.
    pub fn task_context<'a>(
        &'a mut self,
        device: &'a Device<'a>,
        now: DateTime<Utc>,
    ) -> TaskContext<'a> {
        TaskContext {
            device,
            game_view: self.game_view,
            detections: &self.detections,
            ledger: &mut self.ledger,
            now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::elements::NOTIFICATION_CENTER;
    use crate::device::Pacing;
    use crate::test_support::{RecordingTransport, ScriptedDetector, det};

    fn machine(tutorial_done: bool) -> GameStateMachine {
        let mut ledger = InstanceLedger::new("instance1", "dev");
        if tutorial_done {
            ledger.complete_tutorial();
        }
        GameStateMachine::new(ledger, TutorialHandler::with_seed("china", 1))
    }

    #[test]
    fn unknown_resolves_to_city_with_action_on_same_cycle() {
        let detector = ScriptedDetector::default();
        let transport = RecordingTransport::default();
        let device = Device::new("dev", &detector, &transport).with_pacing(Pacing::Instant);
        let mut sm = machine(true);

        assert!(sm.update(&device, vec![det("in_city", 320.0, 20.0, 0.9)]));
        assert_eq!(sm.state(), ViewState::CityView);
        assert!(transport.gestures().is_empty());

        // Already resolved: the city view itself takes no action.
        assert!(!sm.update(&device, vec![det("in_city", 320.0, 20.0, 0.9)]));
    }

    #[test]
    fn unknown_without_view_marker_taps_home() {
        let detector = ScriptedDetector::default();
        let transport = RecordingTransport::default();
        let device = Device::new("dev", &detector, &transport).with_pacing(Pacing::Instant);
        let mut sm = machine(true);

        assert!(sm.update(&device, Vec::new()));
        assert_eq!(sm.state(), ViewState::Unknown);
        assert_eq!(transport.taps(), vec![HOME_BUTTON]);
    }

    #[test]
    fn tutorial_trigger_preempts_city_view() {
        let detector = ScriptedDetector::default();
        let transport = RecordingTransport::default();
        let device = Device::new("dev", &detector, &transport).with_pacing(Pacing::Instant);
        let mut sm = machine(false);
        sm.transition_to(ViewState::CityView);

        let acted = sm.update(
            &device,
            vec![det("in_city", 320.0, 20.0, 0.9), det("click_arrow", 5.0, 5.0, 0.8)],
        );
        assert!(acted);
        assert_eq!(sm.state(), ViewState::Tutorial);
    }

    #[test]
    fn low_confidence_trigger_does_not_force_tutorial() {
        let detector = ScriptedDetector::default();
        let transport = RecordingTransport::default();
        let device = Device::new("dev", &detector, &transport).with_pacing(Pacing::Instant);
        let mut sm = machine(false);

        sm.update(
            &device,
            vec![det("in_city", 320.0, 20.0, 0.9), det("click_arrow", 5.0, 5.0, 0.3)],
        );
        assert_eq!(sm.state(), ViewState::CityView);
    }

    #[test]
    fn completed_tutorial_ignores_triggers() {
        let detector = ScriptedDetector::default();
        let transport = RecordingTransport::default();
        let device = Device::new("dev", &detector, &transport).with_pacing(Pacing::Instant);
        let mut sm = machine(true);
        sm.transition_to(ViewState::CityView);

        assert!(!sm.update(
            &device,
            vec![det("in_city", 320.0, 20.0, 0.9), det("click_target", 5.0, 5.0, 0.9)],
        ));
        assert_eq!(sm.state(), ViewState::CityView);
    }

    #[test]
    fn tutorial_handshake_across_two_cycles() {
        let detector = ScriptedDetector::default();
        let transport = RecordingTransport::default();
        let device = Device::new("dev", &detector, &transport).with_pacing(Pacing::Instant);
        let mut sm = machine(false);

        assert!(sm.update(&device, vec![det("upgrade_complete", 300.0, 300.0, 0.9)]));
        assert!(sm.ledger().tutorial_upgrade_complete_clicked);
        assert!(!sm.ledger().tutorial_completed);

        assert!(sm.update(&device, vec![det("click_target", 140.0, 260.0, 0.9)]));
        assert!(sm.ledger().tutorial_final_arrow_clicked);
        assert!(sm.ledger().tutorial_completed);
        assert_eq!(sm.state(), ViewState::CityView);
        assert_eq!(
            transport.taps(),
            vec![NOTIFICATION_CENTER, Point::new(140, 260)]
        );
    }

    #[test]
    fn feature_banner_is_dismissed_with_home_tap() {
        let detector = ScriptedDetector::default();
        let transport = RecordingTransport::default();
        let device = Device::new("dev", &detector, &transport).with_pacing(Pacing::Instant);
        let mut sm = machine(true);

        assert!(sm.update(&device, vec![det("new_feature_unlock", 320.0, 240.0, 0.9)]));
        assert_eq!(transport.taps(), vec![HOME_BUTTON]);
    }

    #[test]
    fn map_view_returns_to_city() {
        let detector = ScriptedDetector::default();
        let transport = RecordingTransport::default();
        let device = Device::new("dev", &detector, &transport).with_pacing(Pacing::Instant);
        let mut sm = machine(true);

        assert!(sm.update(&device, vec![det("on_map", 320.0, 20.0, 0.9)]));
        assert_eq!(sm.state(), ViewState::MapView);

        let screen = vec![
            det("on_map", 320.0, 20.0, 0.9),
            det("return_to_city_button", 40.0, 440.0, 0.85),
        ];
        assert!(sm.update(&device, screen));
        assert_eq!(sm.state(), ViewState::CityView);
        assert_eq!(transport.taps(), vec![Point::new(40, 440)]);
    }

    #[test]
    fn task_context_exposes_cycle_state() {
        let detector = ScriptedDetector::default();
        let transport = RecordingTransport::default();
        let device = Device::new("dev", &detector, &transport).with_pacing(Pacing::Instant);
        let mut sm = machine(true);
        sm.update(&device, vec![det("in_city", 320.0, 20.0, 0.9)]);

        let ctx = sm.task_context(&device, crate::test_support::fixed_now());
        assert_eq!(ctx.game_view, GameView::City);
        assert_eq!(ctx.detections.len(), 1);
        assert_eq!(ctx.ledger.id, "instance1");
    }
}
