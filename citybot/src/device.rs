//! One device as seen by the bot: detections in, gestures out.
//!
//! [`Device`] binds a device id to a [`Detector`] and a [`Transport`] and
//! absorbs their failures. A failed gesture is logged and reported as
//! `false`; a failed detection is logged and reported as an empty screen.
//! Nothing here aborts a cycle.

use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::core::detection::{Detection, Point};
use crate::core::elements::{
    BLOCKING_INTERSTITIALS, HOME_BUTTON, INTERSTITIAL_MIN_CONFIDENCE, SCREEN_CENTER, UiElement,
    find, find_at, present,
};
use crate::core::view::GameView;
use crate::io::transport::Transport;
use crate::io::vision::Detector;

/// Wait after a gesture that only opens or closes a small widget.
pub const SHORT_SETTLE_MS: u64 = 500;
/// Wait after a gesture that opens a dialog or moves the camera.
pub const SETTLE_MS: u64 = 1000;
/// Wait after a gesture that triggers a long animation.
pub const LONG_SETTLE_MS: u64 = 2000;

/// Screenshots taken while clearing overlays before giving up.
const MAX_CLEANUP_ROUNDS: u32 = 4;

/// Whether animation waits actually sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    Realtime,
    /// No sleeping; used by tests and dry runs against scripted screens.
    Instant,
}

pub struct Device<'a> {
    id: String,
    detector: &'a dyn Detector,
    transport: &'a dyn Transport,
    pacing: Pacing,
}

impl<'a> Device<'a> {
    pub fn new(id: impl Into<String>, detector: &'a dyn Detector, transport: &'a dyn Transport) -> Self {
        Self {
            id: id.into(),
            detector,
            transport,
            pacing: Pacing::Realtime,
        }
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// Same device and transport, observed through another model.
    pub fn with_detector(&self, detector: &'a dyn Detector) -> Device<'a> {
        Device {
            id: self.id.clone(),
            detector,
            transport: self.transport,
            pacing: self.pacing,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tap(&self, point: Point) -> bool {
        match self.transport.tap(&self.id, point) {
            Ok(()) => {
                debug!(device = %self.id, x = point.x, y = point.y, "tap");
                true
            }
            Err(err) => {
                warn!(device = %self.id, x = point.x, y = point.y, err = %format!("{err:#}"), "tap failed");
                false
            }
        }
    }

    pub fn tap_detection(&self, detection: &Detection) -> bool {
        debug!(class = detection.class_name(), confidence = detection.confidence(), "tapping detection");
        self.tap(detection.center())
    }

    pub fn swipe(&self, from: Point, to: Point, duration_ms: u64) -> bool {
        match self.transport.swipe(&self.id, from, to, duration_ms) {
            Ok(()) => true,
            Err(err) => {
                warn!(device = %self.id, %from, %to, err = %format!("{err:#}"), "swipe failed");
                false
            }
        }
    }

    pub fn press_home(&self) -> bool {
        self.tap(HOME_BUTTON)
    }

    /// Let the game finish an animation.
    pub fn settle(&self, millis: u64) {
        if self.pacing == Pacing::Realtime {
            thread::sleep(Duration::from_millis(millis));
        }
    }

    /// One detection pass with no clean-up. Errors become an empty screen.
    pub fn capture(&self) -> Vec<Detection> {
        match self.detector.detect(&self.id) {
            Ok(detections) => detections,
            Err(err) => {
                warn!(device = %self.id, err = %format!("{err:#}"), "detection failed");
                Vec::new()
            }
        }
    }

    /// Detections for the current screen after dismissing overlays that
    /// would swallow the next tap (alliance invites, help bubbles, ripe
    /// resource icons). Gives up after a few rounds and returns the last
    /// screen as seen.
    pub fn detect(&self) -> Vec<Detection> {
        let mut detections = Vec::new();
        for round in 1..=MAX_CLEANUP_ROUNDS {
            detections = self.capture();
            let Some((label, point)) = overlay_tap(&detections) else {
                return detections;
            };
            debug!(round, overlay = label, "dismissing overlay");
            self.tap(point);
            self.settle(SETTLE_MS);
        }
        detections
    }

    /// Bring the camera back to the default city view: leave build mode,
    /// close dialogs, toggle home, and verify.
    pub fn reset_view(&self) {
        let detections = self.capture();
        if present(&detections, UiElement::InBuildMenu) {
            self.tap(SCREEN_CENTER);
            self.settle(SETTLE_MS);
        }
        if let Some(exit) = find(&detections, UiElement::ExitDialog) {
            self.tap_detection(exit);
            self.settle(SETTLE_MS);
        }
        let home_taps = if GameView::from_detections(&detections) == GameView::Map {
            1
        } else {
            2
        };
        for _ in 0..home_taps {
            self.press_home();
            self.settle(LONG_SETTLE_MS);
        }
        let after = self.capture();
        if !present(&after, UiElement::InCity) {
            debug!(device = %self.id, "city marker missing after reset, toggling home");
            self.press_home();
            self.settle(LONG_SETTLE_MS);
        }
    }
}

/// Tap that dismisses the most pressing overlay, if any.
fn overlay_tap(detections: &[Detection]) -> Option<(&'static str, Point)> {
    let invite_exit = present(detections, UiElement::AllianceInvite)
        .then(|| find_at(detections, UiElement::ExitDialog, INTERSTITIAL_MIN_CONFIDENCE))
        .flatten();
    if let Some(exit) = invite_exit {
        return Some(("alliance_invite", exit.center()));
    }
    BLOCKING_INTERSTITIALS.iter().find_map(|element| {
        find(detections, *element).map(|d| (element.aliases()[0], d.center()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Gesture, RecordingTransport, ScriptedDetector, det};

    #[test]
    fn overlay_priority_prefers_invite_then_help_bubble() {
        let screen = vec![
            det("farm_clickable", 50.0, 60.0, 0.9),
            det("help_chat_bubble", 10.0, 20.0, 0.5),
        ];
        assert_eq!(overlay_tap(&screen), Some(("help_chat_bubble", Point::new(10, 20))));

        let screen = vec![
            det("help_chat_bubble", 10.0, 20.0, 0.9),
            det("alliance_invite_join", 300.0, 200.0, 0.45),
            det("exit_dialog_button", 600.0, 40.0, 0.45),
        ];
        assert_eq!(overlay_tap(&screen), Some(("alliance_invite", Point::new(600, 40))));
    }

    #[test]
    fn detect_clears_overlays_before_returning() {
        let detector = ScriptedDetector::new(vec![
            vec![det("help_chat_bubble", 10.0, 20.0, 0.8)],
            vec![det("in_city", 320.0, 20.0, 0.9)],
        ]);
        let transport = RecordingTransport::default();
        let device = Device::new("dev", &detector, &transport).with_pacing(Pacing::Instant);

        let detections = device.detect();
        assert_eq!(detections[0].class_name(), "in_city");
        assert_eq!(transport.gestures(), vec![Gesture::Tap(Point::new(10, 20))]);
    }

    #[test]
    fn detect_gives_up_after_bounded_rounds() {
        let bubble = vec![det("help_chat_bubble", 10.0, 20.0, 0.8)];
        let detector = ScriptedDetector::repeating(bubble);
        let transport = RecordingTransport::default();
        let device = Device::new("dev", &detector, &transport).with_pacing(Pacing::Instant);

        let detections = device.detect();
        assert_eq!(detections.len(), 1);
        assert_eq!(transport.taps().len(), MAX_CLEANUP_ROUNDS as usize);
    }

    #[test]
    fn detector_errors_become_empty_screen() {
        let detector = ScriptedDetector::failing();
        let transport = RecordingTransport::default();
        let device = Device::new("dev", &detector, &transport).with_pacing(Pacing::Instant);
        assert!(device.detect().is_empty());
    }

    #[test]
    fn failed_tap_reports_false() {
        let detector = ScriptedDetector::new(Vec::new());
        let transport = RecordingTransport::failing();
        let device = Device::new("dev", &detector, &transport).with_pacing(Pacing::Instant);
        assert!(!device.tap(Point::new(1, 2)));
    }

    #[test]
    fn reset_view_from_map_uses_single_home_tap() {
        let detector = ScriptedDetector::new(vec![
            vec![det("on_map", 320.0, 20.0, 0.9)],
            vec![det("in_city", 320.0, 20.0, 0.9)],
        ]);
        let transport = RecordingTransport::default();
        let device = Device::new("dev", &detector, &transport).with_pacing(Pacing::Instant);
        device.reset_view();
        assert_eq!(transport.taps(), vec![HOME_BUTTON]);
    }

    #[test]
    fn reset_view_leaves_build_mode_and_dialogs() {
        let detector = ScriptedDetector::new(vec![
            vec![
                det("in_build", 320.0, 20.0, 0.9),
                det("exit_dialog_button", 600.0, 40.0, 0.9),
            ],
            Vec::new(),
        ]);
        let transport = RecordingTransport::default();
        let device = Device::new("dev", &detector, &transport).with_pacing(Pacing::Instant);
        device.reset_view();
        assert_eq!(
            transport.taps(),
            vec![
                SCREEN_CENTER,
                Point::new(600, 40),
                HOME_BUTTON,
                HOME_BUTTON,
                HOME_BUTTON
            ]
        );
    }
}
