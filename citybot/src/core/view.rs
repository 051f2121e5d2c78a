//! Coarse "where is the camera" label derived from a detection list.

use crate::core::detection::Detection;
use crate::core::elements::{UiElement, present};

/// Last-known game view. Carried alongside the detections of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GameView {
    #[default]
    Unknown,
    City,
    Map,
}

impl GameView {
    /// City wins when both markers are visible (the map marker lingers during
    /// the zoom-in animation).
    pub fn from_detections(detections: &[Detection]) -> Self {
        if present(detections, UiElement::InCity) {
            GameView::City
        } else if present(detections, UiElement::OnMap) {
            GameView::Map
        } else {
            GameView::Unknown
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GameView::Unknown => "unknown",
            GameView::City => "city",
            GameView::Map => "map",
        }
    }
}

impl std::fmt::Display for GameView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
