//! Confidence-scored observations returned by the vision collaborator.
//!
//! A [`Detection`] is created fresh for every vision call and is never
//! persisted. Callers decide how much to trust it by choosing a confidence
//! threshold per check; [`DEFAULT_MIN_CONFIDENCE`] is the baseline.

use serde::{Deserialize, Serialize};

/// Baseline confidence below which a detection is not acted upon.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.7;

/// Labels of detections that frame a text region (counters, level badges).
pub const TEXT_REGION_CLASSES: &[&str] = &[
    "power_counter",
    "gold_counter",
    "food_counter",
    "gems_counter",
    "level_indicator",
    "text_box",
];

/// Pixel margin added around a text region before cropping.
const CROP_MARGIN: f64 = 3.0;

/// Integer screen coordinate in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
        }
    }

    /// The origin is used as the "not recorded" marker in older ledgers.
    pub const fn is_origin(self) -> bool {
        self.x == 0 && self.y == 0
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Axis-aligned crop rectangle (left, top, right, bottom) in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropBox {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

/// One labeled, positioned observation.
///
/// Fields are private so the confidence invariant (always within `[0, 1]`)
/// holds for every value in circulation.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    class_name: String,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    confidence: f64,
}

impl Detection {
    /// Build a detection centred at `(x, y)`. Confidence is clamped into
    /// `[0, 1]`; a NaN score counts as zero.
    pub fn new(
        class_name: impl Into<String>,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        confidence: f64,
    ) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            class_name: class_name.into(),
            x,
            y,
            width: width.max(0.0),
            height: height.max(0.0),
            confidence,
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Tap target for this detection (its centre, truncated to pixels).
    pub fn center(&self) -> Point {
        Point::new(self.x as i32, self.y as i32)
    }

    /// True when confidence reaches [`DEFAULT_MIN_CONFIDENCE`].
    pub fn is_confident(&self) -> bool {
        self.is_confident_at(DEFAULT_MIN_CONFIDENCE)
    }

    pub fn is_confident_at(&self, min_confidence: f64) -> bool {
        self.confidence >= min_confidence
    }

    pub fn is_text_region(&self) -> bool {
        TEXT_REGION_CLASSES.contains(&self.class_name.as_str())
    }

    /// Bounding box grown by a small margin, clamped at the screen origin.
    pub fn crop_box(&self) -> CropBox {
        let half_w = self.width / 2.0;
        let half_h = self.height / 2.0;
        let clamp = |v: f64| v.max(0.0) as u32;
        CropBox {
            left: clamp(self.x - half_w - CROP_MARGIN),
            top: clamp(self.y - half_h - CROP_MARGIN),
            right: clamp(self.x + half_w + CROP_MARGIN),
            bottom: clamp(self.y + half_h + CROP_MARGIN),
        }
    }
}

/// First detection labeled `class_name` at or above `min_confidence`.
pub fn find_class<'a>(
    detections: &'a [Detection],
    class_name: &str,
    min_confidence: f64,
) -> Option<&'a Detection> {
    detections
        .iter()
        .find(|d| d.class_name == class_name && d.is_confident_at(min_confidence))
}

/// Highest-confidence detection labeled `class_name` at or above `min_confidence`.
pub fn best_of_class<'a>(
    detections: &'a [Detection],
    class_name: &str,
    min_confidence: f64,
) -> Option<&'a Detection> {
    detections
        .iter()
        .filter(|d| d.class_name == class_name && d.is_confident_at(min_confidence))
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
}
