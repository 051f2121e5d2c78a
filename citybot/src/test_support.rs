//! Test-only fakes for the device collaborators and deterministic builders.

use std::cell::RefCell;
use std::collections::VecDeque;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};

use crate::core::detection::{Detection, Point};
use crate::io::ledger_store::{DEFAULT_LEDGER_FILE, LedgerStore};
use crate::io::transport::Transport;
use crate::io::vision::Detector;

/// Detection centred at `(x, y)` with a fixed 20x20 box.
pub fn det(label: &str, x: f64, y: f64, confidence: f64) -> Detection {
    Detection::new(label, x, y, 20.0, 20.0, confidence)
}

/// Fixed reference instant for clock-dependent tests.
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_default()
}

/// Ledger store rooted in a fresh temp directory. Keep the guard alive.
pub fn temp_store() -> (tempfile::TempDir, LedgerStore) {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = LedgerStore::new(temp.path().join(DEFAULT_LEDGER_FILE));
    (temp, store)
}

/// Detector that replays scripted screens in order.
///
/// Once the script runs out it returns the fallback screen (empty unless
/// built with [`ScriptedDetector::repeating`] or [`ScriptedDetector::then`]).
#[derive(Debug, Default)]
pub struct ScriptedDetector {
    frames: RefCell<VecDeque<Vec<Detection>>>,
    fallback: Vec<Detection>,
    fail: bool,
    calls: RefCell<usize>,
}

impl ScriptedDetector {
    pub fn new(frames: Vec<Vec<Detection>>) -> Self {
        Self {
            frames: RefCell::new(frames.into()),
            ..Self::default()
        }
    }

    /// The same screen forever.
    pub fn repeating(frame: Vec<Detection>) -> Self {
        Self {
            fallback: frame,
            ..Self::default()
        }
    }

    /// Every call errors, as an unreachable inference service would.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Screen returned once the scripted frames are used up.
    pub fn then(mut self, fallback: Vec<Detection>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn calls(&self) -> usize {
        *self.calls.borrow()
    }
}

impl Detector for ScriptedDetector {
    fn detect(&self, _device_id: &str) -> Result<Vec<Detection>> {
        *self.calls.borrow_mut() += 1;
        if self.fail {
            return Err(anyhow!("scripted detector failure"));
        }
        Ok(self
            .frames
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gesture {
    Tap(Point),
    Swipe { from: Point, to: Point, duration_ms: u64 },
}

/// Transport that records gestures instead of sending them.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    gestures: RefCell<Vec<Gesture>>,
    fail: bool,
}

impl RecordingTransport {
    /// Every gesture errors, as a disconnected device would.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn gestures(&self) -> Vec<Gesture> {
        self.gestures.borrow().clone()
    }

    pub fn taps(&self) -> Vec<Point> {
        self.gestures
            .borrow()
            .iter()
            .filter_map(|g| match g {
                Gesture::Tap(p) => Some(*p),
                Gesture::Swipe { .. } => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.gestures.borrow_mut().clear();
    }
}

impl Transport for RecordingTransport {
    fn tap(&self, _device_id: &str, point: Point) -> Result<()> {
        if self.fail {
            return Err(anyhow!("scripted tap failure"));
        }
        self.gestures.borrow_mut().push(Gesture::Tap(point));
        Ok(())
    }

    fn swipe(&self, _device_id: &str, from: Point, to: Point, duration_ms: u64) -> Result<()> {
        if self.fail {
            return Err(anyhow!("scripted swipe failure"));
        }
        self.gestures.borrow_mut().push(Gesture::Swipe {
            from,
            to,
            duration_ms,
        });
        Ok(())
    }
}
