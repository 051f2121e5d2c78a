//! Vision-driven automation for a city-building strategy game.
//!
//! Each cycle the bot takes a screenshot, asks an object-detection model what
//! is on screen, lets a small state machine react, and otherwise hands the
//! screen to a priority-ordered task manager. Long-lived progress (tutorial
//! milestones, the build queue) lives on a per-instance ledger persisted as
//! JSON so runs can be interrupted and resumed.
//!
//! - **[`core`]**: Pure logic (detections, UI element table, ledger, build
//!   queue policy). No I/O.
//! - **[`io`]**: Side effects (config, ledger file, ADB, the detection service).
//!
//! Orchestration modules ([`device`], [`machine`], [`tasks`], [`startup`],
//! [`cycle`]) combine the two behind the `Detector`/`Transport` seams so they
//! can be driven by scripted screens in tests.

pub mod core;
pub mod cycle;
pub mod device;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod machine;
pub mod startup;
pub mod tasks;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
