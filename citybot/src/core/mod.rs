//! Deterministic, pure logic shared by the bot.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures (detections, the progress ledger, the build queue) and
//! take the current time as an argument, so every rule is testable in
//! isolation.

pub mod build_queue;
pub mod detection;
pub mod elements;
pub mod ledger;
pub mod view;
