//! Stable exit codes for citybot CLI commands.

/// Command succeeded (including a run stopped by Ctrl-C).
pub const OK: i32 = 0;
/// Invalid config or ledger, unknown instance, or another I/O error.
pub const INVALID: i32 = 1;
/// `citybot run` gave up on the tutorial before it completed.
pub const TUTORIAL_INCOMPLETE: i32 = 2;
/// `citybot run` could not finish the one-time startup tasks.
pub const STARTUP_FAILED: i32 = 3;
