//! Tracing setup for the `citybot` binary.
//!
//! Everything the bot does is reported through `tracing` events on stderr;
//! stdout is reserved for command output such as `citybot status`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "citybot=info";

/// Install the global subscriber.
///
/// Reads `RUST_LOG`; defaults to `citybot=info` if unset. Output: stderr,
/// compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=citybot=debug citybot run --cycles 10
/// ```
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    // A second call (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
