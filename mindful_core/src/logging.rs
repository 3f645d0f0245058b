//! Logging infrastructure for Mindful.
//!
//! Provides centralized tracing setup for the CLI and for tests.

use crate::{Error, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize logging with sensible defaults
///
/// Filtering comes from RUST_LOG, defaulting to WARN. Output is compact and
/// goes to stderr so prompts on stdout stay readable.
pub fn init() -> Result<()> {
    init_with_level("warn")
}

/// Initialize logging with a specific default level
///
/// RUST_LOG still takes precedence. Fails if a global subscriber is already
/// installed.
pub fn init_with_level(default_level: &str) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| Error::Other(format!("logging already initialized: {}", e)))
}

/// Initialize logging for testing (captures logs for test output)
#[cfg(test)]
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::new("debug"))
        .try_init();
}
