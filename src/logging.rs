//! Tracing subscriber setup for binaries, benches and tests.

use tracing_subscriber::{fmt, EnvFilter};

use crate::types::{BLinkError, Result};

/// Installs a global `fmt` subscriber filtered by `filter`, for example
/// `"blinktree=debug"` or `"blinktree::split=trace,info"`.
pub fn init_logging(filter: &str) -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_new(filter)
                .map_err(|e| BLinkError::invalid(format!("invalid log filter: {e}")))?,
        )
        .with_target(true)
        .with_thread_ids(true)
        .try_init()
        .map_err(|_| BLinkError::invalid("logging already initialized"))
}
