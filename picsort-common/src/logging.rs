//! Logging bootstrap
//!
//! Installs a `tracing_subscriber` fmt subscriber. `RUST_LOG` takes precedence
//! over the configured level so individual modules can be turned up ad hoc.

use tracing_subscriber::EnvFilter;

use crate::{Error, Result};

/// Build the filter used by [`init`]
pub fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the global subscriber
///
/// Fails if a global subscriber is already installed.
pub fn init(level: &str) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(build_filter(level))
        .with_target(false)
        .try_init()
        .map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {}", e)))
}

