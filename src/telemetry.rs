//! Tracing subscriber setup

use crate::config::TelemetryConfig;
use crate::error::{Error, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Build the filter: `RUST_LOG` wins over the configured level
pub fn env_filter(config: &TelemetryConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| Error::config(format!("Invalid log level '{}': {}", config.level, e))),
    }
}

/// Install the global subscriber
///
/// Calling this again after a subscriber is installed is a no-op.
pub fn init_tracing(config: &TelemetryConfig) -> Result<()> {
    let filter = env_filter(config)?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if config.json {
        registry.with(fmt::layer().json().with_target(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    };

    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
    Ok(())
}
