//! Logging setup and the runtime log switch.
//!
//! Registry events go through `tracing`. The subscriber installed by [`init`]
//! writes to stderr and drops every event while the log flag is off, so the
//! flag can be flipped at runtime from the shell or by a plugin through the
//! discovery protocol.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use tracing_subscriber::filter::{filter_fn, EnvFilter};
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

static LOG_FLAG: AtomicBool = AtomicBool::new(true);

/// Turn registry logging on or off.
pub fn set_log_flag(enabled: bool) {
    LOG_FLAG.store(enabled, Ordering::Relaxed);
}

pub fn log_enabled() -> bool {
    LOG_FLAG.load(Ordering::Relaxed)
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `default_level` when set.
pub fn init(default_level: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .context("Invalid log level")?;

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter_fn(|_| log_enabled()));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layer)
        .try_init()
        .context("Failed to set global default subscriber")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_flag_toggles() {
        set_log_flag(false);
        assert!(!log_enabled());
        set_log_flag(true);
        assert!(log_enabled());
    }
}
