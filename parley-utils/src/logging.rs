//! Logging infrastructure for parley
//!
//! Provides unified logging setup using the tracing ecosystem. Both the
//! server daemon and the terminal client log to stderr; the filter comes
//! from the `PARLEY_LOG` environment variable.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{ParleyError, Result};

/// Default filter when `PARLEY_LOG` is unset
const DEFAULT_FILTER: &str = "info";

/// Initialize logging with the filter from `PARLEY_LOG`
///
/// Falls back to "info" when the variable is unset.
pub fn init_logging() -> Result<()> {
    let filter = std::env::var("PARLEY_LOG").unwrap_or_else(|_| DEFAULT_FILTER.into());
    init_logging_with_filter(&filter)
}

/// Initialize logging with an explicit filter directive
///
/// The directive uses EnvFilter syntax (e.g. "info", "parley_server=debug").
pub fn init_logging_with_filter(filter: &str) -> Result<()> {
    let filter = EnvFilter::try_new(filter)
        .map_err(|e| ParleyError::config(format!("Invalid log filter: {}", e)))?;

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| ParleyError::internal(format!("Failed to init logging: {}", e)))?;

    Ok(())
}
