//! Console logging initialization.
//!
//! Log verbosity is controlled through `RUST_LOG` (standard env-filter
//! syntax). When unset, the server logs at `info` for its own crate and
//! `warn` for the HTTP stack.

use tracing_subscriber::EnvFilter;

/// Default filter applied when RUST_LOG is not set.
const DEFAULT_FILTER: &str = "smriti=info,tower_http=warn,warn";

/// Initialize the fmt subscriber with an env-filter.
///
/// Safe to call once at startup. Returns an error if a global
/// subscriber has already been installed.
pub fn init_logging() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))?;

    Ok(())
}
