//! Tracing subscriber setup for the `thesis` binary.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Environment variable holding the filter directive (e.g. `thesis_ledger=debug`).
pub const LOG_ENV: &str = "THESIS_LOG";

/// Install a stderr subscriber. Safe to call more than once; later calls are no-ops.
pub fn init() {
    let env_filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new("warn"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(env_filter)
        .try_init();
}
