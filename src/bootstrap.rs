//! Process-level initialization.

use tracing_subscriber::EnvFilter;

/// Environment variable controlling the log filter, e.g.
/// `CHRONICLE_LOG=chronicle=debug,sqlx=warn`.
pub const LOG_ENV: &str = "CHRONICLE_LOG";

/// Install the global tracing subscriber. Safe to call more than once;
/// later calls are ignored.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
