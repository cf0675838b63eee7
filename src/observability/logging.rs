//! Structured logging.
//!
//! `RUST_LOG` wins over the configured level when set, so operators can raise
//! verbosity for a single module without touching the config file.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter directive for a configured level.
pub fn default_directive(level: &str) -> String {
    format!("meta_relay={level},tower_http={level}")
}

/// Initialize the global tracing subscriber.
///
/// Returns an error if a global subscriber is already installed.
pub fn init_logging(level: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directive(level).into()))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
}
