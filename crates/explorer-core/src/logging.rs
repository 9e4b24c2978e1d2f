//! Structured logging setup

use explorer_config::LogConfig;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::error::{ExplorerError, ExplorerResult};

/// Install the global tracing subscriber
///
/// RUST_LOG takes precedence over the configured level. Logs go to stderr
/// since stdout may carry a language server protocol stream. A subscriber
/// installed earlier is left in place.
pub fn init_logging(config: &LogConfig) -> ExplorerResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| ExplorerError::Logging(e.to_string()))?;

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
    Ok(())
}
