//! Logging setup

use crate::config::LoggingConfig;
use crate::error::PipelineError;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initialize logging
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(config: &LoggingConfig) -> Result<(), PipelineError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| PipelineError::Logging(e.to_string()))?;

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(config.with_target);

    let result = if config.json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };

    result.map_err(|e| PipelineError::Logging(e.to_string()))
}
