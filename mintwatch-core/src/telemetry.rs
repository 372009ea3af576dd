//! Tracing subscriber setup.
//!
//! Libraries in this workspace only emit `tracing` events; the process that
//! owns the cache decides where they go by calling [`init_tracing`] once at
//! startup.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogConfig, LogFormat};
use crate::error::ConfigError;

/// Build the filter: `RUST_LOG` wins when set, otherwise the configured directive.
pub fn env_filter(config: &LogConfig) -> Result<EnvFilter, ConfigError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.filter).map_err(|e| ConfigError::InvalidValue {
            field: "log.filter".to_string(),
            value: config.filter.clone(),
            reason: e.to_string(),
        }),
    }
}

/// Install the global subscriber.
///
/// Returns an error instead of panicking when a subscriber is already set,
/// so tests and embedding applications can call it unconditionally.
pub fn init_tracing(config: &LogConfig) -> Result<(), ConfigError> {
    let filter = env_filter(config)?;
    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };

    result.map_err(|e| ConfigError::InvalidValue {
        field: "log".to_string(),
        value: format!("{:?}", config.format),
        reason: format!("failed to init subscriber: {}", e),
    })?;

    tracing::info!(filter = %config.filter, format = ?config.format, "Tracing initialized");
    Ok(())
}
