//! Subscriber installation.

use std::fmt;
use std::str::FromStr;
use tracing_subscriber::{fmt as layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::errors::ConfigError;

/// Log output layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable, for terminals.
    #[default]
    Pretty,
    /// One JSON object per line, for log shipping.
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::invalid("log_format", other)),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pretty => f.write_str("pretty"),
            Self::Json => f.write_str("json"),
        }
    }
}

/// Installs the global subscriber.
///
/// `RUST_LOG` takes precedence over `default_directive` (e.g. `info` or
/// `bulkops=debug`).
///
/// # Errors
///
/// Returns [`ConfigError::Logging`] if the directive does not parse or a
/// global subscriber is already installed.
pub fn init_logging(format: LogFormat, default_directive: &str) -> Result<(), ConfigError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive)
            .map_err(|err| ConfigError::Logging(err.to_string()))?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match format {
        LogFormat::Json => registry.with(layer::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(layer::layer().with_target(false)).try_init(),
    };
    installed.map_err(|err| ConfigError::Logging(err.to_string()))
}
