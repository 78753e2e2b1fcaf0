//! Logging setup
//!
//! The crate emits `tracing` events (target `flextable`). Applications and
//! tests that want them printed call [`init_logging`].

use std::io;

use tracing::Subscriber;
use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{FlexError, FlexResult};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "warn")
    pub level: String,
    /// JSON structured output instead of plain text
    pub json_format: bool,
    /// Environment filter (e.g. "flextable=debug,sqlx=warn"); overrides `level`
    pub env_filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            env_filter: None,
        }
    }
}

impl LoggingConfig {
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            json_format: false,
            env_filter: Some("flextable=debug,sqlx=warn".to_string()),
        }
    }

    /// Minimal output for test runs
    pub fn test() -> Self {
        Self {
            level: "error".to_string(),
            json_format: false,
            env_filter: Some("flextable=error".to_string()),
        }
    }

    pub fn production() -> Self {
        Self {
            level: "info".to_string(),
            json_format: true,
            env_filter: Some("flextable=info,sqlx=warn".to_string()),
        }
    }

    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    fn filter_directive(&self) -> &str {
        self.env_filter.as_deref().unwrap_or(&self.level)
    }
}

/// Subscriber for `config`: env filter plus a plain or JSON formatter
///
/// `RUST_LOG` takes precedence over the configured filter.
pub fn build_subscriber(config: &LoggingConfig) -> FlexResult<Box<dyn Subscriber + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.filter_directive()))
        .map_err(|e| FlexError::Configuration(format!("Invalid log filter: {}", e)))?;

    let registry = tracing_subscriber::registry().with(filter);
    Ok(if config.json_format {
        Box::new(registry.with(Layer::new().with_writer(io::stdout).json()))
    } else {
        Box::new(registry.with(Layer::new().with_writer(io::stdout)))
    })
}

/// Install a global subscriber
///
/// Returns `Ok(false)` when a subscriber was already installed.
pub fn init_logging(config: &LoggingConfig) -> FlexResult<bool> {
    let installed = build_subscriber(config)?.try_init().is_ok();

    if installed {
        tracing::info!(
            target: "flextable::logging",
            "Logging initialized (level: {}, format: {})",
            config.level,
            if config.json_format { "JSON" } else { "text" }
        );
    }
    Ok(installed)
}
