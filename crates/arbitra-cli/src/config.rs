//! CLI configuration: protocol settings plus logging

use std::path::Path;

use anyhow::Context;
use arbitra_core::ProtocolSettings;
use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    /// `ARBITRA_LOG_LEVEL` / `ARBITRA_LOG_FORMAT`, with command-line overrides
    pub fn from_env(level: Option<String>, format: Option<String>) -> Self {
        let d = Self::default();
        Self {
            level: level
                .or_else(|| std::env::var("ARBITRA_LOG_LEVEL").ok())
                .unwrap_or(d.level),
            format: format
                .or_else(|| std::env::var("ARBITRA_LOG_FORMAT").ok())
                .unwrap_or(d.format),
        }
    }
}

/// Install the global subscriber; `RUST_LOG` wins over the configured level
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    match config.format.as_str() {
        "json" => subscriber
            .with(fmt::layer().json().with_target(true))
            .try_init()
            .context("installing json subscriber")?,
        _ => subscriber
            .with(fmt::layer().pretty().with_target(true))
            .try_init()
            .context("installing pretty subscriber")?,
    }

    Ok(())
}

/// Settings from a JSON document if given, otherwise from `ARBITRA_*`
/// variables; validated either way
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<ProtocolSettings> {
    let settings = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading settings from {}", path.display()))?;
            ProtocolSettings::from_json(&text)?
        }
        None => ProtocolSettings::from_env(),
    };
    settings.validate()?;
    Ok(settings)
}
