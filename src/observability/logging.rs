//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global `tracing` subscriber from `LoggingConfig`
//! - Build the root logger span handed to request middleware
//!
//! # Design Decisions
//! - JSON format for production, text format for development
//! - Level comes from config, then `RUST_LOG`, then `info`
//! - Installing twice is an error, not a panic

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

const DEFAULT_LEVEL: &str = "info";

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration, read from the `LOG` env section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `svc_commons=debug,tower_http=warn`.
    pub level: Option<String>,
    pub format: LogFormat,
    /// Append to this file instead of stdout.
    pub file: Option<PathBuf>,
    pub disable_colors: bool,
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log level {directive:?}: {source}")]
    Filter {
        directive: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },

    #[error("failed to open log file {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to install logger: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Build the level filter for `config`.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    match config.level.as_deref().filter(|level| !level.is_empty()) {
        Some(directive) => EnvFilter::try_new(directive).map_err(|source| LoggingError::Filter {
            directive: directive.to_string(),
            source,
        }),
        None => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LEVEL.into())),
    }
}

/// Install the global subscriber described by `config`.
pub fn configure_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = build_filter(config)?;

    let (writer, ansi) = match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| LoggingError::File {
                    path: path.clone(),
                    source,
                })?;
            (BoxMakeWriter::new(Arc::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stdout), !config.disable_colors),
    };

    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Json => fmt::layer().json().with_writer(writer).boxed(),
        LogFormat::Text => fmt::layer().with_ansi(ansi).with_writer(writer).boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .try_init()?;

    Ok(())
}

/// Root logger span carrying the service version.
pub fn root_logger(version: &str) -> tracing::Span {
    let version = if version.is_empty() { "unknown" } else { version };
    tracing::info_span!("service", version = %version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::Environment;

    #[test]
    fn test_decode_logging_section() {
        let env = Environment::from_vars([
            ("APP_LOG_LEVEL", "debug"),
            ("APP_LOG_FORMAT", "json"),
            ("APP_LOG_DISABLE_COLORS", "true"),
        ]);
        let config: LoggingConfig = env.decode_section("app", "log").unwrap();
        assert_eq!(config.level.as_deref(), Some("debug"));
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.disable_colors);
        assert!(config.file.is_none());
    }

    #[test]
    fn test_defaults_when_section_missing() {
        let config: LoggingConfig = Environment::from_vars([("OTHER", "x")])
            .decode_section("app", "log")
            .unwrap();
        assert_eq!(config.format, LogFormat::Text);
        assert!(config.level.is_none());
    }

    #[test]
    fn test_invalid_level_is_rejected() {
        let config = LoggingConfig {
            level: Some("svc_commons=loud".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            build_filter(&config),
            Err(LoggingError::Filter { .. })
        ));
    }

    #[test]
    fn test_explicit_level_filter() {
        let config = LoggingConfig {
            level: Some("warn".to_string()),
            ..Default::default()
        };
        assert_eq!(build_filter(&config).unwrap().to_string(), "warn");
    }
}
