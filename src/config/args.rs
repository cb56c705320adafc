//! Root command-line arguments and process setup.

use std::path::PathBuf;

use clap::Args;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::loader::{ConfigError, Environment};
use crate::observability::logging::{self, LoggingConfig, LoggingError};

/// Env section holding the logging configuration.
pub const LOG_SECTION: &str = "log";

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("failed to load the logging configuration")]
    LoggingConfig(#[source] ConfigError),

    #[error("failed to create the logger")]
    Logger(#[source] LoggingError),

    #[error("failed to load the config object")]
    Config(#[source] ConfigError),
}

/// Flags shared by every service binary.
#[derive(Debug, Clone, Default, Args)]
pub struct RootArgs {
    /// A prefix to search for when looking for env vars
    #[arg(short, long, default_value = "")]
    pub prefix: String,

    /// A .env file to load configuration from
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub env_file: Option<PathBuf>,
}

impl RootArgs {
    /// Process environment overlaid with the `--config` file, if any.
    pub fn environment(&self) -> Result<Environment, ConfigError> {
        let env = Environment::from_process();
        match &self.env_file {
            Some(path) => env.with_env_file(path),
            None => Ok(env),
        }
    }

    /// Configure logging, then decode the service config `T`.
    ///
    /// Returns the root logger span (carrying `version`) and the config.
    pub fn setup<T: DeserializeOwned>(&self, version: &str) -> Result<(tracing::Span, T), SetupError> {
        let env = self.environment().map_err(SetupError::LoggingConfig)?;
        let logger = self.setup_logging(&env, version)?;

        let config = env.decode(&self.prefix).map_err(SetupError::Config)?;
        logger.in_scope(|| tracing::debug!("Loaded configuration"));
        Ok((logger, config))
    }

    /// Configure logging from the `LOG` section of `env`.
    pub fn setup_logging(&self, env: &Environment, version: &str) -> Result<tracing::Span, SetupError> {
        let log_config: LoggingConfig = env
            .decode_section(&self.prefix, LOG_SECTION)
            .map_err(SetupError::LoggingConfig)?;
        logging::configure_logging(&log_config).map_err(SetupError::Logger)?;
        Ok(logging::root_logger(version))
    }
}
