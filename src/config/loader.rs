//! Configuration loading from environment variables.
//!
//! Variables are matched as `PREFIX_FIELD` (or `PREFIX_SECTION_FIELD` for
//! nested sections), case-insensitively. Names are uppercased on the way in,
//! so `app_name` and `APP_NAME` are the same variable. A `.env` file can be
//! layered on top of the process environment; its values win.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read env file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },

    #[error("failed to decode configuration with prefix {prefix:?}: {source}")]
    Decode {
        prefix: String,
        #[source]
        source: envy::Error,
    },
}

/// A snapshot of environment variables to decode configuration from.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    /// Snapshot the process environment. Non-unicode variables are skipped.
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars_os()
                .filter_map(|(k, v)| {
                    Some((normalize(&k.into_string().ok()?), v.into_string().ok()?))
                })
                .collect(),
        }
    }

    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (normalize(&k.into()), v.into()))
                .collect(),
        }
    }

    /// Overlay the variables defined in a `.env` file.
    pub fn with_env_file(mut self, path: &Path) -> Result<Self, ConfigError> {
        let env_file_error = |source| ConfigError::EnvFile {
            path: path.to_path_buf(),
            source,
        };

        for item in dotenvy::from_path_iter(path).map_err(env_file_error)? {
            let (key, value) = item.map_err(env_file_error)?;
            self.vars.insert(normalize(&key), value);
        }
        Ok(self)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(&normalize(key)).map(String::as_str)
    }

    /// Decode `T` from variables named `PREFIX_FIELD`.
    pub fn decode<T: DeserializeOwned>(&self, prefix: &str) -> Result<T, ConfigError> {
        self.decode_prefixed(&env_prefix(&[prefix]))
    }

    /// Decode `T` from variables named `PREFIX_SECTION_FIELD`.
    pub fn decode_section<T: DeserializeOwned>(
        &self,
        prefix: &str,
        section: &str,
    ) -> Result<T, ConfigError> {
        self.decode_prefixed(&env_prefix(&[prefix, section]))
    }

    fn decode_prefixed<T: DeserializeOwned>(&self, prefix: &str) -> Result<T, ConfigError> {
        let vars = self
            .vars
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()));

        envy::prefixed(prefix)
            .from_iter(vars)
            .map_err(|source| ConfigError::Decode {
                prefix: prefix.to_string(),
                source,
            })
    }
}

fn normalize(key: &str) -> String {
    key.to_uppercase()
}

/// Build the variable prefix for the given path, e.g. `["app", "tls"]` -> `APP_TLS_`.
fn env_prefix(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|part| !part.is_empty())
        .map(|part| format!("{}_", part.to_uppercase()))
        .collect()
}

/// Decode `T` from the process environment, optionally overlaid with `env_file`.
pub fn load_from_env<T: DeserializeOwned>(
    prefix: &str,
    env_file: Option<&Path>,
) -> Result<T, ConfigError> {
    let mut env = Environment::from_process();
    if let Some(path) = env_file {
        env = env.with_env_file(path)?;
    }
    env.decode(prefix)
}
