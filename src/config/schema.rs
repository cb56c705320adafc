//! Configuration schema definitions.
//!
//! All types derive Serde traits and are decoded from environment variables
//! (see `loader`). Every field has a default so minimal environments work.

use serde::Deserialize;

/// Server configuration, read from `PREFIX_*`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Service name reported on spans, logs and metrics.
    pub service_name: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Prometheus scrape address; metrics are off when unset.
    pub metrics_address: Option<String>,

    /// Write finished spans to stdout.
    pub trace_stdout: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            service_name: "svc-commons".to_string(),
            request_timeout_secs: 30,
            metrics_address: None,
            trace_stdout: false,
        }
    }
}

/// TLS configuration, read from `PREFIX_TLS_*`.
///
/// PEM literals (`cert`, `key`, `ca`) take precedence over file paths.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// CA bundle files (comma-separated in the environment).
    pub ca_files: Vec<String>,
    pub key_file: String,
    pub cert_file: String,

    pub cert: String,
    pub key: String,
    pub ca: String,

    /// Skip server certificate verification on client connections.
    pub insecure: bool,
    pub enabled: bool,
}
