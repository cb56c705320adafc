//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! process environment (+ optional .env file)
//!     → loader.rs (Environment snapshot, envy decoding)
//!     → schema.rs (typed sections: server, TLS)
//!     → args.rs (CLI prefix/env file, logging bootstrap)
//! ```
//!
//! # Design Decisions
//! - Config is decoded once at startup; failures abort startup
//! - All fields have defaults to allow minimal environments
//! - Nested sections use their own prefix (`PREFIX_TLS_*`, `PREFIX_LOG_*`)

pub mod args;
pub mod loader;
pub mod schema;

pub use args::RootArgs;
pub use loader::{load_from_env, ConfigError, Environment};
pub use schema::{ServerConfig, TlsConfig};
