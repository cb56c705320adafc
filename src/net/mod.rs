//! Network layer subsystem.
//!
//! TLS is optional: `tls.rs` resolves declarative TLS settings into rustls
//! configs, or reports TLS as disabled.

pub mod tls;

pub use tls::{TlsError, TlsMaterial};
