//! Service commons: environment configuration, TLS setup and request tracing
//! for HTTP services.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::{RootArgs, ServerConfig, TlsConfig};
pub use http::{HttpServer, TracingLayer};
pub use observability::{CurrentTracer, RequestTracer, Tracer};
