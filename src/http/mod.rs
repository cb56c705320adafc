//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, plain or TLS serving)
//!     → middleware/trace.rs (request ID, span, request tracer)
//!     → handlers (read the tracer from the request context)
//! ```

pub mod middleware;
pub mod request;
pub mod server;

pub use middleware::TracingLayer;
pub use request::{request_id, X_REQUEST_ID};
pub use server::HttpServer;
