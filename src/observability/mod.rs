//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → propagation.rs (extract upstream trace, start span, tag it)
//!     → request_tracer.rs (per-request span + log span)
//!     → context.rs (stored once in the request context, read downstream)
//!
//! Backends:
//!     → tracer.rs (injected Tracer; OpenTelemetry adapter)
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, histograms)
//! ```
//!
//! # Design Decisions
//! - The tracer is injected, never looked up globally by the middleware
//! - Request ID flows through spans, logs and outbound headers
//! - Context values are set once and only read afterwards

pub mod context;
pub mod logging;
pub mod metrics;
pub mod propagation;
pub mod request_tracer;
pub mod tracer;

pub use context::{get_tracer, lookup, CurrentTracer};
pub use request_tracer::RequestTracer;
pub use tracer::{NoopTracer, OtelTracer, SpanHandle, Tracer};
