//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (request tracing, timeout)
//! - Serve plain HTTP or TLS on a bound listener
//! - Graceful shutdown on Ctrl+C

use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{Method, Uri};
use axum::routing::{any, get};
use axum::{Json, Router};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;

use crate::config::ServerConfig;
use crate::http::middleware::TracingLayer;
use crate::lifecycle::signals::{shutdown_on_signal, shutdown_signal};
use crate::net::tls::{self, TlsError, TlsMaterial};
use crate::observability::context::CurrentTracer;
use crate::observability::tracer::Tracer;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("TLS setup failed: {0}")]
    Tls(#[from] TlsError),
}

/// HTTP server for a traced service.
pub struct HttpServer {
    router: Router,
    config: ServerConfig,
    tls: Option<TlsMaterial>,
}

impl HttpServer {
    /// Create a new HTTP server. `tls` of `None` serves plain HTTP.
    pub fn new(
        config: ServerConfig,
        tls: Option<TlsMaterial>,
        tracer: Arc<dyn Tracer>,
        logger: tracing::Span,
    ) -> Self {
        let router = Self::build_router(&config, tracer, logger);
        Self { router, config, tls }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServerConfig, tracer: Arc<dyn Tracer>, logger: tracing::Span) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/", any(echo_handler))
            .route("/{*path}", any(echo_handler))
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
            .layer(TracingLayer::new(tracer, logger, config.service_name.clone()))
    }

    /// The fully layered router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;

        match &self.tls {
            Some(material) => {
                let rustls_config = tls::rustls_config(material)?;
                tracing::info!(address = %addr, service = %self.config.service_name, "HTTPS server starting");

                let handle = axum_server::Handle::new();
                tokio::spawn(shutdown_on_signal(handle.clone()));

                axum_server::from_tcp_rustls(listener.into_std()?, rustls_config)
                    .handle(handle)
                    .serve(self.router.into_make_service())
                    .await?;
            }
            None => {
                tracing::info!(address = %addr, service = %self.config.service_name, "HTTP server starting");

                axum::serve(listener, self.router)
                    .with_graceful_shutdown(shutdown_signal())
                    .await?;
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn health_handler() -> &'static str {
    "ok"
}

/// Echo the request's tracing identity.
async fn echo_handler(CurrentTracer(tracer): CurrentTracer, method: Method, uri: Uri) -> Json<Value> {
    let (request_id, trace_id) = match &tracer {
        Some(rt) => (Some(rt.request_id().to_string()), rt.trace_id()),
        None => (None, None),
    };
    tracing::debug!(path = %uri.path(), "Echoing request");

    Json(json!({
        "request_id": request_id,
        "trace_id": trace_id,
        "method": method.as_str(),
        "path": uri.path(),
    }))
}
