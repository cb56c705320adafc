//! Per-request tracing state.

use std::fmt;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use axum::http::{Method, StatusCode, Uri};

use crate::observability::metrics;
use crate::observability::tracer::{tags, SpanHandle};

/// Tracing state for one in-flight request.
///
/// Created by the tracing middleware, stored once in the request context and
/// finished exactly once when the wrapped handler returns.
pub struct RequestTracer {
    request_id: String,
    service: String,
    method: Method,
    uri: Uri,
    span: SpanHandle,
    log: tracing::Span,
    started_at: OnceLock<Instant>,
    status: OnceLock<StatusCode>,
}

impl RequestTracer {
    pub fn new(
        request_id: String,
        service: String,
        method: Method,
        uri: Uri,
        span: SpanHandle,
        logger: &tracing::Span,
    ) -> Self {
        let log = tracing::info_span!(
            parent: logger,
            "request",
            request_id = %request_id,
            service = %service,
            method = %method,
            uri = %uri,
            trace_id = tracing::field::Empty,
        );
        if let Some(trace_id) = span.trace_id() {
            log.record("trace_id", trace_id.as_str());
        }

        Self {
            request_id,
            service,
            method,
            uri,
            span,
            log,
            started_at: OnceLock::new(),
            status: OnceLock::new(),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn span(&self) -> &SpanHandle {
        &self.span
    }

    /// Logger carrying the request-scoped fields.
    pub fn logger(&self) -> &tracing::Span {
        &self.log
    }

    pub fn trace_id(&self) -> Option<String> {
        self.span.trace_id()
    }

    pub fn set_tag(&self, key: &'static str, value: impl Into<String>) {
        self.span.set_tag(key, value);
    }

    /// Time since `start`, if started.
    pub fn elapsed(&self) -> Option<Duration> {
        self.started_at.get().map(Instant::elapsed)
    }

    pub fn start(&self) {
        if self.started_at.set(Instant::now()).is_err() {
            return;
        }
        self.span.start();
        self.log.in_scope(|| tracing::info!("Request started"));
    }

    pub fn record_status(&self, status: StatusCode) {
        if self.status.set(status).is_ok() {
            self.span.set_tag(tags::HTTP_STATUS_CODE, status.as_str());
            if status.is_server_error() {
                self.span.set_tag(tags::ERROR, "true");
            }
        }
    }

    pub fn record_error(&self, error: &dyn fmt::Display) {
        self.span.set_tag(tags::ERROR, error.to_string());
        self.log
            .in_scope(|| tracing::error!(error = %error, "Request handler failed"));
    }

    /// Close the span. Later calls are no-ops.
    pub fn finish(&self) {
        if !self.span.finish() {
            return;
        }

        let duration = self.elapsed().unwrap_or_default();
        let status = self.status.get().copied();
        self.log.in_scope(|| match status {
            Some(status) => tracing::info!(
                status = status.as_u16(),
                duration_ms = duration.as_millis() as u64,
                "Request completed"
            ),
            None => tracing::warn!(
                duration_ms = duration.as_millis() as u64,
                "Request ended without a response"
            ),
        });

        metrics::record_request(&self.service, &self.method, status, duration);
    }
}

impl fmt::Debug for RequestTracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestTracer")
            .field("request_id", &self.request_id)
            .field("service", &self.service)
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("span", &self.span)
            .finish()
    }
}
