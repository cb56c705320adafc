//! Request metrics.
//!
//! # Metrics
//! - `http_requests_total` (counter): requests by service, method, status
//! - `http_request_duration_seconds` (histogram): latency distribution
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder the calls are no-ops
//! - Requests that never produced a response are labelled `status="none"`

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::{Method, StatusCode};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter with an HTTP scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Record a finished request.
pub fn record_request(
    service: &str,
    method: &Method,
    status: Option<StatusCode>,
    duration: Duration,
) {
    let status = status.map_or_else(|| "none".to_string(), |s| s.as_u16().to_string());
    let labels = [
        ("service", service.to_string()),
        ("method", method.to_string()),
        ("status", status),
    ];

    counter!("http_requests_total", &labels).increment(1);
    histogram!("http_request_duration_seconds", &labels).record(duration.as_secs_f64());
}
