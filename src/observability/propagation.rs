//! Span propagation for inbound requests.
//!
//! # Data Flow
//! ```text
//! request context already has an active span?
//!     yes → reuse it, request unchanged
//!     no  → extract upstream trace context from headers (best effort)
//!         → start "http.handler" span (service, resource = method, type = web)
//!         → tag component, method, url, base url, request id
//!         → store span as the request's active span
//! ```

use axum::http::header::{CONTENT_LENGTH, HOST};
use axum::http::{HeaderName, Request};
use hyper::body::Body as HttpBody;

use crate::observability::context;
use crate::observability::tracer::{
    tags, SpanHandle, SpanOptions, Tracer, HTTP_HANDLER_OPERATION, SPAN_TYPE_WEB,
};

/// Component tag value for spans created by this layer.
pub const COMPONENT: &str = "axum";

pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// Return `req` with an active span in its context, plus that span.
///
/// A span already active on the request is reused as-is.
pub fn wrap_with_span<B>(
    req: Request<B>,
    request_id: &str,
    service: &str,
    tracer: &dyn Tracer,
) -> (Request<B>, SpanHandle)
where
    B: HttpBody,
{
    if let Some(span) = context::active_span(req.extensions()) {
        return (req, span);
    }

    let parent = tracer.extract(req.headers());
    let method = req.method().as_str();
    let span = tracer.start_span(
        SpanOptions::new(HTTP_HANDLER_OPERATION)
            .child_of(parent)
            .service_name(service)
            .resource_name(method)
            .span_type(SPAN_TYPE_WEB)
            .tag(tags::HTTP_CONTENT_LENGTH, content_length(&req).to_string()),
    );

    span.set_tag(tags::COMPONENT, COMPONENT);
    span.set_tag(tags::HTTP_METHOD, method);
    span.set_tag(tags::HTTP_URL, req.uri().to_string());
    span.set_tag(tags::HTTP_BASE_URL, base_url(&req));
    span.set_tag(tags::HTTP_REQUEST_ID, request_id);

    let (mut parts, body) = req.into_parts();
    parts.extensions = context::with_active_span(&parts.extensions, span.clone());
    (Request::from_parts(parts, body), span)
}

/// `https` only when the forwarded-proto header says so.
pub fn scheme<B>(req: &Request<B>) -> &'static str {
    match req.headers().get(&X_FORWARDED_PROTO) {
        Some(proto) if proto == "https" => "https",
        _ => "http",
    }
}

/// Host from the URI authority (HTTP/2, absolute-form), else the `Host` header.
pub fn host<B>(req: &Request<B>) -> &str {
    req.uri()
        .authority()
        .map(|authority| authority.as_str())
        .or_else(|| req.headers().get(HOST).and_then(|h| h.to_str().ok()))
        .unwrap_or_default()
}

pub fn base_url<B>(req: &Request<B>) -> String {
    format!("{}://{}", scheme(req), host(req))
}

/// Declared body length, the exact body size if known, else -1.
fn content_length<B: HttpBody>(req: &Request<B>) -> i64 {
    req.headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
        .or_else(|| {
            req.body()
                .size_hint()
                .exact()
                .and_then(|len| i64::try_from(len).ok())
        })
        .unwrap_or(-1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{HeaderMap, Method};
    use opentelemetry::trace::{SpanContext, SpanId, TraceFlags, TraceId, TraceState};
    use std::sync::{Arc, Mutex};

    use crate::observability::tracer::Span;

    type Tags = Arc<Mutex<Vec<(&'static str, String)>>>;

    #[derive(Default)]
    struct FakeTracer {
        started: Mutex<Vec<SpanOptions>>,
        tags: Tags,
    }

    struct FakeSpan(Tags);

    impl Span for FakeSpan {
        fn set_tag(&self, key: &'static str, value: String) {
            self.0.lock().unwrap().push((key, value));
        }

        fn finish(&self) {}
    }

    impl Tracer for FakeTracer {
        fn extract(&self, headers: &HeaderMap) -> Option<SpanContext> {
            headers.get("traceparent")?;
            Some(SpanContext::new(
                TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap(),
                SpanId::from_hex("00f067aa0ba902b7").unwrap(),
                TraceFlags::SAMPLED,
                true,
                TraceState::default(),
            ))
        }

        fn start_span(&self, options: SpanOptions) -> SpanHandle {
            self.started.lock().unwrap().push(options);
            SpanHandle::new(FakeSpan(self.tags.clone()))
        }
    }

    impl FakeTracer {
        fn tag(&self, key: &str) -> Option<String> {
            self.tags
                .lock()
                .unwrap()
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.clone())
        }
    }

    #[test]
    fn test_forwarded_https_base_url() {
        let tracer = FakeTracer::default();
        let req = Request::builder()
            .method(Method::POST)
            .uri("/orders?limit=5")
            .header(HOST, "api.example.com")
            .header("X-Forwarded-Proto", "https")
            .body(Body::from("{\"id\":1}"))
            .unwrap();

        let (req, span) = wrap_with_span(req, "req-42", "orders", &tracer);

        assert_eq!(tracer.tag(tags::HTTP_BASE_URL).as_deref(), Some("https://api.example.com"));
        assert_eq!(tracer.tag(tags::HTTP_METHOD).as_deref(), Some("POST"));
        assert_eq!(tracer.tag(tags::HTTP_URL).as_deref(), Some("/orders?limit=5"));
        assert_eq!(tracer.tag(tags::HTTP_REQUEST_ID).as_deref(), Some("req-42"));
        assert_eq!(tracer.tag(tags::COMPONENT).as_deref(), Some(COMPONENT));

        let started = tracer.started.lock().unwrap();
        assert_eq!(started.len(), 1);
        let options = &started[0];
        assert_eq!(options.operation_name, HTTP_HANDLER_OPERATION);
        assert_eq!(options.service_name, "orders");
        assert_eq!(options.resource_name, "POST");
        assert_eq!(options.span_type, SPAN_TYPE_WEB);
        assert!(options.parent.is_none());
        assert_eq!(
            options.tags,
            vec![(tags::HTTP_CONTENT_LENGTH, "8".to_string())]
        );

        let active = context::active_span(req.extensions()).unwrap();
        assert!(active.same_span(&span));
    }

    #[test]
    fn test_plain_http_base_url() {
        let tracer = FakeTracer::default();
        let req = Request::builder()
            .uri("/health")
            .header(HOST, "api.example.com")
            .body(Body::empty())
            .unwrap();

        wrap_with_span(req, "req-1", "orders", &tracer);
        assert_eq!(tracer.tag(tags::HTTP_BASE_URL).as_deref(), Some("http://api.example.com"));
    }

    #[test]
    fn test_other_forwarded_proto_is_http() {
        let req = Request::builder()
            .uri("http://internal:8080/health")
            .header("X-Forwarded-Proto", "HTTPS, http")
            .body(())
            .unwrap();
        assert_eq!(base_url(&req), "http://internal:8080");
    }

    #[test]
    fn test_content_length_fallbacks() {
        let declared = Request::builder()
            .header(CONTENT_LENGTH, "12")
            .body(Body::empty())
            .unwrap();
        assert_eq!(content_length(&declared), 12);

        let empty = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(content_length(&empty), 0);

        let stream = futures_util::stream::iter(vec![Ok::<_, std::io::Error>("chunk")]);
        let streaming = Request::builder()
            .body(Body::from_stream(stream))
            .unwrap();
        assert_eq!(content_length(&streaming), -1);
    }

    #[test]
    fn test_upstream_trace_is_parent() {
        let tracer = FakeTracer::default();
        let req = Request::builder()
            .header("traceparent", "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01")
            .body(Body::empty())
            .unwrap();

        wrap_with_span(req, "req-1", "orders", &tracer);
        let started = tracer.started.lock().unwrap();
        let parent = started[0].parent.as_ref().unwrap();
        assert_eq!(parent.span_id().to_string(), "00f067aa0ba902b7");
    }

    #[test]
    fn test_existing_span_is_reused() {
        let tracer = FakeTracer::default();
        let req = Request::builder().body(Body::empty()).unwrap();

        let (req, first) = wrap_with_span(req, "req-1", "orders", &tracer);
        let (_, second) = wrap_with_span(req, "req-1", "orders", &tracer);

        assert!(first.same_span(&second));
        assert_eq!(tracer.started.lock().unwrap().len(), 1);
    }
}
