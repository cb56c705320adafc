//! Tracer capability and span handles.
//!
//! # Responsibilities
//! - Define the backend-neutral `Tracer` / `Span` seam injected into the middleware
//! - Provide `SpanHandle`, the shared per-request span reference
//! - Adapt OpenTelemetry tracers to the seam (`OtelTracer`)
//! - Install the process-wide SDK provider used by `OtelTracer::global`
//!
//! # Design Decisions
//! - The tracer is passed in explicitly rather than looked up globally
//! - Start and finish reach the backend at most once per handle
//! - Remote parents are plain `SpanContext` values (W3C trace context)

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use axum::http::HeaderMap;
use opentelemetry::propagation::TextMapPropagator;
use opentelemetry::trace::{Span as _, SpanContext, SpanKind, TraceContextExt, Tracer as _};
use opentelemetry::{global, Context, KeyValue};
use opentelemetry_http::HeaderExtractor;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;

/// Operation name used for every inbound request span.
pub const HTTP_HANDLER_OPERATION: &str = "http.handler";

/// Span type classification for web requests.
pub const SPAN_TYPE_WEB: &str = "web";

/// Tag keys attached to request spans.
pub mod tags {
    pub const SERVICE_NAME: &str = "service.name";
    pub const RESOURCE_NAME: &str = "resource.name";
    pub const SPAN_TYPE: &str = "span.type";
    pub const COMPONENT: &str = "component";
    pub const HTTP_METHOD: &str = "http.method";
    pub const HTTP_URL: &str = "http.url";
    pub const HTTP_BASE_URL: &str = "http.base_url";
    pub const HTTP_CONTENT_LENGTH: &str = "http.content_length";
    pub const HTTP_REQUEST_ID: &str = "http.request_id";
    pub const HTTP_STATUS_CODE: &str = "http.status_code";
    pub const ERROR: &str = "error";
}

/// Options for starting a request span.
#[derive(Debug, Clone)]
pub struct SpanOptions {
    pub operation_name: &'static str,
    /// Upstream span extracted from carrier headers, if any.
    pub parent: Option<SpanContext>,
    pub service_name: String,
    pub resource_name: String,
    pub span_type: &'static str,
    pub tags: Vec<(&'static str, String)>,
}

impl SpanOptions {
    pub fn new(operation_name: &'static str) -> Self {
        Self {
            operation_name,
            parent: None,
            service_name: String::new(),
            resource_name: String::new(),
            span_type: SPAN_TYPE_WEB,
            tags: Vec::new(),
        }
    }

    pub fn child_of(mut self, parent: Option<SpanContext>) -> Self {
        self.parent = parent;
        self
    }

    pub fn service_name(mut self, service: impl Into<String>) -> Self {
        self.service_name = service.into();
        self
    }

    pub fn resource_name(mut self, resource: impl Into<String>) -> Self {
        self.resource_name = resource.into();
        self
    }

    pub fn span_type(mut self, span_type: &'static str) -> Self {
        self.span_type = span_type;
        self
    }

    pub fn tag(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.tags.push((key, value.into()));
        self
    }
}

/// A tracing backend able to extract remote parents and start spans.
pub trait Tracer: Send + Sync {
    /// Recover an upstream span context from carrier headers.
    ///
    /// Returns `None` when the headers carry no valid trace context.
    fn extract(&self, headers: &HeaderMap) -> Option<SpanContext>;

    /// Start a new span.
    fn start_span(&self, options: SpanOptions) -> SpanHandle;
}

/// A single span as seen by a tracing backend.
pub trait Span: Send + Sync {
    fn set_tag(&self, key: &'static str, value: String);

    /// Mark the span active. Most backends start timing at creation.
    fn start(&self) {}

    fn finish(&self);

    fn trace_id(&self) -> Option<String> {
        None
    }
}

struct SpanState {
    span: Box<dyn Span>,
    started: AtomicBool,
    finished: AtomicBool,
}

/// Shared handle to an in-flight span.
///
/// Clones refer to the same span; `finish` only reaches the backend once.
#[derive(Clone)]
pub struct SpanHandle {
    inner: Arc<SpanState>,
}

impl SpanHandle {
    pub fn new(span: impl Span + 'static) -> Self {
        Self {
            inner: Arc::new(SpanState {
                span: Box::new(span),
                started: AtomicBool::new(false),
                finished: AtomicBool::new(false),
            }),
        }
    }

    /// Set a tag. Ignored once the span is finished.
    pub fn set_tag(&self, key: &'static str, value: impl Into<String>) {
        if !self.is_finished() {
            self.inner.span.set_tag(key, value.into());
        }
    }

    pub fn start(&self) {
        if !self.inner.started.swap(true, Ordering::AcqRel) {
            self.inner.span.start();
        }
    }

    /// Close the span. Returns `true` only for the call that closed it.
    pub fn finish(&self) -> bool {
        if self.inner.finished.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.inner.span.finish();
        true
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.inner.finished.load(Ordering::Acquire)
    }

    pub fn trace_id(&self) -> Option<String> {
        self.inner.span.trace_id()
    }

    /// Whether both handles refer to the same span.
    pub fn same_span(&self, other: &SpanHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for SpanHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpanHandle")
            .field("trace_id", &self.trace_id())
            .field("started", &self.is_started())
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Tracer whose spans have no backend effect.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

struct NoopSpan;

impl Span for NoopSpan {
    fn set_tag(&self, _key: &'static str, _value: String) {}

    fn finish(&self) {}
}

impl Tracer for NoopTracer {
    fn extract(&self, _headers: &HeaderMap) -> Option<SpanContext> {
        None
    }

    fn start_span(&self, _options: SpanOptions) -> SpanHandle {
        SpanHandle::new(NoopSpan)
    }
}

/// Build an SDK tracer provider for `service_name` and install it globally.
///
/// Spans are always sampled, so trace ids reach logs and responses. With
/// `export_stdout` finished spans are also written to stdout. Call
/// `shutdown` on the returned provider before exit to flush.
pub fn init_tracer_provider(service_name: &str, export_stdout: bool) -> SdkTracerProvider {
    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    let mut builder = SdkTracerProvider::builder().with_resource(resource);
    if export_stdout {
        builder = builder.with_simple_exporter(opentelemetry_stdout::SpanExporter::default());
    }

    let provider = builder.build();
    global::set_tracer_provider(provider.clone());
    provider
}

/// Adapter from an OpenTelemetry tracer to [`Tracer`].
pub struct OtelTracer<T> {
    tracer: T,
    propagator: TraceContextPropagator,
}

impl OtelTracer<global::BoxedTracer> {
    /// Use the process-global tracer provider.
    pub fn global(name: &'static str) -> Self {
        Self::new(global::tracer(name))
    }
}

impl<T> OtelTracer<T>
where
    T: opentelemetry::trace::Tracer,
{
    pub fn new(tracer: T) -> Self {
        Self {
            tracer,
            propagator: TraceContextPropagator::new(),
        }
    }
}

impl<T> Tracer for OtelTracer<T>
where
    T: opentelemetry::trace::Tracer + Send + Sync,
    T::Span: Send + Sync + 'static,
{
    fn extract(&self, headers: &HeaderMap) -> Option<SpanContext> {
        let cx = self.propagator.extract(&HeaderExtractor(headers));
        let span_context = cx.span().span_context().clone();
        span_context.is_valid().then_some(span_context)
    }

    fn start_span(&self, options: SpanOptions) -> SpanHandle {
        let parent_cx = match options.parent {
            Some(parent) => Context::new().with_remote_span_context(parent),
            None => Context::new(),
        };

        let mut attributes = Vec::with_capacity(options.tags.len() + 3);
        attributes.push(KeyValue::new(tags::SERVICE_NAME, options.service_name));
        attributes.push(KeyValue::new(tags::RESOURCE_NAME, options.resource_name));
        attributes.push(KeyValue::new(tags::SPAN_TYPE, options.span_type));
        attributes.extend(
            options
                .tags
                .into_iter()
                .map(|(key, value)| KeyValue::new(key, value)),
        );

        let span = self
            .tracer
            .span_builder(options.operation_name)
            .with_kind(SpanKind::Server)
            .with_attributes(attributes)
            .start_with_context(&self.tracer, &parent_cx);

        SpanHandle::new(OtelSpan(Mutex::new(span)))
    }
}

struct OtelSpan<S>(Mutex<S>);

impl<S> Span for OtelSpan<S>
where
    S: opentelemetry::trace::Span + Send + Sync,
{
    fn set_tag(&self, key: &'static str, value: String) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_attribute(KeyValue::new(key, value));
    }

    fn finish(&self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).end();
    }

    fn trace_id(&self) -> Option<String> {
        let span = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        let span_context = span.span_context();
        span_context
            .is_valid()
            .then(|| span_context.trace_id().to_string())
    }
}
