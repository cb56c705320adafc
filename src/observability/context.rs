//! Request-scoped trace context store.
//!
//! A request's context is its `Extensions` map. Values are stored under
//! private newtype keys, so foreign values can never be mistaken for ours.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{Extensions, Request};

use crate::observability::request_tracer::RequestTracer;
use crate::observability::tracer::SpanHandle;

#[derive(Clone)]
struct TracerSlot(Arc<RequestTracer>);

#[derive(Clone)]
struct ActiveSpanSlot(SpanHandle);

/// Derive a context that yields `tracer` on lookup. `ctx` is left untouched.
pub fn associate(ctx: &Extensions, tracer: Arc<RequestTracer>) -> Extensions {
    let mut derived = ctx.clone();
    derived.insert(TracerSlot(tracer));
    derived
}

/// The tracer associated with `ctx`, if any.
pub fn lookup(ctx: &Extensions) -> Option<Arc<RequestTracer>> {
    ctx.get::<TracerSlot>().map(|slot| Arc::clone(&slot.0))
}

/// Return `req` carrying a context associated with `tracer`.
pub fn wrap_with_tracer<B>(req: Request<B>, tracer: Arc<RequestTracer>) -> Request<B> {
    let (mut parts, body) = req.into_parts();
    parts.extensions = associate(&parts.extensions, tracer);
    Request::from_parts(parts, body)
}

/// Shorthand for `lookup` on a request's context.
pub fn get_tracer<B>(req: &Request<B>) -> Option<Arc<RequestTracer>> {
    lookup(req.extensions())
}

/// Derive a context whose active span is `span`.
pub fn with_active_span(ctx: &Extensions, span: SpanHandle) -> Extensions {
    let mut derived = ctx.clone();
    derived.insert(ActiveSpanSlot(span));
    derived
}

pub fn active_span(ctx: &Extensions) -> Option<SpanHandle> {
    ctx.get::<ActiveSpanSlot>().map(|slot| slot.0.clone())
}

/// Extractor for the current request's tracer.
///
/// Yields `None` for requests that never passed through the tracing layer.
#[derive(Clone)]
pub struct CurrentTracer(pub Option<Arc<RequestTracer>>);

impl<S> FromRequestParts<S> for CurrentTracer
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(lookup(&parts.extensions)))
    }
}
