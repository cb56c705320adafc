//! Request tracing middleware.
//!
//! Every request gets a request ID, a span and a `RequestTracer` stored in
//! its context. The span is finished when the wrapped service returns, errors,
//! panics, or when the response future is dropped.

use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::http::{Request, Response};
use futures_util::future::BoxFuture;
use hyper::body::Body as HttpBody;
use tower::{Layer, Service};
use tracing::Instrument;

use crate::http::request::request_id;
use crate::observability::context;
use crate::observability::propagation::wrap_with_span;
use crate::observability::request_tracer::RequestTracer;
use crate::observability::tracer::Tracer;

/// Layer that traces every request passing through it.
#[derive(Clone)]
pub struct TracingLayer {
    tracer: Arc<dyn Tracer>,
    logger: tracing::Span,
    service: Arc<str>,
}

impl TracingLayer {
    /// `logger` is the parent of each request's log span.
    pub fn new(tracer: Arc<dyn Tracer>, logger: tracing::Span, service: impl Into<String>) -> Self {
        Self {
            tracer,
            logger,
            service: Arc::from(service.into()),
        }
    }
}

impl fmt::Debug for TracingLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracingLayer")
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

impl<S> Layer<S> for TracingLayer {
    type Service = TracingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TracingService {
            inner,
            layer: self.clone(),
        }
    }
}

#[derive(Clone)]
pub struct TracingService<S> {
    inner: S,
    layer: TracingLayer,
}

impl<S> TracingService<S> {
    /// Build the request tracer and return the request carrying it.
    fn new_tracer<B: HttpBody>(&self, mut req: Request<B>) -> (Request<B>, Arc<RequestTracer>) {
        let id = request_id(&mut req);
        let (req, span) = wrap_with_span(req, &id, &self.layer.service, self.layer.tracer.as_ref());

        let rt = Arc::new(RequestTracer::new(
            id,
            self.layer.service.to_string(),
            req.method().clone(),
            req.uri().clone(),
            span,
            &self.layer.logger,
        ));
        (context::wrap_with_tracer(req, rt.clone()), rt)
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for TracingService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: fmt::Display,
    ReqBody: HttpBody + Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        // The clone is not ready; keep the ready service for this call.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        // Already traced by an outer layer.
        if context::get_tracer(&req).is_some() {
            return Box::pin(inner.call(req));
        }

        let (req, rt) = self.new_tracer(req);
        rt.start();
        let guard = FinishGuard(rt.clone());
        let log = rt.logger().clone();

        Box::pin(
            async move {
                let result = inner.call(req).await;
                match &result {
                    Ok(response) => rt.record_status(response.status()),
                    Err(err) => rt.record_error(err),
                }
                drop(guard);
                result
            }
            .instrument(log),
        )
    }
}

/// Finishes the request tracer on every exit path.
struct FinishGuard(Arc<RequestTracer>);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    use axum::body::Body;
    use axum::http::StatusCode;
    use tower::{service_fn, ServiceExt};

    use crate::http::request::X_REQUEST_ID;
    use crate::observability::tracer::NoopTracer;

    fn layer() -> TracingLayer {
        TracingLayer::new(Arc::new(NoopTracer), tracing::Span::none(), "orders")
    }

    #[tokio::test]
    async fn test_handler_sees_tracer_and_request_id() {
        let svc = layer().layer(service_fn(|req: Request<Body>| async move {
            let rt = context::get_tracer(&req).expect("tracer in context");
            assert!(rt.span().is_started());
            assert!(!rt.span().is_finished());
            let header = req.headers().get(&X_REQUEST_ID).unwrap().to_str().unwrap();
            assert_eq!(rt.request_id(), header);
            assert_eq!(rt.service(), "orders");
            Ok::<_, Infallible>(Response::new(Body::empty()))
        }));

        let res = svc.oneshot(Request::new(Body::empty())).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_nested_layers_share_one_tracer() {
        let inner = layer().layer(service_fn(|req: Request<Body>| async move {
            Ok::<_, Infallible>(Response::new(Body::from(
                context::get_tracer(&req).unwrap().request_id().to_string(),
            )))
        }));
        let svc = layer().layer(inner);

        let req = Request::builder()
            .header(X_REQUEST_ID, "outer-id")
            .body(Body::empty())
            .unwrap();
        let res = svc.oneshot(req).await.unwrap();
        let body = axum::body::to_bytes(res.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"outer-id");
    }
}
