//! End-to-end tests against a running server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use serde_json::Value;
use tokio::net::TcpListener;

use svc_commons::config::ServerConfig;
use svc_commons::http::HttpServer;
use svc_commons::observability::{NoopTracer, OtelTracer, Tracer};

async fn start_server(tracer: Arc<dyn Tracer>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let config = ServerConfig {
        bind_address: addr.to_string(),
        service_name: "echo".to_string(),
        ..Default::default()
    };
    let server = HttpServer::new(config, None, tracer, tracing::Span::none());
    tokio::spawn(async move {
        let _ = server.run(listener).await;
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    addr
}

fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

#[tokio::test]
async fn test_health() {
    let addr = start_server(Arc::new(NoopTracer)).await;

    let res = client()
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .expect("server unreachable");
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn test_echo_reports_request_id() {
    let addr = start_server(Arc::new(NoopTracer)).await;

    let body: Value = client()
        .post(format!("http://{}/orders/7", addr))
        .header("x-request-id", "e2e-request")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["request_id"], "e2e-request");
    assert_eq!(body["method"], "POST");
    assert_eq!(body["path"], "/orders/7");
    assert!(body["trace_id"].is_null());
}

#[tokio::test]
async fn test_echo_generates_request_id() {
    let addr = start_server(Arc::new(NoopTracer)).await;

    let body: Value = client()
        .get(format!("http://{}/", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let id = body["request_id"].as_str().unwrap();
    assert!(uuid::Uuid::parse_str(id).is_ok());
}

#[tokio::test]
async fn test_upstream_trace_is_continued() {
    let provider = SdkTracerProvider::builder().build();
    let tracer = Arc::new(OtelTracer::new(provider.tracer("server-test")));
    let addr = start_server(tracer).await;

    let body: Value = client()
        .get(format!("http://{}/", addr))
        .header(
            "traceparent",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
        )
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["trace_id"], "4bf92f3577b34da6a3ce929d0e0e4736");
}
