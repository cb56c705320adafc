//! Traced HTTP echo service.
//!
//! # Architecture Overview
//!
//! ```text
//!   CLI flags (--prefix, --config)
//!       │
//!       ▼
//!   ┌──────────────┐    ┌──────────────┐    ┌──────────────┐
//!   │ config       │───▶│ logging      │───▶│ TLS material │
//!   │ (env + .env) │    │ (subscriber) │    │ (optional)   │
//!   └──────────────┘    └──────────────┘    └──────┬───────┘
//!                                                  │
//!   Client Request                                 ▼
//!   ─────────────▶ TracingLayer ─▶ TimeoutLayer ─▶ handlers
//!                  (request id, span, RequestTracer in context)
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::Instrument;

use svc_commons::config::{RootArgs, ServerConfig, TlsConfig};
use svc_commons::http::HttpServer;
use svc_commons::observability::{metrics, tracer, OtelTracer};

#[derive(Debug, Parser)]
#[command(name = "svc-commons", version, about = "Traced HTTP echo service")]
struct Cli {
    #[command(flatten)]
    root: RootArgs,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let (logger, config): (_, ServerConfig) = cli.root.setup(env!("CARGO_PKG_VERSION"))?;
    serve(&cli.root, config, logger.clone())
        .instrument(logger)
        .await
}

async fn serve(
    root: &RootArgs,
    config: ServerConfig,
    logger: tracing::Span,
) -> Result<(), Box<dyn std::error::Error>> {
    let tls_config: TlsConfig = root.environment()?.decode_section(&root.prefix, "tls")?;
    let tls = tls_config.materialize()?;

    tracing::info!(
        bind_address = %config.bind_address,
        service = %config.service_name,
        tls = tls.is_some(),
        request_timeout_secs = config.request_timeout_secs,
        "Configuration loaded"
    );

    if let Some(metrics_address) = &config.metrics_address {
        let addr: SocketAddr = metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let listener = TcpListener::bind(&config.bind_address).await?;

    let provider = tracer::init_tracer_provider(&config.service_name, config.trace_stdout);
    let server = HttpServer::new(
        config,
        tls,
        Arc::new(OtelTracer::global("svc-commons")),
        logger,
    );
    let result = server.run(listener).await;

    if let Err(e) = provider.shutdown() {
        tracing::warn!(error = %e, "Tracer provider shutdown failed");
    }
    result?;

    tracing::info!("Shutdown complete");
    Ok(())
}
