//! OS signal handling.

use std::time::Duration;

/// Grace period for in-flight TLS connections after a shutdown signal.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Wait for shutdown signal (Ctrl+C).
///
/// If the handler cannot be installed this never resolves, so the server
/// keeps running instead of exiting immediately.
pub async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Trigger graceful shutdown of an axum-server handle on signal.
pub async fn shutdown_on_signal(handle: axum_server::Handle) {
    shutdown_signal().await;
    handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
}
