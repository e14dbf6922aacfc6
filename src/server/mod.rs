//! Prometheus metrics and the HTTP endpoint that exposes them.

pub mod metrics;

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub fn make_metrics_router() -> Router {
    Router::new().route("/metrics", get(metrics::metrics_handler))
}

/// Serve `GET /metrics` on localhost until `shutdown` is cancelled.
pub async fn run_metrics_server(port: u16, shutdown: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .with_context(|| format!("Failed to bind metrics port {}", port))?;
    info!("Serving metrics on http://127.0.0.1:{}/metrics", port);

    axum::serve(listener, make_metrics_router())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("Metrics server failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn metrics_server_stops_on_shutdown() {
        let shutdown = CancellationToken::new();
        let server = tokio::spawn(run_metrics_server(0, shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();

        let result = tokio::time::timeout(Duration::from_secs(2), server)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn metrics_handler_renders_registered_metrics() {
        use axum::response::IntoResponse;

        metrics::init_metrics();
        metrics::record_crawl_entity("album", "skipped");
        let response = metrics::metrics_handler().await.into_response();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }
}
