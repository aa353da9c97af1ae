//! HTTP server for the Prometheus metrics endpoint.

use axum::{Router, routing::get};
use std::net::SocketAddr;

/// Handler for GET /metrics.
async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

fn router() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

/// Serve `/metrics` on `0.0.0.0:port` until the task is dropped.
pub async fn run_http_server(port: u16) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "Prometheus HTTP server listening");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "Failed to bind HTTP server");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, router()).await {
        tracing::error!(error = %e, "HTTP server error");
    }
}
