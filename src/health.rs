//! HTTP server for health checks and metrics
//!
//! `/health` reports the synchronizer status and answers 503 unless the
//! book is synced, so a stale mirror is visible to probes.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use std::net::SocketAddr;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::metrics;
use crate::orderbook::SyncStatus;

pub fn router(status: watch::Receiver<SyncStatus>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(render_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(status)
}

/// Serve the health router until the process exits
pub async fn serve(port: u16, status: watch::Receiver<SyncStatus>) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(addr = %addr, "Starting health check server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(status)).await
}

async fn health_check(
    State(status): State<watch::Receiver<SyncStatus>>,
) -> (StatusCode, Json<serde_json::Value>) {
    let status = status.borrow().clone();
    let code = if status.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = serde_json::json!({
        "status": if status.is_healthy() { "healthy" } else { "unhealthy" },
        "component": "market-depth-sync",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "sync": status,
    });
    (code, Json(body))
}

async fn render_metrics() -> String {
    metrics::render()
}
