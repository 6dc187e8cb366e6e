//! Status REST API (feature `server`).
//!
//! - `GET  /health`
//! - `GET  /monitor/status`: counters, last trigger, remaining cooldown, rules
//! - `POST /monitor/evaluate`: run one cycle now and return its outcome

use anyhow::{Context, Result};
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

use crate::coordinator::{CoordinatorOutcome, MonitorStatus, TriggerCoordinator};

pub fn router(coordinator: Arc<TriggerCoordinator>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/monitor/status", get(status))
        .route("/monitor/evaluate", post(evaluate))
        .layer(TraceLayer::new_for_http())
        .with_state(coordinator)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn status(State(coordinator): State<Arc<TriggerCoordinator>>) -> Json<MonitorStatus> {
    Json(coordinator.status())
}

async fn evaluate(State(coordinator): State<Arc<TriggerCoordinator>>) -> Json<CoordinatorOutcome> {
    Json(coordinator.run_once().await)
}

/// Serve the API until the shutdown signal flips.
pub async fn serve(
    addr: SocketAddr,
    coordinator: Arc<TriggerCoordinator>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Binding status API to {}", addr))?;
    tracing::info!(addr = %addr, "Status API listening");

    axum::serve(listener, router(coordinator))
        .with_graceful_shutdown(async move {
            while !*shutdown_rx.borrow() {
                if shutdown_rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .context("Status API server failed")
}
