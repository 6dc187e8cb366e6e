//! Stub retraining trigger endpoint on an ephemeral loopback port.
//!
//! Serves `POST /trigger-retraining` and records every request it receives.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

/// How the stub answers.
#[derive(Debug, Clone, Copy)]
pub enum StubMode {
    /// 200 with `{success: true, ...}`.
    Succeed,
    /// 500 with `{success: false, error}`.
    Reject,
    /// 200 with `{success: false, error}`.
    ReportFailure,
    /// 200 with a body that is not JSON.
    Malformed,
    /// Sleep before answering successfully.
    Hang(Duration),
}

#[derive(Debug, Clone)]
pub struct Received {
    pub body: serde_json::Value,
    pub idempotency_key: Option<String>,
    pub authorization: Option<String>,
}

#[derive(Clone)]
struct StubState {
    mode: StubMode,
    received: Arc<Mutex<Vec<Received>>>,
}

pub struct StubEndpoint {
    /// Base URL; the trigger lives at `<base>/trigger-retraining`.
    pub base: Url,
    received: Arc<Mutex<Vec<Received>>>,
}

impl StubEndpoint {
    pub async fn spawn(mode: StubMode) -> Self {
        let received = Arc::new(Mutex::new(Vec::new()));
        let state = StubState {
            mode,
            received: received.clone(),
        };
        let app = Router::new()
            .route("/trigger-retraining", post(trigger))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub endpoint");
        let addr = listener.local_addr().expect("stub endpoint address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("stub endpoint server");
        });

        Self {
            base: Url::parse(&format!("http://{}", addr)).expect("stub endpoint URL"),
            received,
        }
    }

    pub fn trigger_url(&self) -> Url {
        self.base.join("/trigger-retraining").expect("trigger URL")
    }

    pub fn received(&self) -> Vec<Received> {
        self.received.lock().unwrap().clone()
    }

    pub fn hits(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}

async fn trigger(
    State(state): State<StubState>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    state.received.lock().unwrap().push(Received {
        body: body.clone(),
        idempotency_key: header("idempotency-key"),
        authorization: header("authorization"),
    });

    match state.mode {
        StubMode::Succeed => succeed(&body).into_response(),
        StubMode::Reject => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "success": false, "error": "workflow dispatch failed" })),
        )
            .into_response(),
        StubMode::ReportFailure => Json(serde_json::json!({
            "success": false,
            "error": "GitHub token missing"
        }))
        .into_response(),
        StubMode::Malformed => (StatusCode::OK, "<html>gateway</html>").into_response(),
        StubMode::Hang(delay) => {
            tokio::time::sleep(delay).await;
            succeed(&body).into_response()
        }
    }
}

fn succeed(body: &serde_json::Value) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "success": true,
        "message": "Retraining workflow triggered",
        "reason": body["reason"],
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
