//! RetrainingDispatcher: one bounded POST to the retraining trigger endpoint.
//!
//! The dispatcher never returns an error: transport failures, timeouts,
//! non-2xx answers, malformed bodies and `success: false` all come back as a
//! failed `DispatchResult`. It makes exactly one attempt per call.
//!
//! ## Idempotency
//!
//! Each request carries an `Idempotency-Key` header derived from the payload
//! and the trigger time, so the endpoint can collapse duplicates. The
//! dispatcher claims a key under its lock before sending: a key that is in
//! flight or was the last one delivered is not sent again.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;
use url::Url;
use uuid::Uuid;

use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::types::{DispatchResult, TriggerDecision};

/// Namespace for idempotency keys.
const IDEMPOTENCY_NAMESPACE: Uuid = Uuid::from_u128(0x6f76_6572_7269_6465_2d74_7269_6767_6572);

pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Longest slice of an error body kept in a failure message.
const MAX_ERROR_BODY: usize = 200;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// JSON body of `POST /trigger-retraining`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRequest {
    pub reason: String,
    pub override_count: u64,
    pub threshold: u64,
    /// Sent as a header, not in the body.
    #[serde(skip)]
    pub idempotency_key: Uuid,
}

impl TriggerRequest {
    pub fn new(
        reason: impl Into<String>,
        override_count: u64,
        threshold: u64,
        triggered_at: DateTime<Utc>,
    ) -> Self {
        let reason = reason.into();
        let seed = format!(
            "{}|{}|{}|{}",
            reason,
            override_count,
            threshold,
            triggered_at.to_rfc3339()
        );
        Self {
            idempotency_key: Uuid::new_v5(&IDEMPOTENCY_NAMESPACE, seed.as_bytes()),
            reason,
            override_count,
            threshold,
        }
    }

    /// Request for a triggered decision; `None` when it did not trigger.
    pub fn from_decision(decision: &TriggerDecision, triggered_at: DateTime<Utc>) -> Option<Self> {
        if !decision.triggered {
            return None;
        }
        let threshold = decision.threshold?;
        Some(Self::new(
            decision.reason.clone(),
            decision.count,
            threshold,
            triggered_at,
        ))
    }
}

/// Response body. Success carries `message`/`reason`/`timestamp`, failure
/// carries `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// RetrainingDispatcher
// ---------------------------------------------------------------------------

#[async_trait]
pub trait RetrainingDispatcher: Send + Sync {
    /// Single attempt. Never fails; failures are in the result.
    async fn dispatch(&self, request: &TriggerRequest) -> DispatchResult;
}

#[derive(Debug, Default)]
struct DeliveryLog {
    last_delivered: Option<Uuid>,
    in_flight: HashSet<Uuid>,
}

/// Outcome of claiming an idempotency key.
enum KeyClaim<'a> {
    Claimed(InFlightKey<'a>),
    Delivered,
    InFlight,
}

/// A claimed key. Dropping it releases the claim, also when the dispatch
/// future is cancelled mid-request.
struct InFlightKey<'a> {
    dispatcher: &'a HttpRetrainingDispatcher,
    key: Uuid,
    delivered: bool,
}

impl InFlightKey<'_> {
    fn mark_delivered(mut self) {
        self.delivered = true;
    }
}

impl Drop for InFlightKey<'_> {
    fn drop(&mut self) {
        let mut log = self.dispatcher.deliveries();
        log.in_flight.remove(&self.key);
        if self.delivered {
            log.last_delivered = Some(self.key);
        }
    }
}

/// Dispatcher for the HTTP trigger endpoint.
pub struct HttpRetrainingDispatcher {
    client: Client,
    url: Url,
    timeout: Duration,
    api_token: Option<String>,
    deliveries: Mutex<DeliveryLog>,
}

impl HttpRetrainingDispatcher {
    /// `url` is the full trigger URL, including `/trigger-retraining`.
    pub fn new(url: Url, timeout: Duration, api_token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            url,
            timeout,
            api_token,
            deliveries: Mutex::new(DeliveryLog::default()),
        })
    }

    pub fn from_config(config: &MonitorConfig) -> Result<Self> {
        let url = config
            .trigger_url()
            .context("Failed to build trigger URL")?;
        Self::new(url, config.dispatch_timeout, config.api_token.clone())
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    fn deliveries(&self) -> std::sync::MutexGuard<'_, DeliveryLog> {
        self.deliveries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Check and claim `key` in one step.
    fn claim(&self, key: Uuid) -> KeyClaim<'_> {
        let mut log = self.deliveries();
        if log.last_delivered == Some(key) {
            KeyClaim::Delivered
        } else if !log.in_flight.insert(key) {
            KeyClaim::InFlight
        } else {
            KeyClaim::Claimed(InFlightKey {
                dispatcher: self,
                key,
                delivered: false,
            })
        }
    }

    fn describe_transport(&self, err: &reqwest::Error) -> String {
        if err.is_timeout() {
            format!("request timed out after {:?}", self.timeout)
        } else if err.is_connect() {
            format!("could not connect to {}: {}", self.url, err)
        } else {
            format!("request failed: {}", err)
        }
    }

    /// One POST, all failures folded into `MonitorError::DispatchFailed`.
    async fn send(&self, request: &TriggerRequest) -> std::result::Result<String, MonitorError> {
        let mut builder = self
            .client
            .post(self.url.clone())
            .header(IDEMPOTENCY_HEADER, request.idempotency_key.to_string())
            .json(request);
        if let Some(token) = &self.api_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| MonitorError::DispatchFailed(self.describe_transport(&e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| MonitorError::DispatchFailed(self.describe_transport(&e)))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<TriggerResponse>(&body)
                .ok()
                .and_then(|r| r.error)
                .unwrap_or_else(|| truncate(&body));
            return Err(MonitorError::DispatchFailed(format!(
                "HTTP {}: {}",
                status.as_u16(),
                detail
            )));
        }

        let parsed: TriggerResponse = serde_json::from_str(&body).map_err(|e| {
            MonitorError::DispatchFailed(format!("malformed response body: {}", e))
        })?;

        if !parsed.success {
            return Err(MonitorError::DispatchFailed(
                parsed
                    .error
                    .unwrap_or_else(|| "endpoint reported failure".to_string()),
            ));
        }

        Ok(parsed
            .message
            .unwrap_or_else(|| "Retraining workflow triggered".to_string()))
    }
}

#[async_trait]
impl RetrainingDispatcher for HttpRetrainingDispatcher {
    async fn dispatch(&self, request: &TriggerRequest) -> DispatchResult {
        let claim = match self.claim(request.idempotency_key) {
            KeyClaim::Claimed(claim) => claim,
            KeyClaim::Delivered => {
                tracing::info!(
                    idempotency_key = %request.idempotency_key,
                    "RetrainingDispatcher: duplicate trigger suppressed"
                );
                return DispatchResult::succeeded("Duplicate trigger suppressed", Utc::now());
            }
            KeyClaim::InFlight => {
                tracing::warn!(
                    idempotency_key = %request.idempotency_key,
                    "RetrainingDispatcher: same trigger already in flight"
                );
                return DispatchResult::failed(
                    MonitorError::DispatchFailed("same trigger already in flight".to_string()),
                    Utc::now(),
                );
            }
        };

        match self.send(request).await {
            Ok(message) => {
                claim.mark_delivered();
                tracing::info!(
                    url = %self.url,
                    override_count = request.override_count,
                    threshold = request.threshold,
                    idempotency_key = %request.idempotency_key,
                    "RetrainingDispatcher: retraining triggered"
                );
                DispatchResult::succeeded(message, Utc::now())
            }
            Err(e) => {
                tracing::warn!(
                    url = %self.url,
                    override_count = request.override_count,
                    threshold = request.threshold,
                    error = %e,
                    "RetrainingDispatcher: dispatch failed"
                );
                drop(claim);
                DispatchResult::failed(e, Utc::now())
            }
        }
    }
}

fn truncate(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    trimmed.chars().take(MAX_ERROR_BODY).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::ThresholdRule;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_request_body_has_only_wire_fields() {
        let request = TriggerRequest::new("Override threshold exceeded", 15, 5, t0());
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "reason": "Override threshold exceeded",
                "override_count": 15,
                "threshold": 5
            })
        );
    }

    #[test]
    fn test_idempotency_key_is_deterministic() {
        let a = TriggerRequest::new("r", 15, 5, t0());
        let b = TriggerRequest::new("r", 15, 5, t0());
        let later = TriggerRequest::new("r", 15, 5, t0() + chrono::Duration::seconds(1));
        assert_eq!(a.idempotency_key, b.idempotency_key);
        assert_ne!(a.idempotency_key, later.idempotency_key);
    }

    #[test]
    fn test_from_decision() {
        let triggered = TriggerDecision {
            triggered: true,
            reason: "full_override threshold exceeded".to_string(),
            matched_rule: Some(ThresholdRule::total(3, 0)),
            count: 4,
            threshold: Some(3),
        };
        let request = TriggerRequest::from_decision(&triggered, t0()).unwrap();
        assert_eq!(request.override_count, 4);
        assert_eq!(request.threshold, 3);

        let idle = TriggerDecision::not_triggered("nothing", 0);
        assert!(TriggerRequest::from_decision(&idle, t0()).is_none());
    }

    #[test]
    fn test_failure_response_parses() {
        let parsed: TriggerResponse =
            serde_json::from_str(r#"{"success": false, "error": "workflow disabled"}"#).unwrap();
        assert!(!parsed.success);
        assert_eq!(parsed.error.as_deref(), Some("workflow disabled"));
    }

    #[test]
    fn test_truncate_error_body() {
        assert_eq!(truncate("   "), "empty response body");
        assert_eq!(truncate(&"x".repeat(500)).len(), MAX_ERROR_BODY);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_failure_not_error() {
        // Port 9 on loopback is the discard port; nothing listens there in CI.
        let dispatcher = HttpRetrainingDispatcher::new(
            Url::parse("http://127.0.0.1:9/trigger-retraining").unwrap(),
            Duration::from_secs(2),
            None,
        )
        .unwrap();

        let result = dispatcher
            .dispatch(&TriggerRequest::new("Override threshold exceeded", 15, 5, t0()))
            .await;
        assert!(!result.success);
        assert!(result.error.is_some());
    }
}
