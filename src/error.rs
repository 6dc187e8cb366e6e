//! Error handling for the override monitor
//!
//! `MonitorError` is the taxonomy the coordinator reasons about. Store
//! backends and loaders work in `anyhow::Result` and are converted into the
//! typed variants at the counter and config boundaries.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Main error type for the override monitor
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    /// The feedback store could not be queried. The cycle is skipped.
    #[error("Feedback store unavailable: {0}")]
    StoreUnavailable(String),

    /// The trigger endpoint was unreachable, timed out or answered with an error.
    #[error("Retraining dispatch failed: {0}")]
    DispatchFailed(String),

    /// Configuration rejected at load time. Fatal.
    #[error("Invalid configuration for '{field}': {reason}")]
    ConfigInvalid { field: String, reason: String },

    #[error("Invalid count window: start {start} is not before end {end}")]
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl MonitorError {
    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        MonitorError::ConfigInvalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Stable short label used in log fields and status payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            MonitorError::StoreUnavailable(_) => "store_unavailable",
            MonitorError::DispatchFailed(_) => "dispatch_failed",
            MonitorError::ConfigInvalid { .. } => "config_invalid",
            MonitorError::InvalidWindow { .. } => "invalid_window",
        }
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
