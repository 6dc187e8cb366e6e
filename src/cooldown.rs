//! CooldownState: the only shared mutable state in the monitor.
//!
//! An invocation that wants to evaluate must first reserve the dispatch slot.
//! The check of `last_triggered_at` and the reservation happen under one
//! lock, so two concurrent invocations can never both dispatch inside the
//! same cooldown window. The reservation is settled by `commit` (start the
//! cooldown) or `release`; dropping it unsettled releases it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use crate::error::{MonitorError, Result};

/// When a dispatch starts the cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CooldownPolicy {
    /// Any dispatch attempt starts the cooldown, failed ones included.
    #[default]
    #[serde(rename = "attempt", alias = "on_attempt")]
    OnAttempt,
    /// Only a successful dispatch starts the cooldown.
    #[serde(rename = "success", alias = "on_success")]
    OnSuccess,
}

impl CooldownPolicy {
    pub fn starts_cooldown(&self, dispatch_succeeded: bool) -> bool {
        match self {
            CooldownPolicy::OnAttempt => true,
            CooldownPolicy::OnSuccess => dispatch_succeeded,
        }
    }
}

impl FromStr for CooldownPolicy {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "attempt" | "on_attempt" => Ok(CooldownPolicy::OnAttempt),
            "success" | "on_success" => Ok(CooldownPolicy::OnSuccess),
            other => Err(MonitorError::config(
                "cooldown_policy",
                format!("expected 'attempt' or 'success', got '{}'", other),
            )),
        }
    }
}

#[derive(Debug, Default)]
struct CooldownInner {
    last_triggered_at: Option<DateTime<Utc>>,
    in_flight: bool,
}

/// Result of trying to reserve the dispatch slot.
#[derive(Debug)]
pub enum CooldownCheck<'a> {
    Ready(CooldownReservation<'a>),
    Active {
        last_triggered_at: DateTime<Utc>,
        remaining: Duration,
    },
    /// Another invocation holds the slot.
    Busy,
}

#[derive(Debug, Default)]
pub struct CooldownState {
    inner: Mutex<CooldownInner>,
}

impl CooldownState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a known trigger time, e.g. one restored from an audit log.
    pub fn with_last_triggered(at: DateTime<Utc>) -> Self {
        Self {
            inner: Mutex::new(CooldownInner {
                last_triggered_at: Some(at),
                in_flight: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CooldownInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn last_triggered_at(&self) -> Option<DateTime<Utc>> {
        self.lock().last_triggered_at
    }

    /// Time left in the cooldown at `now`, if any.
    pub fn remaining(&self, now: DateTime<Utc>, period: Duration) -> Option<Duration> {
        remaining_in(self.lock().last_triggered_at, now, period)
    }

    /// Check the cooldown and, if it has elapsed and no other invocation holds
    /// the slot, reserve it.
    pub fn try_reserve(&self, now: DateTime<Utc>, period: Duration) -> CooldownCheck<'_> {
        let mut inner = self.lock();

        if let Some(remaining) = remaining_in(inner.last_triggered_at, now, period) {
            if let Some(last_triggered_at) = inner.last_triggered_at {
                return CooldownCheck::Active {
                    last_triggered_at,
                    remaining,
                };
            }
        }
        if inner.in_flight {
            return CooldownCheck::Busy;
        }

        inner.in_flight = true;
        CooldownCheck::Ready(CooldownReservation {
            state: self,
            settled: false,
        })
    }
}

fn remaining_in(
    last_triggered_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    period: Duration,
) -> Option<Duration> {
    let last = last_triggered_at?;
    let elapsed = now - last;
    if elapsed < period {
        // A trigger time ahead of `now` (clock skew) never extends the period.
        Some((period - elapsed).min(period))
    } else {
        None
    }
}

/// Exclusive right to evaluate and dispatch until settled.
#[derive(Debug)]
pub struct CooldownReservation<'a> {
    state: &'a CooldownState,
    settled: bool,
}

impl CooldownReservation<'_> {
    /// Record a trigger at `at` and free the slot.
    pub fn commit(mut self, at: DateTime<Utc>) {
        let mut inner = self.state.lock();
        inner.last_triggered_at = Some(at);
        inner.in_flight = false;
        self.settled = true;
    }

    /// Free the slot without touching `last_triggered_at`.
    pub fn release(mut self) {
        self.state.lock().in_flight = false;
        self.settled = true;
    }
}

impl Drop for CooldownReservation<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.state.lock().in_flight = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_fresh_state_is_ready() {
        let state = CooldownState::new();
        assert!(matches!(
            state.try_reserve(t0(), Duration::hours(1)),
            CooldownCheck::Ready(_)
        ));
        assert!(state.last_triggered_at().is_none());
    }

    #[test]
    fn test_commit_starts_cooldown() {
        let state = CooldownState::new();
        match state.try_reserve(t0(), Duration::hours(1)) {
            CooldownCheck::Ready(r) => r.commit(t0()),
            other => panic!("expected Ready, got {:?}", other),
        }

        match state.try_reserve(t0() + Duration::minutes(20), Duration::hours(1)) {
            CooldownCheck::Active { remaining, .. } => {
                assert_eq!(remaining, Duration::minutes(40))
            }
            other => panic!("expected Active, got {:?}", other),
        }

        assert!(matches!(
            state.try_reserve(t0() + Duration::hours(1), Duration::hours(1)),
            CooldownCheck::Ready(_)
        ));
    }

    #[test]
    fn test_second_reservation_is_busy() {
        let state = CooldownState::new();
        let first = state.try_reserve(t0(), Duration::hours(1));
        assert!(matches!(first, CooldownCheck::Ready(_)));
        assert!(matches!(
            state.try_reserve(t0(), Duration::hours(1)),
            CooldownCheck::Busy
        ));
        drop(first);
        assert!(matches!(
            state.try_reserve(t0(), Duration::hours(1)),
            CooldownCheck::Ready(_)
        ));
    }

    #[test]
    fn test_release_keeps_last_trigger() {
        let state = CooldownState::with_last_triggered(t0() - Duration::hours(2));
        match state.try_reserve(t0(), Duration::hours(1)) {
            CooldownCheck::Ready(r) => r.release(),
            other => panic!("expected Ready, got {:?}", other),
        }
        assert_eq!(state.last_triggered_at(), Some(t0() - Duration::hours(2)));
    }

    #[test]
    fn test_future_trigger_time_caps_remaining_at_period() {
        let state = CooldownState::with_last_triggered(t0() + Duration::hours(2));
        assert_eq!(
            state.remaining(t0(), Duration::hours(1)),
            Some(Duration::hours(1))
        );
        match state.try_reserve(t0(), Duration::hours(1)) {
            CooldownCheck::Active { remaining, .. } => assert_eq!(remaining, Duration::hours(1)),
            other => panic!("expected Active, got {:?}", other),
        };
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("attempt".parse::<CooldownPolicy>().unwrap(), CooldownPolicy::OnAttempt);
        assert_eq!("SUCCESS".parse::<CooldownPolicy>().unwrap(), CooldownPolicy::OnSuccess);
        assert!("never".parse::<CooldownPolicy>().is_err());
        assert!(CooldownPolicy::OnAttempt.starts_cooldown(false));
        assert!(!CooldownPolicy::OnSuccess.starts_cooldown(false));
    }
}
