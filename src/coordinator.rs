//! TriggerCoordinator: one evaluation cycle per invocation.
//!
//! `Idle → Evaluating → (Dispatching → Done) | Done`
//!
//! 1. Reserve the dispatch slot; an active cooldown or a concurrent
//!    invocation ends the cycle before any query.
//! 2. Count overrides in the lookback window. A store failure ends the cycle
//!    with the cooldown untouched.
//! 3. Evaluate the threshold rules.
//! 4. Dispatch when triggered, then start the cooldown per `CooldownPolicy`.
//! 5. Log the outcome.
//!
//! Nothing escapes as an error. There is no retry loop: the next feedback
//! event or scheduler tick is the retry.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::clock::{Clock, SystemClock};
use crate::config::MonitorConfig;
use crate::cooldown::{CooldownCheck, CooldownPolicy, CooldownState};
use crate::counter::FeedbackCounter;
use crate::dispatcher::{RetrainingDispatcher, TriggerRequest};
use crate::error::Result;
use crate::policy::{ThresholdConfig, ThresholdPolicy, ThresholdRule};
use crate::stats::{CoordinatorStats, MonitorStats};
use crate::store::FeedbackStore;
use crate::types::{CountResult, DispatchResult, FeedbackEvent, TriggerDecision, WindowBounds, WindowQuery};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// How one invocation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CoordinatorOutcome {
    CooldownActive {
        last_triggered_at: DateTime<Utc>,
        remaining_secs: i64,
    },
    /// Another invocation was evaluating.
    Busy,
    StoreUnavailable {
        error: String,
    },
    NotTriggered {
        counts: CountResult,
        decision: TriggerDecision,
    },
    Dispatched {
        counts: CountResult,
        decision: TriggerDecision,
        dispatch: DispatchResult,
        cooldown_started: bool,
    },
}

impl CoordinatorOutcome {
    /// A dispatch was attempted.
    pub fn triggered(&self) -> bool {
        matches!(self, CoordinatorOutcome::Dispatched { .. })
    }

    pub fn dispatch_succeeded(&self) -> bool {
        matches!(self, CoordinatorOutcome::Dispatched { dispatch, .. } if dispatch.success)
    }

    pub fn decision(&self) -> Option<&TriggerDecision> {
        match self {
            CoordinatorOutcome::NotTriggered { decision, .. }
            | CoordinatorOutcome::Dispatched { decision, .. } => Some(decision),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CoordinatorOutcome::CooldownActive { .. } => "cooldown_active",
            CoordinatorOutcome::Busy => "busy",
            CoordinatorOutcome::StoreUnavailable { .. } => "store_unavailable",
            CoordinatorOutcome::NotTriggered { .. } => "not_triggered",
            CoordinatorOutcome::Dispatched { .. } => "dispatched",
        }
    }
}

/// Snapshot for status endpoints and logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorStatus {
    pub stats: MonitorStats,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub cooldown_remaining_secs: Option<i64>,
    pub lookback_secs: i64,
    pub rules: Vec<ThresholdRule>,
}

// ---------------------------------------------------------------------------
// TriggerCoordinator
// ---------------------------------------------------------------------------

pub struct TriggerCoordinator {
    counter: FeedbackCounter,
    dispatcher: Arc<dyn RetrainingDispatcher>,
    thresholds: ThresholdConfig,
    lookback: chrono::Duration,
    cooldown_period: chrono::Duration,
    cooldown_policy: CooldownPolicy,
    window_bounds: WindowBounds,
    cooldown: CooldownState,
    clock: Arc<dyn Clock>,
    stats: CoordinatorStats,
}

impl TriggerCoordinator {
    /// Fails with `ConfigInvalid` if `config` does not validate.
    pub fn new(
        config: &MonitorConfig,
        store: Arc<dyn FeedbackStore>,
        dispatcher: Arc<dyn RetrainingDispatcher>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            counter: FeedbackCounter::new(store),
            dispatcher,
            thresholds: config.threshold_config()?,
            lookback: config.lookback_duration(),
            cooldown_period: config.cooldown_duration(),
            cooldown_policy: config.cooldown_policy,
            window_bounds: config.window_bounds,
            cooldown: CooldownState::new(),
            clock: Arc::new(SystemClock),
            stats: CoordinatorStats::new(),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_cooldown_state(mut self, cooldown: CooldownState) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn thresholds(&self) -> &ThresholdConfig {
        &self.thresholds
    }

    pub fn last_triggered_at(&self) -> Option<DateTime<Utc>> {
        self.cooldown.last_triggered_at()
    }

    pub fn stats(&self) -> MonitorStats {
        self.stats.snapshot()
    }

    pub fn status(&self) -> MonitorStatus {
        let now = self.clock.now();
        MonitorStatus {
            stats: self.stats.snapshot(),
            last_triggered_at: self.cooldown.last_triggered_at(),
            cooldown_remaining_secs: self
                .cooldown
                .remaining(now, self.cooldown_period)
                .map(|d| d.num_seconds()),
            lookback_secs: self.lookback.num_seconds(),
            rules: self.thresholds.rules().to_vec(),
        }
    }

    /// Run one cycle at the clock's current time.
    pub async fn run_once(&self) -> CoordinatorOutcome {
        self.run_at(self.clock.now()).await
    }

    /// Post-submission hook. Evaluates on a spawned task so the caller is
    /// not held up by the store query or the trigger request.
    ///
    /// Non-override feedback cannot raise any count and is ignored. Returns
    /// `None` when nothing was spawned.
    pub fn on_feedback(self: &Arc<Self>, event: &FeedbackEvent) -> Option<JoinHandle<CoordinatorOutcome>> {
        if !event.category.is_override() {
            tracing::debug!(
                feedback_id = %event.id,
                category = %event.category,
                "TriggerCoordinator: feedback is not an override, skipping evaluation"
            );
            return None;
        }

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(
                    feedback_id = %event.id,
                    error = %e,
                    "TriggerCoordinator: no async runtime, evaluation left to the scheduler"
                );
                return None;
            }
        };

        let this = Arc::clone(self);
        Some(handle.spawn(async move { this.run_once().await }))
    }

    /// Run one cycle with `now` as the current time.
    pub async fn run_at(&self, now: DateTime<Utc>) -> CoordinatorOutcome {
        self.stats.invocation();

        let reservation = match self.cooldown.try_reserve(now, self.cooldown_period) {
            CooldownCheck::Ready(reservation) => reservation,
            CooldownCheck::Active {
                last_triggered_at,
                remaining,
            } => {
                self.stats.cooldown_skip();
                tracing::debug!(
                    last_triggered_at = %last_triggered_at,
                    remaining_secs = remaining.num_seconds(),
                    "TriggerCoordinator: cooldown active, skipping evaluation"
                );
                return CoordinatorOutcome::CooldownActive {
                    last_triggered_at,
                    remaining_secs: remaining.num_seconds(),
                };
            }
            CooldownCheck::Busy => {
                self.stats.busy_skip();
                tracing::debug!("TriggerCoordinator: evaluation already in progress, skipping");
                return CoordinatorOutcome::Busy;
            }
        };

        let window = WindowQuery::trailing(now, self.lookback, self.window_bounds);
        let counts = match self.counter.count(&window, None).await {
            Ok(counts) => counts,
            Err(e) => {
                reservation.release();
                self.stats.store_error();
                tracing::warn!(
                    error = %e,
                    kind = e.kind(),
                    "TriggerCoordinator: override count failed, skipping cycle"
                );
                return CoordinatorOutcome::StoreUnavailable {
                    error: e.to_string(),
                };
            }
        };

        let decision = ThresholdPolicy::evaluate(&counts, &self.thresholds);
        let request = match TriggerRequest::from_decision(&decision, now) {
            Some(request) => request,
            None => {
                reservation.release();
                self.stats.not_triggered();
                tracing::info!(
                    triggered = false,
                    total = counts.total,
                    reason = %decision.reason,
                    "TriggerCoordinator: no retraining needed"
                );
                return CoordinatorOutcome::NotTriggered { counts, decision };
            }
        };

        let dispatch = self.dispatcher.dispatch(&request).await;
        self.stats.dispatch(dispatch.success);

        let cooldown_started = self.cooldown_policy.starts_cooldown(dispatch.success);
        if cooldown_started {
            reservation.commit(now);
        } else {
            reservation.release();
        }

        if dispatch.success {
            tracing::info!(
                triggered = true,
                count = decision.count,
                threshold = request.threshold,
                reason = %decision.reason,
                dispatch_success = true,
                message = %dispatch.message,
                "TriggerCoordinator: retraining triggered"
            );
        } else {
            tracing::warn!(
                triggered = true,
                count = decision.count,
                threshold = request.threshold,
                reason = %decision.reason,
                dispatch_success = false,
                error = dispatch.error.as_deref().unwrap_or("unknown"),
                cooldown_started,
                "TriggerCoordinator: retraining dispatch failed"
            );
        }

        CoordinatorOutcome::Dispatched {
            counts,
            decision,
            dispatch,
            cooldown_started,
        }
    }
}
