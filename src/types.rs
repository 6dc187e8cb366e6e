//! Core data types: feedback events, count windows, count results,
//! trigger decisions and dispatch results.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{MonitorError, Result};
use crate::policy::ThresholdRule;

// ---------------------------------------------------------------------------
// FeedbackCategory
// ---------------------------------------------------------------------------

/// Kind of reviewer feedback recorded against a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackCategory {
    /// Reviewer replaced the prediction entirely.
    FullOverride,
    /// Reviewer corrected part of the prediction.
    PartialOverride,
    Agree,
    Other,
}

impl FeedbackCategory {
    /// Categories that count towards retraining.
    pub const OVERRIDES: [FeedbackCategory; 2] = [
        FeedbackCategory::FullOverride,
        FeedbackCategory::PartialOverride,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackCategory::FullOverride => "full_override",
            FeedbackCategory::PartialOverride => "partial_override",
            FeedbackCategory::Agree => "agree",
            FeedbackCategory::Other => "other",
        }
    }

    pub fn is_override(&self) -> bool {
        matches!(
            self,
            FeedbackCategory::FullOverride | FeedbackCategory::PartialOverride
        )
    }
}

impl fmt::Display for FeedbackCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedbackCategory {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full_override" => Ok(FeedbackCategory::FullOverride),
            "partial_override" => Ok(FeedbackCategory::PartialOverride),
            "agree" => Ok(FeedbackCategory::Agree),
            "other" => Ok(FeedbackCategory::Other),
            other => Err(MonitorError::config(
                "category",
                format!("unknown feedback category '{}'", other),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// FeedbackEvent
// ---------------------------------------------------------------------------

/// A single piece of reviewer feedback. Written by the submission path,
/// only ever read in aggregate here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub category: FeedbackCategory,
}

impl FeedbackEvent {
    pub fn new(category: FeedbackCategory, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            category,
        }
    }
}

// ---------------------------------------------------------------------------
// WindowQuery
// ---------------------------------------------------------------------------

/// Which window edges are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowBounds {
    /// `[start, end)`. An event on the boundary of two consecutive
    /// scheduled windows is counted exactly once.
    #[default]
    HalfOpen,
    /// `[start, end]`, matching `BETWEEN start AND end`.
    Inclusive,
}

impl FromStr for WindowBounds {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "half_open" | "half-open" => Ok(WindowBounds::HalfOpen),
            "inclusive" => Ok(WindowBounds::Inclusive),
            other => Err(MonitorError::config(
                "window_bounds",
                format!("expected 'half_open' or 'inclusive', got '{}'", other),
            )),
        }
    }
}

/// Time window (and optional category filter) for one count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// `None` counts every override category.
    pub categories: Option<BTreeSet<FeedbackCategory>>,
    pub bounds: WindowBounds,
}

impl WindowQuery {
    /// Window ending at `now` and reaching back `lookback`.
    pub fn trailing(now: DateTime<Utc>, lookback: Duration, bounds: WindowBounds) -> Self {
        Self {
            start: now - lookback,
            end: now,
            categories: None,
            bounds,
        }
    }

    /// Restrict the count to the given categories.
    pub fn with_categories(mut self, categories: impl IntoIterator<Item = FeedbackCategory>) -> Self {
        self.categories = Some(categories.into_iter().collect());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.start >= self.end {
            return Err(MonitorError::InvalidWindow {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    /// Whether `ts` falls inside the window under the configured bounds.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        if ts < self.start {
            return false;
        }
        match self.bounds {
            WindowBounds::HalfOpen => ts < self.end,
            WindowBounds::Inclusive => ts <= self.end,
        }
    }

    /// Override categories the query actually counts: the override set,
    /// intersected with the filter when one is present.
    pub fn counted_categories(&self) -> Vec<FeedbackCategory> {
        FeedbackCategory::OVERRIDES
            .iter()
            .copied()
            .filter(|c| self.categories.as_ref().map_or(true, |f| f.contains(c)))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// CountResult
// ---------------------------------------------------------------------------

/// Per-category override counts for one window, plus their total.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountResult {
    pub by_category: BTreeMap<FeedbackCategory, u64>,
    pub total: u64,
}

impl CountResult {
    pub fn from_counts(counts: impl IntoIterator<Item = (FeedbackCategory, u64)>) -> Self {
        let mut by_category = BTreeMap::new();
        for (category, count) in counts {
            *by_category.entry(category).or_insert(0) += count;
        }
        let total = by_category.values().sum();
        Self { by_category, total }
    }

    /// Count for one category; zero when absent.
    pub fn get(&self, category: FeedbackCategory) -> u64 {
        self.by_category.get(&category).copied().unwrap_or(0)
    }

    /// Count a rule looks at: the total when it has no category.
    pub fn for_filter(&self, category: Option<FeedbackCategory>) -> u64 {
        match category {
            Some(c) => self.get(c),
            None => self.total,
        }
    }
}

// ---------------------------------------------------------------------------
// TriggerDecision
// ---------------------------------------------------------------------------

/// Output of policy evaluation. Carries no side effects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriggerDecision {
    pub triggered: bool,
    pub reason: String,
    pub matched_rule: Option<ThresholdRule>,
    /// Count of the matched rule, or the window total when nothing matched.
    pub count: u64,
    pub threshold: Option<u64>,
}

impl TriggerDecision {
    pub fn not_triggered(reason: impl Into<String>, total: u64) -> Self {
        Self {
            triggered: false,
            reason: reason.into(),
            matched_rule: None,
            count: total,
            threshold: None,
        }
    }
}

// ---------------------------------------------------------------------------
// DispatchResult
// ---------------------------------------------------------------------------

/// Outcome of a single dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchResult {
    pub success: bool,
    pub message: String,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl DispatchResult {
    pub fn succeeded(message: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            success: true,
            message: message.into(),
            error: None,
            timestamp,
        }
    }

    pub fn failed(error: MonitorError, timestamp: DateTime<Utc>) -> Self {
        let message = error.to_string();
        let detail = match error {
            MonitorError::DispatchFailed(detail) => detail,
            other => other.to_string(),
        };
        Self {
            success: false,
            message,
            error: Some(detail),
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, hour, min, 0).unwrap()
    }

    #[test]
    fn test_category_parse_and_display() {
        assert_eq!(
            "full_override".parse::<FeedbackCategory>().unwrap(),
            FeedbackCategory::FullOverride
        );
        assert_eq!(
            " Partial_Override ".parse::<FeedbackCategory>().unwrap(),
            FeedbackCategory::PartialOverride
        );
        assert!("rejected".parse::<FeedbackCategory>().is_err());
        assert_eq!(FeedbackCategory::Agree.to_string(), "agree");
    }

    #[test]
    fn test_only_overrides_are_overrides() {
        assert!(FeedbackCategory::FullOverride.is_override());
        assert!(FeedbackCategory::PartialOverride.is_override());
        assert!(!FeedbackCategory::Agree.is_override());
        assert!(!FeedbackCategory::Other.is_override());
    }

    #[test]
    fn test_half_open_window_excludes_end() {
        let w = WindowQuery::trailing(at(12, 0), Duration::hours(1), WindowBounds::HalfOpen);
        assert!(w.contains(at(11, 0)));
        assert!(w.contains(at(11, 59)));
        assert!(!w.contains(at(12, 0)));
        assert!(!w.contains(at(10, 59)));
    }

    #[test]
    fn test_inclusive_window_includes_both_ends() {
        let w = WindowQuery::trailing(at(12, 0), Duration::hours(1), WindowBounds::Inclusive);
        assert!(w.contains(at(11, 0)));
        assert!(w.contains(at(12, 0)));
    }

    #[test]
    fn test_consecutive_half_open_windows_count_boundary_once() {
        let first = WindowQuery::trailing(at(12, 0), Duration::hours(1), WindowBounds::HalfOpen);
        let second = WindowQuery::trailing(at(13, 0), Duration::hours(1), WindowBounds::HalfOpen);
        let boundary = at(12, 0);
        let hits = [first.contains(boundary), second.contains(boundary)];
        assert_eq!(hits.iter().filter(|h| **h).count(), 1);
    }

    #[test]
    fn test_window_validation() {
        let mut w = WindowQuery::trailing(at(12, 0), Duration::hours(1), WindowBounds::HalfOpen);
        assert!(w.validate().is_ok());
        w.start = w.end;
        assert!(matches!(w.validate(), Err(MonitorError::InvalidWindow { .. })));
    }

    #[test]
    fn test_counted_categories_intersects_filter() {
        let w = WindowQuery::trailing(at(12, 0), Duration::hours(1), WindowBounds::HalfOpen);
        assert_eq!(w.counted_categories(), FeedbackCategory::OVERRIDES.to_vec());

        let filtered = w
            .clone()
            .with_categories([FeedbackCategory::PartialOverride, FeedbackCategory::Agree]);
        assert_eq!(
            filtered.counted_categories(),
            vec![FeedbackCategory::PartialOverride]
        );
    }

    #[test]
    fn test_count_result_totals() {
        let counts = CountResult::from_counts([
            (FeedbackCategory::FullOverride, 3),
            (FeedbackCategory::PartialOverride, 20),
        ]);
        assert_eq!(counts.total, 23);
        assert_eq!(counts.get(FeedbackCategory::FullOverride), 3);
        assert_eq!(counts.get(FeedbackCategory::Agree), 0);
        assert_eq!(counts.for_filter(None), 23);
    }

    #[test]
    fn test_failed_dispatch_result_keeps_detail() {
        let result = DispatchResult::failed(
            MonitorError::DispatchFailed("HTTP 503".to_string()),
            at(12, 0),
        );
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("HTTP 503"));
        assert!(result.message.contains("HTTP 503"));
    }
}
