//! Threshold rules and the pure policy that turns window counts into a
//! trigger decision.
//!
//! Priority is data: rules are evaluated in ascending `priority` order and the
//! first rule whose count meets or exceeds its threshold wins. Rules sharing a
//! priority keep their configuration order, so the earlier rule wins a tie.

use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, Result};
use crate::types::{CountResult, FeedbackCategory, TriggerDecision};

// ---------------------------------------------------------------------------
// ThresholdRule
// ---------------------------------------------------------------------------

/// One `(category, threshold, priority)` rule. `category: None` looks at the
/// window total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdRule {
    #[serde(default)]
    pub category: Option<FeedbackCategory>,
    pub threshold: u64,
    /// 0 is evaluated first.
    #[serde(default)]
    pub priority: u32,
}

impl ThresholdRule {
    pub fn total(threshold: u64, priority: u32) -> Self {
        Self {
            category: None,
            threshold,
            priority,
        }
    }

    pub fn for_category(category: FeedbackCategory, threshold: u64, priority: u32) -> Self {
        Self {
            category: Some(category),
            threshold,
            priority,
        }
    }

    fn reason(&self, count: u64) -> String {
        match self.category {
            None => format!(
                "Override threshold exceeded: {} overrides >= threshold {}",
                count, self.threshold
            ),
            Some(category) => format!(
                "{} threshold exceeded: {} overrides >= threshold {}",
                category, count, self.threshold
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// ThresholdConfig
// ---------------------------------------------------------------------------

/// Validated, ordered rule list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ThresholdConfig {
    rules: Vec<ThresholdRule>,
}

impl ThresholdConfig {
    /// Validate and keep the rules in configuration order.
    ///
    /// Rejects zero thresholds and rules on categories that are never counted.
    pub fn new(rules: Vec<ThresholdRule>) -> Result<Self> {
        for (idx, rule) in rules.iter().enumerate() {
            if rule.threshold == 0 {
                return Err(MonitorError::config(
                    format!("rules[{}].threshold", idx),
                    "threshold must be a positive integer",
                ));
            }
            if let Some(category) = rule.category {
                if !category.is_override() {
                    return Err(MonitorError::config(
                        format!("rules[{}].category", idx),
                        format!("'{}' is not an override category and is never counted", category),
                    ));
                }
            }
        }
        Ok(Self { rules })
    }

    /// Single rule on the window total.
    pub fn single(threshold: u64) -> Result<Self> {
        Self::new(vec![ThresholdRule::total(threshold, 0)])
    }

    pub fn rules(&self) -> &[ThresholdRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Categories any rule looks at individually.
    pub fn categories(&self) -> Vec<FeedbackCategory> {
        let mut categories: Vec<_> = self.rules.iter().filter_map(|r| r.category).collect();
        categories.sort();
        categories.dedup();
        categories
    }

    /// Rules in evaluation order. `sort_by_key` is stable, which gives the
    /// list-order tie break for equal priorities.
    pub fn evaluation_order(&self) -> Vec<&ThresholdRule> {
        let mut ordered: Vec<&ThresholdRule> = self.rules.iter().collect();
        ordered.sort_by_key(|r| r.priority);
        ordered
    }
}

// ---------------------------------------------------------------------------
// ThresholdPolicy
// ---------------------------------------------------------------------------

/// Pure decision function. No I/O.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdPolicy;

impl ThresholdPolicy {
    pub fn evaluate(counts: &CountResult, config: &ThresholdConfig) -> TriggerDecision {
        if config.is_empty() {
            return TriggerDecision::not_triggered("No threshold rules configured", counts.total);
        }

        for rule in config.evaluation_order() {
            let count = counts.for_filter(rule.category);
            if count >= rule.threshold {
                return TriggerDecision {
                    triggered: true,
                    reason: rule.reason(count),
                    matched_rule: Some(rule.clone()),
                    count,
                    threshold: Some(rule.threshold),
                };
            }
        }

        TriggerDecision::not_triggered(
            format!(
                "No threshold reached ({} overrides in window)",
                counts.total
            ),
            counts.total,
        )
    }
}
