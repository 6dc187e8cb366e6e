//! Monitor configuration: load from environment or YAML, validate once.
//!
//! Any invalid value is rejected here as `MonitorError::ConfigInvalid`,
//! before the first evaluation runs.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::cooldown::CooldownPolicy;
use crate::error::{MonitorError, Result};
use crate::policy::{ThresholdConfig, ThresholdRule};
use crate::types::{FeedbackCategory, WindowBounds};

pub const DEFAULT_THRESHOLD: u64 = 10;
pub const DEFAULT_LOOKBACK: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(6 * 60 * 60);
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Longest lookback or cooldown accepted.
const MAX_PERIOD: Duration = Duration::from_secs(366 * 24 * 60 * 60);

const TRIGGER_PATH: &str = "trigger-retraining";

// ---------------------------------------------------------------------------
// MonitorConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Base URL; triggers are POSTed to `<base>/trigger-retraining`.
    pub endpoint_url: Url,
    /// Threshold on the window total. Unset means `DEFAULT_THRESHOLD` when
    /// no category rules are configured, and no total rule otherwise.
    pub default_threshold: Option<u64>,
    pub lookback_window: Duration,
    pub cooldown_period: Duration,
    /// Category rules, evaluated before the total rule.
    pub per_category_thresholds: Vec<ThresholdRule>,
    pub dispatch_timeout: Duration,
    pub check_interval: Duration,
    pub cooldown_policy: CooldownPolicy,
    pub window_bounds: WindowBounds,
    pub api_token: Option<String>,
}

impl MonitorConfig {
    /// Defaults for everything except the endpoint.
    pub fn new(endpoint_url: Url) -> Self {
        Self {
            endpoint_url,
            default_threshold: None,
            lookback_window: DEFAULT_LOOKBACK,
            cooldown_period: DEFAULT_COOLDOWN,
            per_category_thresholds: Vec::new(),
            dispatch_timeout: DEFAULT_DISPATCH_TIMEOUT,
            check_interval: DEFAULT_CHECK_INTERVAL,
            cooldown_policy: CooldownPolicy::default(),
            window_bounds: WindowBounds::default(),
            api_token: None,
        }
    }

    pub fn threshold(mut self, threshold: u64) -> Self {
        self.default_threshold = Some(threshold);
        self
    }

    pub fn lookback(mut self, lookback: Duration) -> Self {
        self.lookback_window = lookback;
        self
    }

    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown_period = cooldown;
        self
    }

    pub fn category_threshold(
        mut self,
        category: FeedbackCategory,
        threshold: u64,
        priority: u32,
    ) -> Self {
        self.per_category_thresholds
            .push(ThresholdRule::for_category(category, threshold, priority));
        self
    }

    pub fn dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = timeout;
        self
    }

    pub fn cooldown_policy(mut self, policy: CooldownPolicy) -> Self {
        self.cooldown_policy = policy;
        self
    }

    pub fn window_bounds(mut self, bounds: WindowBounds) -> Self {
        self.window_bounds = bounds;
        self
    }

    /// Load from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any key/value source. Unset keys take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let endpoint = get("RETRAIN_ENDPOINT_URL")
            .ok_or_else(|| MonitorError::config("RETRAIN_ENDPOINT_URL", "must be set"))?;
        let mut config = Self::new(parse_url("RETRAIN_ENDPOINT_URL", &endpoint)?);

        if let Some(v) = get("OVERRIDE_THRESHOLD") {
            config.default_threshold = Some(parse_threshold("OVERRIDE_THRESHOLD", &v)?);
        }
        if let Some(v) = get("OVERRIDE_LOOKBACK_WINDOW") {
            config.lookback_window = parse_duration("OVERRIDE_LOOKBACK_WINDOW", &v)?;
        }
        if let Some(v) = get("RETRAIN_COOLDOWN") {
            config.cooldown_period = parse_duration("RETRAIN_COOLDOWN", &v)?;
        }
        if let Some(v) = get("OVERRIDE_CATEGORY_THRESHOLDS") {
            config.per_category_thresholds = parse_category_thresholds(&v)?;
        }
        if let Some(v) = get("RETRAIN_DISPATCH_TIMEOUT") {
            config.dispatch_timeout = parse_duration("RETRAIN_DISPATCH_TIMEOUT", &v)?;
        }
        if let Some(v) = get("OVERRIDE_CHECK_INTERVAL") {
            config.check_interval = parse_duration("OVERRIDE_CHECK_INTERVAL", &v)?;
        }
        if let Some(v) = get("RETRAIN_COOLDOWN_POLICY") {
            config.cooldown_policy = v.parse()?;
        }
        if let Some(v) = get("OVERRIDE_WINDOW_BOUNDS") {
            config.window_bounds = v.parse()?;
        }
        config.api_token = get("RETRAIN_API_TOKEN");

        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MonitorError::config(path.display().to_string(), format!("reading: {}", e))
        })?;
        let file: MonitorConfigFile = serde_yaml::from_str(&content).map_err(|e| {
            MonitorError::config(path.display().to_string(), format!("parsing: {}", e))
        })?;
        file.into_config()
    }

    pub fn validate(&self) -> Result<()> {
        if !matches!(self.endpoint_url.scheme(), "http" | "https") {
            return Err(MonitorError::config(
                "endpoint_url",
                format!("unsupported scheme '{}'", self.endpoint_url.scheme()),
            ));
        }
        if self.default_threshold == Some(0) {
            return Err(MonitorError::config(
                "default_threshold",
                "threshold must be a positive integer",
            ));
        }
        check_period("lookback_window", self.lookback_window, false)?;
        check_period("cooldown_period", self.cooldown_period, true)?;
        check_period("dispatch_timeout", self.dispatch_timeout, false)?;
        check_period("check_interval", self.check_interval, false)?;
        if let Some(rule) = self.per_category_thresholds.iter().find(|r| r.category.is_none()) {
            return Err(MonitorError::config(
                "per_category_thresholds",
                format!(
                    "rule with threshold {} has no category; use default_threshold",
                    rule.threshold
                ),
            ));
        }
        self.threshold_config().map(|_| ())
    }

    /// Rule list: category rules as configured, then the total rule one
    /// priority below the last category rule. With category rules and no
    /// explicit default threshold there is no total rule.
    pub fn threshold_config(&self) -> Result<ThresholdConfig> {
        let total_priority = self
            .per_category_thresholds
            .iter()
            .map(|r| r.priority.saturating_add(1))
            .max()
            .unwrap_or(0);

        let mut rules = self.per_category_thresholds.clone();
        let total_threshold = match self.default_threshold {
            Some(threshold) => Some(threshold),
            None if rules.is_empty() => Some(DEFAULT_THRESHOLD),
            None => None,
        };
        if let Some(threshold) = total_threshold {
            rules.push(ThresholdRule::total(threshold, total_priority));
        }
        ThresholdConfig::new(rules)
    }

    /// Full URL of the trigger endpoint.
    pub fn trigger_url(&self) -> Result<Url> {
        let base = self.endpoint_url.as_str().trim_end_matches('/');
        parse_url("endpoint_url", &format!("{}/{}", base, TRIGGER_PATH))
    }

    pub fn lookback_duration(&self) -> chrono::Duration {
        to_chrono(self.lookback_window)
    }

    pub fn cooldown_duration(&self) -> chrono::Duration {
        to_chrono(self.cooldown_period)
    }
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d.min(MAX_PERIOD)).unwrap_or_else(|_| chrono::Duration::zero())
}

fn check_period(field: &str, value: Duration, allow_zero: bool) -> Result<()> {
    if value.is_zero() && !allow_zero {
        return Err(MonitorError::config(field, "duration must be positive"));
    }
    if value > MAX_PERIOD {
        return Err(MonitorError::config(field, "duration must not exceed 366d"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// YAML file form
// ---------------------------------------------------------------------------

/// On-disk shape. Durations are written like the environment values
/// (`30s`, `15m`, `24h`, `7d`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfigFile {
    pub endpoint_url: Option<String>,
    pub default_threshold: Option<u64>,
    pub lookback_window: Option<String>,
    pub cooldown_period: Option<String>,
    pub per_category_thresholds: Vec<ThresholdRule>,
    pub dispatch_timeout: Option<String>,
    pub check_interval: Option<String>,
    pub cooldown_policy: Option<CooldownPolicy>,
    pub window_bounds: Option<WindowBounds>,
    pub api_token: Option<String>,
}

impl MonitorConfigFile {
    pub fn into_config(self) -> Result<MonitorConfig> {
        let endpoint = self
            .endpoint_url
            .ok_or_else(|| MonitorError::config("endpoint_url", "must be set"))?;
        let mut config = MonitorConfig::new(parse_url("endpoint_url", &endpoint)?);

        config.default_threshold = self.default_threshold;
        if let Some(v) = self.lookback_window {
            config.lookback_window = parse_duration("lookback_window", &v)?;
        }
        if let Some(v) = self.cooldown_period {
            config.cooldown_period = parse_duration("cooldown_period", &v)?;
        }
        config.per_category_thresholds = self.per_category_thresholds;
        if let Some(v) = self.dispatch_timeout {
            config.dispatch_timeout = parse_duration("dispatch_timeout", &v)?;
        }
        if let Some(v) = self.check_interval {
            config.check_interval = parse_duration("check_interval", &v)?;
        }
        if let Some(p) = self.cooldown_policy {
            config.cooldown_policy = p;
        }
        if let Some(b) = self.window_bounds {
            config.window_bounds = b;
        }
        config.api_token = self.api_token;

        config.validate()?;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Value parsers
// ---------------------------------------------------------------------------

fn parse_url(field: &str, value: &str) -> Result<Url> {
    Url::parse(value.trim())
        .map_err(|e| MonitorError::config(field, format!("invalid URL '{}': {}", value, e)))
}

fn parse_threshold(field: &str, value: &str) -> Result<u64> {
    let n: i64 = value
        .trim()
        .parse()
        .map_err(|_| MonitorError::config(field, format!("'{}' is not an integer", value)))?;
    if n <= 0 {
        return Err(MonitorError::config(
            field,
            "threshold must be a positive integer",
        ));
    }
    Ok(n as u64)
}

/// Parse `90`, `90s`, `15m`, `24h` or `7d`. A bare number is seconds.
pub fn parse_duration(field: &str, value: &str) -> Result<Duration> {
    let v = value.trim();
    let (digits, unit_secs) = match v.char_indices().last() {
        Some((idx, 's')) => (&v[..idx], 1),
        Some((idx, 'm')) => (&v[..idx], 60),
        Some((idx, 'h')) => (&v[..idx], 60 * 60),
        Some((idx, 'd')) => (&v[..idx], 24 * 60 * 60),
        _ => (v, 1),
    };
    let n: u64 = digits.trim().parse().map_err(|_| {
        MonitorError::config(
            field,
            format!("'{}' is not a duration (expected e.g. 30s, 15m, 24h, 7d)", value),
        )
    })?;
    n.checked_mul(unit_secs)
        .map(Duration::from_secs)
        .ok_or_else(|| MonitorError::config(field, format!("'{}' is out of range", value)))
}

/// Parse `category:threshold[:priority],...`. A missing priority is the
/// entry's position in the list.
pub fn parse_category_thresholds(value: &str) -> Result<Vec<ThresholdRule>> {
    const FIELD: &str = "OVERRIDE_CATEGORY_THRESHOLDS";

    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .enumerate()
        .map(|(idx, entry)| {
            let parts: Vec<&str> = entry.split(':').map(str::trim).collect();
            let (category, threshold, priority) = match parts.as_slice() {
                [c, t] => (*c, *t, None),
                [c, t, p] => (*c, *t, Some(*p)),
                _ => {
                    return Err(MonitorError::config(
                        FIELD,
                        format!("'{}' is not category:threshold[:priority]", entry),
                    ))
                }
            };
            let category: FeedbackCategory = category.parse()?;
            let threshold = parse_threshold(FIELD, threshold)?;
            let priority = match priority {
                Some(p) => p.parse::<u32>().map_err(|_| {
                    MonitorError::config(FIELD, format!("priority '{}' is not an integer", p))
                })?,
                None => idx as u32,
            };
            Ok(ThresholdRule::for_category(category, threshold, priority))
        })
        .collect()
}
