//! Override Monitor - retraining trigger driven by reviewer overrides
//!
//! Counts radiologist overrides of model predictions over a trailing window
//! and, when a threshold rule is reached, asks an external retraining
//! workflow to start. A cooldown keeps a sustained burst of overrides from
//! triggering more than once.
//!
//! ## Components
//!
//! - `counter`: windowed override counts over a `FeedbackStore`
//! - `policy`: ordered threshold rules and the pure decision function
//! - `dispatcher`: one bounded POST to the trigger endpoint
//! - `coordinator`: a single evaluation cycle, cooldown included
//! - `scheduler`: periodic invocation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use override_monitor::{
//!     HttpRetrainingDispatcher, InMemoryFeedbackStore, MonitorConfig, TriggerCoordinator,
//! };
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = MonitorConfig::from_env()?;
//! let store = Arc::new(InMemoryFeedbackStore::new());
//! let dispatcher = Arc::new(HttpRetrainingDispatcher::from_config(&config)?);
//! let coordinator = Arc::new(TriggerCoordinator::new(&config, store, dispatcher)?);
//!
//! let outcome = coordinator.run_once().await;
//! println!("{}", outcome.label());
//! # Ok(())
//! # }
//! ```

// Core error handling
pub mod error;

pub mod types;

pub mod clock;
pub mod config;
pub mod cooldown;
pub mod coordinator;
pub mod counter;
pub mod dispatcher;
pub mod policy;
pub mod scheduler;
pub mod stats;
pub mod store;

// REST status API (when enabled)
#[cfg(feature = "server")]
pub mod api;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::MonitorConfig;
pub use cooldown::{CooldownPolicy, CooldownState};
pub use coordinator::{CoordinatorOutcome, MonitorStatus, TriggerCoordinator};
pub use counter::FeedbackCounter;
pub use dispatcher::{HttpRetrainingDispatcher, RetrainingDispatcher, TriggerRequest, TriggerResponse};
pub use error::MonitorError;
pub use policy::{ThresholdConfig, ThresholdPolicy, ThresholdRule};
pub use scheduler::{IntervalTicker, MonitorScheduler, Ticker};
pub use stats::MonitorStats;
pub use store::{FeedbackStore, InMemoryFeedbackStore};
pub use types::{
    CountResult, DispatchResult, FeedbackCategory, FeedbackEvent, TriggerDecision, WindowBounds,
    WindowQuery,
};

#[cfg(feature = "database")]
pub use store::PgFeedbackStore;
