//! Feedback store backends.
//!
//! The counter only needs one aggregate read: override counts per category
//! inside a window. `FeedbackStore` is that seam. `InMemoryFeedbackStore`
//! backs tests and local runs; `PgFeedbackStore` (feature `database`) reads
//! the production `feedback` table.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use crate::types::{FeedbackCategory, FeedbackEvent, WindowQuery};

#[cfg(feature = "database")]
pub mod postgres;

#[cfg(feature = "database")]
pub use postgres::PgFeedbackStore;

/// Read-only aggregate access to recorded feedback.
#[async_trait]
pub trait FeedbackStore: Send + Sync {
    /// Count events per category for `window.counted_categories()` inside the
    /// window. Categories without rows may be omitted.
    async fn count_overrides(&self, window: &WindowQuery) -> Result<Vec<(FeedbackCategory, u64)>>;
}

// ---------------------------------------------------------------------------
// InMemoryFeedbackStore
// ---------------------------------------------------------------------------

/// Event list behind a lock, with an outage switch.
#[derive(Debug, Default)]
pub struct InMemoryFeedbackStore {
    events: RwLock<Vec<FeedbackEvent>>,
    unavailable: AtomicBool,
}

impl InMemoryFeedbackStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: impl IntoIterator<Item = FeedbackEvent>) -> Self {
        Self {
            events: RwLock::new(events.into_iter().collect()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Stand-in for the external submission path.
    pub fn record(&self, event: FeedbackEvent) {
        self.events
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }

    /// While set, every count fails as if the store were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.events
            .read()
            .map(|events| events.len())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl FeedbackStore for InMemoryFeedbackStore {
    async fn count_overrides(&self, window: &WindowQuery) -> Result<Vec<(FeedbackCategory, u64)>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(anyhow!("in-memory feedback store marked unavailable"));
        }

        let categories = window.counted_categories();
        let events = self
            .events
            .read()
            .map_err(|_| anyhow!("feedback store lock poisoned"))?;

        Ok(categories
            .into_iter()
            .map(|category| {
                let n = events
                    .iter()
                    .filter(|e| e.category == category && window.contains(e.timestamp))
                    .count() as u64;
                (category, n)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WindowBounds;
    use chrono::{Duration, TimeZone, Utc};

    #[tokio::test]
    async fn test_memory_store_counts_only_overrides_in_window() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let store = InMemoryFeedbackStore::with_events([
            FeedbackEvent::new(FeedbackCategory::FullOverride, now - Duration::minutes(5)),
            FeedbackEvent::new(FeedbackCategory::PartialOverride, now - Duration::minutes(10)),
            FeedbackEvent::new(FeedbackCategory::Agree, now - Duration::minutes(10)),
            FeedbackEvent::new(FeedbackCategory::FullOverride, now - Duration::hours(3)),
        ]);

        let window = WindowQuery::trailing(now, Duration::hours(1), WindowBounds::HalfOpen);
        let counts = store.count_overrides(&window).await.unwrap();

        assert_eq!(
            counts,
            vec![
                (FeedbackCategory::FullOverride, 1),
                (FeedbackCategory::PartialOverride, 1),
            ]
        );
    }

    #[tokio::test]
    async fn test_memory_store_outage() {
        let store = InMemoryFeedbackStore::new();
        store.set_unavailable(true);
        let window = WindowQuery::trailing(Utc::now(), Duration::hours(1), WindowBounds::HalfOpen);
        assert!(store.count_overrides(&window).await.is_err());

        store.set_unavailable(false);
        assert!(store.count_overrides(&window).await.is_ok());
    }

    #[test]
    fn test_record_appends() {
        let store = InMemoryFeedbackStore::new();
        assert!(store.is_empty());
        store.record(FeedbackEvent::new(FeedbackCategory::Other, Utc::now()));
        assert_eq!(store.len(), 1);
    }
}
