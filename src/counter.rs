//! FeedbackCounter: windowed override counts over a `FeedbackStore`.
//!
//! Counts are computed fresh on every call. Store failures surface as
//! `MonitorError::StoreUnavailable` and are not retried here.

use std::sync::Arc;

use crate::error::{MonitorError, Result};
use crate::store::FeedbackStore;
use crate::types::{CountResult, FeedbackCategory, WindowQuery};

pub struct FeedbackCounter {
    store: Arc<dyn FeedbackStore>,
}

impl FeedbackCounter {
    pub fn new(store: Arc<dyn FeedbackStore>) -> Self {
        Self { store }
    }

    /// Count overrides in `window`, restricted to `category_filter` when given.
    ///
    /// An explicit filter replaces any filter already on the window. Every
    /// counted category appears in the result, with zero when the store had
    /// no rows for it.
    pub async fn count(
        &self,
        window: &WindowQuery,
        category_filter: Option<&[FeedbackCategory]>,
    ) -> Result<CountResult> {
        window.validate()?;

        let query = match category_filter {
            Some(filter) => window.clone().with_categories(filter.iter().copied()),
            None => window.clone(),
        };
        let counted = query.counted_categories();

        let rows = self.store.count_overrides(&query).await.map_err(|e| {
            tracing::warn!(
                start = %query.start,
                end = %query.end,
                error = %e,
                "FeedbackCounter: store query failed"
            );
            MonitorError::StoreUnavailable(format!("{:#}", e))
        })?;

        // Zero-fill, and drop anything the store returned outside the counted set.
        let counts = CountResult::from_counts(
            counted
                .iter()
                .map(|c| (*c, 0))
                .chain(rows.into_iter().filter(|(c, _)| counted.contains(c))),
        );

        tracing::debug!(
            start = %query.start,
            end = %query.end,
            total = counts.total,
            "FeedbackCounter: window counted"
        );

        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryFeedbackStore;
    use crate::types::{FeedbackEvent, WindowBounds};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn counter_with(events: Vec<FeedbackEvent>) -> (FeedbackCounter, Arc<InMemoryFeedbackStore>) {
        let store = Arc::new(InMemoryFeedbackStore::with_events(events));
        (FeedbackCounter::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_empty_store_returns_zero_counts() {
        let (counter, _) = counter_with(vec![]);
        let window = WindowQuery::trailing(now(), Duration::hours(24), WindowBounds::HalfOpen);

        let counts = counter.count(&window, None).await.unwrap();
        assert_eq!(counts.total, 0);
        assert_eq!(counts.get(FeedbackCategory::FullOverride), 0);
        assert_eq!(counts.get(FeedbackCategory::PartialOverride), 0);
    }

    #[tokio::test]
    async fn test_category_filter_restricts_counts() {
        let (counter, _) = counter_with(vec![
            FeedbackEvent::new(FeedbackCategory::FullOverride, now() - Duration::minutes(1)),
            FeedbackEvent::new(FeedbackCategory::PartialOverride, now() - Duration::minutes(2)),
            FeedbackEvent::new(FeedbackCategory::PartialOverride, now() - Duration::minutes(3)),
        ]);
        let window = WindowQuery::trailing(now(), Duration::hours(1), WindowBounds::HalfOpen);

        let counts = counter
            .count(&window, Some(&[FeedbackCategory::PartialOverride]))
            .await
            .unwrap();
        assert_eq!(counts.total, 2);
        assert_eq!(counts.get(FeedbackCategory::FullOverride), 0);
    }

    #[tokio::test]
    async fn test_boundary_event_respects_bounds() {
        let start = now() - Duration::hours(1);
        let (counter, _) = counter_with(vec![
            FeedbackEvent::new(FeedbackCategory::FullOverride, start),
            FeedbackEvent::new(FeedbackCategory::FullOverride, now()),
        ]);

        let half_open = WindowQuery::trailing(now(), Duration::hours(1), WindowBounds::HalfOpen);
        assert_eq!(counter.count(&half_open, None).await.unwrap().total, 1);

        let inclusive = WindowQuery::trailing(now(), Duration::hours(1), WindowBounds::Inclusive);
        assert_eq!(counter.count(&inclusive, None).await.unwrap().total, 2);
    }

    #[tokio::test]
    async fn test_store_outage_maps_to_store_unavailable() {
        let (counter, store) = counter_with(vec![]);
        store.set_unavailable(true);
        let window = WindowQuery::trailing(now(), Duration::hours(1), WindowBounds::HalfOpen);

        let err = counter.count(&window, None).await.unwrap_err();
        assert!(matches!(err, MonitorError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_inverted_window_rejected() {
        let (counter, _) = counter_with(vec![]);
        let mut window = WindowQuery::trailing(now(), Duration::hours(1), WindowBounds::HalfOpen);
        std::mem::swap(&mut window.start, &mut window.end);

        let err = counter.count(&window, None).await.unwrap_err();
        assert!(matches!(err, MonitorError::InvalidWindow { .. }));
    }
}
