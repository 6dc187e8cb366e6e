//! MonitorScheduler: periodic invocation of the coordinator.
//!
//! The coordinator knows nothing about scheduling; the scheduler drives it
//! from a pluggable `Ticker` until the shutdown signal is received or the
//! ticker runs dry.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Interval, MissedTickBehavior};

use crate::coordinator::TriggerCoordinator;

/// Source of scheduling ticks.
#[async_trait]
pub trait Ticker: Send {
    /// Wait for the next tick. `false` means no more ticks will come.
    async fn tick(&mut self) -> bool;
}

/// Fixed-period ticker. The first tick fires immediately; missed ticks are
/// skipped rather than bunched up.
pub struct IntervalTicker {
    interval: Interval,
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) -> bool {
        self.interval.tick().await;
        true
    }
}

pub struct MonitorScheduler<T: Ticker = IntervalTicker> {
    coordinator: Arc<TriggerCoordinator>,
    ticker: T,
}

impl MonitorScheduler<IntervalTicker> {
    pub fn new(coordinator: Arc<TriggerCoordinator>, period: Duration) -> Self {
        Self::with_ticker(coordinator, IntervalTicker::new(period))
    }
}

impl<T: Ticker> MonitorScheduler<T> {
    pub fn with_ticker(coordinator: Arc<TriggerCoordinator>, ticker: T) -> Self {
        Self {
            coordinator,
            ticker,
        }
    }

    /// Run until shutdown. Returns the number of cycles run.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) -> u64 {
        tracing::info!("MonitorScheduler started");
        let mut cycles = 0u64;

        loop {
            if *shutdown_rx.borrow() {
                tracing::info!("MonitorScheduler shutting down");
                break;
            }

            tokio::select! {
                more = self.ticker.tick() => {
                    if !more {
                        tracing::info!("MonitorScheduler: ticker exhausted");
                        break;
                    }
                }
                _ = shutdown_rx.changed() => {
                    tracing::info!("MonitorScheduler shutting down (while waiting)");
                    break;
                }
            }

            let outcome = self.coordinator.run_once().await;
            cycles += 1;
            tracing::debug!(
                cycle = cycles,
                outcome = outcome.label(),
                "MonitorScheduler: cycle complete"
            );
        }

        tracing::info!(cycles, "MonitorScheduler stopped");
        cycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorConfig;
    use crate::dispatcher::{RetrainingDispatcher, TriggerRequest};
    use crate::store::InMemoryFeedbackStore;
    use crate::types::DispatchResult;
    use url::Url;

    struct NeverCalled;

    #[async_trait]
    impl RetrainingDispatcher for NeverCalled {
        async fn dispatch(&self, _request: &TriggerRequest) -> DispatchResult {
            panic!("no dispatch expected with an empty store");
        }
    }

    fn coordinator() -> Arc<TriggerCoordinator> {
        let config = MonitorConfig::new(Url::parse("http://localhost:8000").unwrap()).threshold(5);
        Arc::new(
            TriggerCoordinator::new(
                &config,
                Arc::new(InMemoryFeedbackStore::new()),
                Arc::new(NeverCalled),
            )
            .unwrap(),
        )
    }

    /// Ticks a fixed number of times, then reports exhaustion.
    struct CountdownTicker(u32);

    #[async_trait]
    impl Ticker for CountdownTicker {
        async fn tick(&mut self) -> bool {
            if self.0 == 0 {
                return false;
            }
            self.0 -= 1;
            true
        }
    }

    #[tokio::test]
    async fn test_custom_ticker_drives_cycles() {
        let coordinator = coordinator();
        let (_tx, rx) = watch::channel(false);

        let cycles = MonitorScheduler::with_ticker(coordinator.clone(), CountdownTicker(3))
            .run(rx)
            .await;

        assert_eq!(cycles, 3);
        assert_eq!(coordinator.stats().invocations, 3);
        assert_eq!(coordinator.stats().not_triggered, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_scheduler_stops_on_shutdown() {
        let coordinator = coordinator();
        let (tx, rx) = watch::channel(false);

        let scheduler = MonitorScheduler::new(coordinator.clone(), Duration::from_secs(3_600));
        let handle = tokio::spawn(scheduler.run(rx));

        // Ticks at 0h, 1h, 2h.
        tokio::time::sleep(Duration::from_secs(2 * 3_600 + 1)).await;
        tx.send(true).unwrap();

        let cycles = handle.await.unwrap();
        assert_eq!(cycles, 3);
        assert!(coordinator.last_triggered_at().is_none());
    }

    #[tokio::test]
    async fn test_shutdown_before_start() {
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        let cycles = MonitorScheduler::new(coordinator(), Duration::from_secs(60))
            .run(rx)
            .await;
        assert_eq!(cycles, 0);
    }
}
