//! Override monitor service
//!
//! Counts overrides in the Postgres feedback table on a fixed schedule and
//! triggers retraining when a threshold rule is reached.
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgresql://localhost/feedback \
//! RETRAIN_ENDPOINT_URL=http://localhost:8000 \
//! OVERRIDE_THRESHOLD=10 \
//! cargo run --bin override_monitor --features database
//!
//! # With the status API
//! MONITOR_BIND_ADDR=127.0.0.1:3000 cargo run --bin override_monitor --features server
//! curl http://localhost:3000/monitor/status
//! ```
//!
//! `OVERRIDE_MONITOR_CONFIG=/path/monitor.yaml` loads the YAML form instead of
//! the individual environment keys.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;

use override_monitor::{
    HttpRetrainingDispatcher, MonitorConfig, MonitorScheduler, PgFeedbackStore, TriggerCoordinator,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::var("OVERRIDE_MONITOR_CONFIG") {
        Ok(path) => MonitorConfig::load_from_file(Path::new(&path))?,
        Err(_) => MonitorConfig::from_env()?,
    };

    let rules = config.threshold_config()?;
    tracing::info!(
        endpoint = %config.endpoint_url,
        lookback_secs = config.lookback_window.as_secs(),
        cooldown_secs = config.cooldown_period.as_secs(),
        check_interval_secs = config.check_interval.as_secs(),
        rules = rules.rules().len(),
        cooldown_policy = ?config.cooldown_policy,
        "Override monitor configured"
    );

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let store = Arc::new(PgFeedbackStore::connect(&database_url).await?);
    let dispatcher = Arc::new(HttpRetrainingDispatcher::from_config(&config)?);
    let coordinator = Arc::new(TriggerCoordinator::new(&config, store, dispatcher)?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler = tokio::spawn(
        MonitorScheduler::new(coordinator.clone(), config.check_interval).run(shutdown_rx.clone()),
    );

    #[cfg(feature = "server")]
    let api = match std::env::var("MONITOR_BIND_ADDR") {
        Ok(addr) => {
            let addr: std::net::SocketAddr = addr
                .parse()
                .with_context(|| format!("MONITOR_BIND_ADDR '{}' is not a socket address", addr))?;
            Some(tokio::spawn(override_monitor::api::serve(
                addr,
                coordinator.clone(),
                shutdown_rx.clone(),
            )))
        }
        Err(_) => None,
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutdown requested");
    shutdown_tx.send(true).ok();

    let cycles = scheduler.await.context("Scheduler task failed")?;

    #[cfg(feature = "server")]
    if let Some(api) = api {
        api.await.context("Status API task failed")??;
    }

    tracing::info!(cycles, stats = ?coordinator.stats(), "Override monitor stopped");
    Ok(())
}
