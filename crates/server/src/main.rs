//! Strata daemon.
//!
//! Wires the configured tiers into a [`TieredStore`], runs the migration
//! scheduler, and logs the metrics snapshot until interrupted. Producers write
//! through the library; the daemon only migrates and reports.

mod config;
mod wiring;

use std::time::Duration;

use clap::Parser;
use strata_engine::TieredStore;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::ServerConfig;

/// Initializes the tracing subscriber. `RUST_LOG` overrides `level`.
fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("strata={level},strata_engine={level},strata_server={level}"))
    });

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

/// Logs the cached metrics snapshot on a fixed interval.
fn spawn_metrics_reporter(store: TieredStore, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // The first tick fires immediately; skip it so startup logs stay quiet.
        interval.tick().await;
        loop {
            interval.tick().await;
            let metrics = store.get_metrics().await;
            info!(
                hot = metrics.hot_count,
                warm = metrics.warm_count,
                cold = metrics.cold_count,
                total_size_bytes = metrics.total_size_bytes,
                compression_ratio = metrics.compression_ratio,
                cost_estimate = metrics.cost_estimate,
                unavailable = ?metrics.unavailable_tiers,
                "Storage metrics"
            );
        }
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();
    init_logging(&config.log_level);

    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Configuration error: {}", error);
        }
        std::process::exit(1);
    }

    let warm = config
        .warm_target()
        .map(|t| t.to_string())
        .unwrap_or_else(|| "none".to_string());
    info!(
        version = strata_engine::VERSION,
        hot = config.hot_enabled,
        warm = %warm,
        cold = config.cold_bucket.as_deref().unwrap_or("none"),
        "Starting Strata"
    );

    let store = wiring::build_store(&config).await?;
    for status in store.tier_status() {
        info!(
            tier = %status.tier,
            enabled = status.enabled,
            backend = status.backend.unwrap_or("-"),
            "Tier status"
        );
    }

    let mut scheduler = store.scheduler();
    scheduler.start();
    let reporter = spawn_metrics_reporter(store.clone(), config.metrics_interval);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    reporter.abort();
    scheduler.stop().await;

    let metrics = store.refresh_metrics().await;
    match serde_json::to_string(&metrics) {
        Ok(line) => info!(metrics = %line, "Final metrics"),
        Err(e) => warn!(error = %e, "Could not render final metrics"),
    }
    Ok(())
}
