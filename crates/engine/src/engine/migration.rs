//! Background migration between tiers.
//!
//! Each cycle runs three steps in order:
//!
//! 1. **Hot to warm**: hot records whose event timestamp is older than
//!    `hot_to_warm_age` are inserted into warm, then removed from hot.
//! 2. **Warm to cold**: warm records not read for `warm_to_cold_idle` are
//!    written to cold, then removed from warm.
//! 3. **Metrics**: the metrics snapshot is recomputed.
//!
//! The destination is always written before the source is removed, so a
//! failure part way leaves the record where it was and it is picked up again
//! next cycle. A failing record is logged and skipped; it never aborts the
//! batch.
//!
//! # Example
//!
//! ```ignore
//! let mut scheduler = store.scheduler();
//!
//! // Single-step in tests
//! let report = scheduler.run_cycle().await;
//!
//! // Or run on the configured interval
//! scheduler.start();
//! // ...
//! scheduler.stop().await;
//! ```

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::clock::saturating_sub;
use crate::core::{ColdTier, HotTier, InsertOutcome, MigrationEvent, WarmTier};
use crate::error::{StorageResult, internal_error};
use crate::types::{StorageRecord, Tier, TimeRange};

use super::metrics::EngineMetrics;
use super::store::EngineCore;

/// Outcome of one migration pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    /// Whether the pass ran (both of its tiers enabled).
    pub ran: bool,
    /// Candidates returned by the scan.
    pub scanned: usize,
    /// Records moved to the colder tier.
    pub migrated: usize,
    /// Records whose colder copy was replaced by newer content.
    pub superseded: usize,
    /// Records left in place because they changed or vanished during the move.
    pub skipped: usize,
    /// Records that failed and stay eligible for the next cycle.
    pub failed: usize,
    /// Whether the candidate scan itself failed.
    pub scan_failed: bool,
}

/// Outcome of one full cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    /// Hot-to-warm pass.
    pub hot_to_warm: PassReport,
    /// Warm-to-cold pass.
    pub warm_to_cold: PassReport,
    /// Metrics recomputed at the end of the cycle.
    pub metrics: EngineMetrics,
    /// Wall time spent on the cycle.
    pub duration_ms: u64,
}

impl CycleReport {
    /// Total records moved in this cycle.
    pub fn migrated(&self) -> usize {
        self.hot_to_warm.migrated + self.warm_to_cold.migrated
    }

    /// Total per-record failures in this cycle.
    pub fn failed(&self) -> usize {
        self.hot_to_warm.failed + self.warm_to_cold.failed
    }
}

/// How a single record's move ended.
enum Moved {
    Migrated { superseded: bool },
    Skipped,
}

/// Owns the periodic migration task.
///
/// Use [`MigrationScheduler::stop`] for a clean shutdown. Dropping a running
/// scheduler aborts its task without waiting for the current cycle.
#[derive(Debug)]
pub struct MigrationScheduler {
    core: Arc<EngineCore>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MigrationScheduler {
    pub(crate) fn new(core: Arc<EngineCore>) -> Self {
        Self {
            core,
            shutdown_tx: None,
            handle: None,
        }
    }

    /// Runs one cycle now.
    ///
    /// Cycles never overlap: a call made while another cycle is running waits
    /// for it to finish.
    pub async fn run_cycle(&self) -> CycleReport {
        run_cycle(&self.core).await
    }

    /// Starts running cycles on the configured interval.
    ///
    /// The first cycle runs immediately. Calling `start` while already running
    /// does nothing.
    pub fn start(&mut self) {
        if self.is_running() {
            warn!("Migration scheduler already running");
            return;
        }

        let (tx, rx) = mpsc::channel(1);
        self.shutdown_tx = Some(tx);

        let core = Arc::clone(&self.core);
        self.handle = Some(tokio::spawn(async move {
            migration_loop(rx, core).await;
        }));

        info!(
            interval = %humantime::format_duration(self.core.config.migration_interval),
            batch_size = self.core.config.migration_batch_size,
            "Migration scheduler started"
        );
    }

    /// Stops the background task and waits for an in-flight cycle to finish.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Migration task ended abnormally");
            }
        }
    }

    /// Returns true while the background task is running.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for MigrationScheduler {
    /// Aborts a background task that was never stopped. A cycle cut short this
    /// way leaves at most a duplicate copy, which the next cycle reconciles.
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn migration_loop(mut shutdown_rx: mpsc::Receiver<()>, core: Arc<EngineCore>) {
    let mut interval = tokio::time::interval(core.config.migration_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("Migration scheduler shutting down");
                break;
            }
            _ = interval.tick() => {
                run_cycle(&core).await;
            }
        }
    }
}

pub(crate) async fn run_cycle(core: &EngineCore) -> CycleReport {
    let _guard = core.cycle_lock.lock().await;
    let started = Instant::now();

    let hot_to_warm = match (core.hot.get(), core.warm.get()) {
        (Some(hot), Some(warm)) => hot_to_warm_pass(core, hot.as_ref(), warm.as_ref()).await,
        _ => PassReport::default(),
    };
    let warm_to_cold = match (core.warm.get(), core.cold.get()) {
        (Some(warm), Some(cold)) => warm_to_cold_pass(core, warm.as_ref(), cold.as_ref()).await,
        _ => PassReport::default(),
    };
    let metrics = core.refresh_metrics().await;

    let report = CycleReport {
        hot_to_warm,
        warm_to_cold,
        metrics,
        duration_ms: started.elapsed().as_millis() as u64,
    };

    if report.migrated() > 0 || report.failed() > 0 {
        info!(
            hot_to_warm = report.hot_to_warm.migrated,
            warm_to_cold = report.warm_to_cold.migrated,
            failed = report.failed(),
            duration_ms = report.duration_ms,
            "Migration cycle complete"
        );
    } else {
        debug!(duration_ms = report.duration_ms, "Migration cycle found nothing to move");
    }
    report
}

async fn hot_to_warm_pass(core: &EngineCore, hot: &dyn HotTier, warm: &dyn WarmTier) -> PassReport {
    let mut report = PassReport {
        ran: true,
        ..Default::default()
    };
    let cutoff = saturating_sub(core.clock.now(), core.config.thresholds.hot_to_warm_age);

    let ids = match core
        .timed(
            hot.backend_name(),
            hot.scan_by_time_range(TimeRange::before(cutoff), core.config.migration_batch_size),
        )
        .await
    {
        Ok(ids) => ids,
        Err(e) => {
            warn!(error = %e, "Hot-tier scan failed; skipping hot-to-warm pass");
            report.scan_failed = true;
            return report;
        }
    };
    report.scanned = ids.len();

    for id in ids {
        match move_hot_to_warm(core, hot, warm, &id).await {
            Ok(Moved::Migrated { superseded }) => {
                report.migrated += 1;
                if superseded {
                    report.superseded += 1;
                }
                migrated(core, id, Tier::Hot);
            }
            Ok(Moved::Skipped) => report.skipped += 1,
            Err(e) => {
                report.failed += 1;
                core.metrics.counters.record_migration_failure();
                warn!(%id, from = %Tier::Hot, error = %e, "Migration failed; will retry next cycle");
            }
        }
    }
    report
}

async fn move_hot_to_warm(
    core: &EngineCore,
    hot: &dyn HotTier,
    warm: &dyn WarmTier,
    id: &str,
) -> StorageResult<Moved> {
    // Expired or deleted since the scan.
    let Some(record) = core.timed(hot.backend_name(), hot.get(id)).await? else {
        return Ok(Moved::Skipped);
    };
    let warm_copy = record.moved_to(Tier::Warm);

    let mut superseded = false;
    let outcome = core
        .timed(warm.backend_name(), warm.insert(&warm_copy))
        .await?;
    if outcome == InsertOutcome::AlreadyPresent {
        let existing = core.timed(warm.backend_name(), warm.peek(id)).await?;
        let identical = existing.is_some_and(|existing| existing.same_content(&record));
        if !identical {
            // The id was stored again after an earlier migration.
            core.timed(warm.backend_name(), warm.delete(id)).await?;
            let retried = core
                .timed(warm.backend_name(), warm.insert(&warm_copy))
                .await?;
            if retried != InsertOutcome::Inserted {
                return Err(internal_error(
                    warm.backend_name(),
                    format!("warm copy of '{id}' reappeared while being replaced"),
                ));
            }
            superseded = true;
        }
    }

    // A Store that raced the move keeps its newer hot copy; the next cycle
    // supersedes the warm copy written here.
    if core
        .timed(hot.backend_name(), hot.delete_if_unchanged(&record))
        .await?
    {
        Ok(Moved::Migrated { superseded })
    } else {
        debug!(%id, "Hot copy changed during migration; leaving it in place");
        Ok(Moved::Skipped)
    }
}

async fn warm_to_cold_pass(core: &EngineCore, warm: &dyn WarmTier, cold: &dyn ColdTier) -> PassReport {
    let mut report = PassReport {
        ran: true,
        ..Default::default()
    };
    let cutoff = saturating_sub(core.clock.now(), core.config.thresholds.warm_to_cold_idle);

    let candidates = match core
        .timed(
            warm.backend_name(),
            warm.scan_idle_since(cutoff, core.config.migration_batch_size),
        )
        .await
    {
        Ok(records) => records,
        Err(e) => {
            warn!(error = %e, "Warm-tier scan failed; skipping warm-to-cold pass");
            report.scan_failed = true;
            return report;
        }
    };
    report.scanned = candidates.len();

    for record in candidates {
        let id = record.id.clone();
        match move_warm_to_cold(core, warm, cold, record).await {
            Ok(()) => {
                report.migrated += 1;
                migrated(core, id, Tier::Warm);
            }
            Err(e) => {
                report.failed += 1;
                core.metrics.counters.record_migration_failure();
                warn!(%id, from = %Tier::Warm, error = %e, "Migration failed; will retry next cycle");
            }
        }
    }
    report
}

/// Archives a scanned warm record. The scan result is used directly since a
/// warm `get` would refresh the access time.
async fn move_warm_to_cold(
    core: &EngineCore,
    warm: &dyn WarmTier,
    cold: &dyn ColdTier,
    record: StorageRecord,
) -> StorageResult<()> {
    let cold_copy = record.moved_to(Tier::Cold);
    core.timed(cold.backend_name(), cold.put(&cold_copy)).await?;
    core.timed(warm.backend_name(), warm.delete(&record.id)).await?;
    Ok(())
}

fn migrated(core: &EngineCore, id: String, from: Tier) {
    core.metrics.counters.record_migration(from);
    if let Some(observer) = &core.observer {
        let to = from.colder().unwrap_or(from);
        observer.on_migrated(&MigrationEvent { id, from, to });
    }
}
