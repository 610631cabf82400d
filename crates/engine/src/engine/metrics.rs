//! Engine metrics.
//!
//! Tier aggregates are recomputed on the migration cadence (or on demand) and
//! cached; reads between refreshes see the last snapshot. Operation counters
//! are live atomics and are copied into every snapshot handed out.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::config::UnitCosts;
use crate::core::TierStats;
use crate::types::Tier;

/// Point-in-time view of the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineMetrics {
    /// Live records in the hot tier.
    pub hot_count: u64,
    /// Records in the warm tier.
    pub warm_count: u64,
    /// Objects in the cold tier.
    pub cold_count: u64,
    /// Stored bytes across all tiers. The cold tier contributes its object
    /// sizes, which include the envelope around each payload.
    pub total_size_bytes: u64,
    /// Stored bytes over original bytes for a sample of hot and warm records.
    /// 1.0 means no savings.
    pub compression_ratio: f64,
    /// Weighted sum of per-tier unit costs times record counts.
    pub cost_estimate: f64,
    /// Tiers that were disabled or failed to report during the refresh.
    pub unavailable_tiers: Vec<Tier>,
    /// When the tier aggregates were computed.
    pub computed_at: DateTime<Utc>,
    /// Operation counters as of the read.
    pub counters: CounterSnapshot,
}

impl EngineMetrics {
    /// Builds a snapshot from per-tier stats; `None` marks a tier that could not report.
    pub(crate) fn from_stats(
        tiers: [(Tier, Option<TierStats>); 3],
        costs: &UnitCosts,
        counters: CounterSnapshot,
        computed_at: DateTime<Utc>,
    ) -> Self {
        let mut metrics = EngineMetrics {
            hot_count: 0,
            warm_count: 0,
            cold_count: 0,
            total_size_bytes: 0,
            compression_ratio: 1.0,
            cost_estimate: 0.0,
            unavailable_tiers: Vec::new(),
            computed_at,
            counters,
        };

        let mut sampled_stored = 0u64;
        let mut sampled_original = 0u64;
        for (tier, stats) in tiers {
            let Some(stats) = stats else {
                metrics.unavailable_tiers.push(tier);
                continue;
            };
            match tier {
                Tier::Hot => metrics.hot_count = stats.count,
                Tier::Warm => metrics.warm_count = stats.count,
                Tier::Cold => metrics.cold_count = stats.count,
            }
            metrics.total_size_bytes += stats.size_bytes;
            metrics.cost_estimate += stats.count as f64 * costs.for_tier(tier);
            sampled_stored += stats.sampled_stored_bytes;
            sampled_original += stats.sampled_original_bytes;
        }

        if sampled_original > 0 {
            metrics.compression_ratio = sampled_stored as f64 / sampled_original as f64;
        }
        metrics
    }

    /// Returns the record count for one tier.
    pub fn count(&self, tier: Tier) -> u64 {
        match tier {
            Tier::Hot => self.hot_count,
            Tier::Warm => self.warm_count,
            Tier::Cold => self.cold_count,
        }
    }
}

/// Copy of the operation counters.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub stores: u64,
    pub hot_hits: u64,
    pub warm_hits: u64,
    pub cold_hits: u64,
    pub misses: u64,
    pub deletes: u64,
    pub migrated_hot_to_warm: u64,
    pub migrated_warm_to_cold: u64,
    pub migration_failures: u64,
}

/// Live operation counters.
#[derive(Debug, Default)]
pub(crate) struct OperationCounters {
    stores: AtomicU64,
    hot_hits: AtomicU64,
    warm_hits: AtomicU64,
    cold_hits: AtomicU64,
    misses: AtomicU64,
    deletes: AtomicU64,
    migrated_hot_to_warm: AtomicU64,
    migrated_warm_to_cold: AtomicU64,
    migration_failures: AtomicU64,
}

impl OperationCounters {
    pub(crate) fn record_store(&self) {
        self.stores.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_hit(&self, tier: Tier) {
        let counter = match tier {
            Tier::Hot => &self.hot_hits,
            Tier::Warm => &self.warm_hits,
            Tier::Cold => &self.cold_hits,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_migration(&self, from: Tier) {
        match from {
            Tier::Hot => self.migrated_hot_to_warm.fetch_add(1, Ordering::Relaxed),
            _ => self.migrated_warm_to_cold.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub(crate) fn record_migration_failure(&self) {
        self.migration_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            stores: self.stores.load(Ordering::Relaxed),
            hot_hits: self.hot_hits.load(Ordering::Relaxed),
            warm_hits: self.warm_hits.load(Ordering::Relaxed),
            cold_hits: self.cold_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            migrated_hot_to_warm: self.migrated_hot_to_warm.load(Ordering::Relaxed),
            migrated_warm_to_cold: self.migrated_warm_to_cold.load(Ordering::Relaxed),
            migration_failures: self.migration_failures.load(Ordering::Relaxed),
        }
    }
}

/// Holds the cached snapshot and the live counters.
#[derive(Debug, Default)]
pub(crate) struct MetricsCollector {
    latest: RwLock<Option<EngineMetrics>>,
    pub(crate) counters: OperationCounters,
}

impl MetricsCollector {
    /// Returns the cached snapshot with current counters, if one exists.
    pub(crate) fn latest(&self) -> Option<EngineMetrics> {
        let mut metrics = self.latest.read().clone()?;
        metrics.counters = self.counters.snapshot();
        Some(metrics)
    }

    pub(crate) fn publish(&self, metrics: EngineMetrics) {
        *self.latest.write() = Some(metrics);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn stats(count: u64, size: u64, stored: u64, original: u64) -> Option<TierStats> {
        Some(TierStats {
            count,
            size_bytes: size,
            sampled_stored_bytes: stored,
            sampled_original_bytes: original,
        })
    }

    #[test]
    fn test_from_stats_aggregates() {
        let costs = UnitCosts {
            hot: 1.0,
            warm: 0.5,
            cold: 0.25,
        };
        let now = Utc.timestamp_millis_opt(0).unwrap();
        let metrics = EngineMetrics::from_stats(
            [
                (Tier::Hot, stats(4, 400, 100, 400)),
                (Tier::Warm, stats(2, 300, 300, 600)),
                (Tier::Cold, stats(8, 1000, 0, 0)),
            ],
            &costs,
            CounterSnapshot::default(),
            now,
        );

        assert_eq!(metrics.hot_count, 4);
        assert_eq!(metrics.warm_count, 2);
        assert_eq!(metrics.cold_count, 8);
        assert_eq!(metrics.total_size_bytes, 1700);
        assert!((metrics.cost_estimate - (4.0 + 1.0 + 2.0)).abs() < 1e-9);
        assert!((metrics.compression_ratio - 0.4).abs() < 1e-9);
        assert!(metrics.unavailable_tiers.is_empty());
    }

    #[test]
    fn test_missing_tier_is_reported() {
        let now = Utc.timestamp_millis_opt(0).unwrap();
        let metrics = EngineMetrics::from_stats(
            [
                (Tier::Hot, stats(1, 10, 10, 10)),
                (Tier::Warm, None),
                (Tier::Cold, None),
            ],
            &UnitCosts::default(),
            CounterSnapshot::default(),
            now,
        );
        assert_eq!(metrics.unavailable_tiers, vec![Tier::Warm, Tier::Cold]);
        assert_eq!(metrics.count(Tier::Warm), 0);
        assert_eq!(metrics.compression_ratio, 1.0);
    }

    #[test]
    fn test_collector_overlays_live_counters() {
        let collector = MetricsCollector::default();
        assert!(collector.latest().is_none());

        let now = Utc.timestamp_millis_opt(0).unwrap();
        collector.publish(EngineMetrics::from_stats(
            [(Tier::Hot, None), (Tier::Warm, None), (Tier::Cold, None)],
            &UnitCosts::default(),
            collector.counters.snapshot(),
            now,
        ));
        collector.counters.record_store();
        collector.counters.record_hit(Tier::Warm);
        collector.counters.record_migration(Tier::Hot);

        let latest = collector.latest().unwrap();
        assert_eq!(latest.counters.stores, 1);
        assert_eq!(latest.counters.warm_hits, 1);
        assert_eq!(latest.counters.migrated_hot_to_warm, 1);
    }
}
