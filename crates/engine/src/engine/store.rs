//! The tiered store and its request path.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use crate::clock::Clock;
use crate::codec::PayloadCodec;
use crate::config::EngineConfig;
use crate::core::{
    ColdTier, EngineObserver, HotTier, TierSlot, TierStats, TierStatus, WarmTier,
};
use crate::error::{BackendError, StorageError, StorageResult, serialization_error};
use crate::types::{RecordDescriptor, RetrievedRecord, StorageRecord, Tier, TimeRange};

use super::metrics::{EngineMetrics, MetricsCollector};
use super::migration::MigrationScheduler;

/// State shared between the request path and the migration scheduler.
#[derive(Debug)]
pub(crate) struct EngineCore {
    pub(crate) hot: TierSlot<dyn HotTier>,
    pub(crate) warm: TierSlot<dyn WarmTier>,
    pub(crate) cold: TierSlot<dyn ColdTier>,
    pub(crate) codec: PayloadCodec,
    pub(crate) config: EngineConfig,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) observer: Option<Arc<dyn EngineObserver>>,
    pub(crate) metrics: MetricsCollector,
    /// Serializes migration cycles.
    pub(crate) cycle_lock: tokio::sync::Mutex<()>,
}

impl EngineCore {
    /// Runs a backend call under the configured timeout.
    pub(crate) async fn timed<T>(
        &self,
        backend_name: &'static str,
        call: impl Future<Output = StorageResult<T>>,
    ) -> StorageResult<T> {
        let limit = self.config.backend_timeout;
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::Backend(BackendError::Timeout {
                backend_name: backend_name.to_string(),
                timeout_ms: limit.as_millis() as u64,
            })),
        }
    }

    /// Looks an id up in one tier. `None` means the tier is disabled.
    async fn probe(&self, tier: Tier, id: &str) -> Option<StorageResult<Option<StorageRecord>>> {
        let result = match tier {
            Tier::Hot => {
                let hot = self.hot.get()?;
                self.timed(hot.backend_name(), hot.get(id)).await
            }
            Tier::Warm => {
                let warm = self.warm.get()?;
                self.timed(warm.backend_name(), warm.get(id)).await
            }
            Tier::Cold => {
                let cold = self.cold.get()?;
                self.timed(cold.backend_name(), cold.get(id)).await
            }
        };
        Some(result)
    }

    fn decode(&self, record: StorageRecord) -> StorageResult<RetrievedRecord> {
        let payload = self.codec.decode(&record.payload, record.compressed)?;
        Ok(RetrievedRecord {
            id: record.id,
            timestamp: record.timestamp,
            payload,
            tier: record.tier,
        })
    }

    /// Recomputes metrics from live tier stats and caches the snapshot.
    pub(crate) async fn refresh_metrics(&self) -> EngineMetrics {
        let sample = self.config.metrics_sample_size;

        let hot = match self.hot.get() {
            Some(hot) => stats_or_warn(
                Tier::Hot,
                self.timed(hot.backend_name(), hot.stats(sample)).await,
            ),
            None => None,
        };
        let warm = match self.warm.get() {
            Some(warm) => stats_or_warn(
                Tier::Warm,
                self.timed(warm.backend_name(), warm.stats(sample)).await,
            ),
            None => None,
        };
        let cold = match self.cold.get() {
            Some(cold) => stats_or_warn(
                Tier::Cold,
                self.timed(cold.backend_name(), cold.stats()).await,
            ),
            None => None,
        };

        let metrics = EngineMetrics::from_stats(
            [(Tier::Hot, hot), (Tier::Warm, warm), (Tier::Cold, cold)],
            &self.config.unit_costs,
            self.metrics.counters.snapshot(),
            self.clock.now(),
        );
        self.metrics.publish(metrics.clone());
        metrics
    }

    pub(crate) fn tier_status(&self) -> Vec<TierStatus> {
        Tier::ALL
            .into_iter()
            .map(|tier| {
                let (backend, reason) = match tier {
                    Tier::Hot => (
                        self.hot.get().map(|t| t.backend_name()),
                        self.hot.disabled_reason(),
                    ),
                    Tier::Warm => (
                        self.warm.get().map(|t| t.backend_name()),
                        self.warm.disabled_reason(),
                    ),
                    Tier::Cold => (
                        self.cold.get().map(|t| t.backend_name()),
                        self.cold.disabled_reason(),
                    ),
                };
                TierStatus {
                    tier,
                    enabled: backend.is_some(),
                    backend,
                    disabled_reason: reason.map(str::to_string),
                }
            })
            .collect()
    }
}

fn stats_or_warn(tier: Tier, result: StorageResult<TierStats>) -> Option<TierStats> {
    match result {
        Ok(stats) => Some(stats),
        Err(e) => {
            warn!(%tier, error = %e, "Tier stats unavailable");
            None
        }
    }
}

/// A hot/warm/cold event store.
///
/// Cloning is cheap; clones share tiers, counters, and the metrics cache.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use chrono::Utc;
/// use strata_engine::{MemoryHotTier, TieredStore};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = TieredStore::builder()
///     .hot(Arc::new(MemoryHotTier::new()))
///     .build()?;
///
/// store.store("e1", Utc::now(), b"hello").await?;
/// let record = store.retrieve("e1").await?.expect("stored");
/// assert_eq!(record.payload, b"hello");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TieredStore {
    pub(crate) core: Arc<EngineCore>,
}

impl TieredStore {
    /// Returns a builder with every tier disabled.
    pub fn builder() -> super::TieredStoreBuilder {
        super::TieredStoreBuilder::new()
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.core.config
    }

    /// Stores a record in the hot tier with the default TTL.
    pub async fn store(
        &self,
        id: &str,
        timestamp: DateTime<Utc>,
        payload: &[u8],
    ) -> StorageResult<RecordDescriptor> {
        self.store_with_ttl(id, timestamp, payload, self.core.config.default_hot_ttl)
            .await
    }

    /// Stores a record in the hot tier with an explicit TTL.
    ///
    /// A record that outlives its TTL before migration moves it is gone from
    /// the hot tier; the TTL should comfortably exceed the hot-to-warm age.
    #[instrument(skip(self, payload), fields(size = payload.len()))]
    pub async fn store_with_ttl(
        &self,
        id: &str,
        timestamp: DateTime<Utc>,
        payload: &[u8],
        ttl: Duration,
    ) -> StorageResult<RecordDescriptor> {
        let hot = self
            .core
            .hot
            .get()
            .ok_or(StorageError::TierDisabled { tier: Tier::Hot })?;

        let encoded = self.core.codec.compress(payload)?;
        let record = StorageRecord::new(
            id,
            timestamp,
            encoded.bytes,
            payload.len() as u64,
            encoded.compressed,
        );
        let descriptor = record.descriptor();

        self.core
            .timed(hot.backend_name(), hot.put(record, ttl))
            .await?;

        self.core.metrics.counters.record_store();
        debug!(
            size_bytes = descriptor.size_bytes,
            compressed = descriptor.compressed,
            "Stored record"
        );
        if let Some(observer) = &self.core.observer {
            observer.on_stored(&descriptor);
        }
        Ok(descriptor)
    }

    /// Serializes `value` as JSON and stores it.
    pub async fn store_json<T: Serialize + ?Sized>(
        &self,
        id: &str,
        timestamp: DateTime<Utc>,
        value: &T,
    ) -> StorageResult<RecordDescriptor> {
        let payload = serde_json::to_vec(value)
            .map_err(|e| serialization_error(format!("failed to serialize '{id}': {e}")))?;
        self.store(id, timestamp, &payload).await
    }

    /// Looks a record up hot, then warm, then cold.
    ///
    /// A tier that errors or times out counts as a miss. A record that is found
    /// but cannot be decoded fails the call with a corrupt-payload error.
    /// Returns `Ok(None)` when every reachable tier missed, and
    /// [`StorageError::AllTiersUnavailable`] when no tier could answer.
    #[instrument(skip(self))]
    pub async fn retrieve(&self, id: &str) -> StorageResult<Option<RetrievedRecord>> {
        let mut answered = false;

        for tier in Tier::ALL {
            match self.core.probe(tier, id).await {
                None => continue,
                Some(Ok(Some(record))) => {
                    self.core.metrics.counters.record_hit(tier);
                    debug!(%tier, "Retrieved record");
                    return self.core.decode(record).map(Some);
                }
                Some(Ok(None)) => answered = true,
                Some(Err(e)) if e.is_corrupt() => {
                    warn!(%tier, error = %e, "Stored record is unreadable");
                    return Err(e);
                }
                Some(Err(e)) => {
                    warn!(%tier, error = %e, "Tier probe failed; treating as miss");
                }
            }
        }

        if !answered {
            return Err(StorageError::AllTiersUnavailable {
                operation: "retrieve",
            });
        }
        self.core.metrics.counters.record_miss();
        Ok(None)
    }

    /// Retrieves a record and deserializes its payload from JSON.
    pub async fn retrieve_json<T: DeserializeOwned>(&self, id: &str) -> StorageResult<Option<T>> {
        let Some(record) = self.retrieve(id).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&record.payload)
            .map(Some)
            .map_err(|e| serialization_error(format!("failed to deserialize '{id}': {e}")))
    }

    /// Returns up to `limit` records in `range`, ascending by timestamp.
    ///
    /// Hot is read first; warm is consulted only when hot returned fewer than
    /// `limit`. When both hold an id the hot copy wins. The cold tier is not
    /// scanned, so records that have gone cold drop out of range results.
    #[instrument(skip(self, range), fields(start = %range.start, end = %range.end))]
    pub async fn query_by_time_range(
        &self,
        range: TimeRange,
        limit: usize,
    ) -> StorageResult<Vec<RetrievedRecord>> {
        if range.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let mut answered = false;
        let mut by_id: HashMap<String, StorageRecord> = HashMap::new();

        if let Some(hot) = self.core.hot.get() {
            match self.collect_hot(hot.as_ref(), range, limit).await {
                Ok(records) => {
                    answered = true;
                    for record in records {
                        by_id.insert(record.id.clone(), record);
                    }
                }
                Err(e) => warn!(tier = %Tier::Hot, error = %e, "Range scan failed"),
            }
        }

        let warm = self.core.warm.get().filter(|_| by_id.len() < limit);
        if let Some(warm) = warm {
            match self
                .core
                .timed(warm.backend_name(), warm.scan_by_time_range(range, limit))
                .await
            {
                Ok(records) => {
                    answered = true;
                    for record in records {
                        by_id.entry(record.id.clone()).or_insert(record);
                    }
                }
                Err(e) => warn!(tier = %Tier::Warm, error = %e, "Range scan failed"),
            }
        }

        if !answered {
            return Err(StorageError::AllTiersUnavailable {
                operation: "query_by_time_range",
            });
        }

        let mut records: Vec<StorageRecord> = by_id.into_values().collect();
        records.sort_by(|a, b| (a.timestamp, &a.id).cmp(&(b.timestamp, &b.id)));
        records.truncate(limit);

        records
            .into_iter()
            .map(|record| self.core.decode(record))
            .collect()
    }

    async fn collect_hot(
        &self,
        hot: &dyn HotTier,
        range: TimeRange,
        limit: usize,
    ) -> StorageResult<Vec<StorageRecord>> {
        let name = hot.backend_name();
        let ids = self
            .core
            .timed(name, hot.scan_by_time_range(range, limit))
            .await?;

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            // Entries can expire or migrate between the scan and the read.
            if let Some(record) = self.core.timed(name, hot.get(&id)).await? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Removes `id` from every enabled tier.
    ///
    /// Every tier is attempted even if one fails; the first failure is
    /// returned. Returns whether any tier held the record.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> StorageResult<bool> {
        let mut outcomes = Vec::with_capacity(Tier::ALL.len());
        if let Some(hot) = self.core.hot.get() {
            let result = self.core.timed(hot.backend_name(), hot.delete(id)).await;
            outcomes.push((Tier::Hot, result));
        }
        if let Some(warm) = self.core.warm.get() {
            let result = self.core.timed(warm.backend_name(), warm.delete(id)).await;
            outcomes.push((Tier::Warm, result));
        }
        if let Some(cold) = self.core.cold.get() {
            let result = self.core.timed(cold.backend_name(), cold.delete(id)).await;
            outcomes.push((Tier::Cold, result));
        }

        let mut removed = false;
        let mut first_error = None;
        for (tier, result) in outcomes {
            match result {
                Ok(present) => removed |= present,
                Err(e) => {
                    warn!(%tier, error = %e, "Delete failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        if removed {
            self.core.metrics.counters.record_delete();
            if let Some(observer) = &self.core.observer {
                observer.on_deleted(id);
            }
        }
        Ok(removed)
    }

    /// Returns the latest metrics snapshot, computing one if none exists yet.
    ///
    /// Snapshots are refreshed by each migration cycle; counters are always current.
    pub async fn get_metrics(&self) -> EngineMetrics {
        match self.core.metrics.latest() {
            Some(metrics) => metrics,
            None => self.core.refresh_metrics().await,
        }
    }

    /// Recomputes metrics now.
    pub async fn refresh_metrics(&self) -> EngineMetrics {
        self.core.refresh_metrics().await
    }

    /// Reports which tiers are enabled.
    pub fn tier_status(&self) -> Vec<TierStatus> {
        self.core.tier_status()
    }

    /// Creates a migration scheduler bound to this store.
    pub fn scheduler(&self) -> MigrationScheduler {
        MigrationScheduler::new(Arc::clone(&self.core))
    }
}
