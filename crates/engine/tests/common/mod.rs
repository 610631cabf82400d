//! Shared fixtures for engine integration tests.
//!
//! Every harness wires all three tiers to one [`ManualClock`] so tests can
//! age records deterministically.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use object_store::memory::InMemory;
use parking_lot::Mutex;

use strata_engine::backends::sqlite::SqliteWarmTier;
use strata_engine::{
    BackendError, EngineConfig, EngineObserver, HotTier, ManualClock, MemoryHotTier,
    MigrationEvent, RecordDescriptor, S3ColdTier, StorageError, StorageRecord, StorageResult,
    TierStats, TieredStore, TimeRange,
};

/// Fixed starting point for the manual clock.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

/// `epoch()` shifted by whole seconds (may be negative).
pub fn at(secs: i64) -> DateTime<Utc> {
    epoch() + chrono::Duration::seconds(secs)
}

/// Configuration with short thresholds that tests can step over.
pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.thresholds.hot_to_warm_age = Duration::from_secs(60);
    config.thresholds.warm_to_cold_idle = Duration::from_secs(600);
    config.thresholds.compression_size_threshold = 1024;
    config.default_hot_ttl = Duration::from_secs(3600);
    config.migration_interval = Duration::from_millis(50);
    config.backend_timeout = Duration::from_millis(500);
    config
}

/// A store over in-process backends plus handles to each tier.
pub struct Harness {
    pub store: TieredStore,
    pub clock: Arc<ManualClock>,
    pub hot: Arc<MemoryHotTier>,
    pub warm: Arc<SqliteWarmTier>,
    pub cold: Arc<S3ColdTier>,
    pub objects: Arc<InMemory>,
    pub observer: Arc<RecordingObserver>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let clock = Arc::new(ManualClock::new(epoch()));
        let hot = Arc::new(MemoryHotTier::with_clock(clock.clone()));
        let warm = SqliteWarmTier::in_memory()
            .expect("Failed to create SQLite warm tier")
            .with_clock(clock.clone());
        warm.init_schema().expect("Failed to initialize schema");
        let warm = Arc::new(warm);
        let objects = Arc::new(InMemory::new());
        let cold = Arc::new(S3ColdTier::with_store(objects.clone(), "test"));
        let observer = Arc::new(RecordingObserver::default());

        let store = TieredStore::builder()
            .hot(hot.clone())
            .warm(warm.clone())
            .cold(cold.clone())
            .config(config)
            .clock(clock.clone())
            .observer(observer.clone())
            .build()
            .expect("Failed to build store");

        Self {
            store,
            clock,
            hot,
            warm,
            cold,
            objects,
            observer,
        }
    }

    /// Advances the shared clock.
    pub fn advance(&self, secs: u64) {
        self.clock.advance(Duration::from_secs(secs));
    }
}

/// Payload that compresses well and exceeds the default threshold.
pub fn large_payload(len: usize) -> Vec<u8> {
    b"{\"event\":\"page_view\",\"path\":\"/index.html\"}"
        .iter()
        .copied()
        .cycle()
        .take(len)
        .collect()
}

/// Observer that records every event it sees.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub stored: Mutex<Vec<RecordDescriptor>>,
    pub migrated: Mutex<Vec<MigrationEvent>>,
    pub deleted: Mutex<Vec<String>>,
}

impl EngineObserver for RecordingObserver {
    fn on_stored(&self, record: &RecordDescriptor) {
        self.stored.lock().push(record.clone());
    }

    fn on_migrated(&self, event: &MigrationEvent) {
        self.migrated.lock().push(event.clone());
    }

    fn on_deleted(&self, id: &str) {
        self.deleted.lock().push(id.to_string());
    }
}

/// How a [`FaultyHotTier`] misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Every call returns an unavailable error.
    Error,
    /// Every call sleeps well past any test timeout.
    Hang,
}

/// A hot tier whose every call fails.
#[derive(Debug)]
pub struct FaultyHotTier {
    pub fault: Fault,
}

impl FaultyHotTier {
    pub fn new(fault: Fault) -> Self {
        Self { fault }
    }

    async fn fail<T>(&self) -> StorageResult<T> {
        if self.fault == Fault::Hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Err(StorageError::Backend(BackendError::Unavailable {
            backend_name: "faulty".to_string(),
            message: "injected failure".to_string(),
        }))
    }
}

#[async_trait]
impl HotTier for FaultyHotTier {
    fn backend_name(&self) -> &'static str {
        "faulty"
    }

    async fn put(&self, _record: StorageRecord, _ttl: Duration) -> StorageResult<()> {
        self.fail().await
    }

    async fn get(&self, _id: &str) -> StorageResult<Option<StorageRecord>> {
        self.fail().await
    }

    async fn delete(&self, _id: &str) -> StorageResult<bool> {
        self.fail().await
    }

    async fn delete_if_unchanged(&self, _expected: &StorageRecord) -> StorageResult<bool> {
        self.fail().await
    }

    async fn scan_by_time_range(
        &self,
        _range: TimeRange,
        _limit: usize,
    ) -> StorageResult<Vec<String>> {
        self.fail().await
    }

    async fn count(&self) -> StorageResult<u64> {
        self.fail().await
    }

    async fn stats(&self, _sample_limit: usize) -> StorageResult<TierStats> {
        self.fail().await
    }
}
