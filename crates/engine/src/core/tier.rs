//! Tier abstractions.
//!
//! Each tier is an injected trait object. The engine never reaches for a global
//! client: a tier is either handed in at construction or marked disabled.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageResult;
use crate::types::{StorageRecord, Tier, TimeRange};

/// Aggregate figures reported by a tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierStats {
    /// Number of records held.
    pub count: u64,
    /// Total stored bytes.
    pub size_bytes: u64,
    /// Stored bytes across the sampled records.
    pub sampled_stored_bytes: u64,
    /// Original (uncompressed) bytes across the sampled records.
    pub sampled_original_bytes: u64,
}

/// Result of a warm-tier insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was written.
    Inserted,
    /// A row with the same id already existed and was left untouched.
    AlreadyPresent,
}

/// The low-latency, TTL-bound tier.
///
/// Entries expire after their TTL whether or not migration has run. Callers
/// that need long retention must rely on migration, not on the TTL.
#[async_trait]
pub trait HotTier: Send + Sync + Debug {
    /// Returns a short backend name for logs and errors.
    fn backend_name(&self) -> &'static str;

    /// Writes a record, replacing any existing entry with the same id.
    async fn put(&self, record: StorageRecord, ttl: Duration) -> StorageResult<()>;

    /// Reads a live record.
    async fn get(&self, id: &str) -> StorageResult<Option<StorageRecord>>;

    /// Removes a record. Returns whether it was present.
    async fn delete(&self, id: &str) -> StorageResult<bool>;

    /// Removes the record only if it still holds the same content as `expected`.
    ///
    /// Used by migration so that a `Store` racing the move is not dropped.
    async fn delete_if_unchanged(&self, expected: &StorageRecord) -> StorageResult<bool>;

    /// Returns ids in the window ordered by ascending timestamp.
    async fn scan_by_time_range(
        &self,
        range: TimeRange,
        limit: usize,
    ) -> StorageResult<Vec<String>>;

    /// Returns the number of live records.
    async fn count(&self) -> StorageResult<u64>;

    /// Returns aggregates, sampling up to `sample_limit` records for sizes.
    async fn stats(&self, sample_limit: usize) -> StorageResult<TierStats>;
}

/// The durable relational tier.
#[async_trait]
pub trait WarmTier: Send + Sync + Debug {
    /// Returns a short backend name for logs and errors.
    fn backend_name(&self) -> &'static str;

    /// Inserts a record keyed on id; an existing row is left untouched.
    async fn insert(&self, record: &StorageRecord) -> StorageResult<InsertOutcome>;

    /// Reads a record and bumps its access time.
    async fn get(&self, id: &str) -> StorageResult<Option<StorageRecord>>;

    /// Reads a record without touching its access time.
    async fn peek(&self, id: &str) -> StorageResult<Option<StorageRecord>>;

    /// Removes a record. Returns whether it was present.
    async fn delete(&self, id: &str) -> StorageResult<bool>;

    /// Returns records in the window ordered by ascending timestamp.
    async fn scan_by_time_range(
        &self,
        range: TimeRange,
        limit: usize,
    ) -> StorageResult<Vec<StorageRecord>>;

    /// Returns records last accessed strictly before `cutoff`, oldest access first.
    async fn scan_idle_since(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<StorageRecord>>;

    /// Returns count and summed size, sampling up to `sample_limit` rows.
    async fn stats(&self, sample_limit: usize) -> StorageResult<TierStats>;
}

/// The archival object-storage tier.
#[async_trait]
pub trait ColdTier: Send + Sync + Debug {
    /// Returns a short backend name for logs and errors.
    fn backend_name(&self) -> &'static str;

    /// Writes the full record as one object, overwriting any previous copy.
    async fn put(&self, record: &StorageRecord) -> StorageResult<()>;

    /// Reads a record; a missing key is `Ok(None)`.
    async fn get(&self, id: &str) -> StorageResult<Option<StorageRecord>>;

    /// Removes a record. Returns whether it was present; a missing key is not an error.
    async fn delete(&self, id: &str) -> StorageResult<bool>;

    /// Returns count and total object size.
    async fn stats(&self) -> StorageResult<TierStats>;
}

/// A tier handle that is either usable or disabled for the engine's lifetime.
#[derive(Debug)]
pub enum TierSlot<T: ?Sized> {
    /// The backend is available.
    Enabled(Arc<T>),
    /// The backend was absent or failed at startup.
    Disabled {
        /// Why the tier is disabled.
        reason: String,
    },
}

impl<T: ?Sized> TierSlot<T> {
    /// Creates a disabled slot.
    pub fn disabled(reason: impl Into<String>) -> Self {
        TierSlot::Disabled {
            reason: reason.into(),
        }
    }

    /// Returns the backend if enabled.
    pub fn get(&self) -> Option<&Arc<T>> {
        match self {
            TierSlot::Enabled(inner) => Some(inner),
            TierSlot::Disabled { .. } => None,
        }
    }

    /// Returns true if the tier is enabled.
    pub fn is_enabled(&self) -> bool {
        matches!(self, TierSlot::Enabled(_))
    }

    /// Returns the reason the tier is disabled, if it is.
    pub fn disabled_reason(&self) -> Option<&str> {
        match self {
            TierSlot::Enabled(_) => None,
            TierSlot::Disabled { reason } => Some(reason),
        }
    }
}

impl<T: ?Sized> Clone for TierSlot<T> {
    fn clone(&self) -> Self {
        match self {
            TierSlot::Enabled(inner) => TierSlot::Enabled(Arc::clone(inner)),
            TierSlot::Disabled { reason } => TierSlot::Disabled {
                reason: reason.clone(),
            },
        }
    }
}

impl<T: ?Sized> From<Arc<T>> for TierSlot<T> {
    fn from(inner: Arc<T>) -> Self {
        TierSlot::Enabled(inner)
    }
}

/// Enabled/disabled state for one tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierStatus {
    /// The tier reported on.
    pub tier: Tier,
    /// Whether the tier is usable.
    pub enabled: bool,
    /// Backend name when enabled.
    pub backend: Option<&'static str>,
    /// Why the tier is disabled, when it is.
    pub disabled_reason: Option<String>,
}
