//! In-process hot tier.
//!
//! Records live in a hash map keyed by id, with a `BTreeSet` of
//! `(timestamp, id)` maintained alongside every put and delete so that time
//! range scans walk entries in order without sorting. Expiry is lazy: expired
//! entries are dropped when an operation runs into them, and [`count`] purges
//! before counting.
//!
//! [`count`]: crate::core::HotTier::count

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::clock::{Clock, SystemClock, saturating_add};
use crate::core::{HotTier, TierStats};
use crate::error::StorageResult;
use crate::types::{StorageRecord, TimeRange};

const BACKEND_NAME: &str = "memory";

#[derive(Debug, Clone)]
struct HotEntry {
    record: StorageRecord,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct HotState {
    entries: HashMap<String, HotEntry>,
    by_time: BTreeSet<(DateTime<Utc>, String)>,
}

impl HotState {
    fn remove(&mut self, id: &str) -> Option<HotEntry> {
        let entry = self.entries.remove(id)?;
        self.by_time
            .remove(&(entry.record.timestamp, entry.record.id.clone()));
        Some(entry)
    }

    fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            self.remove(id);
        }
        expired.len()
    }
}

/// Hot tier held in process memory.
#[derive(Debug)]
pub struct MemoryHotTier {
    state: RwLock<HotState>,
    clock: Arc<dyn Clock>,
}

impl MemoryHotTier {
    /// Creates an empty hot tier on wall-clock time.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty hot tier using `clock` for expiry.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(HotState::default()),
            clock,
        }
    }

    /// Drops all expired entries and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        self.state.write().purge_expired(now)
    }
}

impl Default for MemoryHotTier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HotTier for MemoryHotTier {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn put(&self, mut record: StorageRecord, ttl: Duration) -> StorageResult<()> {
        let expires_at = saturating_add(self.clock.now(), ttl);
        record.location_key = Some(record.id.clone());

        let mut state = self.state.write();
        state.remove(&record.id);
        state
            .by_time
            .insert((record.timestamp, record.id.clone()));
        state
            .entries
            .insert(record.id.clone(), HotEntry { record, expires_at });
        Ok(())
    }

    async fn get(&self, id: &str) -> StorageResult<Option<StorageRecord>> {
        let now = self.clock.now();
        {
            let state = self.state.read();
            match state.entries.get(id) {
                None => return Ok(None),
                Some(entry) if entry.expires_at > now => return Ok(Some(entry.record.clone())),
                Some(_) => {}
            }
        }
        // Expired: drop it unless a fresh put replaced it meanwhile.
        let mut state = self.state.write();
        if state
            .entries
            .get(id)
            .is_some_and(|entry| entry.expires_at <= now)
        {
            state.remove(id);
        }
        Ok(None)
    }

    async fn delete(&self, id: &str) -> StorageResult<bool> {
        let now = self.clock.now();
        let removed = self.state.write().remove(id);
        Ok(removed.is_some_and(|entry| entry.expires_at > now))
    }

    async fn delete_if_unchanged(&self, expected: &StorageRecord) -> StorageResult<bool> {
        let mut state = self.state.write();
        let matches = state
            .entries
            .get(&expected.id)
            .is_some_and(|entry| entry.record.same_content(expected));
        if matches {
            state.remove(&expected.id);
        }
        Ok(matches)
    }

    async fn scan_by_time_range(
        &self,
        range: TimeRange,
        limit: usize,
    ) -> StorageResult<Vec<String>> {
        if range.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let now = self.clock.now();
        let state = self.state.read();
        let lower = (range.start, String::new());
        let ids = state
            .by_time
            .range(lower..)
            .take_while(|(ts, _)| *ts < range.end)
            .filter(|(_, id)| {
                state
                    .entries
                    .get(id)
                    .is_some_and(|entry| entry.expires_at > now)
            })
            .take(limit)
            .map(|(_, id)| id.clone())
            .collect();
        Ok(ids)
    }

    async fn count(&self) -> StorageResult<u64> {
        let now = self.clock.now();
        let mut state = self.state.write();
        state.purge_expired(now);
        Ok(state.entries.len() as u64)
    }

    async fn stats(&self, sample_limit: usize) -> StorageResult<TierStats> {
        let now = self.clock.now();
        let mut state = self.state.write();
        state.purge_expired(now);

        let mut stats = TierStats {
            count: state.entries.len() as u64,
            ..Default::default()
        };
        for (i, entry) in state.entries.values().enumerate() {
            stats.size_bytes += entry.record.size_bytes;
            if i < sample_limit {
                stats.sampled_stored_bytes += entry.record.size_bytes;
                stats.sampled_original_bytes += entry.record.original_size_bytes;
            }
        }
        Ok(stats)
    }
}
