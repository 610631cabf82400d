//! SQLite warm tier implementation.

use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::core::{InsertOutcome, TierStats, WarmTier};
use crate::error::{BackendError, StorageError, StorageResult, internal_error};
use crate::types::{StorageRecord, Tier, TimeRange, from_millis};

use super::{BACKEND_NAME, schema};

const RECORD_COLUMNS: &str =
    "id, timestamp_ms, payload, size_bytes, original_size_bytes, compressed, accessed_at_ms";

/// Warm tier backed by SQLite.
pub struct SqliteWarmTier {
    pool: Pool<SqliteConnectionManager>,
    config: SqliteWarmConfig,
    is_memory: bool,
    clock: Arc<dyn Clock>,
}

impl Debug for SqliteWarmTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteWarmTier")
            .field("config", &self.config)
            .field("is_memory", &self.is_memory)
            .finish_non_exhaustive()
    }
}

/// Configuration for the SQLite warm tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteWarmConfig {
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of idle connections.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in milliseconds.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u32,

    /// Enable WAL mode for better concurrency.
    #[serde(default = "default_true")]
    pub enable_wal: bool,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connection_timeout_ms() -> u64 {
    30000
}

fn default_busy_timeout_ms() -> u32 {
    5000
}

fn default_true() -> bool {
    true
}

impl Default for SqliteWarmConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connection_timeout_ms: default_connection_timeout_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
            enable_wal: true,
        }
    }
}

impl SqliteWarmTier {
    /// Creates a new in-memory warm tier.
    pub fn in_memory() -> StorageResult<Self> {
        Self::with_config(":memory:", SqliteWarmConfig::default())
    }

    /// Opens or creates a file-based database.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        Self::with_config(path, SqliteWarmConfig::default())
    }

    /// Creates a warm tier with custom configuration.
    pub fn with_config<P: AsRef<Path>>(path: P, config: SqliteWarmConfig) -> StorageResult<Self> {
        let path_str = path.as_ref().to_string_lossy();
        let is_memory = path_str == ":memory:";

        let busy_timeout = Duration::from_millis(config.busy_timeout_ms as u64);
        let manager = SqliteConnectionManager::file(path.as_ref())
            .with_init(move |conn| conn.busy_timeout(busy_timeout));

        // Every connection to ":memory:" opens a separate database, so the
        // in-memory pool holds exactly one connection and never recycles it.
        let builder = if is_memory {
            Pool::builder()
                .max_size(1)
                .min_idle(Some(1))
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            Pool::builder()
                .max_size(config.max_connections)
                .min_idle(Some(config.min_connections.min(config.max_connections)))
        };

        let pool = builder
            .connection_timeout(Duration::from_millis(config.connection_timeout_ms))
            .build(manager)
            .map_err(|e| {
                StorageError::Backend(BackendError::ConnectionFailed {
                    backend_name: BACKEND_NAME.to_string(),
                    message: e.to_string(),
                })
            })?;

        let backend = Self {
            pool,
            config,
            is_memory,
            clock: Arc::new(SystemClock),
        };

        backend.configure_connection()?;

        Ok(backend)
    }

    /// Replaces the clock used for migration and access times.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Initialize the database schema.
    pub fn init_schema(&self) -> StorageResult<()> {
        let conn = self.get_connection()?;
        schema::initialize_schema(&conn)
    }

    /// Returns whether this is an in-memory database.
    pub fn is_memory(&self) -> bool {
        self.is_memory
    }

    /// Returns the backend configuration.
    pub fn config(&self) -> &SqliteWarmConfig {
        &self.config
    }

    fn get_connection(&self) -> StorageResult<PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(connection_failed)
    }

    fn configure_connection(&self) -> StorageResult<()> {
        let conn = self.get_connection()?;

        if self.config.enable_wal && !self.is_memory {
            // journal_mode returns the resulting mode as a row.
            conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))
                .map_err(|e| {
                    internal_error(BACKEND_NAME, format!("Failed to enable WAL mode: {}", e))
                })?;
        }

        Ok(())
    }

    /// Runs `f` on a pooled connection on the blocking thread pool.
    async fn run<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StorageResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(connection_failed)?;
            f(&conn)
        })
        .await
        .map_err(|e| internal_error(BACKEND_NAME, format!("Blocking task failed: {}", e)))?
    }
}

#[async_trait]
impl WarmTier for SqliteWarmTier {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn insert(&self, record: &StorageRecord) -> StorageResult<InsertOutcome> {
        let now_ms = self.clock.now().timestamp_millis();
        let record = record.clone();
        self.run(move |conn| {
            let changed = conn
                .execute(
                    "INSERT INTO warm_records
                        (id, timestamp_ms, payload, size_bytes, original_size_bytes, compressed,
                         migrated_at_ms, accessed_at_ms)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                     ON CONFLICT(id) DO NOTHING",
                    params![
                        record.id,
                        record.timestamp.timestamp_millis(),
                        record.payload,
                        record.size_bytes as i64,
                        record.original_size_bytes as i64,
                        record.compressed,
                        now_ms,
                    ],
                )
                .map_err(|e| query_failed("insert", e))?;

            Ok(if changed == 0 {
                InsertOutcome::AlreadyPresent
            } else {
                InsertOutcome::Inserted
            })
        })
        .await
    }

    async fn get(&self, id: &str) -> StorageResult<Option<StorageRecord>> {
        let now_ms = self.clock.now().timestamp_millis();
        let id = id.to_string();
        self.run(move |conn| {
            let touched = conn
                .execute(
                    "UPDATE warm_records SET accessed_at_ms = ?2 WHERE id = ?1",
                    params![id, now_ms],
                )
                .map_err(|e| query_failed("touch", e))?;
            if touched == 0 {
                return Ok(None);
            }
            select_one(conn, &id)
        })
        .await
    }

    async fn peek(&self, id: &str) -> StorageResult<Option<StorageRecord>> {
        let id = id.to_string();
        self.run(move |conn| select_one(conn, &id)).await
    }

    async fn delete(&self, id: &str) -> StorageResult<bool> {
        let id = id.to_string();
        self.run(move |conn| {
            let removed = conn
                .execute("DELETE FROM warm_records WHERE id = ?1", params![id])
                .map_err(|e| query_failed("delete", e))?;
            Ok(removed > 0)
        })
        .await
    }

    async fn scan_by_time_range(
        &self,
        range: TimeRange,
        limit: usize,
    ) -> StorageResult<Vec<StorageRecord>> {
        if range.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let start_ms = range.start.timestamp_millis();
        let end_ms = range.end.timestamp_millis();
        let limit = sql_limit(limit);
        self.run(move |conn| {
            select_many(
                conn,
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM warm_records
                     WHERE timestamp_ms >= ?1 AND timestamp_ms < ?2
                     ORDER BY timestamp_ms, id
                     LIMIT ?3"
                ),
                params![start_ms, end_ms, limit],
            )
        })
        .await
    }

    async fn scan_idle_since(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<StorageRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let cutoff_ms = cutoff.timestamp_millis();
        let limit = sql_limit(limit);
        self.run(move |conn| {
            select_many(
                conn,
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM warm_records
                     WHERE accessed_at_ms < ?1
                     ORDER BY accessed_at_ms, id
                     LIMIT ?2"
                ),
                params![cutoff_ms, limit],
            )
        })
        .await
    }

    async fn stats(&self, sample_limit: usize) -> StorageResult<TierStats> {
        let sample_limit = sql_limit(sample_limit);
        self.run(move |conn| {
            let (count, size): (i64, i64) = conn
                .query_row(
                    "SELECT COUNT(*), COALESCE(SUM(size_bytes), 0) FROM warm_records",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .map_err(|e| query_failed("stats", e))?;

            let (sampled_stored, sampled_original): (i64, i64) = conn
                .query_row(
                    "SELECT COALESCE(SUM(size_bytes), 0), COALESCE(SUM(original_size_bytes), 0)
                     FROM (SELECT size_bytes, original_size_bytes FROM warm_records LIMIT ?1)",
                    params![sample_limit],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .map_err(|e| query_failed("sample", e))?;

            Ok(TierStats {
                count: count.max(0) as u64,
                size_bytes: size.max(0) as u64,
                sampled_stored_bytes: sampled_stored.max(0) as u64,
                sampled_original_bytes: sampled_original.max(0) as u64,
            })
        })
        .await
    }
}

fn select_one(conn: &Connection, id: &str) -> StorageResult<Option<StorageRecord>> {
    conn.query_row(
        &format!("SELECT {RECORD_COLUMNS} FROM warm_records WHERE id = ?1"),
        params![id],
        row_to_record,
    )
    .optional()
    .map_err(|e| query_failed("select", e))
}

fn select_many(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> StorageResult<Vec<StorageRecord>> {
    let mut stmt = conn.prepare(sql).map_err(|e| query_failed("prepare", e))?;
    let rows = stmt
        .query_map(params, row_to_record)
        .map_err(|e| query_failed("scan", e))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| query_failed("scan", e))
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<StorageRecord> {
    let id: String = row.get(0)?;
    let size_bytes: i64 = row.get(3)?;
    let original_size_bytes: i64 = row.get(4)?;
    Ok(StorageRecord {
        timestamp: from_millis(row.get(1)?),
        payload: row.get(2)?,
        size_bytes: size_bytes.max(0) as u64,
        original_size_bytes: original_size_bytes.max(0) as u64,
        tier: Tier::Warm,
        compressed: row.get(5)?,
        accessed_at: Some(from_millis(row.get(6)?)),
        location_key: Some(id.clone()),
        id,
    })
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn connection_failed(e: r2d2::Error) -> StorageError {
    StorageError::Backend(BackendError::ConnectionFailed {
        backend_name: BACKEND_NAME.to_string(),
        message: e.to_string(),
    })
}

fn query_failed(operation: &str, e: rusqlite::Error) -> StorageError {
    StorageError::Backend(BackendError::Internal {
        backend_name: BACKEND_NAME.to_string(),
        message: format!("{} failed: {}", operation, e),
        source: Some(Box::new(e)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    fn record(id: &str, ms: i64, body: &[u8]) -> StorageRecord {
        StorageRecord::new(id, at(ms), body.to_vec(), body.len() as u64, false)
    }

    fn create_test_tier() -> (Arc<ManualClock>, SqliteWarmTier) {
        let clock = Arc::new(ManualClock::new(at(1_000_000)));
        let tier = SqliteWarmTier::in_memory()
            .unwrap()
            .with_clock(clock.clone());
        tier.init_schema().unwrap();
        (clock, tier)
    }

    #[test]
    fn test_create_in_memory() {
        let tier = SqliteWarmTier::in_memory().unwrap();
        assert!(tier.is_memory());
        assert_eq!(tier.backend_name(), "sqlite");
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let (_clock, tier) = create_test_tier();
        let mut original = record("e1", 1_500, b"payload");
        original.original_size_bytes = 40;
        original.compressed = true;

        assert_eq!(tier.insert(&original).await.unwrap(), InsertOutcome::Inserted);

        let got = tier.get("e1").await.unwrap().unwrap();
        assert_eq!(got.tier, Tier::Warm);
        assert_eq!(got.timestamp, at(1_500));
        assert_eq!(got.payload, b"payload");
        assert_eq!(got.original_size_bytes, 40);
        assert!(got.compressed);
        assert!(got.same_content(&original));
        assert_eq!(got.location_key.as_deref(), Some("e1"));

        assert!(tier.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_existing_is_untouched() {
        let (_clock, tier) = create_test_tier();
        tier.insert(&record("e1", 10, b"first")).await.unwrap();
        let outcome = tier.insert(&record("e1", 10, b"second")).await.unwrap();
        assert_eq!(outcome, InsertOutcome::AlreadyPresent);
        assert_eq!(tier.peek("e1").await.unwrap().unwrap().payload, b"first");
    }

    #[tokio::test]
    async fn test_get_bumps_access_time_and_peek_does_not() {
        let (clock, tier) = create_test_tier();
        tier.insert(&record("e1", 10, b"x")).await.unwrap();
        let inserted_at = clock.now();

        clock.advance(Duration::from_secs(60));
        let peeked = tier.peek("e1").await.unwrap().unwrap();
        assert_eq!(peeked.accessed_at, Some(inserted_at));

        let read = tier.get("e1").await.unwrap().unwrap();
        assert_eq!(read.accessed_at, Some(clock.now()));
    }

    #[tokio::test]
    async fn test_scan_by_time_range_orders_and_limits() {
        let (_clock, tier) = create_test_tier();
        for (id, ms) in [("c", 30), ("a", 10), ("b", 20), ("d", 40)] {
            tier.insert(&record(id, ms, id.as_bytes())).await.unwrap();
        }

        let ids: Vec<String> = tier
            .scan_by_time_range(TimeRange::new(at(10), at(40)), 10)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        let limited = tier
            .scan_by_time_range(TimeRange::before(at(100)), 1)
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, "a");
    }

    #[tokio::test]
    async fn test_scan_idle_since() {
        let (clock, tier) = create_test_tier();
        tier.insert(&record("old", 10, b"o")).await.unwrap();
        clock.advance(Duration::from_secs(3600));
        tier.insert(&record("new", 20, b"n")).await.unwrap();

        let cutoff = clock.now();
        let idle = tier.scan_idle_since(cutoff, 10).await.unwrap();
        assert_eq!(idle.len(), 1);
        assert_eq!(idle[0].id, "old");

        // Reading "old" makes it recently used.
        clock.advance(Duration::from_secs(1));
        tier.get("old").await.unwrap();
        assert!(tier.scan_idle_since(cutoff, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_and_stats() {
        let (_clock, tier) = create_test_tier();
        let mut big = record("big", 10, &[1u8; 50]);
        big.original_size_bytes = 200;
        tier.insert(&big).await.unwrap();
        tier.insert(&record("small", 20, &[2u8; 10])).await.unwrap();

        let stats = tier.stats(100).await.unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.size_bytes, 60);
        assert_eq!(stats.sampled_stored_bytes, 60);
        assert_eq!(stats.sampled_original_bytes, 210);

        assert!(tier.delete("big").await.unwrap());
        assert!(!tier.delete("big").await.unwrap());
        assert_eq!(tier.stats(100).await.unwrap().count, 1);
    }
}
