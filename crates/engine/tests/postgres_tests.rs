//! PostgreSQL warm tier tests.
//!
//! Configuration tests always run. Tests against a live server read
//! `STRATA_TEST_PG_URL` and return early when it is unset.
//!
//! Run with: `STRATA_TEST_PG_URL=postgres://... cargo test -p strata-engine --features postgres -- postgres`

#![cfg(feature = "postgres")]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use strata_engine::backends::postgres::{PostgresWarmConfig, PostgresWarmTier};
use strata_engine::{InsertOutcome, ManualClock, StorageRecord, Tier, TimeRange, WarmTier};

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

fn at(secs: i64) -> DateTime<Utc> {
    epoch() + chrono::Duration::seconds(secs)
}

// ============================================================================
// Configuration (no PostgreSQL instance required)
// ============================================================================

#[test]
fn test_postgres_config_defaults() {
    let config = PostgresWarmConfig::new("postgres://localhost/strata");
    assert_eq!(config.url, "postgres://localhost/strata");
    assert_eq!(config.max_connections, 10);
    assert_eq!(config.statement_timeout_ms, 30000);
}

#[tokio::test]
async fn test_unreachable_server_fails_to_connect() {
    let config = PostgresWarmConfig::new("postgres://strata@127.0.0.1:1/strata");
    assert!(PostgresWarmTier::new(config).await.is_err());
}

// ============================================================================
// Live server
// ============================================================================

async fn live_tier(clock: Arc<ManualClock>) -> Option<PostgresWarmTier> {
    let url = std::env::var("STRATA_TEST_PG_URL").ok()?;
    let tier = PostgresWarmTier::new(PostgresWarmConfig::new(url))
        .await
        .expect("Failed to connect to PostgreSQL")
        .with_clock(clock);
    tier.init_schema().await.expect("Failed to initialize schema");
    Some(tier)
}

fn unique_id(prefix: &str) -> String {
    format!(
        "{prefix}-{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    )
}

#[tokio::test]
async fn test_postgres_insert_get_delete() {
    let clock = Arc::new(ManualClock::new(epoch()));
    let Some(tier) = live_tier(clock.clone()).await else {
        return;
    };
    let id = unique_id("pg");
    let record = StorageRecord::new(&id, at(0), b"payload".to_vec(), 7, false).moved_to(Tier::Warm);

    assert_eq!(tier.insert(&record).await.unwrap(), InsertOutcome::Inserted);
    assert_eq!(
        tier.insert(&record).await.unwrap(),
        InsertOutcome::AlreadyPresent
    );

    clock.advance(std::time::Duration::from_secs(30));
    let found = tier.get(&id).await.unwrap().unwrap();
    assert_eq!(found.payload, b"payload");
    assert_eq!(found.accessed_at, Some(at(30)));

    assert!(tier.delete(&id).await.unwrap());
    assert!(tier.peek(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_postgres_range_scan() {
    let clock = Arc::new(ManualClock::new(epoch()));
    let Some(tier) = live_tier(clock).await else {
        return;
    };
    let base = unique_id("range");
    // Far-future timestamps keep this window clear of other runs' rows.
    let offset = 10_000_000;
    for i in 0..3 {
        let record = StorageRecord::new(
            format!("{base}-{i}"),
            at(offset + i),
            b"x".to_vec(),
            1,
            false,
        )
        .moved_to(Tier::Warm);
        tier.insert(&record).await.unwrap();
    }

    let found = tier
        .scan_by_time_range(TimeRange::new(at(offset), at(offset + 2)), 10)
        .await
        .unwrap();
    let ids: Vec<_> = found.iter().map(|r| r.id.clone()).collect();
    assert!(ids.contains(&format!("{base}-0")));
    assert!(ids.contains(&format!("{base}-1")));
    assert!(!ids.contains(&format!("{base}-2")));

    for i in 0..3 {
        tier.delete(&format!("{base}-{i}")).await.unwrap();
    }
}
