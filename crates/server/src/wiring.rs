//! Connects the configured backends and assembles the store.
//!
//! The daemon exposes no write API, so it acts as a migration worker over
//! shared warm and cold backends. Its hot tier lives in this process and only
//! ever holds records written through an embedding [`TieredStore`]; deployments
//! that only demote warm rows to cold can run with `STRATA_HOT_ENABLED=false`.

use std::sync::Arc;

use strata_engine::{
    BackendError, ColdTier, HotTier, MemoryHotTier, StorageError, StorageResult, TieredStore,
    WarmTier,
};
use tracing::info;

use crate::config::{ServerConfig, WarmTarget};

/// Builds a [`TieredStore`] from the daemon configuration.
///
/// A backend that fails to connect is disabled rather than aborting startup;
/// the store fails only when no tier at all is usable.
pub async fn build_store(config: &ServerConfig) -> anyhow::Result<TieredStore> {
    let mut builder = TieredStore::builder().config(config.engine_config());

    if config.hot_enabled {
        builder = builder
            .connect_hot(async { Ok(Arc::new(MemoryHotTier::new()) as Arc<dyn HotTier>) })
            .await;
    }

    if let Some(target) = config.warm_target() {
        info!(warm = %target, "Connecting warm tier");
        builder = builder.connect_warm(connect_warm(target, config)).await;
    }

    if let Some(cold) = config.cold_config() {
        info!(bucket = %cold.bucket, prefix = %cold.prefix, "Connecting cold tier");
        builder = builder.connect_cold(connect_cold(cold)).await;
    }

    Ok(builder.build()?)
}

async fn connect_warm(target: WarmTarget, config: &ServerConfig) -> StorageResult<Arc<dyn WarmTier>> {
    match target {
        WarmTarget::Sqlite(path) => connect_sqlite(path, config.warm_max_connections).await,
        WarmTarget::Postgres(url) => connect_postgres(url, config.warm_max_connections).await,
    }
}

#[cfg(feature = "sqlite")]
async fn connect_sqlite(path: String, max_connections: u32) -> StorageResult<Arc<dyn WarmTier>> {
    use strata_engine::backends::sqlite::{SqliteWarmConfig, SqliteWarmTier};

    let config = SqliteWarmConfig {
        max_connections,
        ..Default::default()
    };
    let warm = tokio::task::spawn_blocking(move || {
        let warm = SqliteWarmTier::with_config(&path, config)?;
        warm.init_schema()?;
        Ok::<_, StorageError>(warm)
    })
    .await
    .map_err(|e| unavailable("sqlite", e.to_string()))??;
    Ok(Arc::new(warm))
}

#[cfg(not(feature = "sqlite"))]
async fn connect_sqlite(_path: String, _max_connections: u32) -> StorageResult<Arc<dyn WarmTier>> {
    Err(unavailable(
        "sqlite",
        "built without the 'sqlite' feature. Build with: cargo build -p strata-server --features sqlite",
    ))
}

#[cfg(feature = "postgres")]
async fn connect_postgres(url: String, max_connections: u32) -> StorageResult<Arc<dyn WarmTier>> {
    use strata_engine::backends::postgres::{PostgresWarmConfig, PostgresWarmTier};

    let mut config = PostgresWarmConfig::new(url);
    config.max_connections = max_connections as usize;
    let warm = PostgresWarmTier::new(config).await?;
    warm.init_schema().await?;
    Ok(Arc::new(warm))
}

#[cfg(not(feature = "postgres"))]
async fn connect_postgres(_url: String, _max_connections: u32) -> StorageResult<Arc<dyn WarmTier>> {
    Err(unavailable(
        "postgres",
        "built without the 'postgres' feature. Build with: cargo build -p strata-server --features postgres",
    ))
}

#[cfg(feature = "s3")]
async fn connect_cold(config: strata_engine::S3ColdConfig) -> StorageResult<Arc<dyn ColdTier>> {
    use strata_engine::S3ColdTier;

    let cold = S3ColdTier::new(&config)?;
    // Fail fast on bad credentials or a missing bucket.
    cold.stats().await?;
    Ok(Arc::new(cold))
}

#[cfg(not(feature = "s3"))]
async fn connect_cold(_config: strata_engine::S3ColdConfig) -> StorageResult<Arc<dyn ColdTier>> {
    Err(unavailable(
        "s3",
        "built without the 's3' feature. Build with: cargo build -p strata-server --features s3",
    ))
}

fn unavailable(backend_name: &str, message: impl Into<String>) -> StorageError {
    StorageError::Backend(BackendError::Unavailable {
        backend_name: backend_name.to_string(),
        message: message.into(),
    })
}
