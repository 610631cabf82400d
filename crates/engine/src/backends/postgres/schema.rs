//! PostgreSQL schema definitions and migrations.

use crate::error::{StorageError, StorageResult, internal_error};

use super::BACKEND_NAME;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
pub async fn initialize_schema(client: &deadpool_postgres::Client) -> StorageResult<()> {
    let current_version = get_schema_version(client).await?;

    if current_version == 0 {
        create_schema_v1(client).await?;
        set_schema_version(client, SCHEMA_VERSION).await?;
    } else if current_version > SCHEMA_VERSION {
        return Err(pg_error(format!(
            "Database schema version {} is newer than supported version {}",
            current_version, SCHEMA_VERSION
        )));
    }

    Ok(())
}

async fn get_schema_version(client: &deadpool_postgres::Client) -> StorageResult<i32> {
    client
        .execute(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER NOT NULL
            )",
            &[],
        )
        .await
        .map_err(|e| pg_error(format!("Failed to create schema_version table: {}", e)))?;

    let row = client
        .query_opt("SELECT version FROM schema_version LIMIT 1", &[])
        .await
        .map_err(|e| pg_error(format!("Failed to query schema version: {}", e)))?;

    Ok(row.map(|r| r.get::<_, i32>(0)).unwrap_or(0))
}

async fn set_schema_version(client: &deadpool_postgres::Client, version: i32) -> StorageResult<()> {
    client
        .execute("DELETE FROM schema_version", &[])
        .await
        .map_err(|e| pg_error(format!("Failed to clear schema_version: {}", e)))?;

    client
        .execute(
            "INSERT INTO schema_version (version) VALUES ($1)",
            &[&version],
        )
        .await
        .map_err(|e| pg_error(format!("Failed to set schema_version: {}", e)))?;

    Ok(())
}

async fn create_schema_v1(client: &deadpool_postgres::Client) -> StorageResult<()> {
    client
        .batch_execute(
            "CREATE TABLE IF NOT EXISTS warm_records (
                id TEXT PRIMARY KEY,
                timestamp_ms BIGINT NOT NULL,
                payload BYTEA NOT NULL,
                size_bytes BIGINT NOT NULL,
                original_size_bytes BIGINT NOT NULL,
                compressed BOOLEAN NOT NULL DEFAULT FALSE,
                migrated_at_ms BIGINT NOT NULL,
                accessed_at_ms BIGINT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_warm_records_timestamp
                ON warm_records(timestamp_ms, id);

            CREATE INDEX IF NOT EXISTS idx_warm_records_accessed
                ON warm_records(accessed_at_ms, id);",
        )
        .await
        .map_err(|e| pg_error(format!("Failed to create schema v1: {}", e)))
}

fn pg_error(message: String) -> StorageError {
    internal_error(BACKEND_NAME, message)
}
