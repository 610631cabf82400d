//! SQLite schema definitions.

use rusqlite::Connection;

use crate::error::{StorageResult, internal_error};

use super::BACKEND_NAME;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
pub fn initialize_schema(conn: &Connection) -> StorageResult<()> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        create_schema_v1(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version > SCHEMA_VERSION {
        return Err(internal_error(
            BACKEND_NAME,
            format!(
                "Database schema version {} is newer than supported version {}",
                current_version, SCHEMA_VERSION
            ),
        ));
    }

    Ok(())
}

fn get_schema_version(conn: &Connection) -> StorageResult<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL
        )",
        [],
    )
    .map_err(|e| {
        internal_error(
            BACKEND_NAME,
            format!("Failed to create schema_version table: {}", e),
        )
    })?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .ok();

    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> StorageResult<()> {
    conn.execute("DELETE FROM schema_version", [])
        .map_err(|e| internal_error(BACKEND_NAME, format!("Failed to clear schema_version: {}", e)))?;

    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])
        .map_err(|e| internal_error(BACKEND_NAME, format!("Failed to set schema_version: {}", e)))?;

    Ok(())
}

/// Warm records with their migration and last-access times.
fn create_schema_v1(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS warm_records (
            id TEXT PRIMARY KEY,
            timestamp_ms INTEGER NOT NULL,
            payload BLOB NOT NULL,
            size_bytes INTEGER NOT NULL,
            original_size_bytes INTEGER NOT NULL,
            compressed INTEGER NOT NULL DEFAULT 0,
            migrated_at_ms INTEGER NOT NULL,
            accessed_at_ms INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_warm_records_timestamp
            ON warm_records(timestamp_ms, id);

        CREATE INDEX IF NOT EXISTS idx_warm_records_accessed
            ON warm_records(accessed_at_ms, id);",
    )
    .map_err(|e| internal_error(BACKEND_NAME, format!("Failed to create schema v1: {}", e)))
}
