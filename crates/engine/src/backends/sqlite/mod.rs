//! SQLite warm tier.
//!
//! Supports in-memory databases (tests) and file-based databases. All queries
//! run on the blocking thread pool since `rusqlite` is synchronous.
//!
//! # Example
//!
//! ```no_run
//! use strata_engine::backends::sqlite::SqliteWarmTier;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let warm = SqliteWarmTier::open("./data/warm.db")?;
//! warm.init_schema()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Schema
//!
//! A single `warm_records` table keyed by record id, indexed on event
//! timestamp (range queries, hot-to-warm ordering) and last access time
//! (warm-to-cold demotion). A `schema_version` table records the schema in use.

mod backend;
pub(crate) mod schema;

pub use backend::{SqliteWarmConfig, SqliteWarmTier};

const BACKEND_NAME: &str = "sqlite";
