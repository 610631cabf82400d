//! Tier backend implementations.
//!
//! | Backend | Tier | Feature | Description |
//! |---------|------|---------|-------------|
//! | Memory | hot | always | In-process map with TTL expiry |
//! | SQLite | warm | `sqlite` | Embedded database, in-memory or on disk |
//! | PostgreSQL | warm | `postgres` | Pooled connections via deadpool |
//! | S3 | cold | always (`s3` for AWS) | Any `object_store::ObjectStore` |
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "sqlite")]
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use object_store::memory::InMemory;
//! use strata_engine::backends::{MemoryHotTier, S3ColdTier};
//! use strata_engine::backends::sqlite::SqliteWarmTier;
//!
//! let hot = MemoryHotTier::new();
//! let warm = SqliteWarmTier::open("./data/warm.db")?;
//! warm.init_schema()?;
//! let cold = S3ColdTier::with_store(Arc::new(InMemory::new()), "strata");
//! # Ok(())
//! # }
//! ```

mod memory;
pub mod s3;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::MemoryHotTier;
pub use s3::{S3ColdConfig, S3ColdTier};
