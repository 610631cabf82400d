//! # Strata Engine
//!
//! A tiered event store. Records are written to a low-latency hot tier, moved
//! to a durable relational warm tier as they age, and archived to object
//! storage once they go unread. Lookups probe tiers from cheapest to most
//! expensive; range queries merge the hot and warm tiers.
//!
//! ## Architecture
//!
//! ```text
//!            store                  retrieve / query_by_time_range
//!              |                               |
//!        PayloadCodec                    TieredStore router
//!              |                     /         |          \
//!              v                    v          v           v
//!         +---------+  migrate  +---------+  migrate  +---------+
//!         |   Hot   | --------> |  Warm   | --------> |  Cold   |
//!         | memory  |   (age)   | sqlite/ |  (idle)   | object  |
//!         |  + TTL  |           | postgres|           |  store  |
//!         +---------+           +---------+           +---------+
//! ```
//!
//! - [`core`]: tier traits ([`HotTier`], [`WarmTier`], [`ColdTier`]) and the
//!   observer hook.
//! - [`backends`]: tier implementations, feature-gated per backend.
//! - [`engine`]: [`TieredStore`], its builder, and the [`MigrationScheduler`].
//! - [`codec`]: threshold-based deflate compression.
//!
//! ## Example
//!
//! ```no_run
//! # #[cfg(feature = "sqlite")]
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use chrono::Utc;
//! use object_store::memory::InMemory;
//! use strata_engine::backends::sqlite::SqliteWarmTier;
//! use strata_engine::{MemoryHotTier, S3ColdTier, TieredStore};
//!
//! let warm = SqliteWarmTier::open("./data/warm.db")?;
//! warm.init_schema()?;
//!
//! let store = TieredStore::builder()
//!     .hot(Arc::new(MemoryHotTier::new()))
//!     .warm(Arc::new(warm))
//!     .cold(Arc::new(S3ColdTier::with_store(Arc::new(InMemory::new()), "strata")))
//!     .build()?;
//!
//! let mut scheduler = store.scheduler();
//! scheduler.start();
//!
//! store.store("e1", Utc::now(), b"{\"kind\":\"created\"}").await?;
//! let found = store.retrieve("e1").await?;
//! assert!(found.is_some());
//!
//! scheduler.stop().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `sqlite` | SQLite warm tier (default) |
//! | `postgres` | PostgreSQL warm tier |
//! | `s3` | AWS S3 cold tier construction (default) |

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod clock;
pub mod codec;
pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{BackendError, CodecError, ConfigError, StorageError, StorageResult};
pub use types::{RecordDescriptor, RetrievedRecord, StorageRecord, Tier, TimeRange};

pub use backends::{MemoryHotTier, S3ColdConfig, S3ColdTier};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EngineConfig, TierThresholds, UnitCosts};
pub use crate::core::{
    ColdTier, EngineObserver, HotTier, InsertOutcome, MigrationEvent, TierSlot, TierStats,
    TierStatus, WarmTier,
};
pub use engine::{
    CycleReport, EngineMetrics, MigrationScheduler, PassReport, TieredStore, TieredStoreBuilder,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
