//! The tiered store: request routing, migration, and metrics.
//!
//! Writes always land in the hot tier. Reads probe hot, warm, then cold,
//! stopping at the first hit. A background [`MigrationScheduler`] demotes
//! records as they age (hot to warm) or go unread (warm to cold).

mod builder;
mod metrics;
mod migration;
mod store;

pub use builder::TieredStoreBuilder;
pub use metrics::{CounterSnapshot, EngineMetrics};
pub use migration::{CycleReport, MigrationScheduler, PassReport};
pub use store::TieredStore;
