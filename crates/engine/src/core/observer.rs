//! Synchronous notifications for successful engine operations.
//!
//! Observers run on the caller's task after the operation has completed, so
//! they should return quickly; anything slow belongs behind a channel.

use std::fmt::Debug;

use crate::types::{RecordDescriptor, Tier};

/// A record that changed tiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationEvent {
    /// Record id.
    pub id: String,
    /// Tier the record left.
    pub from: Tier,
    /// Tier now holding the record.
    pub to: Tier,
}

/// Receives engine events.
///
/// All methods default to no-ops so an observer only implements what it needs.
pub trait EngineObserver: Send + Sync + Debug {
    /// Called after a successful `Store`.
    fn on_stored(&self, _record: &RecordDescriptor) {}

    /// Called after a record has been moved to a colder tier.
    fn on_migrated(&self, _event: &MigrationEvent) {}

    /// Called after a successful `Delete` that removed at least one copy.
    fn on_deleted(&self, _id: &str) {}
}
