//! Tier traits and engine extension points.

mod observer;
mod tier;

pub use observer::{EngineObserver, MigrationEvent};
pub use tier::{ColdTier, HotTier, InsertOutcome, TierSlot, TierStats, TierStatus, WarmTier};
