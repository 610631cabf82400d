//! Core types for stored records.

mod record;

pub use record::{
    RecordDescriptor, RetrievedRecord, StorageRecord, Tier, TimeRange, truncate_to_millis,
};

pub(crate) use record::from_millis;
