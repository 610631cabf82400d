//! Storage record types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One of the three storage tiers, ordered by cost of access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Low-latency, TTL-bound store for the newest records.
    Hot,
    /// Durable relational store for aged-out hot records.
    Warm,
    /// Object storage for archival records.
    Cold,
}

impl Tier {
    /// All tiers in probe order (cheapest first).
    pub const ALL: [Tier; 3] = [Tier::Hot, Tier::Warm, Tier::Cold];

    /// Returns the tier name as a static string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Hot => "hot",
            Tier::Warm => "warm",
            Tier::Cold => "cold",
        }
    }

    /// Returns the next-colder tier, if any.
    pub fn colder(&self) -> Option<Tier> {
        match self {
            Tier::Hot => Some(Tier::Warm),
            Tier::Warm => Some(Tier::Cold),
            Tier::Cold => None,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hot" => Ok(Tier::Hot),
            "warm" => Ok(Tier::Warm),
            "cold" => Ok(Tier::Cold),
            other => Err(format!("unknown tier: {other}")),
        }
    }
}

/// The unit of storage held by a tier.
///
/// `payload` is the stored representation: when `compressed` is set it must be
/// passed through the codec before it is handed back to a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageRecord {
    /// Caller-assigned identifier, unique within the store.
    pub id: String,

    /// Logical event time, millisecond precision.
    pub timestamp: DateTime<Utc>,

    /// Stored (possibly compressed) bytes.
    pub payload: Vec<u8>,

    /// Size of the stored representation.
    pub size_bytes: u64,

    /// Size of the caller's payload before compression.
    pub original_size_bytes: u64,

    /// Tier holding the authoritative copy.
    pub tier: Tier,

    /// Whether `payload` is compressed.
    pub compressed: bool,

    /// Last read time, maintained by the warm tier.
    #[serde(default)]
    pub accessed_at: Option<DateTime<Utc>>,

    /// Tier-specific address (cache key, row id, or object key).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_key: Option<String>,
}

impl StorageRecord {
    /// Creates a hot-tier record from an already-encoded payload.
    pub fn new(
        id: impl Into<String>,
        timestamp: DateTime<Utc>,
        payload: Vec<u8>,
        original_size_bytes: u64,
        compressed: bool,
    ) -> Self {
        Self {
            id: id.into(),
            timestamp: truncate_to_millis(timestamp),
            size_bytes: payload.len() as u64,
            payload,
            original_size_bytes,
            tier: Tier::Hot,
            compressed,
            accessed_at: None,
            location_key: None,
        }
    }

    /// Returns a copy of this record reassigned to `tier`.
    pub fn moved_to(&self, tier: Tier) -> Self {
        Self {
            tier,
            location_key: None,
            ..self.clone()
        }
    }

    /// Returns true if both records carry the same stored content.
    ///
    /// Tier bookkeeping (tier, access time, location) is ignored.
    pub fn same_content(&self, other: &StorageRecord) -> bool {
        self.id == other.id
            && self.timestamp == other.timestamp
            && self.compressed == other.compressed
            && self.payload == other.payload
    }

    /// Returns the caller-facing descriptor for this record.
    pub fn descriptor(&self) -> RecordDescriptor {
        RecordDescriptor {
            id: self.id.clone(),
            timestamp: self.timestamp,
            tier: self.tier,
            size_bytes: self.size_bytes,
            compressed: self.compressed,
        }
    }
}

/// What `Store` reports back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDescriptor {
    /// Record id.
    pub id: String,
    /// Event time, truncated to milliseconds.
    pub timestamp: DateTime<Utc>,
    /// Tier the record was written to.
    pub tier: Tier,
    /// Stored size after compression.
    pub size_bytes: u64,
    /// Whether the payload was compressed.
    pub compressed: bool,
}

/// A decoded record returned by `Retrieve` and range queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievedRecord {
    /// Record id.
    pub id: String,
    /// Event time.
    pub timestamp: DateTime<Utc>,
    /// Original payload bytes, decompressed.
    pub payload: Vec<u8>,
    /// Tier that answered the lookup.
    pub tier: Tier,
}

/// A half-open time window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    /// Inclusive lower bound.
    pub start: DateTime<Utc>,
    /// Exclusive upper bound.
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Creates a range covering `[start, end)`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Everything strictly before `end`.
    pub fn before(end: DateTime<Utc>) -> Self {
        Self {
            start: DateTime::<Utc>::MIN_UTC,
            end,
        }
    }

    /// Returns true if `ts` falls in the window.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }

    /// Returns true if the window cannot contain anything.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Drops sub-millisecond precision so every tier reports the same timestamp.
pub fn truncate_to_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ts.timestamp_millis()).unwrap_or(ts)
}

/// Converts epoch milliseconds read from a backend into a timestamp.
pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_tier_order_and_names() {
        assert!(Tier::Hot < Tier::Warm && Tier::Warm < Tier::Cold);
        assert_eq!(Tier::Warm.to_string(), "warm");
        assert_eq!("COLD".parse::<Tier>().unwrap(), Tier::Cold);
        assert!("lukewarm".parse::<Tier>().is_err());
        assert_eq!(Tier::Hot.colder(), Some(Tier::Warm));
        assert_eq!(Tier::Cold.colder(), None);
    }

    #[test]
    fn test_new_record_truncates_timestamp() {
        let ts = Utc.timestamp_nanos(1_700_000_000_123_456_789);
        let record = StorageRecord::new("e1", ts, vec![1, 2, 3], 3, false);
        assert_eq!(record.timestamp.timestamp_millis(), 1_700_000_000_123);
        assert_eq!(record.timestamp.timestamp_subsec_nanos(), 123_000_000);
        assert_eq!(record.size_bytes, 3);
        assert_eq!(record.tier, Tier::Hot);
    }

    #[test]
    fn test_same_content_ignores_tier_bookkeeping() {
        let ts = Utc.timestamp_millis_opt(1_000).unwrap();
        let hot = StorageRecord::new("e1", ts, b"abc".to_vec(), 3, false);
        let mut warm = hot.moved_to(Tier::Warm);
        warm.accessed_at = Some(ts);
        warm.location_key = Some("e1".to_string());
        assert!(hot.same_content(&warm));

        let other = StorageRecord::new("e1", ts, b"abd".to_vec(), 3, false);
        assert!(!hot.same_content(&other));
    }

    #[test]
    fn test_time_range_is_half_open() {
        let start = Utc.timestamp_millis_opt(100).unwrap();
        let end = Utc.timestamp_millis_opt(200).unwrap();
        let range = TimeRange::new(start, end);
        assert!(range.contains(start));
        assert!(!range.contains(end));
        assert!(TimeRange::new(end, start).is_empty());
        assert!(TimeRange::before(end).contains(start));
    }
}
