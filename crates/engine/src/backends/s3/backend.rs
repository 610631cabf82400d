//! Cold tier implementation over [`ObjectStore`].

use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use object_store::path::Path;
use object_store::{Attribute, AttributeValue, Attributes, ObjectStore, PutOptions, PutPayload};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::{ColdTier, TierStats};
use crate::error::{BackendError, CodecError, StorageError, StorageResult, serialization_error};
use crate::types::{StorageRecord, Tier};

use super::BACKEND_NAME;
#[cfg(feature = "s3")]
use super::S3ColdConfig;
use super::config::default_stats_max_age;

/// On-object representation of an archived record.
#[derive(Debug, Serialize, Deserialize)]
struct ColdEnvelope {
    id: String,
    timestamp: DateTime<Utc>,
    /// Stored bytes, base64-encoded.
    payload: String,
    size_bytes: u64,
    original_size_bytes: u64,
    compressed: bool,
}

impl ColdEnvelope {
    fn from_record(record: &StorageRecord) -> Self {
        Self {
            id: record.id.clone(),
            timestamp: record.timestamp,
            payload: BASE64.encode(&record.payload),
            size_bytes: record.size_bytes,
            original_size_bytes: record.original_size_bytes,
            compressed: record.compressed,
        }
    }

    fn into_record(self, key: &Path) -> StorageResult<StorageRecord> {
        let payload = BASE64
            .decode(self.payload.as_bytes())
            .map_err(|e| corrupt_object(key, format!("invalid base64 payload: {e}")))?;
        Ok(StorageRecord {
            id: self.id,
            timestamp: self.timestamp,
            payload,
            size_bytes: self.size_bytes,
            original_size_bytes: self.original_size_bytes,
            tier: Tier::Cold,
            compressed: self.compressed,
            accessed_at: None,
            location_key: Some(key.to_string()),
        })
    }
}

/// Cold tier backed by an object store.
///
/// `stats` reports object counts and object sizes (the encoded envelope, not
/// the record's stored bytes). A listing is reused until `stats_max_age`
/// passes or this tier writes or deletes.
#[derive(Debug)]
pub struct S3ColdTier {
    store: Arc<dyn ObjectStore>,
    prefix: Path,
    stats_max_age: Duration,
    stats_cache: Mutex<Option<(Instant, TierStats)>>,
}

impl S3ColdTier {
    /// Builds an S3 store from configuration.
    #[cfg(feature = "s3")]
    pub fn new(config: &S3ColdConfig) -> StorageResult<Self> {
        let store = build_store(config)?;
        Ok(Self::with_store(store, &config.prefix).with_stats_max_age(config.stats_max_age))
    }

    /// Uses an existing object store, writing under `prefix`.
    pub fn with_store(store: Arc<dyn ObjectStore>, prefix: &str) -> Self {
        Self {
            store,
            prefix: Path::from(prefix),
            stats_max_age: default_stats_max_age(),
            stats_cache: Mutex::new(None),
        }
    }

    /// Sets how long a bucket listing is reused; zero lists on every call.
    pub fn with_stats_max_age(mut self, max_age: Duration) -> Self {
        self.stats_max_age = max_age;
        self
    }

    fn cached_stats(&self) -> Option<TierStats> {
        let cached = *self.stats_cache.lock();
        cached
            .filter(|(at, _)| at.elapsed() < self.stats_max_age)
            .map(|(_, stats)| stats)
    }

    fn invalidate_stats(&self) {
        *self.stats_cache.lock() = None;
    }

    fn records_root(&self) -> Path {
        self.prefix.child("records")
    }

    /// Returns the object key for a record id.
    pub fn record_key(&self, id: &str) -> Path {
        self.records_root().child(format!("{id}.json"))
    }
}

#[async_trait]
impl ColdTier for S3ColdTier {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn put(&self, record: &StorageRecord) -> StorageResult<()> {
        let key = self.record_key(&record.id);
        let body = serde_json::to_vec(&ColdEnvelope::from_record(record)).map_err(|e| {
            serialization_error(format!("failed to encode record '{}': {e}", record.id))
        })?;

        let mut attributes = Attributes::new();
        attributes.insert(
            Attribute::ContentType,
            AttributeValue::from("application/json"),
        );
        attributes.insert(
            Attribute::Metadata("timestamp".into()),
            AttributeValue::from(record.timestamp.to_rfc3339()),
        );
        attributes.insert(
            Attribute::Metadata("compressed".into()),
            AttributeValue::from(record.compressed.to_string()),
        );
        let options = PutOptions {
            attributes,
            ..Default::default()
        };

        self.store
            .put_opts(&key, PutPayload::from(body), options)
            .await
            .map_err(|e| store_error("put", &key, e))?;
        self.invalidate_stats();
        Ok(())
    }

    async fn get(&self, id: &str) -> StorageResult<Option<StorageRecord>> {
        let key = self.record_key(id);
        let result = match self.store.get(&key).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(store_error("get", &key, e)),
        };

        let bytes = result
            .bytes()
            .await
            .map_err(|e| store_error("download", &key, e))?;

        let envelope: ColdEnvelope = serde_json::from_slice(&bytes)
            .map_err(|e| corrupt_object(&key, format!("invalid record envelope: {e}")))?;
        envelope.into_record(&key).map(Some)
    }

    async fn delete(&self, id: &str) -> StorageResult<bool> {
        let key = self.record_key(id);
        // S3 deletes succeed on missing keys, so presence comes from a HEAD.
        match self.store.head(&key).await {
            Ok(_) => {}
            Err(object_store::Error::NotFound { .. }) => return Ok(false),
            Err(e) => return Err(store_error("head", &key, e)),
        }
        match self.store.delete(&key).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => {
                self.invalidate_stats();
                Ok(true)
            }
            Err(e) => Err(store_error("delete", &key, e)),
        }
    }

    async fn stats(&self) -> StorageResult<TierStats> {
        if let Some(stats) = self.cached_stats() {
            return Ok(stats);
        }

        let root = self.records_root();
        let (count, size_bytes) = self
            .store
            .list(Some(&root))
            .try_fold((0u64, 0u64), |(count, size), meta| async move {
                Ok((count + 1, size + meta.size as u64))
            })
            .await
            .map_err(|e| store_error("list", &root, e))?;

        let stats = TierStats {
            count,
            size_bytes,
            ..Default::default()
        };
        *self.stats_cache.lock() = Some((Instant::now(), stats));
        Ok(stats)
    }
}

#[cfg(feature = "s3")]
fn build_store(config: &S3ColdConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    use object_store::aws::AmazonS3Builder;

    let mut builder = AmazonS3Builder::new()
        .with_region(&config.region)
        .with_bucket_name(&config.bucket)
        .with_allow_http(config.allow_http)
        .with_virtual_hosted_style_request(config.virtual_hosted_style_request);

    if let Some(endpoint) = &config.endpoint {
        builder = builder.with_endpoint(endpoint);
    }

    if let Some(access_key_id) = &config.access_key_id {
        builder = builder.with_access_key_id(access_key_id);
    }

    if let Some(secret_access_key) = &config.secret_access_key {
        builder = builder.with_secret_access_key(secret_access_key);
    }

    let store = builder.build().map_err(|e| {
        StorageError::Backend(BackendError::ConnectionFailed {
            backend_name: BACKEND_NAME.to_string(),
            message: format!("failed to build S3 store for bucket '{}': {e}", config.bucket),
        })
    })?;

    Ok(Arc::new(store))
}

/// An object exists but cannot be read back as a record.
fn corrupt_object(key: &Path, message: String) -> StorageError {
    StorageError::Codec(CodecError::CorruptPayload {
        message: format!("{message} at '{}'", key.as_ref()),
    })
}

fn store_error(operation: &str, key: &Path, e: object_store::Error) -> StorageError {
    StorageError::Backend(BackendError::Internal {
        backend_name: BACKEND_NAME.to_string(),
        message: format!("{operation} failed for key '{}': {e}", key.as_ref()),
        source: Some(Box::new(e)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use object_store::memory::InMemory;

    fn tier() -> (Arc<InMemory>, S3ColdTier) {
        let store = Arc::new(InMemory::new());
        let tier = S3ColdTier::with_store(store.clone(), "archive");
        (store, tier)
    }

    fn record(id: &str, body: &[u8], compressed: bool) -> StorageRecord {
        let ts = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        StorageRecord::new(id, ts, body.to_vec(), 99, compressed).moved_to(Tier::Cold)
    }

    #[test]
    fn test_record_key_layout() {
        let (_store, tier) = tier();
        assert_eq!(tier.record_key("e1").as_ref(), "archive/records/e1.json");
        // Path separators in ids are escaped rather than creating new levels.
        assert!(!tier.record_key("a/b").as_ref().contains("records/a/b"));
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let (_store, tier) = tier();
        let original = record("e1", &[0, 159, 255, 10], true);
        tier.put(&original).await.unwrap();

        let got = tier.get("e1").await.unwrap().unwrap();
        assert!(got.same_content(&original));
        assert_eq!(got.tier, Tier::Cold);
        assert_eq!(got.original_size_bytes, 99);
        assert_eq!(got.location_key.as_deref(), Some("archive/records/e1.json"));
    }

    #[tokio::test]
    async fn test_object_attributes() {
        let (store, tier) = tier();
        tier.put(&record("e1", b"body", false)).await.unwrap();

        let result = store.get(&tier.record_key("e1")).await.unwrap();
        assert_eq!(
            result
                .attributes
                .get(&Attribute::ContentType)
                .map(|v| v.as_ref()),
            Some("application/json")
        );
        assert_eq!(
            result
                .attributes
                .get(&Attribute::Metadata("compressed".into()))
                .map(|v| v.as_ref()),
            Some("false")
        );
    }

    #[tokio::test]
    async fn test_missing_key_is_none_and_delete_is_idempotent() {
        let (_store, tier) = tier();
        assert!(tier.get("nope").await.unwrap().is_none());
        assert!(!tier.delete("nope").await.unwrap());

        tier.put(&record("e1", b"x", false)).await.unwrap();
        assert!(tier.delete("e1").await.unwrap());
        assert!(tier.get("e1").await.unwrap().is_none());
        assert!(!tier.delete("e1").await.unwrap());
    }

    #[tokio::test]
    async fn test_stats_counts_objects() {
        let (_store, tier) = tier();
        assert_eq!(tier.stats().await.unwrap().count, 0);

        tier.put(&record("a", b"aaaa", false)).await.unwrap();
        tier.put(&record("b", b"bb", false)).await.unwrap();
        let stats = tier.stats().await.unwrap();
        assert_eq!(stats.count, 2);
        assert!(stats.size_bytes > 0);
    }

    #[tokio::test]
    async fn test_stats_listing_is_reused_until_local_write() {
        let (store, tier) = tier();
        tier.put(&record("a", b"aaaa", false)).await.unwrap();
        assert_eq!(tier.stats().await.unwrap().count, 1);

        // Objects written by another process show up only after the cache expires.
        store
            .put(&tier.record_key("other"), PutPayload::from_static(b"{}"))
            .await
            .unwrap();
        assert_eq!(tier.stats().await.unwrap().count, 1);

        tier.put(&record("b", b"bb", false)).await.unwrap();
        assert_eq!(tier.stats().await.unwrap().count, 3);

        assert!(tier.delete("b").await.unwrap());
        assert_eq!(tier.stats().await.unwrap().count, 2);
    }

    #[tokio::test]
    async fn test_zero_max_age_always_lists() {
        let store = Arc::new(InMemory::new());
        let tier = S3ColdTier::with_store(store.clone(), "archive")
            .with_stats_max_age(Duration::ZERO);
        tier.put(&record("a", b"aaaa", false)).await.unwrap();
        assert_eq!(tier.stats().await.unwrap().count, 1);

        store
            .put(&tier.record_key("other"), PutPayload::from_static(b"{}"))
            .await
            .unwrap();
        assert_eq!(tier.stats().await.unwrap().count, 2);
    }

    #[tokio::test]
    async fn test_garbage_object_is_corrupt() {
        let (store, tier) = tier();
        store
            .put(&tier.record_key("bad"), PutPayload::from_static(b"not json"))
            .await
            .unwrap();
        let err = tier.get("bad").await.unwrap_err();
        assert!(err.is_corrupt());
    }

    #[tokio::test]
    async fn test_bad_base64_payload_is_corrupt() {
        let (store, tier) = tier();
        let body = br#"{"id":"bad","timestamp":"2024-03-01T12:00:00Z","payload":"***","size_bytes":3,"original_size_bytes":3,"compressed":false}"#;
        store
            .put(&tier.record_key("bad"), PutPayload::from_static(body))
            .await
            .unwrap();
        let err = tier.get("bad").await.unwrap_err();
        assert!(err.is_corrupt());
    }
}
