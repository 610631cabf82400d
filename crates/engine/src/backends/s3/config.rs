//! Cold tier configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// S3 cold tier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3ColdConfig {
    /// Bucket holding archived records.
    pub bucket: String,

    /// S3 region.
    #[serde(default = "default_region")]
    pub region: String,

    /// Optional custom endpoint (for MinIO or S3-compatible services).
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Optional static access key ID.
    #[serde(default)]
    pub access_key_id: Option<String>,

    /// Optional static secret access key.
    #[serde(default)]
    pub secret_access_key: Option<String>,

    /// Whether HTTP is allowed (useful for local MinIO).
    #[serde(default)]
    pub allow_http: bool,

    /// Whether virtual-hosted-style requests should be used.
    /// Set to `false` to force path-style addressing.
    #[serde(default = "default_true")]
    pub virtual_hosted_style_request: bool,

    /// Key prefix under which records are written.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// How long a bucket listing is reused for `stats` when this process has
    /// not written or deleted since.
    #[serde(
        with = "crate::config::humantime_serde",
        default = "default_stats_max_age"
    )]
    pub stats_max_age: Duration,
}

impl S3ColdConfig {
    /// Creates a configuration for `bucket` with defaults for everything else.
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: default_region(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            allow_http: false,
            virtual_hosted_style_request: true,
            prefix: default_prefix(),
            stats_max_age: default_stats_max_age(),
        }
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_true() -> bool {
    true
}

fn default_prefix() -> String {
    "strata".to_string()
}

pub(crate) fn default_stats_max_age() -> Duration {
    Duration::from_secs(300)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_with_defaults() {
        let config: S3ColdConfig =
            serde_json::from_value(serde_json::json!({ "bucket": "archive" })).unwrap();
        assert_eq!(config.bucket, "archive");
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.prefix, "strata");
        assert!(config.virtual_hosted_style_request);
        assert!(!config.allow_http);
        assert_eq!(config.stats_max_age, Duration::from_secs(300));
    }
}
