//! Daemon configuration.
//!
//! Every option can be given on the command line or through the environment.
//! Durations use humantime syntax (`90s`, `1h`, `7days`).
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `STRATA_LOG_LEVEL` | info | Log level |
//! | `STRATA_HOT_ENABLED` | true | Run the in-process hot tier |
//! | `STRATA_HOT_TTL` | 24h | Default hot-tier TTL |
//! | `STRATA_WARM_URL` | | SQLite path, `:memory:`, or `postgres://` URL |
//! | `STRATA_WARM_MAX_CONNECTIONS` | 10 | Warm pool size |
//! | `STRATA_COLD_BUCKET` | | Object-storage bucket for the cold tier |
//! | `STRATA_COLD_REGION` | us-east-1 | Bucket region |
//! | `STRATA_COLD_ENDPOINT` | | Custom endpoint (MinIO, LocalStack) |
//! | `STRATA_COLD_PREFIX` | strata | Key prefix inside the bucket |
//! | `STRATA_COLD_ALLOW_HTTP` | false | Allow plain HTTP endpoints |
//! | `STRATA_HOT_TO_WARM_AGE` | 1h | Event age before hot records move to warm |
//! | `STRATA_WARM_TO_COLD_IDLE` | 7days | Idle time before warm records move to cold |
//! | `STRATA_COMPRESSION_THRESHOLD` | 1024 | Payload size (bytes) above which to compress |
//! | `STRATA_MIGRATION_INTERVAL` | 1m | Time between migration cycles |
//! | `STRATA_MIGRATION_BATCH_SIZE` | 100 | Records per pass per cycle |
//! | `STRATA_BACKEND_TIMEOUT` | 5s | Upper bound on any backend call |
//! | `STRATA_METRICS_INTERVAL` | 5m | How often to log the metrics snapshot |

use std::fmt;
use std::time::Duration;

use clap::{ArgAction, Parser};
use strata_engine::{EngineConfig, S3ColdConfig, TierThresholds, UnitCosts};

/// Where the warm tier lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarmTarget {
    /// A SQLite file path or `:memory:`.
    Sqlite(String),
    /// A PostgreSQL connection URL.
    Postgres(String),
}

impl fmt::Display for WarmTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarmTarget::Sqlite(path) => write!(f, "sqlite:{path}"),
            // Credentials stay out of logs.
            WarmTarget::Postgres(_) => write!(f, "postgres"),
        }
    }
}

/// Command-line and environment configuration for the `strata` daemon.
#[derive(Debug, Clone, Parser)]
#[command(name = "strata")]
#[command(about = "Tiered hot/warm/cold event store", version)]
pub struct ServerConfig {
    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "STRATA_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Run the in-process hot tier. It is not shared with other processes.
    #[arg(long, env = "STRATA_HOT_ENABLED", default_value_t = true, action = ArgAction::Set)]
    pub hot_enabled: bool,

    /// Default TTL for hot-tier writes.
    #[arg(long, env = "STRATA_HOT_TTL", default_value = "24h", value_parser = humantime::parse_duration)]
    pub hot_ttl: Duration,

    /// Warm tier location: a SQLite path, `:memory:`, or a `postgres://` URL.
    #[arg(long, env = "STRATA_WARM_URL")]
    pub warm_url: Option<String>,

    /// Maximum warm-tier pool connections.
    #[arg(long, env = "STRATA_WARM_MAX_CONNECTIONS", default_value = "10")]
    pub warm_max_connections: u32,

    /// Cold tier bucket. The cold tier is disabled when unset.
    #[arg(long, env = "STRATA_COLD_BUCKET")]
    pub cold_bucket: Option<String>,

    /// Cold tier bucket region.
    #[arg(long, env = "STRATA_COLD_REGION", default_value = "us-east-1")]
    pub cold_region: String,

    /// Custom object-storage endpoint.
    #[arg(long, env = "STRATA_COLD_ENDPOINT")]
    pub cold_endpoint: Option<String>,

    /// Key prefix for archived records.
    #[arg(long, env = "STRATA_COLD_PREFIX", default_value = "strata")]
    pub cold_prefix: String,

    /// Allow plain HTTP to the object-storage endpoint.
    #[arg(long, env = "STRATA_COLD_ALLOW_HTTP", default_value_t = false, action = ArgAction::Set)]
    pub cold_allow_http: bool,

    /// Access key id; falls back to the AWS environment when unset.
    #[arg(long, env = "STRATA_COLD_ACCESS_KEY_ID", hide_env_values = true)]
    pub cold_access_key_id: Option<String>,

    /// Secret access key; falls back to the AWS environment when unset.
    #[arg(long, env = "STRATA_COLD_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub cold_secret_access_key: Option<String>,

    /// Event age after which hot records move to warm.
    #[arg(long, env = "STRATA_HOT_TO_WARM_AGE", default_value = "1h", value_parser = humantime::parse_duration)]
    pub hot_to_warm_age: Duration,

    /// Time since last read after which warm records move to cold.
    #[arg(long, env = "STRATA_WARM_TO_COLD_IDLE", default_value = "7days", value_parser = humantime::parse_duration)]
    pub warm_to_cold_idle: Duration,

    /// Payloads larger than this many bytes are compressed.
    #[arg(long, env = "STRATA_COMPRESSION_THRESHOLD", default_value = "1024")]
    pub compression_threshold: usize,

    /// Deflate level (0-9).
    #[arg(long, env = "STRATA_COMPRESSION_LEVEL", default_value = "6")]
    pub compression_level: u32,

    /// Time between migration cycles.
    #[arg(long, env = "STRATA_MIGRATION_INTERVAL", default_value = "1m", value_parser = humantime::parse_duration)]
    pub migration_interval: Duration,

    /// Records moved per pass per cycle.
    #[arg(long, env = "STRATA_MIGRATION_BATCH_SIZE", default_value = "100")]
    pub migration_batch_size: usize,

    /// Upper bound on any single backend call.
    #[arg(long, env = "STRATA_BACKEND_TIMEOUT", default_value = "5s", value_parser = humantime::parse_duration)]
    pub backend_timeout: Duration,

    /// Records sampled per tier for the compression ratio.
    #[arg(long, env = "STRATA_METRICS_SAMPLE_SIZE", default_value = "100")]
    pub metrics_sample_size: usize,

    /// How often the daemon logs the metrics snapshot.
    #[arg(long, env = "STRATA_METRICS_INTERVAL", default_value = "5m", value_parser = humantime::parse_duration)]
    pub metrics_interval: Duration,

    /// Hot tier unit cost per record.
    #[arg(long, env = "STRATA_COST_HOT", default_value = "0.00001")]
    pub cost_hot: f64,

    /// Warm tier unit cost per record.
    #[arg(long, env = "STRATA_COST_WARM", default_value = "0.000002")]
    pub cost_warm: f64,

    /// Cold tier unit cost per record.
    #[arg(long, env = "STRATA_COST_COLD", default_value = "0.0000004")]
    pub cost_cold: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            log_level: "info".to_string(),
            hot_enabled: true,
            hot_ttl: engine.default_hot_ttl,
            warm_url: None,
            warm_max_connections: 10,
            cold_bucket: None,
            cold_region: "us-east-1".to_string(),
            cold_endpoint: None,
            cold_prefix: "strata".to_string(),
            cold_allow_http: false,
            cold_access_key_id: None,
            cold_secret_access_key: None,
            hot_to_warm_age: engine.thresholds.hot_to_warm_age,
            warm_to_cold_idle: engine.thresholds.warm_to_cold_idle,
            compression_threshold: engine.thresholds.compression_size_threshold,
            compression_level: engine.compression_level,
            migration_interval: engine.migration_interval,
            migration_batch_size: engine.migration_batch_size,
            backend_timeout: engine.backend_timeout,
            metrics_sample_size: engine.metrics_sample_size,
            metrics_interval: Duration::from_secs(5 * 60),
            cost_hot: engine.unit_costs.hot,
            cost_warm: engine.unit_costs.warm,
            cost_cold: engine.unit_costs.cold,
        }
    }
}

impl ServerConfig {
    /// Returns the warm tier target, if one is configured.
    pub fn warm_target(&self) -> Option<WarmTarget> {
        let url = self.warm_url.as_deref()?.trim();
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Some(WarmTarget::Postgres(url.to_string()))
        } else {
            Some(WarmTarget::Sqlite(url.to_string()))
        }
    }

    /// Returns the cold tier settings, if a bucket is configured.
    pub fn cold_config(&self) -> Option<S3ColdConfig> {
        let bucket = self.cold_bucket.as_deref()?;
        let mut config = S3ColdConfig::new(bucket);
        config.region = self.cold_region.clone();
        config.endpoint = self.cold_endpoint.clone();
        config.prefix = self.cold_prefix.clone();
        config.allow_http = self.cold_allow_http;
        config.access_key_id = self.cold_access_key_id.clone();
        config.secret_access_key = self.cold_secret_access_key.clone();
        // Path-style addressing for custom endpoints.
        config.virtual_hosted_style_request = self.cold_endpoint.is_none();
        Some(config)
    }

    /// Builds the engine configuration.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            thresholds: TierThresholds {
                hot_to_warm_age: self.hot_to_warm_age,
                warm_to_cold_idle: self.warm_to_cold_idle,
                compression_size_threshold: self.compression_threshold,
            },
            unit_costs: UnitCosts {
                hot: self.cost_hot,
                warm: self.cost_warm,
                cold: self.cost_cold,
            },
            default_hot_ttl: self.hot_ttl,
            migration_interval: self.migration_interval,
            migration_batch_size: self.migration_batch_size,
            backend_timeout: self.backend_timeout,
            metrics_sample_size: self.metrics_sample_size,
            compression_level: self.compression_level,
        }
    }

    /// Validates the configuration and returns every error found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !self.hot_enabled && self.warm_url.is_none() && self.cold_bucket.is_none() {
            errors.push(
                "No tier configured: enable the hot tier, set a warm URL, or set a cold bucket"
                    .to_string(),
            );
        }

        if self.warm_url.as_deref().is_some_and(|u| u.trim().is_empty()) {
            errors.push("Warm URL cannot be empty".to_string());
        }

        if self.warm_max_connections == 0 {
            errors.push("Warm max connections cannot be 0".to_string());
        }

        if self.cold_bucket.as_deref().is_some_and(|b| b.trim().is_empty()) {
            errors.push("Cold bucket cannot be empty".to_string());
        }

        if self.cold_access_key_id.is_some() != self.cold_secret_access_key.is_some() {
            errors.push("Cold access key id and secret must be set together".to_string());
        }

        if self.metrics_interval.is_zero() {
            errors.push("Metrics interval cannot be 0".to_string());
        }

        if let Err(e) = self.engine_config().validate() {
            errors.push(e.to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Creates a configuration suitable for testing: hot and in-memory warm
    /// tiers, no cold tier, short intervals.
    pub fn for_testing() -> Self {
        Self {
            log_level: "debug".to_string(),
            warm_url: Some(":memory:".to_string()),
            hot_to_warm_age: Duration::from_secs(1),
            warm_to_cold_idle: Duration::from_secs(5),
            migration_interval: Duration::from_millis(100),
            backend_timeout: Duration::from_secs(1),
            metrics_interval: Duration::from_secs(1),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert!(config.hot_enabled);
        assert!(config.warm_url.is_none());
        assert!(config.cold_bucket.is_none());
        assert_eq!(config.engine_config(), EngineConfig::default());
    }

    #[test]
    fn test_parse_from_args() {
        let config = ServerConfig::try_parse_from([
            "strata",
            "--hot-enabled",
            "false",
            "--warm-url",
            "postgres://strata@db/strata",
            "--hot-to-warm-age",
            "90s",
            "--warm-to-cold-idle",
            "2days",
        ])
        .unwrap();

        assert!(!config.hot_enabled);
        assert_eq!(config.hot_to_warm_age, Duration::from_secs(90));
        assert_eq!(config.warm_to_cold_idle, Duration::from_secs(2 * 24 * 60 * 60));
        assert_eq!(
            config.warm_target(),
            Some(WarmTarget::Postgres("postgres://strata@db/strata".to_string()))
        );
    }

    #[test]
    fn test_rejects_bad_duration() {
        let result = ServerConfig::try_parse_from(["strata", "--hot-ttl", "soon"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_warm_target_sqlite() {
        let config = ServerConfig {
            warm_url: Some("./data/warm.db".to_string()),
            ..Default::default()
        };
        assert_eq!(
            config.warm_target(),
            Some(WarmTarget::Sqlite("./data/warm.db".to_string()))
        );
        assert_eq!(config.warm_target().unwrap().to_string(), "sqlite:./data/warm.db");
    }

    #[test]
    fn test_postgres_target_hides_credentials() {
        let target = WarmTarget::Postgres("postgres://u:secret@db/strata".to_string());
        assert!(!target.to_string().contains("secret"));
    }

    #[test]
    fn test_cold_config() {
        let config = ServerConfig {
            cold_bucket: Some("archive".to_string()),
            cold_endpoint: Some("http://localhost:9000".to_string()),
            cold_allow_http: true,
            ..Default::default()
        };
        let cold = config.cold_config().unwrap();
        assert_eq!(cold.bucket, "archive");
        assert_eq!(cold.prefix, "strata");
        assert!(cold.allow_http);
        assert!(!cold.virtual_hosted_style_request);

        assert!(ServerConfig::default().cold_config().is_none());
    }

    #[test]
    fn test_validate_valid() {
        assert!(ServerConfig::default().validate().is_ok());
        assert!(ServerConfig::for_testing().validate().is_ok());
    }

    #[test]
    fn test_validate_no_tiers() {
        let config = ServerConfig {
            hot_enabled: false,
            ..Default::default()
        };
        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("No tier configured")));
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let config = ServerConfig {
            warm_url: Some("  ".to_string()),
            cold_bucket: Some(String::new()),
            cold_access_key_id: Some("key".to_string()),
            migration_batch_size: 0,
            ..Default::default()
        };
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().any(|e| e.contains("migration_batch_size")));
    }

    #[test]
    fn test_for_testing() {
        let config = ServerConfig::for_testing();
        assert_eq!(config.warm_target(), Some(WarmTarget::Sqlite(":memory:".to_string())));
        assert!(config.cold_bucket.is_none());
        assert_eq!(config.log_level, "debug");
    }
}
