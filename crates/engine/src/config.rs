//! Engine configuration.
//!
//! All durations serialize in humantime format (`"1h"`, `"7days"`).
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use strata_engine::config::{EngineConfig, TierThresholds};
//!
//! let config = EngineConfig {
//!     thresholds: TierThresholds {
//!         hot_to_warm_age: Duration::from_secs(600),
//!         ..Default::default()
//!     },
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;
use crate::types::Tier;

/// Thresholds that drive tier migration and compression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierThresholds {
    /// Age (by event timestamp) after which a hot record may be demoted.
    #[serde(with = "humantime_serde", default = "default_hot_to_warm_age")]
    pub hot_to_warm_age: Duration,

    /// Time since last access after which a warm record may be demoted.
    #[serde(with = "humantime_serde", default = "default_warm_to_cold_idle")]
    pub warm_to_cold_idle: Duration,

    /// Payloads larger than this many bytes are candidates for compression.
    #[serde(default = "default_compression_size_threshold")]
    pub compression_size_threshold: usize,
}

fn default_hot_to_warm_age() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_warm_to_cold_idle() -> Duration {
    Duration::from_secs(7 * 24 * 60 * 60)
}

fn default_compression_size_threshold() -> usize {
    1024
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            hot_to_warm_age: default_hot_to_warm_age(),
            warm_to_cold_idle: default_warm_to_cold_idle(),
            compression_size_threshold: default_compression_size_threshold(),
        }
    }
}

/// Per-record unit costs used for the cost estimate.
///
/// Units are arbitrary (for example, currency per record per month); only the
/// ratios between tiers matter to the estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitCosts {
    /// Hot tier cost per record.
    #[serde(default = "default_hot_cost")]
    pub hot: f64,
    /// Warm tier cost per record.
    #[serde(default = "default_warm_cost")]
    pub warm: f64,
    /// Cold tier cost per record.
    #[serde(default = "default_cold_cost")]
    pub cold: f64,
}

fn default_hot_cost() -> f64 {
    0.000_01
}

fn default_warm_cost() -> f64 {
    0.000_002
}

fn default_cold_cost() -> f64 {
    0.000_000_4
}

impl Default for UnitCosts {
    fn default() -> Self {
        Self {
            hot: default_hot_cost(),
            warm: default_warm_cost(),
            cold: default_cold_cost(),
        }
    }
}

impl UnitCosts {
    /// Returns the unit cost for a tier.
    pub fn for_tier(&self, tier: Tier) -> f64 {
        match tier {
            Tier::Hot => self.hot,
            Tier::Warm => self.warm,
            Tier::Cold => self.cold,
        }
    }
}

/// Full engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Migration and compression thresholds.
    #[serde(default)]
    pub thresholds: TierThresholds,

    /// Unit costs for the cost estimate.
    #[serde(default)]
    pub unit_costs: UnitCosts,

    /// TTL applied to hot-tier writes without an explicit override.
    #[serde(with = "humantime_serde", default = "default_hot_ttl")]
    pub default_hot_ttl: Duration,

    /// Interval between migration cycles.
    #[serde(with = "humantime_serde", default = "default_migration_interval")]
    pub migration_interval: Duration,

    /// Maximum records moved per pass per cycle.
    #[serde(default = "default_migration_batch_size")]
    pub migration_batch_size: usize,

    /// Upper bound on any single backend call.
    #[serde(with = "humantime_serde", default = "default_backend_timeout")]
    pub backend_timeout: Duration,

    /// Number of records sampled per tier for the compression ratio.
    #[serde(default = "default_metrics_sample_size")]
    pub metrics_sample_size: usize,

    /// Deflate level (0-9) used for payload compression.
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,
}

fn default_hot_ttl() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_migration_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_migration_batch_size() -> usize {
    100
}

fn default_backend_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_metrics_sample_size() -> usize {
    100
}

fn default_compression_level() -> u32 {
    6
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thresholds: TierThresholds::default(),
            unit_costs: UnitCosts::default(),
            default_hot_ttl: default_hot_ttl(),
            migration_interval: default_migration_interval(),
            migration_batch_size: default_migration_batch_size(),
            backend_timeout: default_backend_timeout(),
            metrics_sample_size: default_metrics_sample_size(),
            compression_level: default_compression_level(),
        }
    }
}

impl EngineConfig {
    /// Validates configuration invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.thresholds.hot_to_warm_age.is_zero() {
            return Err(invalid("hot_to_warm_age", "must be greater than zero"));
        }
        if self.thresholds.warm_to_cold_idle.is_zero() {
            return Err(invalid("warm_to_cold_idle", "must be greater than zero"));
        }
        if self.default_hot_ttl.is_zero() {
            return Err(invalid("default_hot_ttl", "must be greater than zero"));
        }
        if self.migration_interval.is_zero() {
            return Err(invalid("migration_interval", "must be greater than zero"));
        }
        if self.migration_batch_size == 0 {
            return Err(invalid("migration_batch_size", "must be > 0"));
        }
        if self.backend_timeout.is_zero() {
            return Err(invalid("backend_timeout", "must be greater than zero"));
        }
        if self.compression_level > 9 {
            return Err(invalid("compression_level", "must be between 0 and 9"));
        }

        for tier in Tier::ALL {
            let cost = self.unit_costs.for_tier(tier);
            if !cost.is_finite() || cost < 0.0 {
                return Err(invalid(
                    "unit_costs",
                    format!("{tier} unit cost must be a non-negative number, got {cost}"),
                ));
            }
        }

        Ok(())
    }

    /// Logs configuration that is legal but risky.
    ///
    /// A hot TTL at or below the demotion age lets records expire from the hot
    /// tier before migration can move them.
    pub fn warn_on_risky_settings(&self) {
        if self.default_hot_ttl <= self.thresholds.hot_to_warm_age {
            warn!(
                hot_ttl = %humantime::format_duration(self.default_hot_ttl),
                hot_to_warm_age = %humantime::format_duration(self.thresholds.hot_to_warm_age),
                "Hot-tier TTL does not exceed the hot-to-warm age; records may expire before migration"
            );
        }
        if self.default_hot_ttl <= self.migration_interval {
            warn!(
                hot_ttl = %humantime::format_duration(self.default_hot_ttl),
                migration_interval = %humantime::format_duration(self.migration_interval),
                "Hot-tier TTL does not exceed the migration interval"
            );
        }
    }
}

fn invalid(field: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        message: message.into(),
    }
}

/// Serde module for Duration with humantime format.
pub(crate) mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.thresholds.hot_to_warm_age, Duration::from_secs(3600));
        assert_eq!(
            config.thresholds.warm_to_cold_idle,
            Duration::from_secs(7 * 86_400)
        );
        assert_eq!(config.thresholds.compression_size_threshold, 1024);
        assert_eq!(config.migration_batch_size, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let config = EngineConfig {
            migration_batch_size: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("migration_batch_size"));
    }

    #[test]
    fn test_validate_rejects_negative_cost() {
        let config = EngineConfig {
            unit_costs: UnitCosts {
                warm: -1.0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_humantime_serialization() {
        let json = serde_json::json!({
            "thresholds": { "hot_to_warm_age": "30m", "warm_to_cold_idle": "2days" },
            "migration_interval": "10s"
        });
        let config: EngineConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.thresholds.hot_to_warm_age, Duration::from_secs(1800));
        assert_eq!(
            config.thresholds.warm_to_cold_idle,
            Duration::from_secs(2 * 86_400)
        );
        assert_eq!(config.migration_interval, Duration::from_secs(10));
        assert_eq!(config.default_hot_ttl, Duration::from_secs(86_400));

        let round = serde_json::to_value(&config).unwrap();
        assert_eq!(round["migration_interval"], "10s");
    }
}
