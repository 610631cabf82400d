//! Construction of a [`TieredStore`].

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::codec::PayloadCodec;
use crate::config::EngineConfig;
use crate::core::{ColdTier, EngineObserver, HotTier, TierSlot, WarmTier};
use crate::error::{ConfigError, StorageResult};
use crate::types::Tier;

use super::metrics::MetricsCollector;
use super::store::{EngineCore, TieredStore};

const NOT_CONFIGURED: &str = "not configured";

/// Builder for [`TieredStore`].
///
/// Every tier starts disabled. At least one must be enabled by the time
/// [`build`](Self::build) is called.
#[derive(Debug)]
pub struct TieredStoreBuilder {
    hot: TierSlot<dyn HotTier>,
    warm: TierSlot<dyn WarmTier>,
    cold: TierSlot<dyn ColdTier>,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    observer: Option<Arc<dyn EngineObserver>>,
}

impl Default for TieredStoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TieredStoreBuilder {
    /// Creates a builder with all tiers disabled and default configuration.
    pub fn new() -> Self {
        Self {
            hot: TierSlot::disabled(NOT_CONFIGURED),
            warm: TierSlot::disabled(NOT_CONFIGURED),
            cold: TierSlot::disabled(NOT_CONFIGURED),
            config: EngineConfig::default(),
            clock: Arc::new(SystemClock),
            observer: None,
        }
    }

    /// Enables the hot tier.
    pub fn hot(mut self, hot: Arc<dyn HotTier>) -> Self {
        self.hot = TierSlot::Enabled(hot);
        self
    }

    /// Enables the warm tier.
    pub fn warm(mut self, warm: Arc<dyn WarmTier>) -> Self {
        self.warm = TierSlot::Enabled(warm);
        self
    }

    /// Enables the cold tier.
    pub fn cold(mut self, cold: Arc<dyn ColdTier>) -> Self {
        self.cold = TierSlot::Enabled(cold);
        self
    }

    /// Sets the hot tier slot directly.
    pub fn hot_slot(mut self, slot: TierSlot<dyn HotTier>) -> Self {
        self.hot = slot;
        self
    }

    /// Sets the warm tier slot directly.
    pub fn warm_slot(mut self, slot: TierSlot<dyn WarmTier>) -> Self {
        self.warm = slot;
        self
    }

    /// Sets the cold tier slot directly.
    pub fn cold_slot(mut self, slot: TierSlot<dyn ColdTier>) -> Self {
        self.cold = slot;
        self
    }

    /// Connects the hot tier, disabling it if the connection fails.
    pub async fn connect_hot<F>(mut self, connect: F) -> Self
    where
        F: Future<Output = StorageResult<Arc<dyn HotTier>>>,
    {
        self.hot = self.attempt(Tier::Hot, connect).await;
        self
    }

    /// Connects the warm tier, disabling it if the connection fails.
    pub async fn connect_warm<F>(mut self, connect: F) -> Self
    where
        F: Future<Output = StorageResult<Arc<dyn WarmTier>>>,
    {
        self.warm = self.attempt(Tier::Warm, connect).await;
        self
    }

    /// Connects the cold tier, disabling it if the connection fails.
    pub async fn connect_cold<F>(mut self, connect: F) -> Self
    where
        F: Future<Output = StorageResult<Arc<dyn ColdTier>>>,
    {
        self.cold = self.attempt(Tier::Cold, connect).await;
        self
    }

    /// Sets the engine configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the clock used for migration ages and metrics timestamps.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Registers an observer for store, migrate, and delete events.
    pub fn observer(mut self, observer: Arc<dyn EngineObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Runs a connection attempt under the backend timeout.
    async fn attempt<T: ?Sized, F>(&self, tier: Tier, connect: F) -> TierSlot<T>
    where
        F: Future<Output = StorageResult<Arc<T>>>,
    {
        let slot = match tokio::time::timeout(self.config.backend_timeout, connect).await {
            Ok(Ok(backend)) => TierSlot::Enabled(backend),
            Ok(Err(e)) => TierSlot::disabled(format!("connection failed: {e}")),
            Err(_) => TierSlot::disabled(format!(
                "connection timed out after {}",
                humantime::format_duration(self.config.backend_timeout)
            )),
        };
        if let Some(reason) = slot.disabled_reason() {
            debug!(%tier, reason, "Backend connection attempt failed");
        }
        slot
    }

    /// Validates configuration and creates the store.
    ///
    /// Each disabled tier is logged once here; operations against it then
    /// miss silently.
    pub fn build(self) -> StorageResult<TieredStore> {
        self.config.validate()?;
        if !self.hot.is_enabled() && !self.warm.is_enabled() && !self.cold.is_enabled() {
            return Err(ConfigError::NoTiersEnabled.into());
        }
        self.config.warn_on_risky_settings();

        for (tier, reason) in [
            (Tier::Hot, self.hot.disabled_reason()),
            (Tier::Warm, self.warm.disabled_reason()),
            (Tier::Cold, self.cold.disabled_reason()),
        ] {
            if let Some(reason) = reason {
                warn!(%tier, reason, "Tier disabled; lookups will skip it");
            }
        }

        info!(
            hot = self.hot.get().map(|t| t.backend_name()).unwrap_or("disabled"),
            warm = self.warm.get().map(|t| t.backend_name()).unwrap_or("disabled"),
            cold = self.cold.get().map(|t| t.backend_name()).unwrap_or("disabled"),
            "Tiered store ready"
        );

        let codec = PayloadCodec::new(self.config.thresholds.compression_size_threshold)
            .with_level(self.config.compression_level);

        Ok(TieredStore {
            core: Arc::new(EngineCore {
                hot: self.hot,
                warm: self.warm,
                cold: self.cold,
                codec,
                config: self.config,
                clock: self.clock,
                observer: self.observer,
                metrics: MetricsCollector::default(),
                cycle_lock: tokio::sync::Mutex::new(()),
            }),
        })
    }
}
