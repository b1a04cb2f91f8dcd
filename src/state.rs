use std::sync::RwLock;

use crate::config::{Config, PricingConfig, PricingUpdate};
use crate::dispatch::lifecycle::LifecycleTimers;
use crate::error::AppError;
use crate::notify::{Gateway, PushOutcome};
use crate::observability::metrics::Metrics;
use crate::presence::PresenceCache;
use crate::store::BookingStore;

pub struct AppState {
    pub config: Config,
    pub presence: PresenceCache,
    pub bookings: BookingStore,
    pub gateway: Gateway,
    pub lifecycle: LifecycleTimers,
    pricing: RwLock<PricingConfig>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let gateway = Gateway::new(config.event_buffer_size);
        Self {
            config,
            presence: PresenceCache::new(),
            bookings: BookingStore::new(),
            gateway,
            lifecycle: LifecycleTimers::new(),
            pricing: RwLock::new(PricingConfig::default()),
            metrics: Metrics::new(),
        }
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self::new(Config {
            http_port: 0,
            log_level: "debug".to_string(),
            event_buffer_size: 64,
            presence_ttl_secs: 300,
            eviction_interval_secs: 120,
            snapshot_interval_secs: 15,
            supply_freshness_secs: 600,
            booking_expiry_secs: 300,
            expiry_interval_secs: 60,
        })
    }

    pub fn pricing_config(&self) -> Result<PricingConfig, AppError> {
        self.pricing
            .read()
            .map(|cfg| cfg.clone())
            .map_err(|_| AppError::Internal("pricing config lock poisoned".to_string()))
    }

    /// Validates the merged config before swapping it in; a rejected update
    /// leaves the current config untouched.
    pub fn update_pricing(&self, update: PricingUpdate) -> Result<PricingConfig, AppError> {
        let mut guard = self
            .pricing
            .write()
            .map_err(|_| AppError::Internal("pricing config lock poisoned".to_string()))?;
        let merged = guard.merged(update)?;
        *guard = merged.clone();
        Ok(merged)
    }

    pub fn record_accept(&self, outcome: &str) {
        self.metrics
            .accept_attempts_total
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn record_notification(&self, outcome: PushOutcome) {
        self.metrics
            .notifications_total
            .with_label_values(&[outcome.as_str()])
            .inc();
    }
}
