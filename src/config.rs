use std::env;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Hard ceilings. Config updates are clamped/rejected against these and can
/// never raise them.
pub const MAX_SURGE_CEILING: f64 = 2.0;
pub const HOURLY_RATE_CEILING: f64 = 120.0;
pub const DAY_FACTOR_CEILING: f64 = 1.5;
pub const DAY_MULTIPLIER_CEILING: f64 = 2.0;
pub const SHARED_DISCOUNT_CEILING: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub presence_ttl_secs: u64,
    pub eviction_interval_secs: u64,
    pub snapshot_interval_secs: u64,
    pub supply_freshness_secs: u64,
    pub booking_expiry_secs: u64,
    pub expiry_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            presence_ttl_secs: parse_or_default("PRESENCE_TTL_SECS", 300)?,
            eviction_interval_secs: parse_or_default("EVICTION_INTERVAL_SECS", 120)?,
            snapshot_interval_secs: parse_or_default("SNAPSHOT_INTERVAL_SECS", 15)?,
            supply_freshness_secs: parse_or_default("SUPPLY_FRESHNESS_SECS", 600)?,
            booking_expiry_secs: parse_or_default("BOOKING_EXPIRY_SECS", 300)?,
            expiry_interval_secs: parse_or_default("EXPIRY_INTERVAL_SECS", 60)?,
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurgeConfig {
    pub rush_hour_factor: f64,
    pub late_night_factor: f64,
    pub weekend_factor: f64,
    pub max_surge: f64,
    pub min_drivers_for_surge: usize,
    pub base_surge_no_supply: f64,
    pub min_demand_for_surge: usize,
    /// demand/supply ratio below this is the low tier, above
    /// `high_ratio_threshold` the high tier, medium in between.
    pub medium_ratio_threshold: f64,
    pub high_ratio_threshold: f64,
    pub low_demand_multiplier: f64,
    pub medium_demand_multiplier: f64,
    pub high_demand_multiplier: f64,
}

impl Default for SurgeConfig {
    fn default() -> Self {
        Self {
            rush_hour_factor: 1.5,
            late_night_factor: 1.3,
            weekend_factor: 1.2,
            max_surge: 2.0,
            min_drivers_for_surge: 3,
            base_surge_no_supply: 1.5,
            min_demand_for_surge: 3,
            medium_ratio_threshold: 1.5,
            high_ratio_threshold: 3.0,
            low_demand_multiplier: 1.1,
            medium_demand_multiplier: 1.25,
            high_demand_multiplier: 1.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FareTable {
    pub base_fare: f64,
    pub per_km: f64,
    pub per_minute: f64,
    pub minimum_fare: f64,
    pub avg_speed_kmh: f64,
    pub economy_multiplier: f64,
    pub comfort_multiplier: f64,
    pub premium_multiplier: f64,
    pub van_multiplier: f64,
    /// Expected per-km price band for the stability verdict.
    pub expected_per_km_min: f64,
    pub expected_per_km_max: f64,
}

impl Default for FareTable {
    fn default() -> Self {
        Self {
            base_fare: 5.0,
            per_km: 1.5,
            per_minute: 0.3,
            minimum_fare: 10.0,
            avg_speed_kmh: 30.0,
            economy_multiplier: 1.0,
            comfort_multiplier: 1.3,
            premium_multiplier: 1.8,
            van_multiplier: 1.6,
            expected_per_km_min: 1.5,
            expected_per_km_max: 15.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    pub base_fare: f64,
    pub flat_per_km: f64,
    pub standard_multiplier: f64,
    pub express_multiplier: f64,
    pub minimum_fare: f64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            base_fare: 4.0,
            flat_per_km: 1.2,
            standard_multiplier: 1.0,
            express_multiplier: 1.5,
            minimum_fare: 8.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayHireConfig {
    pub default_hourly_rate: f64,
    pub weekend_factor: f64,
    pub peak_factor: f64,
    pub late_night_factor: f64,
}

impl Default for DayHireConfig {
    fn default() -> Self {
        Self {
            default_hourly_rate: 40.0,
            weekend_factor: 1.2,
            peak_factor: 1.3,
            late_night_factor: 1.25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedRideConfig {
    pub max_passengers: u32,
    pub per_additional_discount: f64,
}

impl Default for SharedRideConfig {
    fn default() -> Self {
        Self {
            max_passengers: 4,
            per_additional_discount: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub supply_radius_km: f64,
    pub demand_radius_km: f64,
    pub demand_window_minutes: i64,
    pub accept_radius_km: f64,
    pub offer_fanout: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            supply_radius_km: 5.0,
            demand_radius_km: 5.0,
            demand_window_minutes: 15,
            accept_radius_km: 15.0,
            offer_fanout: 5,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PricingConfig {
    pub surge: SurgeConfig,
    pub fare: FareTable,
    pub delivery: DeliveryConfig,
    pub day_hire: DayHireConfig,
    pub shared: SharedRideConfig,
    pub search: SearchConfig,
}

/// Partial runtime update; absent sections keep their current values.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PricingUpdate {
    pub surge: Option<SurgeConfig>,
    pub fare: Option<FareTable>,
    pub delivery: Option<DeliveryConfig>,
    pub day_hire: Option<DayHireConfig>,
    pub shared: Option<SharedRideConfig>,
    pub search: Option<SearchConfig>,
}

impl PricingConfig {
    /// Merge an update and validate the result. The current config is
    /// untouched unless the merged config passes validation.
    pub fn merged(&self, update: PricingUpdate) -> Result<PricingConfig, AppError> {
        let merged = PricingConfig {
            surge: update.surge.unwrap_or_else(|| self.surge.clone()),
            fare: update.fare.unwrap_or_else(|| self.fare.clone()),
            delivery: update.delivery.unwrap_or_else(|| self.delivery.clone()),
            day_hire: update.day_hire.unwrap_or_else(|| self.day_hire.clone()),
            shared: update.shared.unwrap_or_else(|| self.shared.clone()),
            search: update.search.unwrap_or_else(|| self.search.clone()),
        };
        merged.validate()?;
        Ok(merged)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let s = &self.surge;
        if !(1.0..=MAX_SURGE_CEILING).contains(&s.max_surge) {
            return Err(AppError::Validation(format!(
                "max_surge must be within [1.0, {MAX_SURGE_CEILING}], got {}",
                s.max_surge
            )));
        }
        if !(1.0..=s.max_surge).contains(&s.base_surge_no_supply) {
            return Err(AppError::Validation(format!(
                "base_surge_no_supply must be within [1.0, max_surge], got {}",
                s.base_surge_no_supply
            )));
        }
        for (name, factor) in [
            ("rush_hour_factor", s.rush_hour_factor),
            ("late_night_factor", s.late_night_factor),
            ("weekend_factor", s.weekend_factor),
            ("low_demand_multiplier", s.low_demand_multiplier),
            ("medium_demand_multiplier", s.medium_demand_multiplier),
            ("high_demand_multiplier", s.high_demand_multiplier),
        ] {
            if !(1.0..=MAX_SURGE_CEILING).contains(&factor) {
                return Err(AppError::Validation(format!(
                    "{name} must be within [1.0, {MAX_SURGE_CEILING}], got {factor}"
                )));
            }
        }
        if s.medium_ratio_threshold <= 0.0 || s.high_ratio_threshold <= s.medium_ratio_threshold {
            return Err(AppError::Validation(
                "demand ratio thresholds must be positive and increasing".to_string(),
            ));
        }

        let f = &self.fare;
        if f.base_fare < 0.0 || f.per_km < 0.0 || f.per_minute < 0.0 {
            return Err(AppError::Validation("fare rates must be non-negative".to_string()));
        }
        if f.minimum_fare <= 0.0 {
            return Err(AppError::Validation("minimum_fare must be positive".to_string()));
        }
        if f.avg_speed_kmh <= 0.0 {
            return Err(AppError::Validation("avg_speed_kmh must be positive".to_string()));
        }
        for (name, mult) in [
            ("economy_multiplier", f.economy_multiplier),
            ("comfort_multiplier", f.comfort_multiplier),
            ("premium_multiplier", f.premium_multiplier),
            ("van_multiplier", f.van_multiplier),
        ] {
            if mult <= 0.0 {
                return Err(AppError::Validation(format!("{name} must be positive, got {mult}")));
            }
        }
        if f.expected_per_km_min < 0.0 || f.expected_per_km_max <= f.expected_per_km_min {
            return Err(AppError::Validation(
                "expected per-km band must be non-negative and increasing".to_string(),
            ));
        }

        let d = &self.delivery;
        if d.minimum_fare <= 0.0 || d.base_fare < 0.0 || d.flat_per_km < 0.0 {
            return Err(AppError::Validation("delivery rates out of range".to_string()));
        }
        if d.standard_multiplier <= 0.0 || d.express_multiplier <= 0.0 {
            return Err(AppError::Validation(
                "delivery multipliers must be positive".to_string(),
            ));
        }

        let day = &self.day_hire;
        if !(0.0..=HOURLY_RATE_CEILING).contains(&day.default_hourly_rate) {
            return Err(AppError::Validation(format!(
                "default_hourly_rate must be within [0, {HOURLY_RATE_CEILING}], got {}",
                day.default_hourly_rate
            )));
        }
        for (name, factor) in [
            ("day_hire.weekend_factor", day.weekend_factor),
            ("day_hire.peak_factor", day.peak_factor),
            ("day_hire.late_night_factor", day.late_night_factor),
        ] {
            if !(1.0..=DAY_FACTOR_CEILING).contains(&factor) {
                return Err(AppError::Validation(format!(
                    "{name} must be within [1.0, {DAY_FACTOR_CEILING}], got {factor}"
                )));
            }
        }

        let sh = &self.shared;
        if sh.max_passengers == 0 {
            return Err(AppError::Validation("max_passengers must be >= 1".to_string()));
        }
        if !(0.0..=SHARED_DISCOUNT_CEILING).contains(&sh.per_additional_discount) {
            return Err(AppError::Validation(format!(
                "per_additional_discount must be within [0, {SHARED_DISCOUNT_CEILING}], got {}",
                sh.per_additional_discount
            )));
        }

        let search = &self.search;
        if search.supply_radius_km <= 0.0
            || search.demand_radius_km <= 0.0
            || search.accept_radius_km <= 0.0
        {
            return Err(AppError::Validation("search radii must be positive".to_string()));
        }
        if search.demand_window_minutes <= 0 {
            return Err(AppError::Validation(
                "demand_window_minutes must be positive".to_string(),
            ));
        }
        if search.offer_fanout == 0 {
            return Err(AppError::Validation("offer_fanout must be >= 1".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        PricingConfig::default().validate().unwrap();
    }

    #[test]
    fn merge_rejects_surge_above_ceiling() {
        let current = PricingConfig::default();
        let update = PricingUpdate {
            surge: Some(SurgeConfig {
                max_surge: 3.5,
                ..SurgeConfig::default()
            }),
            ..PricingUpdate::default()
        };
        assert!(current.merged(update).is_err());
    }

    #[test]
    fn merge_rejects_hourly_rate_above_ceiling() {
        let current = PricingConfig::default();
        let update = PricingUpdate {
            day_hire: Some(DayHireConfig {
                default_hourly_rate: HOURLY_RATE_CEILING + 1.0,
                ..DayHireConfig::default()
            }),
            ..PricingUpdate::default()
        };
        assert!(current.merged(update).is_err());
    }

    #[test]
    fn merge_keeps_untouched_sections() {
        let current = PricingConfig::default();
        let update = PricingUpdate {
            fare: Some(FareTable {
                minimum_fare: 12.0,
                ..FareTable::default()
            }),
            ..PricingUpdate::default()
        };
        let merged = current.merged(update).unwrap();
        assert_eq!(merged.fare.minimum_fare, 12.0);
        assert_eq!(merged.surge.max_surge, current.surge.max_surge);
    }

    #[test]
    fn merge_rejects_no_supply_surge_above_max_surge() {
        let current = PricingConfig::default();
        let update = PricingUpdate {
            surge: Some(SurgeConfig {
                max_surge: 1.2,
                base_surge_no_supply: 1.4,
                ..SurgeConfig::default()
            }),
            ..PricingUpdate::default()
        };
        assert!(current.merged(update).is_err());
    }
}
