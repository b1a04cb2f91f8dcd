use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};

use crate::config::SurgeConfig;
use crate::models::estimate::{SurgeReason, SurgeResult};
use crate::sampler::{DemandSample, SupplySample};

/// Surge multiplier from local scarcity. Pure over (samples, timestamp,
/// config) so the same inputs always quote the same price.
///
/// Known discontinuity, preserved as specified: zero supply pays the fixed
/// no-supply surge while one-below-threshold supply pays 1.0.
pub fn compute_surge(
    supply: &SupplySample,
    demand: &DemandSample,
    at: DateTime<Utc>,
    cfg: &SurgeConfig,
) -> SurgeResult {
    if supply.count == 0 {
        return SurgeResult {
            multiplier: cfg.base_surge_no_supply,
            reason: SurgeReason::NoSupply,
        };
    }

    if supply.count < cfg.min_drivers_for_surge {
        // Sample too small for time-based surge to be meaningful.
        return SurgeResult {
            multiplier: 1.0,
            reason: SurgeReason::ThinSupply,
        };
    }

    let multiplier = (time_factor(at, cfg) * demand_factor(demand, supply, cfg))
        .clamp(1.0, cfg.max_surge);

    SurgeResult {
        multiplier,
        reason: SurgeReason::Computed,
    }
}

/// Exactly one primary factor fires: rush hour outranks late night. Weekend
/// applies only when no primary fired.
fn time_factor(at: DateTime<Utc>, cfg: &SurgeConfig) -> f64 {
    let hour = at.hour();

    if matches!(hour, 7..=9 | 17..=19) {
        return cfg.rush_hour_factor;
    }
    if hour >= 22 || hour <= 4 {
        return cfg.late_night_factor;
    }
    if matches!(at.weekday(), Weekday::Sat | Weekday::Sun) {
        return cfg.weekend_factor;
    }
    1.0
}

fn demand_factor(demand: &DemandSample, supply: &SupplySample, cfg: &SurgeConfig) -> f64 {
    if demand.count < cfg.min_demand_for_surge {
        return 1.0;
    }

    let ratio = demand.count as f64 / supply.count as f64;
    if ratio >= cfg.high_ratio_threshold {
        cfg.high_demand_multiplier
    } else if ratio >= cfg.medium_ratio_threshold {
        cfg.medium_demand_multiplier
    } else {
        cfg.low_demand_multiplier
    }
}
