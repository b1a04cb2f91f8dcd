pub mod fare;
pub mod surge;

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::config::PricingConfig;
use crate::error::AppError;
use crate::geo;
use crate::models::booking::{DeliveryType, RideType};
use crate::models::estimate::{
    DayHireEstimate, DeliveryEstimate, FareEstimate, SharedRideShare, StabilityVerdict,
    SurgeReason, SurgeResult,
};
use crate::models::presence::GeoPoint;
use crate::sampler;
use crate::state::AppState;

/// Ride quote entry point. Validation errors surface to the caller; sampling
/// failures degrade to a 1.0 surge so a quote is always produced.
pub fn quote_ride(
    state: &AppState,
    pickup: GeoPoint,
    dropoff: GeoPoint,
    ride_type: RideType,
    at: DateTime<Utc>,
) -> Result<FareEstimate, AppError> {
    geo::validate_point(&pickup)?;
    geo::validate_point(&dropoff)?;

    let cfg = state.pricing_config()?;
    let surge = surge_or_fallback(state, &cfg, &pickup, at);
    let estimate = fare::ride_fare(&cfg, &pickup, &dropoff, ride_type, surge, at)?;

    state
        .metrics
        .estimates_total
        .with_label_values(&["ride"])
        .inc();
    state
        .metrics
        .surge_multiplier
        .observe(estimate.surge.multiplier);

    if estimate.stability != StabilityVerdict::Stable {
        state.metrics.unstable_quotes_total.inc();
        warn!(
            total = estimate.total,
            distance_km = estimate.distance_km,
            verdict = ?estimate.stability,
            "quote outside expected price band"
        );
    }

    Ok(estimate)
}

pub fn quote_delivery(
    state: &AppState,
    pickup: GeoPoint,
    dropoff: GeoPoint,
    delivery_type: DeliveryType,
    at: DateTime<Utc>,
) -> Result<DeliveryEstimate, AppError> {
    let cfg = state.pricing_config()?;
    let estimate = fare::delivery_fare(
        &cfg.delivery,
        &pickup,
        &dropoff,
        delivery_type,
        cfg.fare.avg_speed_kmh,
        at,
    )?;

    state
        .metrics
        .estimates_total
        .with_label_values(&["delivery"])
        .inc();
    Ok(estimate)
}

pub fn quote_day_hire(
    state: &AppState,
    hourly_rate_override: Option<f64>,
    hours: f64,
    at: DateTime<Utc>,
) -> Result<DayHireEstimate, AppError> {
    let cfg = state.pricing_config()?;
    let estimate = fare::day_hire_fare(&cfg.day_hire, hourly_rate_override, hours, at)?;

    state
        .metrics
        .estimates_total
        .with_label_values(&["day_hire"])
        .inc();
    Ok(estimate)
}

pub fn quote_shared_ride(
    state: &AppState,
    total_group_price: f64,
    new_passenger_count: i64,
) -> Result<SharedRideShare, AppError> {
    let cfg = state.pricing_config()?;
    let share = fare::shared_ride_share(&cfg.shared, total_group_price, new_passenger_count)?;

    state
        .metrics
        .estimates_total
        .with_label_values(&["shared_ride"])
        .inc();
    Ok(share)
}

/// An estimate must always return a usable number: any sampling failure is
/// logged and counted, then replaced by the neutral multiplier.
fn surge_or_fallback(
    state: &AppState,
    cfg: &PricingConfig,
    pickup: &GeoPoint,
    at: DateTime<Utc>,
) -> SurgeResult {
    match sampled_surge(state, cfg, pickup, at) {
        Ok(surge) => surge,
        Err(err) => {
            state.metrics.surge_fallbacks_total.inc();
            warn!(error = %err, "surge sampling failed; falling back to 1.0");
            SurgeResult {
                multiplier: 1.0,
                reason: SurgeReason::Fallback,
            }
        }
    }
}

fn sampled_surge(
    state: &AppState,
    cfg: &PricingConfig,
    pickup: &GeoPoint,
    at: DateTime<Utc>,
) -> Result<SurgeResult, AppError> {
    let supply = sampler::sample_supply(
        &state.presence,
        pickup,
        cfg.search.supply_radius_km,
        Duration::from_secs(state.config.supply_freshness_secs),
    )?;
    let demand = sampler::sample_demand(
        &state.bookings,
        pickup,
        cfg.search.demand_radius_km,
        cfg.search.demand_window_minutes,
        at,
    )?;

    Ok(surge::compute_surge(&supply, &demand, at, &cfg.surge))
}
