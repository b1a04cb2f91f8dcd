use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};

use crate::config::{
    DayHireConfig, DeliveryConfig, FareTable, PricingConfig, SharedRideConfig,
    DAY_FACTOR_CEILING, DAY_MULTIPLIER_CEILING, HOURLY_RATE_CEILING, SHARED_DISCOUNT_CEILING,
};
use crate::error::AppError;
use crate::geo;
use crate::models::booking::{DeliveryType, RideType};
use crate::models::estimate::{
    DayHireEstimate, DeliveryEstimate, FareEstimate, SharedRideShare, StabilityVerdict,
    SurgeResult,
};
use crate::models::presence::GeoPoint;

pub fn type_multiplier(fare: &FareTable, ride_type: RideType) -> f64 {
    match ride_type {
        RideType::Economy => fare.economy_multiplier,
        RideType::Comfort => fare.comfort_multiplier,
        RideType::Premium => fare.premium_multiplier,
        RideType::Van => fare.van_multiplier,
    }
}

/// Metered ride fare: (base + km + minutes) x type, surged, floored at the
/// minimum fare and rounded to whole currency units.
pub fn ride_fare(
    cfg: &PricingConfig,
    pickup: &GeoPoint,
    dropoff: &GeoPoint,
    ride_type: RideType,
    surge: SurgeResult,
    at: DateTime<Utc>,
) -> Result<FareEstimate, AppError> {
    let travel = geo::estimate_travel_time(pickup, dropoff, cfg.fare.avg_speed_kmh)?;
    let distance_km = travel.distance_m / 1000.0;

    let base_fare = cfg.fare.base_fare;
    let distance_fare = distance_km * cfg.fare.per_km;
    let time_fare = travel.duration_minutes * cfg.fare.per_minute;
    let multiplier = type_multiplier(&cfg.fare, ride_type);

    let subtotal = (base_fare + distance_fare + time_fare) * multiplier;
    let priced = subtotal * surge.multiplier;
    let total = priced.round().max(cfg.fare.minimum_fare);

    Ok(FareEstimate {
        pickup: *pickup,
        dropoff: *dropoff,
        ride_type,
        distance_km,
        duration_minutes: travel.duration_minutes,
        base_fare,
        distance_fare,
        time_fare,
        type_multiplier: multiplier,
        subtotal,
        surge,
        total,
        stability: stability_verdict(total, distance_km, &cfg.fare),
        quoted_at: at,
    })
}

/// Advisory only. Trips too short to have a meaningful per-km price are
/// always Stable; they sit on the minimum-fare floor.
pub fn stability_verdict(total: f64, distance_km: f64, fare: &FareTable) -> StabilityVerdict {
    if distance_km < 0.1 {
        return StabilityVerdict::Stable;
    }
    let per_km = total / distance_km;
    if per_km < fare.expected_per_km_min {
        StabilityVerdict::BelowExpected
    } else if per_km > fare.expected_per_km_max {
        StabilityVerdict::AboveExpected
    } else {
        StabilityVerdict::Stable
    }
}

/// Multi-hour hire. Each time factor is capped individually and the composed
/// product is capped again; a provider rate override is itself capped by the
/// system ceiling.
pub fn day_hire_fare(
    cfg: &DayHireConfig,
    hourly_rate_override: Option<f64>,
    hours: f64,
    at: DateTime<Utc>,
) -> Result<DayHireEstimate, AppError> {
    if !hours.is_finite() || hours <= 0.0 {
        return Err(AppError::Validation(format!(
            "hire duration must be positive, got {hours}"
        )));
    }
    if let Some(rate) = hourly_rate_override {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(AppError::Validation(format!(
                "hourly rate override must be positive, got {rate}"
            )));
        }
    }

    let hourly_rate = hourly_rate_override
        .unwrap_or(cfg.default_hourly_rate)
        .min(HOURLY_RATE_CEILING);

    let hour = at.hour();
    let mut time_multiplier = 1.0;
    if matches!(at.weekday(), Weekday::Sat | Weekday::Sun) {
        time_multiplier *= cfg.weekend_factor.min(DAY_FACTOR_CEILING);
    }
    if matches!(hour, 7..=9 | 17..=19) {
        time_multiplier *= cfg.peak_factor.min(DAY_FACTOR_CEILING);
    }
    if hour >= 22 || hour <= 4 {
        time_multiplier *= cfg.late_night_factor.min(DAY_FACTOR_CEILING);
    }
    let time_multiplier = time_multiplier.min(DAY_MULTIPLIER_CEILING);

    Ok(DayHireEstimate {
        hourly_rate,
        hours,
        time_multiplier,
        total: (hourly_rate * hours * time_multiplier).round(),
        quoted_at: at,
    })
}

/// Flat-rate delivery: no surge, minimum-fare floor.
pub fn delivery_fare(
    cfg: &DeliveryConfig,
    pickup: &GeoPoint,
    dropoff: &GeoPoint,
    delivery_type: DeliveryType,
    avg_speed_kmh: f64,
    at: DateTime<Utc>,
) -> Result<DeliveryEstimate, AppError> {
    let travel = geo::estimate_travel_time(pickup, dropoff, avg_speed_kmh)?;
    let distance_km = travel.distance_m / 1000.0;

    let multiplier = match delivery_type {
        DeliveryType::Standard => cfg.standard_multiplier,
        DeliveryType::Express => cfg.express_multiplier,
    };

    let priced = cfg.base_fare * multiplier + distance_km * cfg.flat_per_km;
    Ok(DeliveryEstimate {
        delivery_type,
        distance_km,
        duration_minutes: travel.duration_minutes,
        total: priced.round().max(cfg.minimum_fare),
        quoted_at: at,
    })
}

/// Per-passenger share of a shared ride: linear per-additional-passenger
/// discount, total discount capped at 50%.
pub fn shared_ride_share(
    cfg: &SharedRideConfig,
    total_group_price: f64,
    new_passenger_count: i64,
) -> Result<SharedRideShare, AppError> {
    if !total_group_price.is_finite() || total_group_price <= 0.0 {
        return Err(AppError::Validation(format!(
            "group price must be positive, got {total_group_price}"
        )));
    }
    if new_passenger_count <= 0 {
        return Err(AppError::Validation(format!(
            "passenger count must be positive, got {new_passenger_count}"
        )));
    }

    let passenger_count = (new_passenger_count as u32).min(cfg.max_passengers);
    let discount_rate = ((passenger_count - 1) as f64 * cfg.per_additional_discount)
        .min(SHARED_DISCOUNT_CEILING);
    let per_passenger = (total_group_price * (1.0 - discount_rate) / passenger_count as f64).round();

    Ok(SharedRideShare {
        total_group_price,
        passenger_count,
        discount_rate,
        per_passenger,
    })
}
