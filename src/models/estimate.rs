use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::booking::{DeliveryType, RideType};
use crate::models::presence::GeoPoint;

/// Advisory comparison of the computed price against the expected per-km
/// band. Monitoring signal only; a quote is returned either way.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StabilityVerdict {
    Stable,
    BelowExpected,
    AboveExpected,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SurgeReason {
    NoSupply,
    ThinSupply,
    Computed,
    Fallback,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SurgeResult {
    pub multiplier: f64,
    pub reason: SurgeReason,
}

/// Immutable once returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FareEstimate {
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub ride_type: RideType,
    pub distance_km: f64,
    pub duration_minutes: f64,
    pub base_fare: f64,
    pub distance_fare: f64,
    pub time_fare: f64,
    pub type_multiplier: f64,
    pub subtotal: f64,
    pub surge: SurgeResult,
    pub total: f64,
    pub stability: StabilityVerdict,
    pub quoted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryEstimate {
    pub delivery_type: DeliveryType,
    pub distance_km: f64,
    pub duration_minutes: f64,
    pub total: f64,
    pub quoted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayHireEstimate {
    pub hourly_rate: f64,
    pub hours: f64,
    pub time_multiplier: f64,
    pub total: f64,
    pub quoted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedRideShare {
    pub total_group_price: f64,
    pub passenger_count: u32,
    pub discount_rate: f64,
    pub per_passenger: f64,
}
