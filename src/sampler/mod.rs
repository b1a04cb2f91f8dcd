use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::geo;
use crate::models::presence::GeoPoint;
use crate::presence::{PresenceCache, PresenceFilter};
use crate::store::BookingStore;

/// Nearby offerable providers at the moment of the call. Recomputed per
/// query; nothing here is persisted.
#[derive(Debug, Clone)]
pub struct SupplySample {
    pub count: usize,
    pub provider_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Copy)]
pub struct DemandSample {
    pub count: usize,
}

/// Supply uses a stricter freshness window than cache eviction: an entry can
/// still be cached yet too old to count as offerable supply.
pub fn sample_supply(
    cache: &PresenceCache,
    point: &GeoPoint,
    radius_km: f64,
    freshness: Duration,
) -> Result<SupplySample, AppError> {
    geo::validate_point(point)?;
    if radius_km <= 0.0 {
        return Err(AppError::Validation(format!(
            "supply radius must be positive, got {radius_km}"
        )));
    }

    let filter = PresenceFilter {
        online_only: true,
        available_only: true,
        verified_only: true,
        near: Some((*point, radius_km)),
        fresh_within: Some(freshness),
        ..PresenceFilter::default()
    };

    let provider_ids: Vec<Uuid> = cache
        .snapshot(&filter)
        .into_iter()
        .map(|p| p.provider_id)
        .collect();

    Ok(SupplySample {
        count: provider_ids.len(),
        provider_ids,
    })
}

pub fn sample_demand(
    store: &BookingStore,
    point: &GeoPoint,
    radius_km: f64,
    window_minutes: i64,
    now: DateTime<Utc>,
) -> Result<DemandSample, AppError> {
    geo::validate_point(point)?;
    if radius_km <= 0.0 || window_minutes <= 0 {
        return Err(AppError::Validation(format!(
            "demand query out of range: radius {radius_km} km, window {window_minutes} min"
        )));
    }

    let open = store.open_near(point, radius_km, ChronoDuration::minutes(window_minutes), now);
    Ok(DemandSample { count: open.len() })
}
