use serde::Serialize;

use crate::error::AppError;
use crate::models::presence::GeoPoint;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

pub fn validate_point(p: &GeoPoint) -> Result<(), AppError> {
    if !p.lat.is_finite() || !(-90.0..=90.0).contains(&p.lat) {
        return Err(AppError::Validation(format!("latitude out of range: {}", p.lat)));
    }
    if !p.lng.is_finite() || !(-180.0..=180.0).contains(&p.lng) {
        return Err(AppError::Validation(format!("longitude out of range: {}", p.lng)));
    }
    Ok(())
}

pub fn distance_m(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_M * central_angle
}

pub fn distance_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    distance_m(a, b) / 1000.0
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TravelEstimate {
    pub distance_m: f64,
    pub duration_minutes: f64,
}

pub fn estimate_travel_time(
    origin: &GeoPoint,
    dest: &GeoPoint,
    avg_speed_kmh: f64,
) -> Result<TravelEstimate, AppError> {
    validate_point(origin)?;
    validate_point(dest)?;
    if avg_speed_kmh <= 0.0 {
        return Err(AppError::Validation(format!(
            "average speed must be positive, got {avg_speed_kmh}"
        )));
    }

    let meters = distance_m(origin, dest);
    Ok(TravelEstimate {
        distance_m: meters,
        duration_minutes: (meters / 1000.0) / avg_speed_kmh * 60.0,
    })
}
