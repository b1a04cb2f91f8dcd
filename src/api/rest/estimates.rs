use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::AppError;
use crate::models::booking::{DeliveryType, RideType};
use crate::models::estimate::{DayHireEstimate, DeliveryEstimate, FareEstimate, SharedRideShare};
use crate::models::presence::GeoPoint;
use crate::pricing;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/estimates/ride", post(estimate_ride))
        .route("/estimates/delivery", post(estimate_delivery))
        .route("/estimates/day", post(estimate_day_hire))
        .route("/estimates/shared", post(estimate_shared_ride))
}

#[derive(Deserialize)]
pub struct RideEstimateRequest {
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub ride_type: RideType,
    /// Quote for a future departure; defaults to now.
    pub scheduled_at: Option<DateTime<Utc>>,
}

async fn estimate_ride(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RideEstimateRequest>,
) -> Result<Json<FareEstimate>, AppError> {
    let at = req.scheduled_at.unwrap_or_else(Utc::now);
    let estimate = pricing::quote_ride(&state, req.pickup, req.dropoff, req.ride_type, at)?;
    Ok(Json(estimate))
}

#[derive(Deserialize)]
pub struct DeliveryEstimateRequest {
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub delivery_type: DeliveryType,
}

async fn estimate_delivery(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DeliveryEstimateRequest>,
) -> Result<Json<DeliveryEstimate>, AppError> {
    let estimate =
        pricing::quote_delivery(&state, req.pickup, req.dropoff, req.delivery_type, Utc::now())?;
    Ok(Json(estimate))
}

#[derive(Deserialize)]
pub struct DayHireEstimateRequest {
    pub hours: f64,
    pub hourly_rate: Option<f64>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

async fn estimate_day_hire(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DayHireEstimateRequest>,
) -> Result<Json<DayHireEstimate>, AppError> {
    let at = req.scheduled_at.unwrap_or_else(Utc::now);
    let estimate = pricing::quote_day_hire(&state, req.hourly_rate, req.hours, at)?;
    Ok(Json(estimate))
}

#[derive(Deserialize)]
pub struct SharedRideEstimateRequest {
    pub total_group_price: f64,
    pub new_passenger_count: i64,
}

async fn estimate_shared_ride(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SharedRideEstimateRequest>,
) -> Result<Json<SharedRideShare>, AppError> {
    let share =
        pricing::quote_shared_ride(&state, req.total_group_price, req.new_passenger_count)?;
    Ok(Json(share))
}
