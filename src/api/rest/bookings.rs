use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::dispatch::coordinator;
use crate::error::AppError;
use crate::models::booking::{Booking, BookingKind, BookingStatus};
use crate::models::presence::GeoPoint;
use crate::pricing;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bookings", post(create_booking))
        .route("/bookings/:id", get(get_booking))
        .route("/bookings/:id/accept", post(accept_booking))
        .route("/bookings/:id/reject", post(reject_booking))
        .route("/bookings/:id/cancel", post(cancel_booking))
        .route("/bookings/:id/arrive", post(mark_arrived))
        .route("/bookings/:id/start", post(start_trip))
        .route("/bookings/:id/complete", post(complete_trip))
}

#[derive(Deserialize)]
pub struct CreateBookingRequest {
    pub customer_id: Uuid,
    pub kind: BookingKind,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub scheduled_start: Option<DateTime<Utc>>,
}

async fn create_booking(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<Json<Booking>, AppError> {
    if let Some(start) = req.scheduled_start {
        if start <= Utc::now() {
            return Err(AppError::Validation(
                "scheduled_start must be in the future".to_string(),
            ));
        }
    }

    let now = Utc::now();
    let quoted_fare = match req.kind {
        BookingKind::Ride { ride_type } => Some(
            pricing::quote_ride(
                &state,
                req.pickup,
                req.dropoff,
                ride_type,
                req.scheduled_start.unwrap_or(now),
            )?
            .total,
        ),
        BookingKind::Delivery { delivery_type } => Some(
            pricing::quote_delivery(&state, req.pickup, req.dropoff, delivery_type, now)?.total,
        ),
        BookingKind::DayHire { hours } => Some(
            pricing::quote_day_hire(
                &state,
                None,
                hours as f64,
                req.scheduled_start.unwrap_or(now),
            )?
            .total,
        ),
    };

    let booking = Booking {
        id: Uuid::new_v4(),
        customer_id: req.customer_id,
        kind: req.kind,
        pickup: req.pickup,
        dropoff: req.dropoff,
        status: BookingStatus::Pending,
        provider_id: None,
        quoted_fare,
        scheduled_start: req.scheduled_start,
        created_at: now,
    };

    let booking = coordinator::open_booking(&state, booking)?;
    Ok(Json(booking))
}

async fn get_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    let booking = state
        .bookings
        .get(id)
        .ok_or_else(|| AppError::NotFound(format!("booking {id} not found")))?;
    Ok(Json(booking))
}

#[derive(Deserialize)]
pub struct AcceptRequest {
    pub provider_id: Uuid,
}

async fn accept_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<AcceptRequest>,
) -> Result<Json<coordinator::AcceptOutcome>, AppError> {
    let outcome = coordinator::accept(&state, id, req.provider_id)?;
    Ok(Json(outcome))
}

#[derive(Deserialize)]
pub struct RejectRequest {
    pub provider_id: Uuid,
    #[serde(default)]
    pub reason: String,
}

async fn reject_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<RejectRequest>,
) -> Result<Json<Booking>, AppError> {
    coordinator::reject(&state, id, req.provider_id, req.reason)?;
    let booking = state
        .bookings
        .get(id)
        .ok_or_else(|| AppError::NotFound(format!("booking {id} not found")))?;
    Ok(Json(booking))
}

async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(coordinator::cancel_booking(&state, id)?))
}

async fn mark_arrived(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(coordinator::mark_arrived(&state, id)?))
}

async fn start_trip(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(coordinator::start_trip(&state, id)?))
}

async fn complete_trip(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(coordinator::complete_trip(&state, id)?))
}
