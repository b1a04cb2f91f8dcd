pub mod bookings;
pub mod estimates;
pub mod providers;
pub mod ws;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;

use crate::config::{PricingConfig, PricingUpdate};
use crate::error::AppError;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(providers::router())
        .merge(estimates::router())
        .merge(bookings::router())
        .route("/config/pricing", get(get_pricing).put(update_pricing))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    providers: usize,
    bookings: usize,
    live_connections: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        providers: state.presence.len(),
        bookings: state.bookings.len(),
        live_connections: state.gateway.live_connections(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}

async fn get_pricing(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PricingConfig>, AppError> {
    Ok(Json(state.pricing_config()?))
}

async fn update_pricing(
    State(state): State<Arc<AppState>>,
    Json(update): Json<PricingUpdate>,
) -> Result<Json<PricingConfig>, AppError> {
    Ok(Json(state.update_pricing(update)?))
}
