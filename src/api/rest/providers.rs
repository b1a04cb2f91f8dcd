use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::AppError;
use crate::geo;
use crate::models::presence::{GeoPoint, PresenceUpdate, ProviderPresence, ProviderRole};
use crate::presence::PresenceFilter;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/providers/:id/presence", post(push_presence))
        .route("/providers/:id/offline", post(go_offline))
        .route("/providers/nearby", get(nearby_providers))
}

async fn push_presence(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(update): Json<PresenceUpdate>,
) -> Result<Json<ProviderPresence>, AppError> {
    geo::validate_point(&update.location)?;
    if let Some(speed) = update.speed_kmh {
        if !speed.is_finite() || speed < 0.0 {
            return Err(AppError::Validation(format!("speed must be non-negative, got {speed}")));
        }
    }

    let entry = state.presence.upsert(id, update);
    state.metrics.presence_entries.set(state.presence.len() as i64);
    Ok(Json(entry))
}

async fn go_offline(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let removed = state.presence.mark_offline(id);
    if !removed {
        return Err(AppError::NotFound(format!("provider {id} has no live presence")));
    }
    state.metrics.presence_entries.set(state.presence.len() as i64);
    Ok(Json(json!({ "provider_id": id, "offline": true })))
}

#[derive(Deserialize)]
pub struct NearbyQuery {
    pub lat: f64,
    pub lng: f64,
    pub radius_km: f64,
    pub role: Option<ProviderRole>,
}

async fn nearby_providers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NearbyQuery>,
) -> Result<Json<Vec<ProviderPresence>>, AppError> {
    let point = GeoPoint {
        lat: query.lat,
        lng: query.lng,
    };
    geo::validate_point(&point)?;
    if query.radius_km <= 0.0 {
        return Err(AppError::Validation(format!(
            "radius must be positive, got {}",
            query.radius_km
        )));
    }

    let filter = PresenceFilter {
        online_only: true,
        available_only: true,
        role: query.role,
        near: Some((point, query.radius_km)),
        ..PresenceFilter::default()
    };
    Ok(Json(state.presence.snapshot(&filter)))
}
