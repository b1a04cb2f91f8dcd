use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProviderRole {
    Driver,
    DeliveryAgent,
}

/// A provider's live record. One authoritative entry per provider,
/// overwritten on every push and evicted once stale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderPresence {
    pub provider_id: Uuid,
    pub location: GeoPoint,
    pub heading_degrees: f64,
    pub speed_kmh: Option<f64>,
    pub is_online: bool,
    pub is_available: bool,
    pub role: ProviderRole,
    pub verified: bool,
    pub last_updated: DateTime<Utc>,
}

/// Incoming presence push; `last_updated` is stamped by the cache, never
/// trusted from the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct PresenceUpdate {
    pub location: GeoPoint,
    #[serde(default)]
    pub heading_degrees: f64,
    pub speed_kmh: Option<f64>,
    pub is_available: bool,
    pub role: ProviderRole,
    #[serde(default)]
    pub verified: bool,
}
