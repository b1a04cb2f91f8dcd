use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::geo;
use crate::models::presence::{GeoPoint, PresenceUpdate, ProviderPresence, ProviderRole};
use crate::state::AppState;

/// Live provider presence. The cache is the only authority for real-time
/// location/availability; each key is replaced wholesale on every push.
#[derive(Default)]
pub struct PresenceCache {
    entries: DashMap<Uuid, ProviderPresence>,
}

#[derive(Debug, Clone, Default)]
pub struct PresenceFilter {
    pub online_only: bool,
    pub available_only: bool,
    pub verified_only: bool,
    pub role: Option<ProviderRole>,
    pub near: Option<(GeoPoint, f64)>,
    pub fresh_within: Option<Duration>,
}

impl PresenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, provider_id: Uuid, update: PresenceUpdate) -> ProviderPresence {
        let entry = ProviderPresence {
            provider_id,
            location: update.location,
            heading_degrees: update.heading_degrees,
            speed_kmh: update.speed_kmh,
            is_online: true,
            is_available: update.is_available,
            role: update.role,
            verified: update.verified,
            last_updated: Utc::now(),
        };
        self.entries.insert(provider_id, entry.clone());
        entry
    }

    pub fn mark_offline(&self, provider_id: Uuid) -> bool {
        self.entries.remove(&provider_id).is_some()
    }

    pub fn get(&self, provider_id: Uuid) -> Option<ProviderPresence> {
        self.entries.get(&provider_id).map(|e| e.value().clone())
    }

    /// Flips availability in place and refreshes the freshness stamp: an
    /// assigned provider is still live, just not offerable.
    pub fn set_available(&self, provider_id: Uuid, available: bool) -> bool {
        match self.entries.get_mut(&provider_id) {
            Some(mut entry) => {
                entry.is_available = available;
                entry.last_updated = Utc::now();
                true
            }
            None => false,
        }
    }

    pub fn snapshot(&self, filter: &PresenceFilter) -> Vec<ProviderPresence> {
        let now = Utc::now();
        self.entries
            .iter()
            .filter_map(|entry| {
                let p = entry.value();
                if filter.online_only && !p.is_online {
                    return None;
                }
                if filter.available_only && !p.is_available {
                    return None;
                }
                if filter.verified_only && !p.verified {
                    return None;
                }
                if let Some(role) = filter.role {
                    if p.role != role {
                        return None;
                    }
                }
                if let Some(window) = filter.fresh_within {
                    let age = now.signed_duration_since(p.last_updated);
                    if age.num_seconds() >= window.as_secs() as i64 {
                        return None;
                    }
                }
                if let Some((point, radius_km)) = filter.near {
                    if geo::distance_km(&p.location, &point) > radius_km {
                        return None;
                    }
                }
                Some(p.clone())
            })
            .collect()
    }

    pub fn evict_stale(&self, ttl: Duration) -> usize {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries.retain(|_, p| {
            now.signed_duration_since(p.last_updated).num_seconds() < ttl.as_secs() as i64
        });
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Independent sweep timer, decoupled from request traffic.
pub async fn run_eviction_sweep(state: Arc<AppState>, interval: Duration, ttl: Duration) {
    info!(interval_secs = interval.as_secs(), ttl_secs = ttl.as_secs(), "presence eviction sweep started");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let evicted = state.presence.evict_stale(ttl);
        state.metrics.presence_entries.set(state.presence.len() as i64);
        if evicted > 0 {
            state.metrics.presence_evictions_total.inc_by(evicted as u64);
            debug!(evicted, "evicted stale presence entries");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{Duration as ChronoDuration, Utc};
    use uuid::Uuid;

    use super::{PresenceCache, PresenceFilter};
    use crate::models::presence::{GeoPoint, PresenceUpdate, ProviderRole};

    fn update(lat: f64, lng: f64, available: bool) -> PresenceUpdate {
        PresenceUpdate {
            location: GeoPoint { lat, lng },
            heading_degrees: 90.0,
            speed_kmh: Some(25.0),
            is_available: available,
            role: ProviderRole::Driver,
            verified: true,
        }
    }

    #[test]
    fn upsert_replaces_previous_entry() {
        let cache = PresenceCache::new();
        let id = Uuid::new_v4();

        cache.upsert(id, update(5.60, -0.18, true));
        cache.upsert(id, update(5.61, -0.19, false));

        let entry = cache.get(id).unwrap();
        assert_eq!(entry.location.lat, 5.61);
        assert!(!entry.is_available);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn mark_offline_removes_entry() {
        let cache = PresenceCache::new();
        let id = Uuid::new_v4();

        cache.upsert(id, update(5.60, -0.18, true));
        assert!(cache.mark_offline(id));
        assert!(cache.get(id).is_none());
        assert!(!cache.mark_offline(id));
    }

    #[test]
    fn snapshot_filters_by_availability_and_radius() {
        let cache = PresenceCache::new();
        let near_available = Uuid::new_v4();
        let near_busy = Uuid::new_v4();
        let far = Uuid::new_v4();

        cache.upsert(near_available, update(5.6037, -0.187, true));
        cache.upsert(near_busy, update(5.6040, -0.186, false));
        cache.upsert(far, update(6.70, -1.62, true));

        let filter = PresenceFilter {
            online_only: true,
            available_only: true,
            near: Some((GeoPoint { lat: 5.6037, lng: -0.187 }, 5.0)),
            ..PresenceFilter::default()
        };
        let snapshot = cache.snapshot(&filter);

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].provider_id, near_available);
    }

    #[test]
    fn snapshot_excludes_entries_beyond_freshness_window() {
        let cache = PresenceCache::new();
        let fresh = Uuid::new_v4();
        let stale = Uuid::new_v4();

        cache.upsert(fresh, update(5.60, -0.18, true));
        cache.upsert(stale, update(5.60, -0.18, true));
        cache
            .entries
            .get_mut(&stale)
            .unwrap()
            .last_updated = Utc::now() - ChronoDuration::minutes(11);

        let filter = PresenceFilter {
            fresh_within: Some(Duration::from_secs(600)),
            ..PresenceFilter::default()
        };
        let snapshot = cache.snapshot(&filter);

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].provider_id, fresh);
    }

    #[test]
    fn evict_stale_removes_only_entries_past_ttl() {
        let cache = PresenceCache::new();
        let fresh = Uuid::new_v4();
        let stale = Uuid::new_v4();

        cache.upsert(fresh, update(5.60, -0.18, true));
        cache.upsert(stale, update(5.61, -0.19, true));
        cache
            .entries
            .get_mut(&stale)
            .unwrap()
            .last_updated = Utc::now() - ChronoDuration::minutes(6);

        let evicted = cache.evict_stale(Duration::from_secs(300));

        assert_eq!(evicted, 1);
        assert!(cache.get(fresh).is_some());
        assert!(cache.get(stale).is_none());
    }

    #[test]
    fn set_available_flips_flag_in_place() {
        let cache = PresenceCache::new();
        let id = Uuid::new_v4();

        cache.upsert(id, update(5.60, -0.18, true));
        assert!(cache.set_available(id, false));
        assert!(!cache.get(id).unwrap().is_available);
        assert!(!cache.set_available(Uuid::new_v4(), false));
    }
}
