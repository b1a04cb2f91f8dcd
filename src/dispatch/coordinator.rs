use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dispatch::lifecycle;
use crate::error::AppError;
use crate::geo;
use crate::models::booking::{Booking, BookingStatus, Rejection};
use crate::models::presence::ProviderPresence;
use crate::sampler;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct AcceptOutcome {
    pub booking: Booking,
    pub eta_minutes: f64,
}

/// Accept-attempt arbitration. Everything before `try_assign` is advisory
/// screening; the conditional transition alone decides the winner, so two
/// racing accepts can both pass screening and still resolve to one winner.
pub fn accept(
    state: &Arc<AppState>,
    booking_id: Uuid,
    provider_id: Uuid,
) -> Result<AcceptOutcome, AppError> {
    let booking = state
        .bookings
        .get(booking_id)
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id} not found")))?;
    let presence = eligible_presence(state, &booking, provider_id)?;

    let cfg = state.pricing_config()?;
    let eta_minutes =
        geo::estimate_travel_time(&presence.location, &booking.pickup, cfg.fare.avg_speed_kmh)?
            .duration_minutes;

    let assigned = match state.bookings.try_assign(booking_id, provider_id) {
        Ok(assigned) => assigned,
        Err(err) => {
            if matches!(err, AppError::BookingUnavailable) {
                // Expected, frequent, cheap: the caller just moves on.
                state.record_accept("lost");
                info!(booking_id = %booking_id, provider_id = %provider_id, "accept lost the race");
            }
            return Err(err);
        }
    };
    state.record_accept("won");

    state.presence.set_available(provider_id, false);

    for loser in state.bookings.take_offers(booking_id) {
        if loser == provider_id {
            continue;
        }
        let outcome = state.gateway.push(
            loser,
            "offer_invalidated",
            json!({ "booking_id": booking_id }),
        );
        state.record_notification(outcome);
    }

    let outcome = state.gateway.push(
        provider_id,
        "booking_assigned",
        json!({ "booking_id": booking_id, "pickup": assigned.pickup, "eta_minutes": eta_minutes }),
    );
    state.record_notification(outcome);
    let outcome = state.gateway.push(
        assigned.customer_id,
        "provider_assigned",
        json!({ "booking_id": booking_id, "provider_id": provider_id, "eta_minutes": eta_minutes }),
    );
    state.record_notification(outcome);

    lifecycle::schedule(state, &assigned);

    info!(
        booking_id = %booking_id,
        provider_id = %provider_id,
        eta_minutes,
        "booking assigned"
    );

    Ok(AcceptOutcome {
        booking: assigned,
        eta_minutes,
    })
}

fn eligible_presence(
    state: &AppState,
    booking: &Booking,
    provider_id: Uuid,
) -> Result<ProviderPresence, AppError> {
    let presence = state.presence.get(provider_id).ok_or_else(|| {
        AppError::Ineligible(format!("provider {provider_id} has no live presence"))
    })?;

    if !presence.verified {
        state.record_accept("ineligible");
        return Err(AppError::Ineligible(format!("provider {provider_id} is not verified")));
    }
    if !presence.is_available {
        state.record_accept("ineligible");
        return Err(AppError::Ineligible(format!("provider {provider_id} is not available")));
    }

    // Scheduled hires are accepted ahead of time from anywhere; immediate
    // bookings require the provider to be within pickup range.
    if booking.scheduled_start.is_none() {
        let cfg = state.pricing_config()?;
        let distance_km = geo::distance_km(&presence.location, &booking.pickup);
        if distance_km > cfg.search.accept_radius_km {
            state.record_accept("ineligible");
            return Err(AppError::Ineligible(format!(
                "provider {provider_id} is {distance_km:.1} km from pickup, limit {} km",
                cfg.search.accept_radius_km
            )));
        }
    }

    Ok(presence)
}

/// Records the rejection and re-offers to the next nearest candidate that
/// has not already seen this booking. Booking state is untouched.
pub fn reject(
    state: &Arc<AppState>,
    booking_id: Uuid,
    provider_id: Uuid,
    reason: String,
) -> Result<(), AppError> {
    let booking = state
        .bookings
        .get(booking_id)
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id} not found")))?;

    state.bookings.record_rejection(Rejection {
        booking_id,
        provider_id,
        reason,
        rejected_at: Utc::now(),
    });
    state.metrics.rejections_total.inc();

    if booking.status != BookingStatus::Pending {
        return Ok(());
    }

    let mut offered = state.bookings.take_offers(booking_id);
    offered.retain(|id| *id != provider_id);

    match next_candidate(state, &booking, provider_id, &offered) {
        Some(candidate) => {
            offered.push(candidate);
            let outcome = state.gateway.push(
                candidate,
                "booking_offer",
                json!({ "booking_id": booking_id, "pickup": booking.pickup }),
            );
            state.record_notification(outcome);
            info!(booking_id = %booking_id, candidate = %candidate, "booking re-offered");
        }
        None => {
            warn!(booking_id = %booking_id, "no further candidates after rejection");
        }
    }
    state.bookings.set_offers(booking_id, offered);

    Ok(())
}

fn next_candidate(
    state: &AppState,
    booking: &Booking,
    rejecting: Uuid,
    already_offered: &[Uuid],
) -> Option<Uuid> {
    let cfg = state.pricing_config().ok()?;
    let supply = sampler::sample_supply(
        &state.presence,
        &booking.pickup,
        cfg.search.accept_radius_km,
        Duration::from_secs(state.config.supply_freshness_secs),
    )
    .ok()?;

    let rejected: Vec<Uuid> = state
        .bookings
        .rejections_for(booking.id)
        .into_iter()
        .map(|r| r.provider_id)
        .collect();

    let mut candidates: Vec<ProviderPresence> = supply
        .provider_ids
        .iter()
        .filter(|id| **id != rejecting && !rejected.contains(id) && !already_offered.contains(id))
        .filter_map(|id| state.presence.get(*id))
        .collect();
    candidates.sort_by(|a, b| {
        geo::distance_m(&a.location, &booking.pickup)
            .total_cmp(&geo::distance_m(&b.location, &booking.pickup))
    });
    candidates.first().map(|p| p.provider_id)
}

/// Creates a PENDING booking and fans the initial offer out to the nearest
/// eligible providers.
pub fn open_booking(state: &Arc<AppState>, mut booking: Booking) -> Result<Booking, AppError> {
    geo::validate_point(&booking.pickup)?;
    geo::validate_point(&booking.dropoff)?;
    booking.status = BookingStatus::Pending;
    booking.provider_id = None;

    state.bookings.insert(booking.clone());

    let cfg = state.pricing_config()?;
    let supply = sampler::sample_supply(
        &state.presence,
        &booking.pickup,
        cfg.search.accept_radius_km,
        Duration::from_secs(state.config.supply_freshness_secs),
    )?;

    let mut candidates: Vec<ProviderPresence> = supply
        .provider_ids
        .iter()
        .filter_map(|id| state.presence.get(*id))
        .collect();
    candidates.sort_by(|a, b| {
        geo::distance_m(&a.location, &booking.pickup)
            .total_cmp(&geo::distance_m(&b.location, &booking.pickup))
    });
    candidates.truncate(cfg.search.offer_fanout);

    let offered: Vec<Uuid> = candidates.iter().map(|p| p.provider_id).collect();
    state.bookings.set_offers(booking.id, offered.clone());

    for provider_id in &offered {
        let outcome = state.gateway.push(
            *provider_id,
            "booking_offer",
            json!({ "booking_id": booking.id, "pickup": booking.pickup, "kind": booking.kind }),
        );
        state.record_notification(outcome);
    }

    info!(booking_id = %booking.id, offers = offered.len(), "booking opened");
    Ok(booking)
}

/// Cancels with compensating effects: timers stopped, provider freed,
/// outstanding offers withdrawn.
pub fn cancel_booking(state: &Arc<AppState>, booking_id: Uuid) -> Result<Booking, AppError> {
    let cancelled = state.bookings.cancel(booking_id)?;

    lifecycle::cancel(state, booking_id);

    if let Some(provider_id) = cancelled.provider_id {
        state.presence.set_available(provider_id, true);
        let outcome = state.gateway.push(
            provider_id,
            "booking_cancelled",
            json!({ "booking_id": booking_id }),
        );
        state.record_notification(outcome);
    }
    for offered in state.bookings.take_offers(booking_id) {
        let outcome = state.gateway.push(
            offered,
            "offer_invalidated",
            json!({ "booking_id": booking_id }),
        );
        state.record_notification(outcome);
    }
    let outcome = state.gateway.push(
        cancelled.customer_id,
        "booking_cancelled",
        json!({ "booking_id": booking_id }),
    );
    state.record_notification(outcome);

    info!(booking_id = %booking_id, "booking cancelled");
    Ok(cancelled)
}

/// Moves PENDING bookings past their deadline to EXPIRED, withdrawing the
/// outstanding offers and telling the customer. Assignment races are settled
/// inside the store; an accept that lands first keeps the booking.
pub fn expire_pending(state: &Arc<AppState>, max_age: ChronoDuration) -> usize {
    let expired = state.bookings.expire_stale_pending(max_age, Utc::now());

    for booking in &expired {
        lifecycle::cancel(state, booking.id);
        for offered in state.bookings.take_offers(booking.id) {
            let outcome = state.gateway.push(
                offered,
                "offer_invalidated",
                json!({ "booking_id": booking.id }),
            );
            state.record_notification(outcome);
        }
        let outcome = state.gateway.push(
            booking.customer_id,
            "booking_expired",
            json!({ "booking_id": booking.id }),
        );
        state.record_notification(outcome);
        info!(booking_id = %booking.id, "booking expired unassigned");
    }

    if !expired.is_empty() {
        state
            .metrics
            .bookings_expired_total
            .inc_by(expired.len() as u64);
    }
    expired.len()
}

/// Independent sweep timer, decoupled from request traffic.
pub async fn run_expiry_sweep(state: Arc<AppState>, interval: Duration, max_age: ChronoDuration) {
    info!(
        interval_secs = interval.as_secs(),
        max_age_secs = max_age.num_seconds(),
        "booking expiry sweep started"
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let expired = expire_pending(&state, max_age);
        if expired > 0 {
            debug!(expired, "expired stale pending bookings");
        }
    }
}

pub fn mark_arrived(state: &Arc<AppState>, booking_id: Uuid) -> Result<Booking, AppError> {
    let updated = state
        .bookings
        .transition(booking_id, BookingStatus::Assigned, BookingStatus::Arrived)?;
    let outcome = state.gateway.push(
        updated.customer_id,
        "provider_arrived",
        json!({ "booking_id": booking_id }),
    );
    state.record_notification(outcome);
    Ok(updated)
}

pub fn start_trip(state: &Arc<AppState>, booking_id: Uuid) -> Result<Booking, AppError> {
    let updated = state
        .bookings
        .transition(booking_id, BookingStatus::Arrived, BookingStatus::InProgress)?;
    let outcome = state.gateway.push(
        updated.customer_id,
        "trip_started",
        json!({ "booking_id": booking_id }),
    );
    state.record_notification(outcome);
    Ok(updated)
}

pub fn complete_trip(state: &Arc<AppState>, booking_id: Uuid) -> Result<Booking, AppError> {
    let updated = state
        .bookings
        .transition(booking_id, BookingStatus::InProgress, BookingStatus::Completed)?;

    lifecycle::cancel(state, booking_id);
    if let Some(provider_id) = updated.provider_id {
        state.presence.set_available(provider_id, true);
    }
    let outcome = state.gateway.push(
        updated.customer_id,
        "trip_completed",
        json!({ "booking_id": booking_id }),
    );
    state.record_notification(outcome);

    info!(booking_id = %booking_id, "trip completed");
    Ok(updated)
}
