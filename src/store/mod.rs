use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo;
use crate::models::booking::{Booking, BookingStatus, Rejection};
use crate::models::presence::GeoPoint;

/// Stand-in for the persistence collaborator, scoped to the narrow interface
/// the core consumes: keyed booking reads/writes, the conditional status
/// transition, open-bookings-near, rejections and outstanding offers.
#[derive(Default)]
pub struct BookingStore {
    bookings: DashMap<Uuid, Booking>,
    rejections: DashMap<Uuid, Vec<Rejection>>,
    offers: DashMap<Uuid, Vec<Uuid>>,
}

impl BookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, booking: Booking) {
        self.bookings.insert(booking.id, booking);
    }

    pub fn get(&self, id: Uuid) -> Option<Booking> {
        self.bookings.get(&id).map(|b| b.value().clone())
    }

    pub fn len(&self) -> usize {
        self.bookings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookings.is_empty()
    }

    /// The sole arbiter of assignment races: PENDING→ASSIGNED happens as one
    /// conditional write under the entry guard. Whichever caller's write
    /// commits first wins; every later caller sees a non-PENDING status.
    pub fn try_assign(&self, booking_id: Uuid, provider_id: Uuid) -> Result<Booking, AppError> {
        let mut entry = self
            .bookings
            .get_mut(&booking_id)
            .ok_or_else(|| AppError::NotFound(format!("booking {booking_id} not found")))?;

        if entry.status != BookingStatus::Pending {
            return Err(AppError::BookingUnavailable);
        }

        entry.status = BookingStatus::Assigned;
        entry.provider_id = Some(provider_id);
        Ok(entry.clone())
    }

    /// Conditional lifecycle transition; fails without side effects when the
    /// current status is not `from`.
    pub fn transition(
        &self,
        booking_id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
    ) -> Result<Booking, AppError> {
        let mut entry = self
            .bookings
            .get_mut(&booking_id)
            .ok_or_else(|| AppError::NotFound(format!("booking {booking_id} not found")))?;

        if entry.status != from {
            return Err(AppError::Ineligible(format!(
                "booking {booking_id} is {:?}, expected {from:?}",
                entry.status
            )));
        }

        entry.status = to;
        Ok(entry.clone())
    }

    /// Cancels from any pre-COMPLETED, non-terminal state.
    pub fn cancel(&self, booking_id: Uuid) -> Result<Booking, AppError> {
        let mut entry = self
            .bookings
            .get_mut(&booking_id)
            .ok_or_else(|| AppError::NotFound(format!("booking {booking_id} not found")))?;

        if entry.status.is_terminal() {
            return Err(AppError::Ineligible(format!(
                "booking {booking_id} is already {:?}",
                entry.status
            )));
        }

        entry.status = BookingStatus::Cancelled;
        Ok(entry.clone())
    }

    /// Open (PENDING) bookings created within the window whose pickup lies
    /// within the radius. Linear scan by design; nearby cardinality is
    /// bounded.
    pub fn open_near(
        &self,
        point: &GeoPoint,
        radius_km: f64,
        window: ChronoDuration,
        now: DateTime<Utc>,
    ) -> Vec<Booking> {
        let cutoff = now - window;
        self.bookings
            .iter()
            .filter_map(|entry| {
                let b = entry.value();
                let open = b.status == BookingStatus::Pending
                    && b.created_at >= cutoff
                    && geo::distance_km(&b.pickup, point) <= radius_km;
                open.then(|| b.clone())
            })
            .collect()
    }

    pub fn record_rejection(&self, rejection: Rejection) {
        self.rejections
            .entry(rejection.booking_id)
            .or_default()
            .push(rejection);
    }

    pub fn rejections_for(&self, booking_id: Uuid) -> Vec<Rejection> {
        self.rejections
            .get(&booking_id)
            .map(|r| r.value().clone())
            .unwrap_or_default()
    }

    pub fn set_offers(&self, booking_id: Uuid, provider_ids: Vec<Uuid>) {
        self.offers.insert(booking_id, provider_ids);
    }

    pub fn offers_for(&self, booking_id: Uuid) -> Vec<Uuid> {
        self.offers
            .get(&booking_id)
            .map(|ids| ids.value().clone())
            .unwrap_or_default()
    }

    /// Removes and returns the outstanding offers so the caller can notify
    /// the losers exactly once.
    pub fn take_offers(&self, booking_id: Uuid) -> Vec<Uuid> {
        self.offers
            .remove(&booking_id)
            .map(|(_, ids)| ids)
            .unwrap_or_default()
    }

    /// Moves unclaimed PENDING bookings past their deadline to EXPIRED and
    /// returns them. Candidates are collected first, then re-checked under
    /// the entry guard, so a racing assignment is never overwritten.
    pub fn expire_stale_pending(
        &self,
        max_age: ChronoDuration,
        now: DateTime<Utc>,
    ) -> Vec<Booking> {
        let candidates: Vec<Uuid> = self
            .bookings
            .iter()
            .filter_map(|entry| {
                let b = entry.value();
                (b.status == BookingStatus::Pending && past_deadline(b, max_age, now))
                    .then_some(b.id)
            })
            .collect();

        let mut expired = Vec::new();
        for id in candidates {
            if let Some(mut entry) = self.bookings.get_mut(&id) {
                if entry.status == BookingStatus::Pending && past_deadline(&entry, max_age, now) {
                    entry.status = BookingStatus::Expired;
                    expired.push(entry.clone());
                }
            }
        }
        expired
    }
}

/// An immediate booking times out `max_age` after creation; a scheduled one
/// once its start passes unassigned.
fn past_deadline(booking: &Booking, max_age: ChronoDuration, now: DateTime<Utc>) -> bool {
    match booking.scheduled_start {
        Some(start) => start < now,
        None => booking.created_at < now - max_age,
    }
}
