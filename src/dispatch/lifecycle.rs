use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use serde_json::json;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::booking::{Booking, BookingKind, BookingStatus};
use crate::state::AppState;

/// Registry of in-flight per-booking timers. Process-local and best-effort:
/// timers do not survive a restart.
#[derive(Default)]
pub struct LifecycleTimers {
    handles: DashMap<Uuid, Vec<AbortHandle>>,
}

impl LifecycleTimers {
    pub fn new() -> Self {
        Self::default()
    }

    fn track(&self, booking_id: Uuid, handle: AbortHandle) {
        self.handles.entry(booking_id).or_default().push(handle);
    }

    pub fn cancel(&self, booking_id: Uuid) -> usize {
        match self.handles.remove(&booking_id) {
            Some((_, handles)) => {
                let count = handles.len();
                for handle in handles {
                    handle.abort();
                }
                count
            }
            None => 0,
        }
    }

    pub fn active_bookings(&self) -> usize {
        self.handles.len()
    }
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    Reminder,
    Start,
    Progress { elapsed_hours: u32 },
    Completion,
}

/// Schedules the reminder/start/progress/completion timers for a scheduled
/// hire. Immediate bookings have no timed lifecycle.
pub fn schedule(state: &Arc<AppState>, booking: &Booking) {
    let Some(start) = booking.scheduled_start else {
        return;
    };
    let BookingKind::DayHire { hours } = booking.kind else {
        return;
    };

    spawn_stage(state, booking.id, start - ChronoDuration::minutes(15), Stage::Reminder);
    spawn_stage(state, booking.id, start, Stage::Start);
    for elapsed in 1..hours {
        spawn_stage(
            state,
            booking.id,
            start + ChronoDuration::hours(elapsed as i64),
            Stage::Progress { elapsed_hours: elapsed },
        );
    }
    spawn_stage(
        state,
        booking.id,
        start + ChronoDuration::hours(hours as i64),
        Stage::Completion,
    );

    info!(booking_id = %booking.id, hours, "lifecycle timers scheduled");
}

pub fn cancel(state: &AppState, booking_id: Uuid) {
    let cancelled = state.lifecycle.cancel(booking_id);
    if cancelled > 0 {
        debug!(booking_id = %booking_id, cancelled, "lifecycle timers cancelled");
    }
}

fn spawn_stage(state: &Arc<AppState>, booking_id: Uuid, fire_at: DateTime<Utc>, stage: Stage) {
    let task_state = state.clone();
    let handle = tokio::spawn(async move {
        let delay = (fire_at - Utc::now()).to_std().unwrap_or_default();
        tokio::time::sleep(delay).await;
        run_stage(&task_state, booking_id, stage);
    });
    state.lifecycle.track(booking_id, handle.abort_handle());
}

fn run_stage(state: &Arc<AppState>, booking_id: Uuid, stage: Stage) {
    let Some(booking) = state.bookings.get(booking_id) else {
        warn!(booking_id = %booking_id, "lifecycle timer fired for unknown booking");
        return;
    };
    if booking.status.is_terminal() {
        return;
    }

    match stage {
        Stage::Reminder => {
            notify_parties(state, &booking, "booking_reminder", json!({ "starts_at": booking.scheduled_start }));
        }
        Stage::Start => {
            // Scheduled hires auto-progress at start time; arrival is implied.
            let started = state
                .bookings
                .transition(booking_id, BookingStatus::Assigned, BookingStatus::InProgress)
                .or_else(|_| {
                    state.bookings.transition(booking_id, BookingStatus::Arrived, BookingStatus::InProgress)
                });
            match started {
                Ok(updated) => {
                    notify_parties(state, &updated, "booking_started", json!({}));
                }
                Err(err) => {
                    warn!(booking_id = %booking_id, error = %err, "start timer fired but booking not startable");
                }
            }
        }
        Stage::Progress { elapsed_hours } => {
            notify_parties(state, &booking, "booking_progress", json!({ "elapsed_hours": elapsed_hours }));
        }
        Stage::Completion => {
            match state
                .bookings
                .transition(booking_id, BookingStatus::InProgress, BookingStatus::Completed)
            {
                Ok(updated) => {
                    if let Some(provider_id) = updated.provider_id {
                        state.presence.set_available(provider_id, true);
                    }
                    notify_parties(state, &updated, "booking_completed", json!({}));
                    info!(booking_id = %booking_id, "scheduled hire completed");
                }
                Err(err) => {
                    warn!(booking_id = %booking_id, error = %err, "completion timer fired but booking not in progress");
                }
            }
            state.lifecycle.cancel(booking_id);
        }
    }
}

fn notify_parties(state: &AppState, booking: &Booking, event: &str, payload: serde_json::Value) {
    let outcome = state.gateway.push(booking.customer_id, event, payload.clone());
    state
        .metrics
        .notifications_total
        .with_label_values(&[outcome.as_str()])
        .inc();

    if let Some(provider_id) = booking.provider_id {
        let outcome = state.gateway.push(provider_id, event, payload);
        state
            .metrics
            .notifications_total
            .with_label_values(&[outcome.as_str()])
            .inc();
    }
}
