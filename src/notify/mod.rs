use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info};
use uuid::Uuid;

use crate::models::presence::ProviderRole;
use crate::presence::PresenceFilter;
use crate::state::AppState;

/// Per-recipient mailbox bound; beyond this the oldest queued message is
/// dropped first.
const MAILBOX_CAP: usize = 64;

#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub event: String,
    pub payload: Value,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastScope {
    Role(ProviderRole),
    Booking(Uuid),
}

#[derive(Debug, Clone, Serialize)]
pub struct BroadcastEnvelope {
    pub scope: BroadcastScope,
    pub event: String,
    pub payload: Value,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Live,
    Queued,
    /// Queued, but the mailbox was full and its oldest envelope was lost.
    QueuedEvictingOldest,
}

impl PushOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            PushOutcome::Live => "live",
            PushOutcome::Queued => "queued",
            PushOutcome::QueuedEvictingOldest => "queued_evicting_oldest",
        }
    }
}

/// Point-to-point and fan-out notification gateway. Live WS connections get
/// messages immediately; recipients without one fall back to a bounded
/// mailbox drained on reconnect.
pub struct Gateway {
    live: DashMap<Uuid, mpsc::UnboundedSender<Envelope>>,
    mailboxes: DashMap<Uuid, Vec<Envelope>>,
    broadcast_tx: broadcast::Sender<BroadcastEnvelope>,
}

impl Gateway {
    pub fn new(event_buffer_size: usize) -> Self {
        let (broadcast_tx, _unused_rx) = broadcast::channel(event_buffer_size);
        Self {
            live: DashMap::new(),
            mailboxes: DashMap::new(),
            broadcast_tx,
        }
    }

    /// Registers a live connection and replays anything queued while the
    /// recipient was away.
    pub fn register(&self, recipient: Uuid, sender: mpsc::UnboundedSender<Envelope>) {
        if let Some((_, queued)) = self.mailboxes.remove(&recipient) {
            for envelope in queued {
                let _ = sender.send(envelope);
            }
        }
        self.live.insert(recipient, sender);
    }

    pub fn unregister(&self, recipient: Uuid) {
        self.live.remove(&recipient);
    }

    pub fn live_connections(&self) -> usize {
        self.live.len()
    }

    pub fn push(&self, recipient: Uuid, event: &str, payload: Value) -> PushOutcome {
        let envelope = Envelope {
            event: event.to_string(),
            payload,
            sent_at: Utc::now(),
        };

        if let Some(sender) = self.live.get(&recipient) {
            if sender.send(envelope.clone()).is_ok() {
                return PushOutcome::Live;
            }
            // Connection gone; fall through to the mailbox.
            drop(sender);
            self.live.remove(&recipient);
        }

        let mut mailbox = self.mailboxes.entry(recipient).or_default();
        if mailbox.len() >= MAILBOX_CAP {
            mailbox.remove(0);
            mailbox.push(envelope);
            error!(%recipient, event, "mailbox full; evicted oldest queued notification");
            return PushOutcome::QueuedEvictingOldest;
        }
        mailbox.push(envelope);
        PushOutcome::Queued
    }

    pub fn broadcast(&self, scope: BroadcastScope, event: &str, payload: Value) -> usize {
        let envelope = BroadcastEnvelope {
            scope,
            event: event.to_string(),
            payload,
            sent_at: Utc::now(),
        };
        self.broadcast_tx.send(envelope).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEnvelope> {
        self.broadcast_tx.subscribe()
    }
}

/// Periodic presence snapshot push, independent of request traffic.
pub async fn run_presence_broadcast(state: Arc<AppState>, interval: Duration) {
    info!(interval_secs = interval.as_secs(), "presence broadcast started");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        for role in [ProviderRole::Driver, ProviderRole::DeliveryAgent] {
            let filter = PresenceFilter {
                online_only: true,
                available_only: true,
                role: Some(role),
                ..PresenceFilter::default()
            };
            let snapshot = state.presence.snapshot(&filter);
            let payload = match serde_json::to_value(&snapshot) {
                Ok(value) => value,
                Err(err) => {
                    error!(error = %err, "failed to serialize presence snapshot");
                    continue;
                }
            };
            state
                .gateway
                .broadcast(BroadcastScope::Role(role), "presence_snapshot", payload);
        }
    }
}
