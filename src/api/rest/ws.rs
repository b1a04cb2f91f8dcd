use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::presence::ProviderRole;
use crate::notify::BroadcastScope;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct WsQuery {
    pub client_id: Uuid,
    pub role: Option<ProviderRole>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query))
}

/// One live connection: point-to-point envelopes arrive on a personal
/// channel registered with the gateway (draining any offline mailbox),
/// role/booking broadcasts on the shared fan-out, filtered by subscription.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, query: WsQuery) {
    let (mut sender, mut receiver) = socket.split();
    let (personal_tx, mut personal_rx) = mpsc::unbounded_channel();
    state.gateway.register(query.client_id, personal_tx);
    let mut broadcast_rx = state.gateway.subscribe();
    let mut booking_subs: HashSet<Uuid> = HashSet::new();

    info!(client_id = %query.client_id, role = ?query.role, "live connection opened");

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_message(&text, &mut booking_subs, query.client_id);
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(client_id = %query.client_id, error = %err, "websocket receive error");
                        break;
                    }
                }
            }
            envelope = personal_rx.recv() => {
                let Some(envelope) = envelope else { break };
                if send_json(&mut sender, &envelope).await.is_err() {
                    break;
                }
            }
            envelope = broadcast_rx.recv() => {
                match envelope {
                    Ok(envelope) => {
                        let wanted = match envelope.scope {
                            BroadcastScope::Role(role) => query.role == Some(role),
                            BroadcastScope::Booking(id) => booking_subs.contains(&id),
                        };
                        if wanted && send_json(&mut sender, &envelope).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(client_id = %query.client_id, skipped, "broadcast receiver lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    state.gateway.unregister(query.client_id);
    info!(client_id = %query.client_id, "live connection closed");
}

fn handle_client_message(text: &str, booking_subs: &mut HashSet<Uuid>, client_id: Uuid) {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        warn!(%client_id, "ignoring malformed client message");
        return;
    };
    if let Some(id) = value.get("subscribe_booking").and_then(|v| v.as_str()) {
        if let Ok(booking_id) = id.parse::<Uuid>() {
            booking_subs.insert(booking_id);
        }
    }
    if let Some(id) = value.get("unsubscribe_booking").and_then(|v| v.as_str()) {
        if let Ok(booking_id) = id.parse::<Uuid>() {
            booking_subs.remove(&booking_id);
        }
    }
}

async fn send_json<T: serde::Serialize>(
    sender: &mut SplitSink<WebSocket, Message>,
    value: &T,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(value)
        .map_err(|err| axum::Error::new(format!("serialize ws payload: {err}")))?;
    sender.send(Message::Text(json.into())).await
}
