//! WebSocket handler for the room hub: join a room on connect, relay
//! signaling messages to one peer or to the whole room, leave on disconnect.
//!
//! The wire protocol is deliberately thin. The server assigns the
//! participant id and produces a small closed set of system messages
//! (`assign_id`, `existing_participants`, `new_participant`,
//! `participant_left`); everything a client sends is an opaque JSON object
//! relayed to the room with `sender_id` rewritten by the hub. See
//! [`crate::room`] for the relay semantics.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use std::time::{Duration, Instant};

use super::AppState;
use crate::events::{EventEmitter, RoomEvent};
use crate::protocol_constants::{WS_HEARTBEAT_CHECK_INTERVAL_SECS, WS_HEARTBEAT_TIMEOUT_SECS};
use crate::utils::now_millis;

/// Routes mounted under the room hub WebSocket.
pub fn routes() -> Router<AppState> {
    Router::new().route("/rooms/{room_id}/ws", get(ws_handler))
}

/// WebSocket upgrade handler for `GET /rooms/{room_id}/ws`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state, room_id))
}

/// Main WebSocket connection handler: one connection per room participant.
async fn handle_ws(socket: WebSocket, state: AppState, room_id: String) {
    let (mut sender, mut receiver) = socket.split();
    let mut last_activity = Instant::now();

    // Joining happens on connect; the first things the client receives are
    // the hub's assign_id and existing_participants messages.
    let (participant_id, mut inbox) = state.services.rooms.join(&room_id);
    let conn_guard = state
        .services
        .ws_manager
        .register(&room_id, &participant_id);
    let cancel_token = conn_guard.cancel_token().clone();

    state.services.event_bridge.emit_room(RoomEvent::Joined {
        room_id: room_id.clone(),
        participant_id: participant_id.clone(),
        timestamp: now_millis(),
    });
    log::info!(
        "[WS] Socket #{} joined room {room_id} as {participant_id}",
        conn_guard.id()
    );

    // Use interval instead of sleep to reduce timer allocations and prevent
    // drift. Delay mode skips missed ticks rather than bursting to catch up.
    let mut heartbeat_interval =
        tokio::time::interval(Duration::from_secs(WS_HEARTBEAT_CHECK_INTERVAL_SECS));
    heartbeat_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                log::info!("[WS] Socket #{} force-closed", conn_guard.id());
                break;
            }
            msg = receiver.next() => {
                last_activity = Instant::now();
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<serde_json::Value>(&text) {
                            Ok(serde_json::Value::Object(payload)) => {
                                state.services.rooms.relay(&participant_id, payload);
                            }
                            Ok(_) | Err(_) => {
                                log::debug!(
                                    "[WS] Ignoring non-object payload from {participant_id}"
                                );
                            }
                        }
                    }
                    // The underlying protocol layer answers pings; both
                    // directions just count as liveness here.
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
            relayed = inbox.recv() => {
                let Some(message) = relayed else {
                    // Hub dropped this participant (e.g. evicted as dead).
                    break;
                };
                let Ok(text) = serde_json::to_string(&message) else {
                    continue;
                };
                if sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            _ = heartbeat_interval.tick() => {
                if last_activity.elapsed() > Duration::from_secs(WS_HEARTBEAT_TIMEOUT_SECS) {
                    log::warn!(
                        "[WS] Participant {participant_id} unresponsive for >{WS_HEARTBEAT_TIMEOUT_SECS}s, closing"
                    );
                    break;
                }
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    state.services.rooms.leave(&participant_id);
    state.services.event_bridge.emit_room(RoomEvent::Left {
        room_id: room_id.clone(),
        participant_id: participant_id.clone(),
        timestamp: now_millis(),
    });
    log::info!(
        "[WS] Socket #{} left room {room_id} as {participant_id}",
        conn_guard.id()
    );
}
