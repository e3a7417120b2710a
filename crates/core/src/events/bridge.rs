//! Bridge implementation that maps domain events to broadcast transport.
//!
//! The [`BroadcastEventBridge`] lives at the boundary between domain services
//! and transport concerns, mapping typed domain events onto a
//! `tokio::sync::broadcast` channel that WebSocket handlers subscribe to.

use tokio::sync::broadcast;

use super::emitter::EventEmitter;
use super::{BroadcastEvent, RoomEvent, SessionEvent};

/// Bridges domain events to the room WebSocket broadcast channel.
///
/// This adapter implements [`EventEmitter`] by forwarding events to a
/// `tokio::sync::broadcast` channel. Room WS handlers subscribe to the same
/// channel to push events to connected participants.
///
/// # Thread Safety
///
/// The bridge is `Send + Sync` and can be shared across async tasks.
#[derive(Clone)]
pub struct BroadcastEventBridge {
    tx: broadcast::Sender<BroadcastEvent>,
}

impl BroadcastEventBridge {
    /// Creates a new bridge with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Creates a new bridge wrapping an existing broadcast sender.
    pub fn with_sender(tx: broadcast::Sender<BroadcastEvent>) -> Self {
        Self { tx }
    }

    /// Returns a new receiver for the broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.tx.subscribe()
    }

    /// Returns a reference to the broadcast sender.
    pub fn sender(&self) -> &broadcast::Sender<BroadcastEvent> {
        &self.tx
    }
}

/// Generates an [`EventEmitter`] method that sends to the broadcast channel.
macro_rules! impl_emit {
    ($method:ident, $event_ty:ty, $variant:ident) => {
        fn $method(&self, event: $event_ty) {
            if let Err(e) = self.tx.send(BroadcastEvent::$variant(event)) {
                log::trace!("[EventBridge] No broadcast receivers: {}", e);
            }
        }
    };
}

impl EventEmitter for BroadcastEventBridge {
    impl_emit!(emit_session, SessionEvent, Session);
    impl_emit!(emit_room, RoomEvent, Room);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_session_reaches_subscriber() {
        let bridge = BroadcastEventBridge::new(8);
        let mut rx = bridge.subscribe();

        bridge.emit_session(SessionEvent::Created {
            session_id: "s1".to_string(),
            timestamp: 0,
        });

        let received = rx.try_recv().expect("event should be delivered");
        match received {
            BroadcastEvent::Session(SessionEvent::Created { session_id, .. }) => {
                assert_eq!(session_id, "s1");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn emit_with_no_subscribers_does_not_panic() {
        let bridge = BroadcastEventBridge::new(8);
        bridge.emit_room(RoomEvent::Left {
            room_id: "r1".to_string(),
            participant_id: "p1".to_string(),
            timestamp: 0,
        });
    }
}
