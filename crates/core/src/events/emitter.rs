//! Event emitter abstraction for decoupling services from transport.
//!
//! Services depend on the [`EventEmitter`] trait rather than concrete broadcast
//! channels, enabling testing and alternative transport implementations.

use super::{RoomEvent, SessionEvent};

/// Trait for emitting domain events without knowledge of transport.
///
/// Services use this trait to emit events, decoupling them from the
/// specifics of how events are delivered to clients (WebSocket, logging, etc.).
pub trait EventEmitter: Send + Sync {
    /// Emits a recording session lifecycle event.
    fn emit_session(&self, event: SessionEvent);

    /// Emits a room membership event.
    fn emit_room(&self, event: RoomEvent);
}

/// No-op emitter for testing or when no observer is attached.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_session(&self, _event: SessionEvent) {}

    fn emit_room(&self, _event: RoomEvent) {}
}

/// Logging emitter for debugging and development.
///
/// Logs all events at debug level.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_session(&self, event: SessionEvent) {
        log::debug!("[Events] session_event={:?}", event);
    }

    fn emit_room(&self, event: RoomEvent) {
        log::debug!("[Events] room_event={:?}", event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingEventEmitter {
        session_count: AtomicUsize,
        room_count: AtomicUsize,
    }

    impl CountingEventEmitter {
        fn new() -> Self {
            Self {
                session_count: AtomicUsize::new(0),
                room_count: AtomicUsize::new(0),
            }
        }
    }

    impl EventEmitter for CountingEventEmitter {
        fn emit_session(&self, _event: SessionEvent) {
            self.session_count.fetch_add(1, Ordering::SeqCst);
        }

        fn emit_room(&self, _event: RoomEvent) {
            self.room_count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn counting_emitter_tracks_events() {
        let emitter = Arc::new(CountingEventEmitter::new());

        emitter.emit_session(SessionEvent::Created {
            session_id: "s1".to_string(),
            timestamp: 0,
        });
        emitter.emit_session(SessionEvent::Closed {
            session_id: "s1".to_string(),
            timestamp: 0,
        });
        emitter.emit_room(RoomEvent::Joined {
            room_id: "r1".to_string(),
            participant_id: "p1".to_string(),
            timestamp: 0,
        });

        assert_eq!(emitter.session_count.load(Ordering::SeqCst), 2);
        assert_eq!(emitter.room_count.load(Ordering::SeqCst), 1);
    }
}
