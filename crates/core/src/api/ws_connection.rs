//! Room socket tracking.
//!
//! Every open room WebSocket registers here with the room and participant
//! it serves. The manager exists so shutdown can force-close all sockets
//! without the room hub ever touching transport handles; a
//! [`RoomSocketGuard`] unregisters on drop, so a handler that exits any
//! way at all - clean close, error, panic - leaves no stale entry behind.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

/// Who a tracked socket serves.
struct RoomSocket {
    room_id: String,
    participant_id: String,
}

/// Registry of open room sockets.
///
/// Thread-safe, shared across all WebSocket handlers. Force-close works
/// through a hierarchical cancellation token: each socket gets a child of
/// the current global token, and cancelling the parent reaches them all.
pub struct WsConnectionManager {
    sockets: DashMap<u64, RoomSocket>,
    next_id: AtomicU64,
    /// Parent token for force-close. Replaced wholesale after `close_all`
    /// so sockets opened afterwards start from a fresh, uncancelled token.
    global_cancel: RwLock<CancellationToken>,
}

impl WsConnectionManager {
    pub fn new() -> Self {
        Self {
            sockets: DashMap::new(),
            next_id: AtomicU64::new(1),
            global_cancel: RwLock::new(CancellationToken::new()),
        }
    }

    /// Tracks the socket serving `participant_id` in `room_id`, returning
    /// a guard that unregisters it on drop.
    pub fn register(self: &Arc<Self>, room_id: &str, participant_id: &str) -> RoomSocketGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel_token = self.global_cancel.read().child_token();

        self.sockets.insert(
            id,
            RoomSocket {
                room_id: room_id.to_string(),
                participant_id: participant_id.to_string(),
            },
        );
        log::debug!(
            "[RoomSocket] #{id} opened for {participant_id} in room {room_id} ({} open)",
            self.sockets.len()
        );

        RoomSocketGuard {
            id,
            manager: Arc::clone(self),
            cancel_token,
        }
    }

    fn unregister(&self, id: u64) {
        if let Some((_, socket)) = self.sockets.remove(&id) {
            log::debug!(
                "[RoomSocket] #{id} closed for {} in room {} ({} open)",
                socket.participant_id,
                socket.room_id,
                self.sockets.len()
            );
        }
    }

    /// Open sockets across all rooms.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.sockets.len()
    }

    /// Open sockets currently serving `room_id`.
    #[must_use]
    pub fn connections_in_room(&self, room_id: &str) -> usize {
        self.sockets
            .iter()
            .filter(|e| e.room_id == room_id)
            .count()
    }

    /// Force-closes every tracked socket by cancelling the shared parent
    /// token, then installs a fresh token so the hub keeps accepting
    /// participants afterwards. Returns how many sockets were signalled.
    pub fn close_all(&self) -> usize {
        let count = self.sockets.len();
        if count > 0 {
            log::info!("[RoomSocket] Force-closing {count} socket(s)");
            let mut guard = self.global_cancel.write();
            guard.cancel();
            *guard = CancellationToken::new();
        }
        count
    }
}

impl Default for WsConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for one tracked room socket.
pub struct RoomSocketGuard {
    id: u64,
    manager: Arc<WsConnectionManager>,
    /// Child token for this socket; cancelled on force-close.
    cancel_token: CancellationToken,
}

impl RoomSocketGuard {
    /// Numeric socket id, for log correlation.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Token to select on alongside the socket's own traffic:
    /// ```ignore
    /// tokio::select! {
    ///     _ = cancel_token.cancelled() => break,
    ///     // ... other branches
    /// }
    /// ```
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }
}

impl Drop for RoomSocketGuard {
    fn drop(&mut self) {
        self.manager.unregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_drop_track_counts() {
        let manager = Arc::new(WsConnectionManager::new());
        let a = manager.register("room1", "alice");
        let b = manager.register("room1", "bob");
        let c = manager.register("room2", "carol");
        assert_eq!(manager.connection_count(), 3);
        assert_eq!(manager.connections_in_room("room1"), 2);
        assert_eq!(manager.connections_in_room("room2"), 1);
        assert_ne!(a.id(), b.id());

        drop(b);
        assert_eq!(manager.connections_in_room("room1"), 1);
        drop(a);
        drop(c);
        assert_eq!(manager.connection_count(), 0);
    }

    #[test]
    fn close_all_cancels_open_sockets() {
        let manager = Arc::new(WsConnectionManager::new());
        let guard = manager.register("room1", "alice");
        assert!(!guard.cancel_token().is_cancelled());

        assert_eq!(manager.close_all(), 1);
        assert!(guard.cancel_token().is_cancelled());
    }

    #[test]
    fn sockets_after_close_all_start_uncancelled() {
        let manager = Arc::new(WsConnectionManager::new());
        let old = manager.register("room1", "alice");
        manager.close_all();

        let fresh = manager.register("room1", "bob");
        assert!(old.cancel_token().is_cancelled());
        assert!(!fresh.cancel_token().is_cancelled());
    }

    #[test]
    fn close_all_with_nothing_open_is_a_noop() {
        let manager = Arc::new(WsConnectionManager::new());
        assert_eq!(manager.close_all(), 0);
    }
}
