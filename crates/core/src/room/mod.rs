//! Room hub: signaling relay for participants joining a shared room.
//!
//! Unlike a [`crate::session::RecordingSession`] (which ingests and records
//! media), a room is purely a relay: participants exchange SDP/ICE and
//! control messages with each other, attributed by sender id, either
//! targeted at one recipient or broadcast to the rest of the room.

mod hub;

pub use hub::{Room, RoomHub, SystemMessage};

use tokio::sync::mpsc;

/// A connected room participant: their server-assigned id and the sending
/// half of their connection's inbox.
pub struct Participant {
    pub id: String,
    inbox: mpsc::Sender<serde_json::Value>,
}

impl Participant {
    #[must_use]
    pub fn new(id: String, inbox: mpsc::Sender<serde_json::Value>) -> Self {
        Self { id, inbox }
    }

    /// Queues a message for delivery, at-most-once.
    ///
    /// Returns `false` if the inbox is closed (the participant's connection
    /// handler is gone); a full inbox just drops the message.
    fn send(&self, message: serde_json::Value) -> bool {
        match self.inbox.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::warn!("[RoomHub] Inbox full for participant {}, dropping message", self.id);
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}
