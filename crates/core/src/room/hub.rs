//! Join/leave/relay logic for room-scoped signaling.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::Participant;
use crate::utils::new_id;

/// Capacity of each participant's inbox channel.
const PARTICIPANT_INBOX_CAPACITY: usize = 64;

/// Server-originated room messages.
///
/// These are the only message kinds the hub itself produces; everything
/// else on the wire is a client payload relayed opaquely (with `sender_id`
/// rewritten).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SystemMessage {
    /// First message every participant receives: their server-assigned id.
    AssignId { id: String },
    /// Second message: ids of everyone already in the room.
    ExistingParticipants { ids: Vec<String> },
    /// Someone else joined.
    NewParticipant { id: String },
    /// Someone else left.
    ParticipantLeft { id: String },
}

impl SystemMessage {
    fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// One active room: a set of participants indexed by id.
pub struct Room {
    participants: DashMap<String, Participant>,
}

impl Room {
    fn new() -> Self {
        Self {
            participants: DashMap::new(),
        }
    }

    #[must_use]
    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    /// Snapshot of the member list, so sends never happen while holding a
    /// map shard lock.
    fn snapshot(&self) -> Vec<(String, mpsc::Sender<Value>)> {
        self.participants
            .iter()
            .map(|e| (e.id.clone(), e.value().inbox.clone()))
            .collect()
    }
}

/// Registry of all active rooms, keyed by room id.
///
/// Rooms are created lazily on first join and removed as soon as their
/// last participant leaves. Participant ids are allocated here (never by
/// the client) and are unique for the process lifetime, so a forged or
/// stale id can at worst address nobody.
pub struct RoomHub {
    rooms: DashMap<String, Arc<Room>>,
    /// Which room each live participant is in; participants never migrate.
    participant_rooms: DashMap<String, String>,
}

impl RoomHub {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            participant_rooms: DashMap::new(),
        }
    }

    /// Adds a new participant to `room_id`, creating the room if absent.
    ///
    /// Returns the assigned participant id and the receiving half of their
    /// inbox. By the time this returns, the inbox already holds the
    /// `assign_id` and `existing_participants` messages, and everyone else
    /// in the room has been sent `new_participant`.
    pub fn join(&self, room_id: &str) -> (String, mpsc::Receiver<Value>) {
        let participant_id = new_id();
        let (tx, rx) = mpsc::channel(PARTICIPANT_INBOX_CAPACITY);

        let room = self
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Arc::new(Room::new()))
            .clone();

        let existing: Vec<String> = room.participants.iter().map(|e| e.id.clone()).collect();

        let _ = tx.try_send(
            SystemMessage::AssignId {
                id: participant_id.clone(),
            }
            .to_value(),
        );
        let _ = tx.try_send(SystemMessage::ExistingParticipants { ids: existing }.to_value());

        room.participants.insert(
            participant_id.clone(),
            Participant::new(participant_id.clone(), tx),
        );
        self.participant_rooms
            .insert(participant_id.clone(), room_id.to_string());

        self.broadcast(
            &room,
            Some(&participant_id),
            SystemMessage::NewParticipant {
                id: participant_id.clone(),
            }
            .to_value(),
        );

        log::info!("[RoomHub] Participant {participant_id} joined room {room_id}");
        (participant_id, rx)
    }

    /// Removes a participant, announcing `participant_left` to whoever
    /// remains and dropping the room entirely once it has no participants
    /// left, so an abandoned room doesn't linger in the registry forever.
    pub fn leave(&self, participant_id: &str) {
        let Some((_, room_id)) = self.participant_rooms.remove(participant_id) else {
            return;
        };
        let Some(room) = self.rooms.get(&room_id).map(|e| Arc::clone(e.value())) else {
            return;
        };
        if room.participants.remove(participant_id).is_none() {
            return;
        }
        log::info!("[RoomHub] Participant {participant_id} left room {room_id}");

        if room.participants.is_empty() {
            self.rooms
                .remove_if(&room_id, |_, r| r.participants.is_empty());
            return;
        }

        self.broadcast(
            &room,
            None,
            SystemMessage::ParticipantLeft {
                id: participant_id.to_string(),
            }
            .to_value(),
        );
    }

    /// Relays a client payload from `sender_id` into their room.
    ///
    /// If the payload carries a `target_id`, the message goes only to that
    /// participant; a target who already left makes this a silent no-op,
    /// since races between relay and disconnect are routine, not errors.
    /// Without a target, the payload goes to every other room member. In
    /// both cases `sender_id` is written into the outgoing payload,
    /// replacing anything the client put there, and `target_id` is
    /// stripped - routing metadata is not the recipient's business.
    ///
    /// A sender who is not in any room (already disconnected) is also a
    /// no-op.
    pub fn relay(&self, sender_id: &str, mut payload: serde_json::Map<String, Value>) {
        let Some(room_id) = self
            .participant_rooms
            .get(sender_id)
            .map(|e| e.value().clone())
        else {
            return;
        };
        let Some(room) = self.rooms.get(&room_id).map(|e| Arc::clone(e.value())) else {
            return;
        };

        let target = payload
            .remove("target_id")
            .and_then(|v| v.as_str().map(str::to_string));
        payload.insert("sender_id".to_string(), json!(sender_id));
        let message = Value::Object(payload);

        match target {
            Some(target_id) => {
                let send_failed = room
                    .participants
                    .get(&target_id)
                    .is_some_and(|p| !p.send(message));
                if send_failed {
                    self.leave(&target_id);
                }
            }
            None => self.broadcast(&room, Some(sender_id), message),
        }
    }

    /// Sends `message` to every room member except `skip_id`. Receivers
    /// whose inbox turned out to be closed are removed via [`Self::leave`]
    /// afterwards; one dead receiver never blocks delivery to the rest.
    fn broadcast(&self, room: &Room, skip_id: Option<&str>, message: Value) {
        let mut dead: Vec<String> = Vec::new();
        for (id, inbox) in room.snapshot() {
            if Some(id.as_str()) == skip_id {
                continue;
            }
            if let Err(mpsc::error::TrySendError::Closed(_)) = inbox.try_send(message.clone()) {
                dead.push(id);
            }
        }
        for id in dead {
            self.leave(&id);
        }
    }

    #[must_use]
    pub fn room_exists(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Number of participants currently in `room_id` (0 if absent).
    #[must_use]
    pub fn participant_count(&self, room_id: &str) -> usize {
        self.rooms
            .get(room_id)
            .map_or(0, |r| r.participant_count())
    }
}

impl Default for RoomHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> serde_json::Map<String, Value> {
        value.as_object().cloned().expect("test payload is an object")
    }

    fn kind(message: &Value) -> &str {
        message.get("type").and_then(Value::as_str).unwrap_or("")
    }

    #[tokio::test]
    async fn joiner_receives_assign_id_then_existing_participants() {
        let hub = RoomHub::new();
        let (a, _a_rx) = hub.join("room1");
        let (_b, mut b_rx) = hub.join("room1");

        let first = b_rx.recv().await.unwrap();
        assert_eq!(kind(&first), "assign_id");
        let second = b_rx.recv().await.unwrap();
        assert_eq!(kind(&second), "existing_participants");
        let ids: Vec<&str> = second["ids"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(ids, vec![a.as_str()]);
    }

    #[tokio::test]
    async fn earlier_members_observe_new_participant() {
        let hub = RoomHub::new();
        let (_a, mut a_rx) = hub.join("room1");
        // Drain A's own join messages.
        assert_eq!(kind(&a_rx.recv().await.unwrap()), "assign_id");
        assert_eq!(kind(&a_rx.recv().await.unwrap()), "existing_participants");

        let (b, _b_rx) = hub.join("room1");
        let (c, _c_rx) = hub.join("room1");

        let join_b = a_rx.recv().await.unwrap();
        assert_eq!(kind(&join_b), "new_participant");
        assert_eq!(join_b["id"], json!(b));
        let join_c = a_rx.recv().await.unwrap();
        assert_eq!(join_c["id"], json!(c));
    }

    #[tokio::test]
    async fn leave_announces_participant_left_and_drops_empty_room() {
        let hub = RoomHub::new();
        let (a, mut a_rx) = hub.join("room1");
        let (b, _b_rx) = hub.join("room1");
        // Drain A's queue: assign_id, existing, new_participant(B).
        for _ in 0..3 {
            a_rx.recv().await.unwrap();
        }

        hub.leave(&b);
        let left = a_rx.recv().await.unwrap();
        assert_eq!(kind(&left), "participant_left");
        assert_eq!(left["id"], json!(b));
        assert!(hub.room_exists("room1"));

        hub.leave(&a);
        assert!(!hub.room_exists("room1"));
    }

    #[tokio::test]
    async fn broadcast_relay_reaches_everyone_except_sender() {
        let hub = RoomHub::new();
        let (a, mut a_rx) = hub.join("room1");
        let (_b, mut b_rx) = hub.join("room1");
        let (_c, mut c_rx) = hub.join("room1");

        hub.relay(&a, object(json!({"type": "chat", "data": {"text": "hi"}})));

        // Skip join traffic until the chat arrives.
        let to_b = loop {
            let m = b_rx.recv().await.unwrap();
            if kind(&m) == "chat" {
                break m;
            }
        };
        assert_eq!(to_b["sender_id"], json!(a));
        assert_eq!(to_b["data"]["text"], json!("hi"));

        let to_c = loop {
            let m = c_rx.recv().await.unwrap();
            if kind(&m) == "chat" {
                break m;
            }
        };
        assert_eq!(to_c["sender_id"], json!(a));

        // A gets join traffic but never its own relay back.
        while let Ok(m) = a_rx.try_recv() {
            assert_ne!(kind(&m), "chat");
        }
    }

    #[tokio::test]
    async fn targeted_relay_reaches_only_target_and_strips_target_id() {
        let hub = RoomHub::new();
        let (a, _a_rx) = hub.join("room1");
        let (b, mut b_rx) = hub.join("room1");
        let (_c, mut c_rx) = hub.join("room1");

        hub.relay(
            &a,
            object(json!({"type": "signal", "target_id": b, "data": {"x": 1}})),
        );

        let to_b = loop {
            let m = b_rx.recv().await.unwrap();
            if kind(&m) == "signal" {
                break m;
            }
        };
        assert_eq!(to_b["sender_id"], json!(a));
        assert_eq!(to_b["data"]["x"], json!(1));
        assert!(to_b.get("target_id").is_none());

        while let Ok(m) = c_rx.try_recv() {
            assert_ne!(kind(&m), "signal");
        }
    }

    #[tokio::test]
    async fn client_supplied_sender_id_is_overwritten() {
        let hub = RoomHub::new();
        let (a, _a_rx) = hub.join("room1");
        let (_b, mut b_rx) = hub.join("room1");

        hub.relay(
            &a,
            object(json!({"type": "signal", "sender_id": "spoofed", "data": {"x": 2}})),
        );

        let msg = loop {
            let m = b_rx.recv().await.unwrap();
            if kind(&m) == "signal" {
                break m;
            }
        };
        assert_eq!(msg["sender_id"], json!(a));
    }

    #[tokio::test]
    async fn relay_to_absent_target_is_silent_noop() {
        let hub = RoomHub::new();
        let (a, _a_rx) = hub.join("room1");
        let (_b, mut b_rx) = hub.join("room1");

        hub.relay(
            &a,
            object(json!({"type": "signal", "target_id": "nobody", "data": {}})),
        );

        while let Ok(m) = b_rx.try_recv() {
            assert_ne!(kind(&m), "signal");
        }
    }

    #[tokio::test]
    async fn relay_from_departed_sender_is_noop() {
        let hub = RoomHub::new();
        let (a, _a_rx) = hub.join("room1");
        let (_b, mut b_rx) = hub.join("room1");
        hub.leave(&a);

        hub.relay(&a, object(json!({"type": "chat"})));

        while let Ok(m) = b_rx.try_recv() {
            assert_ne!(kind(&m), "chat");
        }
    }

    #[tokio::test]
    async fn departed_participant_receives_nothing_further() {
        let hub = RoomHub::new();
        let (a, _a_rx) = hub.join("room1");
        let (b, mut b_rx) = hub.join("room1");
        let (_c, _c_rx) = hub.join("room1");

        hub.leave(&b);
        while b_rx.try_recv().is_ok() {}

        hub.relay(&a, object(json!({"type": "chat"})));
        assert!(b_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_inbox_triggers_removal_on_broadcast() {
        let hub = RoomHub::new();
        let (a, _a_rx) = hub.join("room1");
        let (b, b_rx) = hub.join("room1");
        drop(b_rx);

        hub.relay(&a, object(json!({"type": "chat"})));
        assert_eq!(hub.participant_count("room1"), 1);
        // A second relay targeted at the evicted participant is a no-op.
        hub.relay(&a, object(json!({"type": "chat", "target_id": b})));
    }
}
