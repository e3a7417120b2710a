//! Event system for real-time client communication.
//!
//! This module provides:
//! - [`EventEmitter`] trait for domain services to emit events
//! - Event types for recording sessions and room membership
//!
//! The actual transport implementation (the room's WebSocket broadcast) is
//! handled separately in the `api` module using [`BroadcastEventBridge`].

mod bridge;
mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use serde::Serialize;

/// Events broadcast to interested observers of the core's domain state.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum BroadcastEvent {
    /// Events from a recording session's lifecycle.
    Session(SessionEvent),
    /// Events from room membership changes.
    Room(RoomEvent),
}

/// Events related to a recording session's lifecycle.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    /// A session was created and entered `Negotiating`.
    Created {
        #[serde(rename = "sessionId")]
        session_id: String,
        timestamp: u64,
    },
    /// A session reached `Recording` (peer connected, first track attached).
    Recording {
        #[serde(rename = "sessionId")]
        session_id: String,
        timestamp: u64,
    },
    /// A session's video or audio source set changed (attach/detach).
    SourcesChanged {
        #[serde(rename = "sessionId")]
        session_id: String,
        #[serde(rename = "videoSources")]
        video_sources: usize,
        #[serde(rename = "audioSources")]
        audio_sources: usize,
        timestamp: u64,
    },
    /// A session finished and its file was closed.
    Closed {
        #[serde(rename = "sessionId")]
        session_id: String,
        timestamp: u64,
    },
}

/// Events related to room membership changes.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RoomEvent {
    /// A participant joined a room.
    Joined {
        #[serde(rename = "roomId")]
        room_id: String,
        #[serde(rename = "participantId")]
        participant_id: String,
        timestamp: u64,
    },
    /// A participant left a room.
    Left {
        #[serde(rename = "roomId")]
        room_id: String,
        #[serde(rename = "participantId")]
        participant_id: String,
        timestamp: u64,
    },
}

impl From<SessionEvent> for BroadcastEvent {
    fn from(event: SessionEvent) -> Self {
        BroadcastEvent::Session(event)
    }
}

impl From<RoomEvent> for BroadcastEvent {
    fn from(event: RoomEvent) -> Self {
        BroadcastEvent::Room(event)
    }
}
