//! Classroom streaming core - shared library for the ingestion, compositing,
//! and recording service.
//!
//! This crate ingests per-participant audio/video over WebRTC, composites
//! video into a single picture-in-picture canvas, mixes audio, and records
//! the result to a container file. A separate room hub relays signaling
//! messages (SDP offers/answers, ICE candidates) between participants who
//! are not necessarily being recorded together.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`runtime`]: Task spawning abstraction for async runtime independence
//! - [`events`]: Event system for real-time client notification
//! - [`state`]: Core application configuration
//! - [`clock`]: Frame/audio tick pacemaker
//! - [`video`]: Frame buffers and the PiP compositor
//! - [`audio`]: Per-source buffers and the averaging mixer
//! - [`session`]: Recording session state machine and registry
//! - [`room`]: Signaling room hub (join/leave/relay)
//! - [`webrtc_peer`]: WebRTC peer connection negotiation and RTP ingest
//! - [`decoder`]: RTP depacketization and media decode
//! - [`encoder`]: Container file encode
//! - [`ingest`]: Wires decoded media into a recording session
//! - [`pipeline`]: Drives the composite/mix/encode loop for a session
//! - [`collaborators`]: Authorization and metadata storage seams
//! - [`bootstrap`]: Composition root wiring all services together
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! The crate defines traits to decouple core logic from the hosting
//! process:
//!
//! - [`TaskSpawner`](runtime::TaskSpawner): Spawning background tasks
//! - [`EventEmitter`](events::EventEmitter): Emitting domain events
//! - [`Authorizer`](collaborators::Authorizer): Recording/viewing policy
//! - [`MetadataStore`](collaborators::MetadataStore): Finished-recording catalog
//!
//! Each trait has a default implementation suitable for a standalone
//! server; a host embedding this crate may supply its own.

#![warn(clippy::all)]

pub mod api;
pub mod audio;
pub mod bootstrap;
pub mod clock;
pub mod collaborators;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod events;
pub mod ingest;
pub mod pipeline;
pub mod protocol_constants;
pub mod room;
pub mod runtime;
pub mod session;
pub mod state;
pub mod utils;
pub mod video;
pub mod webrtc_peer;

pub use audio::{mix, AudioFrame, AudioSource};
pub use bootstrap::{bootstrap_services, BootstrappedServices};
pub use collaborators::{Authorizer, MetadataStore};
pub use error::{CoreError, CoreResult};
pub use events::{
    BroadcastEvent, BroadcastEventBridge, EventEmitter, RoomEvent, SessionEvent,
};
pub use room::{Participant, RoomHub};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use session::{RecordingSession, SessionRegistry, SessionState};
pub use state::Config;
pub use utils::{new_id, now_millis};
pub use video::{compose, VideoFrame, VideoSource};

pub use api::{start_server, AppState, ServerError, WsConnectionManager};
