//! Core application configuration.
//!
//! Provides [`Config`], the set of tunables that govern compositing,
//! mixing, session lifecycle, and room hub behavior. Defaults mirror the
//! fixed constants in [`crate::protocol_constants`]; operators may override
//! them for deployments with different capacity needs.

use serde::{Deserialize, Serialize};

use crate::protocol_constants::{
    DEFAULT_CONTAINER_EXT, ENCODER_FLUSH_TIMEOUT_SECS, NEGOTIATION_TIMEOUT_SECS,
    ROOM_BROADCAST_CAPACITY,
};

/// Configuration for the classroom streaming core.
///
/// All fields have sensible defaults matching [`crate::protocol_constants`].
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// Directory where finished recordings are written.
    pub recordings_dir: String,

    /// Container file extension for recordings (without the leading dot).
    pub container_ext: String,

    /// Maximum number of concurrent recording sessions.
    pub max_concurrent_sessions: usize,

    /// Time allowed for a session to reach `Recording` before `begin` fails
    /// (seconds).
    pub negotiation_timeout_secs: u64,

    /// Bounded duration for the encoder to flush and close on `end`
    /// (seconds).
    pub encoder_flush_timeout_secs: u64,

    /// Capacity of each room's broadcast channel.
    pub room_broadcast_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            recordings_dir: "recordings".to_string(),
            container_ext: DEFAULT_CONTAINER_EXT.to_string(),
            max_concurrent_sessions: 16,
            negotiation_timeout_secs: NEGOTIATION_TIMEOUT_SECS,
            encoder_flush_timeout_secs: ENCODER_FLUSH_TIMEOUT_SECS,
            room_broadcast_capacity: ROOM_BROADCAST_CAPACITY,
        }
    }
}

impl Config {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid field found.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent_sessions == 0 {
            return Err("max_concurrent_sessions must be >= 1".to_string());
        }
        if self.room_broadcast_capacity == 0 {
            return Err(
                "room_broadcast_capacity must be >= 1 (broadcast::channel panics on 0)"
                    .to_string(),
            );
        }
        if self.negotiation_timeout_secs == 0 {
            return Err("negotiation_timeout_secs must be >= 1".to_string());
        }
        Ok(())
    }
}
