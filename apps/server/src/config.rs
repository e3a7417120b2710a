//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::net::SocketAddr;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP/WebSocket server binds to.
    /// Override: `CLASSROOM_BIND_ADDR`
    pub bind_addr: SocketAddr,

    /// Directory where finished recordings are written.
    /// Override: `CLASSROOM_RECORDINGS_DIR`
    pub recordings_dir: String,

    /// Container file extension for recordings (without the leading dot).
    pub container_ext: String,

    /// Maximum number of concurrent recording sessions.
    /// Override: `CLASSROOM_MAX_SESSIONS`
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

impl Default for ServerConfig {
    fn default() -> Self {
        let core = classroom_core::Config::default();
        Self {
            bind_addr: "0.0.0.0:8080".parse().expect("valid default bind addr"),
            recordings_dir: core.recordings_dir,
            container_ext: core.container_ext,
            max_concurrent_sessions: core.max_concurrent_sessions,
            negotiation_timeout_secs: core.negotiation_timeout_secs,
            encoder_flush_timeout_secs: core.encoder_flush_timeout_secs,
            room_broadcast_capacity: core.room_broadcast_capacity,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("CLASSROOM_BIND_ADDR") {
            if let Ok(addr) = val.parse() {
                self.bind_addr = addr;
            }
        }

        if let Ok(val) = std::env::var("CLASSROOM_RECORDINGS_DIR") {
            self.recordings_dir = val;
        }

        if let Ok(val) = std::env::var("CLASSROOM_MAX_SESSIONS") {
            if let Ok(n) = val.parse() {
                self.max_concurrent_sessions = n;
            }
        }
    }

    /// Converts to classroom-core's Config type.
    pub fn to_core_config(&self) -> classroom_core::Config {
        classroom_core::Config {
            recordings_dir: self.recordings_dir.clone(),
            container_ext: self.container_ext.clone(),
            max_concurrent_sessions: self.max_concurrent_sessions,
            negotiation_timeout_secs: self.negotiation_timeout_secs,
            encoder_flush_timeout_secs: self.encoder_flush_timeout_secs,
            room_broadcast_capacity: self.room_broadcast_capacity,
        }
    }
}
