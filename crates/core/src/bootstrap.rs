//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where all
//! services are instantiated and wired together. This pattern provides:
//!
//! - **Clarity**: All dependency relationships are visible in one place
//! - **Testability**: Easy to swap implementations for testing
//! - **Maintainability**: Service creation logic is isolated from usage

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::api::ws_connection::WsConnectionManager;
use crate::collaborators::{Authorizer, MetadataStore, NoopMetadataStore, PermissiveAuthorizer};
use crate::error::{CoreError, CoreResult};
use crate::events::{BroadcastEvent, BroadcastEventBridge};
use crate::room::RoomHub;
use crate::runtime::TokioSpawner;
use crate::session::SessionRegistry;
use crate::state::Config;
use crate::webrtc_peer::build_api;

/// Container for all bootstrapped services.
///
/// This struct holds all the wired services created during bootstrap. It's
/// consumed by the `api` module to build the final router state.
#[derive(Clone)]
pub struct BootstrappedServices {
    /// Active recording sessions.
    pub sessions: Arc<SessionRegistry>,
    /// Active signaling rooms.
    pub rooms: Arc<RoomHub>,
    /// Broadcast channel sender for real-time events.
    pub broadcast_tx: broadcast::Sender<BroadcastEvent>,
    /// Event bridge for emitting domain events to the WebSocket transport.
    pub event_bridge: Arc<BroadcastEventBridge>,
    /// Manages WebSocket connections (room sockets).
    pub ws_manager: Arc<WsConnectionManager>,
    /// Authorization policy for recording and viewing.
    pub authorizer: Arc<dyn Authorizer>,
    /// Catalog for finished recordings.
    pub metadata_store: Arc<dyn MetadataStore>,
    /// Shared WebRTC API instance (media engine, interceptors).
    pub webrtc_api: Arc<webrtc::api::API>,
    /// Task spawner for background operations (clock ticks, encoder drains).
    pub spawner: Arc<dyn crate::runtime::TaskSpawner>,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
    /// Resolved configuration.
    pub config: Config,
}

impl BootstrappedServices {
    /// The event bridge as a plain [`EventEmitter`], for services that only
    /// need to emit.
    #[must_use]
    pub fn events(&self) -> Arc<dyn crate::events::EventEmitter> {
        Arc::clone(&self.event_bridge) as Arc<dyn crate::events::EventEmitter>
    }

    /// Initiates graceful shutdown: signals cancellation, stops accepting
    /// new WebSocket traffic, and asks every in-flight recording session to
    /// stop, waiting (bounded by the flush timeout) for their pipelines to
    /// finalize so files on disk end with a proper container trailer.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");
        self.cancel_token.cancel();
        let closed = self.ws_manager.close_all();
        log::info!("[Bootstrap] Closed {} WebSocket connection(s)", closed);

        let draining = self.sessions.ids();
        if draining.is_empty() {
            return;
        }
        log::info!("[Bootstrap] Draining {} recording session(s)", draining.len());
        for id in &draining {
            if let Some(session) = self.sessions.get(id) {
                session.mark_stopping();
            }
        }
        let deadline = std::time::Duration::from_secs(self.config.encoder_flush_timeout_secs + 2);
        let drained = tokio::time::timeout(deadline, async {
            while !self.sessions.is_empty() {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            }
        })
        .await
        .is_ok();
        if drained {
            log::info!("[Bootstrap] All sessions finalized");
        } else {
            log::warn!(
                "[Bootstrap] {} session(s) still finalizing at exit; files may be truncated",
                self.sessions.len()
            );
        }
    }
}

/// Bootstraps all application services with their dependencies.
///
/// This is the composition root where all services are instantiated and
/// wired together.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the WebRTC API
/// cannot be constructed.
pub fn bootstrap_services(config: &Config) -> CoreResult<BootstrappedServices> {
    config
        .validate()
        .map_err(|e| CoreError::Internal(format!("invalid configuration: {e}")))?;

    std::fs::create_dir_all(&config.recordings_dir).map_err(|e| {
        CoreError::Internal(format!(
            "cannot create recordings dir {}: {e}",
            config.recordings_dir
        ))
    })?;

    let spawner: Arc<dyn crate::runtime::TaskSpawner> = Arc::new(TokioSpawner::current());
    let sessions = Arc::new(SessionRegistry::new(config.max_concurrent_sessions));
    let rooms = Arc::new(RoomHub::new());
    let ws_manager = Arc::new(WsConnectionManager::new());

    let (broadcast_tx, _) = broadcast::channel::<BroadcastEvent>(config.room_broadcast_capacity);
    let event_bridge = Arc::new(BroadcastEventBridge::with_sender(broadcast_tx.clone()));

    let webrtc_api =
        Arc::new(build_api().map_err(|e| CoreError::Internal(format!("build WebRTC API: {e}")))?);

    Ok(BootstrappedServices {
        sessions,
        rooms,
        broadcast_tx,
        event_bridge,
        ws_manager,
        authorizer: Arc::new(PermissiveAuthorizer),
        metadata_store: Arc::new(NoopMetadataStore),
        webrtc_api,
        spawner,
        cancel_token: CancellationToken::new(),
        config: config.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bootstrap_with_default_config_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.recordings_dir = dir.path().to_string_lossy().to_string();
        let services = bootstrap_services(&config).unwrap();
        assert_eq!(services.sessions.len(), 0);
    }

    #[tokio::test]
    async fn bootstrap_rejects_invalid_config() {
        let mut config = Config::default();
        config.max_concurrent_sessions = 0;
        assert!(bootstrap_services(&config).is_err());
    }
}
