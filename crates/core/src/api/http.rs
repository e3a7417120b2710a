//! HTTP route handlers for the recording lifecycle.
//!
//! All handlers are thin - they delegate to services for business logic.
//! Two endpoints cover the whole lifecycle: `POST /recordings` negotiates a
//! new session from an SDP offer, `POST /recordings/{id}/stop` finalizes
//! it. There is no authenticated stop: knowing the session id is the
//! capability, and only the response to `begin` ever contains it.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::header;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::error::{CoreError, CoreResult};
use crate::events::{EventEmitter, SessionEvent};
use crate::ingest::SessionIngestSink;
use crate::pipeline;
use crate::protocol_constants::APP_NAME;
use crate::session::SessionState;
use crate::utils::now_millis;
use crate::webrtc_peer::IngestPeer;

/// Routes mounted under the HTTP recording API.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/recordings", post(begin_recording))
        .route("/recordings/{session_id}/stop", post(stop_recording))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    name: &'static str,
    version: &'static str,
    active_sessions: usize,
}

/// `GET /health`: liveness probe with a summary of in-flight work.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        name: APP_NAME,
        version: env!("CARGO_PKG_VERSION"),
        active_sessions: state.services.sessions.len(),
    })
}

/// Extracts the caller's principal id from a `Bearer` token.
///
/// Credential verification is the embedding platform's concern; from the
/// core's perspective the token *is* the principal identity, and the
/// [`Authorizer`](crate::collaborators::Authorizer) decides what that
/// principal may do.
fn bearer_principal(headers: &HeaderMap) -> CoreResult<String> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or_else(|| CoreError::Unauthenticated("missing Bearer token".to_string()))?;
    if token.is_empty() {
        return Err(CoreError::Unauthenticated("empty Bearer token".to_string()));
    }
    Ok(token.to_string())
}

#[derive(Debug, Deserialize)]
struct BeginRequest {
    sdp: String,
    #[serde(rename = "type")]
    kind: String,
    division_id: String,
}

#[derive(Debug, Serialize)]
struct BeginResponse {
    sdp: String,
    #[serde(rename = "type")]
    kind: String,
    session_id: String,
}

/// `POST /recordings`: negotiates a new recording session.
///
/// Takes the presenter's SDP offer, answers it, and spawns the session
/// pipeline. Tracks attach asynchronously once the peer connection comes
/// up; a session that never produces media within the negotiation timeout
/// is torn down with no file persisted.
async fn begin_recording(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<BeginRequest>,
) -> CoreResult<Json<BeginResponse>> {
    let principal_id = bearer_principal(&headers)?;

    if req.kind != "offer" {
        return Err(CoreError::BadOffer(format!(
            "expected type \"offer\", got {:?}",
            req.kind
        )));
    }
    if req.sdp.trim().is_empty() {
        return Err(CoreError::BadOffer("empty SDP".to_string()));
    }

    let allowed = state
        .services
        .authorizer
        .may_record(&principal_id, &req.division_id)
        .await?;
    if !allowed {
        return Err(CoreError::Authorization(format!(
            "{principal_id} may not record division {}",
            req.division_id
        )));
    }

    if !state
        .services
        .metadata_store
        .division_exists(&req.division_id)
        .await?
    {
        return Err(CoreError::NotFound(format!("division {}", req.division_id)));
    }

    let session = state.services.sessions.begin(
        &principal_id,
        &req.division_id,
        &state.services.config.recordings_dir,
        &state.services.config.container_ext,
    )?;

    let sink = Arc::new(SessionIngestSink::new(
        Arc::clone(&session),
        state.services.events(),
    ));
    let negotiated = async {
        let peer = IngestPeer::new(&state.services.webrtc_api, sink).await?;
        let answer = peer.negotiate(&req.sdp).await?;
        Ok::<_, CoreError>((peer, answer))
    }
    .await;

    let (peer, answer) = match negotiated {
        Ok(pair) => pair,
        Err(e) => {
            // Negotiation never completed; the session was never visible to
            // the caller, so it just disappears.
            session.mark_closed();
            state.services.sessions.remove(&session.id);
            return Err(e);
        }
    };
    session.hold_peer(peer);

    pipeline::spawn(
        &state.services.spawner,
        Arc::clone(&session),
        Arc::clone(&state.services.sessions),
        state.services.events(),
        Duration::from_secs(state.services.config.negotiation_timeout_secs),
        Duration::from_secs(state.services.config.encoder_flush_timeout_secs),
    );

    state.services.event_bridge.emit_session(SessionEvent::Created {
        session_id: session.id.clone(),
        timestamp: now_millis(),
    });
    log::info!(
        "[Session] {} negotiating for division {} (principal {principal_id})",
        session.id,
        req.division_id
    );

    Ok(Json(BeginResponse {
        sdp: answer,
        kind: "answer".to_string(),
        session_id: session.id.clone(),
    }))
}

#[derive(Debug, Serialize)]
struct StopResponse {
    message: String,
}

/// `POST /recordings/{session_id}/stop`: finalizes a session.
///
/// Stops the tick loop, closes the peer connection, waits for the encoder
/// to flush (bounded), catalogs the finished file, and answers once the
/// session is gone from the registry. A second stop for the same id - or a
/// stop racing another stop - gets `NotFound`.
async fn stop_recording(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> CoreResult<Json<StopResponse>> {
    let session = state
        .services
        .sessions
        .get(&session_id)
        .ok_or_else(|| CoreError::NotFound(format!("session {session_id}")))?;

    if matches!(session.state(), SessionState::Stopping | SessionState::Closed) {
        // Someone else already consumed this id.
        return Err(CoreError::NotFound(format!("session {session_id}")));
    }
    session.mark_stopping();
    if let Some(peer) = session.take_peer() {
        let _ = peer.close().await;
    }

    // The pipeline owns finalization; wait (bounded) for it to reach
    // Closed. Its own flush timeout is strictly tighter than this margin.
    let wait_limit =
        Duration::from_secs(state.services.config.encoder_flush_timeout_secs) + Duration::from_secs(5);
    let mut state_rx = session.watch_state();
    let finalized = tokio::time::timeout(wait_limit, async {
        while *state_rx.borrow_and_update() != SessionState::Closed {
            if state_rx.changed().await.is_err() {
                break;
            }
        }
    })
    .await
    .is_ok();
    if !finalized {
        return Err(CoreError::Internal(format!(
            "session {session_id} did not finalize within {wait_limit:?}"
        )));
    }

    match session.take_finalize() {
        Some(Ok(Some(path))) => {
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.to_string_lossy().to_string());
            let video_id = state
                .services
                .metadata_store
                .record_video(&filename, &session.division_id, now_millis())
                .await?;
            log::info!(
                "[Session] {session_id} finalized to {filename} (video {video_id})"
            );
            Ok(Json(StopResponse {
                message: format!("recording saved as {filename}"),
            }))
        }
        Some(Ok(None)) => Ok(Json(StopResponse {
            message: "recording stopped before any media arrived; nothing was saved".to_string(),
        })),
        Some(Err(e)) => Err(e),
        None => Err(CoreError::Internal(format!(
            "session {session_id} closed without a finalize outcome"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::bootstrap::{bootstrap_services, BootstrappedServices};
    use crate::collaborators::{Authorizer, MetadataStore};
    use crate::state::Config;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, value.parse().unwrap());
        headers
    }

    fn test_services(dir: &std::path::Path) -> BootstrappedServices {
        let mut config = Config::default();
        config.recordings_dir = dir.to_string_lossy().to_string();
        bootstrap_services(&config).unwrap()
    }

    fn begin_request(division_id: &str) -> BeginRequest {
        BeginRequest {
            sdp: "v=0\r\n".to_string(),
            kind: "offer".to_string(),
            division_id: division_id.to_string(),
        }
    }

    struct DenyAll;

    #[async_trait]
    impl Authorizer for DenyAll {
        async fn may_record(&self, _p: &str, _d: &str) -> CoreResult<bool> {
            Ok(false)
        }
        async fn may_view(&self, _p: &str, _d: &str) -> CoreResult<bool> {
            Ok(false)
        }
    }

    struct NoDivisions;

    #[async_trait]
    impl MetadataStore for NoDivisions {
        async fn division_exists(&self, _d: &str) -> CoreResult<bool> {
            Ok(false)
        }
        async fn record_video(&self, _f: &str, _d: &str, _t: u64) -> CoreResult<String> {
            Ok("unused".to_string())
        }
    }

    #[test]
    fn bearer_principal_extracts_token() {
        let headers = headers_with("Bearer teacher-1");
        assert_eq!(bearer_principal(&headers).unwrap(), "teacher-1");
    }

    #[test]
    fn missing_authorization_is_unauthenticated() {
        let err = bearer_principal(&HeaderMap::new()).unwrap_err();
        assert!(matches!(err, CoreError::Unauthenticated(_)));
    }

    #[test]
    fn non_bearer_scheme_is_unauthenticated() {
        let err = bearer_principal(&headers_with("Basic dXNlcg==")).unwrap_err();
        assert!(matches!(err, CoreError::Unauthenticated(_)));
    }

    #[test]
    fn empty_token_is_unauthenticated() {
        let err = bearer_principal(&headers_with("Bearer ")).unwrap_err();
        assert!(matches!(err, CoreError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn begin_without_token_is_rejected_before_any_session_exists() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(Arc::new(test_services(dir.path())));

        let result = begin_recording(
            State(state.clone()),
            HeaderMap::new(),
            Json(begin_request("div-1")),
        )
        .await;

        assert!(matches!(result.unwrap_err(), CoreError::Unauthenticated(_)));
        assert!(state.services.sessions.is_empty());
    }

    #[tokio::test]
    async fn unauthorized_begin_creates_no_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut services = test_services(dir.path());
        services.authorizer = Arc::new(DenyAll);
        let state = AppState::new(Arc::new(services));

        let result = begin_recording(
            State(state.clone()),
            headers_with("Bearer student-1"),
            Json(begin_request("div-1")),
        )
        .await;

        assert!(matches!(result.unwrap_err(), CoreError::Authorization(_)));
        assert!(state.services.sessions.is_empty());
        // No file either: the recordings dir stays empty.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn begin_for_unknown_division_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut services = test_services(dir.path());
        services.metadata_store = Arc::new(NoDivisions);
        let state = AppState::new(Arc::new(services));

        let result = begin_recording(
            State(state.clone()),
            headers_with("Bearer teacher-1"),
            Json(begin_request("ghost-division")),
        )
        .await;

        assert!(matches!(result.unwrap_err(), CoreError::NotFound(_)));
        assert!(state.services.sessions.is_empty());
    }

    #[tokio::test]
    async fn begin_with_wrong_type_is_bad_offer() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(Arc::new(test_services(dir.path())));

        let mut req = begin_request("div-1");
        req.kind = "answer".to_string();
        let result =
            begin_recording(State(state.clone()), headers_with("Bearer t"), Json(req)).await;

        assert!(matches!(result.unwrap_err(), CoreError::BadOffer(_)));
    }

    #[tokio::test]
    async fn begin_with_garbage_sdp_cleans_up_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(Arc::new(test_services(dir.path())));

        let mut req = begin_request("div-1");
        req.sdp = "this is not sdp".to_string();
        let result =
            begin_recording(State(state.clone()), headers_with("Bearer t"), Json(req)).await;

        assert!(matches!(result.unwrap_err(), CoreError::BadOffer(_)));
        assert!(state.services.sessions.is_empty());
    }

    /// Stands in for the real pipeline task: finalizes the session as soon
    /// as it observes `Stopping`.
    fn spawn_fake_pipeline(
        session: Arc<crate::session::RecordingSession>,
        registry: Arc<crate::session::SessionRegistry>,
        outcome_path: Option<std::path::PathBuf>,
    ) {
        tokio::spawn(async move {
            let mut rx = session.watch_state();
            loop {
                if *rx.borrow_and_update() == SessionState::Stopping {
                    break;
                }
                if rx.changed().await.is_err() {
                    return;
                }
            }
            session.set_finalize(Ok(outcome_path));
            session.mark_closed();
            registry.remove(&session.id);
        });
    }

    #[tokio::test]
    async fn stop_finalizes_then_second_stop_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(Arc::new(test_services(dir.path())));

        let session = state
            .services
            .sessions
            .begin("teacher-1", "div-1", &state.services.config.recordings_dir, "mkv")
            .unwrap();
        spawn_fake_pipeline(
            Arc::clone(&session),
            Arc::clone(&state.services.sessions),
            Some(session.output_path.clone()),
        );

        let first = stop_recording(State(state.clone()), Path(session.id.clone()))
            .await
            .unwrap();
        assert!(first.0.message.contains(&format!("{}.mkv", session.id)));
        assert!(state.services.sessions.is_empty());

        let second = stop_recording(State(state.clone()), Path(session.id.clone())).await;
        assert!(matches!(second.unwrap_err(), CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn stop_before_any_media_reports_nothing_saved() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(Arc::new(test_services(dir.path())));

        let session = state
            .services
            .sessions
            .begin("teacher-1", "div-1", &state.services.config.recordings_dir, "mkv")
            .unwrap();
        spawn_fake_pipeline(
            Arc::clone(&session),
            Arc::clone(&state.services.sessions),
            None,
        );

        let response = stop_recording(State(state.clone()), Path(session.id.clone()))
            .await
            .unwrap();
        assert!(response.0.message.contains("nothing was saved"));
    }

    #[tokio::test]
    async fn health_reports_idle_server() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(Arc::new(test_services(dir.path())));

        let response = health(State(state)).await;
        assert_eq!(response.0.name, APP_NAME);
        assert_eq!(response.0.active_sessions, 0);
    }

    #[tokio::test]
    async fn stop_unknown_session_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(Arc::new(test_services(dir.path())));

        let result = stop_recording(State(state), Path("no-such-session".to_string())).await;
        assert!(matches!(result.unwrap_err(), CoreError::NotFound(_)));
    }
}
