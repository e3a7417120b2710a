//! Recording session lifecycle: negotiation, active recording, teardown.
//!
//! A [`RecordingSession`] owns the set of per-participant video/audio
//! sources feeding one compositor+mixer+encoder pipeline and tracks the
//! state machine described by [`SessionState`]. The knowledge of a
//! session's id is itself the capability required to stop it - there is no
//! separate owner-token check, matching a classroom tool where the
//! initiating teacher's browser is the only caller that ever learns the id.

mod registry;

pub use registry::SessionRegistry;

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::audio::AudioSource;
use crate::error::CoreResult;
use crate::utils::now_millis;
use crate::video::VideoSource;
use crate::webrtc_peer::IngestPeer;

/// Lifecycle states a recording session passes through.
///
/// Negotiating -> Recording -> Stopping -> Closed. There is no path back to
/// an earlier state; a session that fails during negotiation goes straight
/// to `Closed` without ever becoming `Recording`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    /// Peer connection is being established; no media has been attached yet.
    Negotiating,
    /// At least one track has attached and the encoder is writing frames.
    Recording,
    /// `stop` was called (or the peer failed); the encoder is flushing and
    /// the container is being finalized. Frames are no longer accepted.
    Stopping,
    /// The container file is finalized (or negotiation failed); the session
    /// is inert and scheduled for removal from the registry.
    Closed,
}

/// How a session's pipeline ended.
///
/// `Ok(Some(path))` means the container at `path` was finalized;
/// `Ok(None)` means the session closed before any media arrived, so no
/// file was ever created.
pub type FinalizeOutcome = CoreResult<Option<PathBuf>>;

/// A single classroom recording in progress.
///
/// One session corresponds to one WebRTC peer connection (the device doing
/// the recording - e.g. a teacher's capture rig sending a camera track, a
/// document-camera track, and a screen-share track as a single offer). The
/// tracks that arrive on that connection each become a video or audio
/// source; `next_order` assigns each a stable, monotonically increasing
/// position as it attaches, which is what the compositor uses to pick the
/// main (earliest-attached) source and stack the rest as PiP tiles.
pub struct RecordingSession {
    pub id: String,
    pub principal_id: String,
    pub division_id: String,
    pub video_sources: dashmap::DashMap<String, VideoSource>,
    pub audio_sources: dashmap::DashMap<String, AudioSource>,
    pub created_at_ms: u64,
    pub output_path: PathBuf,
    state_tx: watch::Sender<SessionState>,
    next_order: AtomicU32,
    peer: Mutex<Option<IngestPeer>>,
    finalize: Mutex<Option<FinalizeOutcome>>,
}

impl RecordingSession {
    /// Creates a new session in `Negotiating`.
    #[must_use]
    pub fn new(
        id: String,
        principal_id: String,
        division_id: String,
        output_path: PathBuf,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Negotiating);
        Self {
            id,
            principal_id,
            division_id,
            video_sources: dashmap::DashMap::new(),
            audio_sources: dashmap::DashMap::new(),
            created_at_ms: now_millis(),
            output_path,
            state_tx,
            next_order: AtomicU32::new(0),
            peer: Mutex::new(None),
            finalize: Mutex::new(None),
        }
    }

    /// Stores the negotiated peer connection so it stays alive for the
    /// session's lifetime rather than being dropped at the end of the HTTP
    /// handler that created it.
    pub fn hold_peer(&self, peer: IngestPeer) {
        *self.peer.lock() = Some(peer);
    }

    /// Takes ownership of the peer connection for teardown.
    pub fn take_peer(&self) -> Option<IngestPeer> {
        self.peer.lock().take()
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Subscribes to state transitions. The pipeline task uses this to wait
    /// for `Recording` (open the encoder) and `Stopping` (flush it) without
    /// polling.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Transitions `Negotiating` -> `Recording` on the first attached track.
    ///
    /// Returns `true` exactly once, for the call that performed the
    /// transition. Later calls (already `Recording`, or already torn down)
    /// return `false` and leave the state alone.
    pub fn mark_recording(&self) -> bool {
        self.state_tx.send_if_modified(|state| {
            if *state == SessionState::Negotiating {
                *state = SessionState::Recording;
                true
            } else {
                false
            }
        })
    }

    /// Transitions to `Stopping`. Idempotent if already stopping/closed.
    pub fn mark_stopping(&self) {
        self.state_tx.send_if_modified(|state| {
            if matches!(state, SessionState::Negotiating | SessionState::Recording) {
                *state = SessionState::Stopping;
                true
            } else {
                false
            }
        });
    }

    /// Transitions to `Closed`. Terminal; always succeeds.
    pub fn mark_closed(&self) {
        self.state_tx.send_if_modified(|state| {
            if *state == SessionState::Closed {
                false
            } else {
                *state = SessionState::Closed;
                true
            }
        });
    }

    /// Records how the pipeline ended; read once by whoever called `stop`.
    pub fn set_finalize(&self, outcome: FinalizeOutcome) {
        *self.finalize.lock() = Some(outcome);
    }

    /// Takes the pipeline's finalize outcome, if it has been recorded.
    pub fn take_finalize(&self) -> Option<FinalizeOutcome> {
        self.finalize.lock().take()
    }

    /// Attaches a video track, assigning it the next attachment order if
    /// it hasn't been seen before. A no-op if `track_id` is already
    /// attached (ontrack may be invoked more than once per track by some
    /// implementations).
    pub fn attach_video(&self, track_id: String) {
        self.video_sources.entry(track_id).or_insert_with(|| {
            VideoSource::new(self.next_order.fetch_add(1, Ordering::Relaxed))
        });
    }

    /// Attaches an audio track, assigning it the next attachment order.
    pub fn attach_audio(&self, track_id: String) {
        self.audio_sources.entry(track_id).or_insert_with(|| {
            AudioSource::new(self.next_order.fetch_add(1, Ordering::Relaxed))
        });
    }

    /// Removes a track's sources, e.g. when its underlying RTP stream ends.
    pub fn detach(&self, track_id: &str) {
        self.video_sources.remove(track_id);
        self.audio_sources.remove(track_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> RecordingSession {
        RecordingSession::new(
            "s1".to_string(),
            "teacher-1".to_string(),
            "div-1".to_string(),
            "/tmp/s1.mkv".into(),
        )
    }

    #[test]
    fn new_session_is_negotiating() {
        assert_eq!(session().state(), SessionState::Negotiating);
    }

    #[test]
    fn mark_recording_transitions_exactly_once() {
        let s = session();
        assert!(s.mark_recording());
        assert!(!s.mark_recording());
        assert_eq!(s.state(), SessionState::Recording);
    }

    #[test]
    fn mark_recording_after_stopping_is_refused() {
        let s = session();
        s.mark_stopping();
        assert!(!s.mark_recording());
        assert_eq!(s.state(), SessionState::Stopping);
    }

    #[test]
    fn mark_closed_is_terminal_and_idempotent() {
        let s = session();
        s.mark_closed();
        s.mark_closed();
        assert_eq!(s.state(), SessionState::Closed);
        s.mark_stopping();
        assert_eq!(s.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn watch_observes_transitions() {
        let s = session();
        let mut rx = s.watch_state();
        s.mark_recording();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), SessionState::Recording);
    }

    #[test]
    fn finalize_outcome_round_trips() {
        let s = session();
        s.set_finalize(Ok(Some("/tmp/s1.mkv".into())));
        let outcome = s.take_finalize().unwrap().unwrap();
        assert_eq!(outcome, Some(PathBuf::from("/tmp/s1.mkv")));
        assert!(s.take_finalize().is_none());
    }

    #[test]
    fn detach_removes_both_source_kinds() {
        let s = session();
        s.attach_video("track1".to_string());
        s.attach_audio("track1".to_string());
        s.detach("track1");
        assert!(s.video_sources.is_empty());
        assert!(s.audio_sources.is_empty());
    }

    #[test]
    fn attach_assigns_increasing_order() {
        let s = session();
        s.attach_video("a".to_string());
        s.attach_video("b".to_string());
        assert!(s.video_sources.get("a").unwrap().order < s.video_sources.get("b").unwrap().order);
    }
}
