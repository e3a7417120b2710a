//! Wires an [`IngestPeer`](crate::webrtc_peer::IngestPeer)'s inbound RTP to a
//! [`RecordingSession`]'s video/audio sources.
//!
//! This is the seam between the WebRTC transport layer and the domain: RTP
//! payloads go in, decoded frames land in the session's source buffers,
//! ready for the next compositor/mixer tick. Failures here are strictly
//! per-source: a track whose decoder chokes is dropped, the session keeps
//! recording whatever else is attached.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::decoder::{AudioDecoder, VideoDecoder};
use crate::events::{EventEmitter, SessionEvent};
use crate::session::{RecordingSession, SessionState};
use crate::utils::now_millis;
use crate::webrtc_peer::TrackSink;

/// Implements [`TrackSink`] by decoding inbound RTP and feeding the result
/// into a session's source buffers. Per-track decoders are created lazily
/// on that track's first RTP payload, the same moment the track is
/// attached to the session's source maps.
pub struct SessionIngestSink {
    session: Arc<RecordingSession>,
    events: Arc<dyn EventEmitter>,
    video_decoders: DashMap<String, Mutex<VideoDecoder>>,
    audio_decoders: DashMap<String, Mutex<AudioDecoder>>,
}

impl SessionIngestSink {
    #[must_use]
    pub fn new(session: Arc<RecordingSession>, events: Arc<dyn EventEmitter>) -> Self {
        Self {
            session,
            events,
            video_decoders: DashMap::new(),
            audio_decoders: DashMap::new(),
        }
    }

    fn accepting_media(&self) -> bool {
        matches!(
            self.session.state(),
            SessionState::Negotiating | SessionState::Recording
        )
    }

    fn note_recording(&self) {
        if self.session.mark_recording() {
            log::info!("[Session] {} started recording", self.session.id);
            self.events.emit_session(SessionEvent::Recording {
                session_id: self.session.id.clone(),
                timestamp: now_millis(),
            });
        }
    }

    fn note_sources_changed(&self) {
        self.events.emit_session(SessionEvent::SourcesChanged {
            session_id: self.session.id.clone(),
            video_sources: self.session.video_sources.len(),
            audio_sources: self.session.audio_sources.len(),
            timestamp: now_millis(),
        });
    }
}

impl TrackSink for SessionIngestSink {
    fn on_video_rtp(&self, track_id: &str, payload: &[u8]) {
        if !self.accepting_media() {
            return;
        }
        if !self.video_decoders.contains_key(track_id) {
            match VideoDecoder::new() {
                Ok(decoder) => {
                    self.video_decoders
                        .insert(track_id.to_string(), Mutex::new(decoder));
                    self.session.attach_video(track_id.to_string());
                    self.note_sources_changed();
                }
                Err(e) => {
                    log::error!("[Ingest] Cannot open H.264 decoder for {track_id}: {e}");
                    return;
                }
            }
        }
        let Some(decoder) = self.video_decoders.get(track_id) else {
            return;
        };
        let frames = decoder.lock().push_rtp(payload);
        drop(decoder);

        match frames {
            Ok(frames) => {
                if let Some(mut source) = self.session.video_sources.get_mut(track_id) {
                    for frame in frames {
                        source.push_frame(frame);
                        self.note_recording();
                    }
                }
            }
            Err(e) => {
                log::debug!("[Ingest] Video decode error on {track_id}: {e}");
            }
        }
    }

    fn on_audio_rtp(&self, track_id: &str, payload: &[u8]) {
        if !self.accepting_media() {
            return;
        }
        if !self.audio_decoders.contains_key(track_id) {
            match AudioDecoder::new() {
                Ok(decoder) => {
                    self.audio_decoders
                        .insert(track_id.to_string(), Mutex::new(decoder));
                    self.session.attach_audio(track_id.to_string());
                    self.note_sources_changed();
                }
                Err(e) => {
                    log::error!("[Ingest] Cannot open Opus decoder for {track_id}: {e}");
                    return;
                }
            }
        }
        let Some(decoder) = self.audio_decoders.get(track_id) else {
            return;
        };
        let samples = decoder.lock().push_rtp(payload);
        drop(decoder);

        match samples {
            Ok(chunks) => {
                if let Some(mut source) = self.session.audio_sources.get_mut(track_id) {
                    for chunk in chunks {
                        source.push_samples(&chunk);
                        self.note_recording();
                    }
                }
            }
            Err(e) => {
                log::debug!("[Ingest] Audio decode error on {track_id}: {e}");
            }
        }
    }

    fn on_track_ended(&self, track_id: &str) {
        self.video_decoders.remove(track_id);
        self.audio_decoders.remove(track_id);
        self.session.detach(track_id);
        log::info!(
            "[Ingest] Track {track_id} ended, detached from session {}",
            self.session.id
        );
        self.note_sources_changed();
    }

    fn on_disconnected(&self) {
        log::warn!(
            "[Ingest] Peer connection for session {} went away",
            self.session.id
        );
        self.session.mark_stopping();
    }
}
