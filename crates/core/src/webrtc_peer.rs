//! WebRTC peer connection wrapper for media ingestion.
//!
//! Wraps a single `RTCPeerConnection` accepting one browser's outbound
//! video/audio tracks. Negotiation is answer-only: the server never
//! initiates an offer, since it has nothing to send back to the browser
//! besides the SDP answer itself.

use std::sync::Arc;

use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_H264, MIME_TYPE_OPUS};
use webrtc::api::{APIBuilder, API};
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};
use webrtc::track::track_remote::TrackRemote;

use crate::error::{CoreError, CoreResult};

/// Receives demuxed, still-encoded media from an inbound WebRTC track.
///
/// Implemented by the recording session; kept as a trait so the peer
/// connection layer doesn't need to know about [`crate::session`] directly.
/// Tracks are identified by their WebRTC track id, not by a participant -
/// a single peer connection may carry several tracks (e.g. a camera and a
/// screen share), each becoming its own compositor/mixer source.
pub trait TrackSink: Send + Sync {
    /// Delivers one RTP payload's worth of encoded video (H.264) bytes.
    fn on_video_rtp(&self, track_id: &str, payload: &[u8]);

    /// Delivers one RTP payload's worth of encoded audio (Opus) bytes.
    fn on_audio_rtp(&self, track_id: &str, payload: &[u8]);

    /// Called once a track's RTP stream ends (the remote stopped the track
    /// or its transport died). The track's sources should be detached; the
    /// rest of the session continues.
    fn on_track_ended(&self, track_id: &str);

    /// Called when the peer connection transitions to a terminal state
    /// (failed, closed, or disconnected past recovery).
    fn on_disconnected(&self);
}

/// Builds the shared WebRTC API instance (media engine + interceptors).
///
/// # Errors
///
/// Returns an error if the required codecs cannot be registered.
pub fn build_api() -> CoreResult<API> {
    let mut media_engine = MediaEngine::default();
    media_engine
        .register_codec(
            RTCRtpCodecParameters {
                capability: RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_H264.to_string(),
                    clock_rate: 90_000,
                    channels: 0,
                    sdp_fmtp_line: "level-asymmetry-allowed=1;packetization-mode=1".to_string(),
                    rtcp_feedback: vec![],
                },
                payload_type: 102,
                ..Default::default()
            },
            RTPCodecType::Video,
        )
        .map_err(|e| CoreError::Internal(format!("register H264 codec: {e}")))?;
    media_engine
        .register_codec(
            RTCRtpCodecParameters {
                capability: RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_OPUS.to_string(),
                    clock_rate: 48_000,
                    channels: 2,
                    sdp_fmtp_line: "minptime=10;useinbandfec=1".to_string(),
                    rtcp_feedback: vec![],
                },
                payload_type: 111,
                ..Default::default()
            },
            RTPCodecType::Audio,
        )
        .map_err(|e| CoreError::Internal(format!("register Opus codec: {e}")))?;

    let registry = Registry::new();
    Ok(APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build())
}

/// One session's ingest-only peer connection. May carry several inbound
/// tracks (e.g. camera plus screen share), each delivered to `sink` keyed
/// by its WebRTC track id.
pub struct IngestPeer {
    connection: Arc<RTCPeerConnection>,
}

impl IngestPeer {
    /// Creates a peer connection and wires the inbound track handler to
    /// `sink`. Does not perform negotiation; call [`negotiate`](Self::negotiate) next.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying peer connection cannot be created.
    pub async fn new(api: &API, sink: Arc<dyn TrackSink>) -> CoreResult<Self> {
        let connection = Arc::new(
            api.new_peer_connection(RTCConfiguration::default())
                .await
                .map_err(|e| CoreError::Transport(format!("create peer connection: {e}")))?,
        );

        let track_sink = Arc::clone(&sink);
        connection.on_track(Box::new(move |track: Arc<TrackRemote>, _, _| {
            let track_sink = Arc::clone(&track_sink);
            Box::pin(async move {
                let is_video = track.kind() == RTPCodecType::Video;
                let track_id = track.id();
                loop {
                    match track.read_rtp().await {
                        Ok((packet, _)) => {
                            if is_video {
                                track_sink.on_video_rtp(&track_id, &packet.payload);
                            } else {
                                track_sink.on_audio_rtp(&track_id, &packet.payload);
                            }
                        }
                        Err(_) => break,
                    }
                }
                track_sink.on_track_ended(&track_id);
            })
        }));

        let disconnect_sink = Arc::clone(&sink);
        connection.on_peer_connection_state_change(Box::new(move |state| {
            match state {
                RTCPeerConnectionState::Failed | RTCPeerConnectionState::Closed => {
                    disconnect_sink.on_disconnected();
                }
                _ => {}
            }
            Box::pin(async {})
        }));

        Ok(Self { connection })
    }

    /// Applies a browser's SDP offer and returns the server's SDP answer.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::BadOffer`] if the SDP cannot be parsed or
    /// negotiation fails.
    pub async fn negotiate(&self, offer_sdp: &str) -> CoreResult<String> {
        let offer = RTCSessionDescription::offer(offer_sdp.to_string())
            .map_err(|e| CoreError::BadOffer(format!("invalid offer: {e}")))?;

        self.connection
            .set_remote_description(offer)
            .await
            .map_err(|e| CoreError::BadOffer(format!("set_remote_description: {e}")))?;

        let answer = self
            .connection
            .create_answer(None)
            .await
            .map_err(|e| CoreError::BadOffer(format!("create_answer: {e}")))?;

        self.connection
            .set_local_description(answer.clone())
            .await
            .map_err(|e| CoreError::BadOffer(format!("set_local_description: {e}")))?;

        Ok(answer.sdp)
    }

    /// Closes the underlying peer connection.
    pub async fn close(&self) -> CoreResult<()> {
        self.connection
            .close()
            .await
            .map_err(|e| CoreError::Transport(format!("close: {e}")))
    }
}
