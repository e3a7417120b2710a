//! Container writer: composed video + mixed audio -> MKV file.
//!
//! `ffmpeg-next` is synchronous, so a `MediaEncoder` is owned for its
//! whole lifetime by one dedicated encoder thread (see
//! [`crate::pipeline`]), which feeds it frames from a channel and
//! finalizes the container when the channel closes. Nothing here is
//! async and nothing here crosses threads.

use std::path::{Path, PathBuf};

use ffmpeg_next as ffmpeg;
use ffmpeg_next::Rational;

use crate::audio::AudioFrame;
use crate::error::{CoreError, CoreResult};
use crate::protocol_constants::{AUDIO_CHANNELS, AUDIO_SAMPLE_RATE, VIDEO_TICK_HZ};
use crate::video::VideoFrame;

/// Encodes composed video and mixed audio into a single MKV container.
///
/// Uses libx264 at CRF 18 / `ultrafast` preset (near-lossless, encode speed
/// over file size - recordings are archived, not distributed) and AAC for
/// audio.
pub struct MediaEncoder {
    path: PathBuf,
    output: ffmpeg::format::context::Output,
    video_encoder: ffmpeg::encoder::Video,
    video_stream_index: usize,
    video_frame_count: i64,
    audio_encoder: ffmpeg::encoder::Audio,
    audio_stream_index: usize,
    audio_sample_count: i64,
    /// AAC consumes a fixed frame size (typically 1024 samples) that does
    /// not match the 20ms mix cadence, so samples queue here per channel
    /// until a full codec frame is available.
    aac_frame_size: usize,
    pending: [Vec<f32>; 2],
}

impl MediaEncoder {
    /// Creates the output file and opens both encoders. Does not write the
    /// container header yet (call [`Self::open`]).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EncoderFailure`] if the output file, encoders,
    /// or container header cannot be created.
    pub fn open(path: &Path, width: u32, height: u32) -> CoreResult<Self> {
        ffmpeg::init().map_err(|e| CoreError::EncoderFailure(format!("ffmpeg init: {e}")))?;

        let mut output = ffmpeg::format::output(&path_str(path)?)
            .map_err(|e| CoreError::EncoderFailure(format!("create output {path:?}: {e}")))?;

        let global_header = output
            .format()
            .flags()
            .contains(ffmpeg::format::Flags::GLOBAL_HEADER);

        let h264 = ffmpeg::encoder::find(ffmpeg::codec::Id::H264)
            .ok_or_else(|| CoreError::EncoderFailure("H.264 encoder unavailable".to_string()))?;
        let mut video_stream = output
            .add_stream(h264)
            .map_err(|e| CoreError::EncoderFailure(format!("add video stream: {e}")))?;
        let video_stream_index = video_stream.index();

        let mut video_ctx = ffmpeg::codec::Context::new_with_codec(h264)
            .encoder()
            .video()
            .map_err(|e| CoreError::EncoderFailure(format!("video encoder context: {e}")))?;
        video_ctx.set_width(width);
        video_ctx.set_height(height);
        video_ctx.set_format(ffmpeg::format::Pixel::YUV420P);
        video_ctx.set_time_base(Rational::new(1, VIDEO_TICK_HZ as i32));
        video_ctx.set_frame_rate(Some(Rational::new(VIDEO_TICK_HZ as i32, 1)));
        if global_header {
            video_ctx.set_flags(ffmpeg::codec::Flags::GLOBAL_HEADER);
        }
        let mut options = ffmpeg::Dictionary::new();
        options.set("preset", "ultrafast");
        options.set("crf", "18");
        let video_encoder = video_ctx
            .open_with(options)
            .map_err(|e| CoreError::EncoderFailure(format!("open video encoder: {e}")))?;
        video_stream.set_parameters(&video_encoder);

        let aac = ffmpeg::encoder::find(ffmpeg::codec::Id::AAC)
            .ok_or_else(|| CoreError::EncoderFailure("AAC encoder unavailable".to_string()))?;
        let mut audio_stream = output
            .add_stream(aac)
            .map_err(|e| CoreError::EncoderFailure(format!("add audio stream: {e}")))?;
        let audio_stream_index = audio_stream.index();

        let mut audio_ctx = ffmpeg::codec::Context::new_with_codec(aac)
            .encoder()
            .audio()
            .map_err(|e| CoreError::EncoderFailure(format!("audio encoder context: {e}")))?;
        audio_ctx.set_rate(AUDIO_SAMPLE_RATE as i32);
        audio_ctx.set_channel_layout(ffmpeg::ChannelLayout::STEREO);
        audio_ctx.set_format(ffmpeg::format::Sample::F32(
            ffmpeg::format::sample::Type::Planar,
        ));
        audio_ctx.set_time_base(Rational::new(1, AUDIO_SAMPLE_RATE as i32));
        if global_header {
            audio_ctx.set_flags(ffmpeg::codec::Flags::GLOBAL_HEADER);
        }
        let audio_encoder = audio_ctx
            .open_as(aac)
            .map_err(|e| CoreError::EncoderFailure(format!("open audio encoder: {e}")))?;
        audio_stream.set_parameters(&audio_encoder);

        output
            .write_header()
            .map_err(|e| CoreError::EncoderFailure(format!("write container header: {e}")))?;

        let aac_frame_size = audio_encoder.frame_size().max(1) as usize;

        Ok(Self {
            path: path.to_path_buf(),
            output,
            video_encoder,
            video_stream_index,
            video_frame_count: 0,
            audio_encoder,
            audio_stream_index,
            audio_sample_count: 0,
            aac_frame_size,
            pending: [Vec::new(), Vec::new()],
        })
    }

    /// Encodes one composed canvas frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be submitted to the encoder.
    pub fn push_video(&mut self, frame: &VideoFrame) -> CoreResult<()> {
        let mut ff_frame =
            ffmpeg::frame::Video::new(ffmpeg::format::Pixel::YUV420P, frame.width, frame.height);
        // Plane buffers may carry alignment padding beyond width*height.
        ff_frame.data_mut(0)[..frame.y.len()].copy_from_slice(&frame.y);
        ff_frame.data_mut(1)[..frame.u.len()].copy_from_slice(&frame.u);
        ff_frame.data_mut(2)[..frame.v.len()].copy_from_slice(&frame.v);
        ff_frame.set_pts(Some(self.video_frame_count));
        self.video_frame_count += 1;

        self.video_encoder
            .send_frame(&ff_frame)
            .map_err(|e| CoreError::EncoderFailure(format!("send video frame: {e}")))?;
        self.drain_video()
    }

    /// Queues one mixed audio frame, encoding as many full AAC frames as
    /// the queue now holds.
    ///
    /// # Errors
    ///
    /// Returns an error if a frame cannot be submitted to the encoder.
    pub fn push_audio(&mut self, frame: &AudioFrame) -> CoreResult<()> {
        let channels = AUDIO_CHANNELS as usize;
        for (i, &sample) in frame.iter().enumerate() {
            self.pending[i % channels].push(f32::from(sample) / f32::from(i16::MAX));
        }
        while self.pending[0].len() >= self.aac_frame_size {
            self.encode_pending(self.aac_frame_size)?;
        }
        Ok(())
    }

    /// Encodes `samples` queued samples per channel as one AAC frame. Only
    /// the final frame before EOF may be shorter than the codec frame size.
    fn encode_pending(&mut self, samples: usize) -> CoreResult<()> {
        // The AAC encoder context was opened as F32 planar, so each
        // channel's samples go in their own plane rather than interleaved.
        let mut ff_frame = ffmpeg::frame::Audio::new(
            ffmpeg::format::Sample::F32(ffmpeg::format::sample::Type::Planar),
            samples,
            ffmpeg::ChannelLayout::STEREO,
        );
        for (channel, queue) in self.pending.iter_mut().enumerate() {
            let taken: Vec<u8> = queue
                .drain(..samples)
                .flat_map(f32::to_le_bytes)
                .collect();
            ff_frame.data_mut(channel)[..taken.len()].copy_from_slice(&taken);
        }
        ff_frame.set_pts(Some(self.audio_sample_count));
        self.audio_sample_count += samples as i64;

        self.audio_encoder
            .send_frame(&ff_frame)
            .map_err(|e| CoreError::EncoderFailure(format!("send audio frame: {e}")))?;
        self.drain_audio()
    }

    fn drain_video(&mut self) -> CoreResult<()> {
        let stream_tb = self
            .output
            .stream(self.video_stream_index)
            .map(|s| s.time_base())
            .unwrap_or_else(|| Rational::new(1, VIDEO_TICK_HZ as i32));
        let mut packet = ffmpeg::Packet::empty();
        while self.video_encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.video_stream_index);
            // Encoder timestamps count ticks; the muxer counts in the
            // stream's own time base.
            packet.rescale_ts(Rational::new(1, VIDEO_TICK_HZ as i32), stream_tb);
            packet
                .write_interleaved(&mut self.output)
                .map_err(|e| CoreError::EncoderFailure(format!("write video packet: {e}")))?;
        }
        Ok(())
    }

    fn drain_audio(&mut self) -> CoreResult<()> {
        let stream_tb = self
            .output
            .stream(self.audio_stream_index)
            .map(|s| s.time_base())
            .unwrap_or_else(|| Rational::new(1, AUDIO_SAMPLE_RATE as i32));
        let mut packet = ffmpeg::Packet::empty();
        while self.audio_encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.audio_stream_index);
            packet.rescale_ts(Rational::new(1, AUDIO_SAMPLE_RATE as i32), stream_tb);
            packet
                .write_interleaved(&mut self.output)
                .map_err(|e| CoreError::EncoderFailure(format!("write audio packet: {e}")))?;
        }
        Ok(())
    }

    /// Flushes both encoders and finalizes the container trailer. Consumes
    /// `self`: the encoder cannot be used after this call.
    ///
    /// # Errors
    ///
    /// Returns an error if either encoder fails to flush or the trailer
    /// cannot be written; in that case the output file may be partial.
    pub fn flush_and_close(mut self) -> CoreResult<PathBuf> {
        self.video_encoder
            .send_eof()
            .map_err(|e| CoreError::EncoderFailure(format!("flush video encoder: {e}")))?;
        self.drain_video()?;

        let tail = self.pending[0].len();
        if tail > 0 {
            self.encode_pending(tail)?;
        }
        self.audio_encoder
            .send_eof()
            .map_err(|e| CoreError::EncoderFailure(format!("flush audio encoder: {e}")))?;
        self.drain_audio()?;

        self.output
            .write_trailer()
            .map_err(|e| CoreError::EncoderFailure(format!("write container trailer: {e}")))?;

        Ok(self.path)
    }
}

fn path_str(path: &Path) -> CoreResult<&str> {
    path.to_str()
        .ok_or_else(|| CoreError::EncoderFailure(format!("non-UTF8 output path: {path:?}")))
}
