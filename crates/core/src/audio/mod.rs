//! Audio mixer: combines per-participant audio into a single output frame.
//!
//! Like the video compositor, mixing runs on a fixed cadence (see
//! [`crate::clock`]) and always emits a frame of exactly
//! [`crate::protocol_constants::AUDIO_FRAME_SAMPLES`] samples, even when no
//! source has new audio ready (silence is emitted instead).

mod mixer;

pub use mixer::mix;

use std::collections::VecDeque;

use crate::protocol_constants::{AUDIO_CHANNELS, AUDIO_FRAME_SAMPLES, AUDIO_SOURCE_BUFFER_FRAMES};

/// One mixed-frame's worth of interleaved stereo S16 samples.
///
/// Length is always [`FRAME_LEN`].
pub type AudioFrame = Vec<i16>;

/// Interleaved sample count of one mixed frame (960 sample pairs).
pub const FRAME_LEN: usize = AUDIO_FRAME_SAMPLES * AUDIO_CHANNELS as usize;

/// Builds a silent frame of the standard size.
#[must_use]
pub fn silent_frame() -> AudioFrame {
    vec![0i16; FRAME_LEN]
}

/// Per-participant audio source: a bounded ring buffer of already-resampled
/// (48kHz stereo S16, interleaved) samples awaiting mix.
///
/// Samples are expected to already be resampled to the mixer's target rate
/// and channel layout before being pushed; resampling from the inbound
/// WebRTC Opus track happens upstream in the decoder. The buffer is
/// sample-granular, not frame-granular: a source whose decoder produced
/// only part of a mix frame keeps that partial data buffered until enough
/// accumulates, rather than having it padded out or discarded.
pub struct AudioSource {
    pub order: u32,
    buffer: VecDeque<i16>,
    samples_dropped: u64,
}

impl AudioSource {
    #[must_use]
    pub fn new(order: u32) -> Self {
        Self {
            order,
            buffer: VecDeque::with_capacity(AUDIO_SOURCE_BUFFER_FRAMES * FRAME_LEN),
            samples_dropped: 0,
        }
    }

    /// Appends resampled interleaved samples. If the buffer would exceed
    /// its capacity (200ms), the oldest samples are dropped to make room -
    /// mixing favors low latency over completeness.
    pub fn push_samples(&mut self, samples: &[i16]) {
        let capacity = AUDIO_SOURCE_BUFFER_FRAMES * FRAME_LEN;
        if samples.len() >= capacity {
            // One chunk larger than the whole window: keep only its tail.
            self.samples_dropped += (self.buffer.len() + samples.len() - capacity) as u64;
            self.buffer.clear();
            self.buffer
                .extend(samples[samples.len() - capacity..].iter().copied());
            return;
        }
        let overflow = (self.buffer.len() + samples.len()).saturating_sub(capacity);
        if overflow > 0 {
            self.buffer.drain(..overflow);
            self.samples_dropped += overflow as u64;
        }
        self.buffer.extend(samples.iter().copied());
    }

    /// Pops exactly one frame's worth of samples if available.
    ///
    /// Returns `None` on underrun (fewer than [`FRAME_LEN`] samples
    /// buffered); whatever partial data is queued stays put for the next
    /// tick, and the mixer leaves this source out of the average entirely.
    pub fn pop_frame(&mut self) -> Option<AudioFrame> {
        if self.buffer.len() < FRAME_LEN {
            return None;
        }
        Some(self.buffer.drain(..FRAME_LEN).collect())
    }

    /// Interleaved samples currently queued.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn samples_dropped(&self) -> u64 {
        self.samples_dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_frame_has_expected_length() {
        assert_eq!(silent_frame().len(), FRAME_LEN);
    }

    #[test]
    fn partial_frame_underruns_and_stays_buffered() {
        let mut source = AudioSource::new(0);
        // Half a frame: 480 sample pairs.
        source.push_samples(&vec![7i16; FRAME_LEN / 2]);
        assert!(source.pop_frame().is_none());
        assert_eq!(source.buffered(), FRAME_LEN / 2);

        // The second half arrives; now a full frame pops, preserving the
        // earlier samples at the front.
        source.push_samples(&vec![9i16; FRAME_LEN / 2]);
        let frame = source.pop_frame().unwrap();
        assert_eq!(frame.len(), FRAME_LEN);
        assert_eq!(frame[0], 7);
        assert_eq!(frame[FRAME_LEN - 1], 9);
        assert_eq!(source.buffered(), 0);
    }

    #[test]
    fn overflow_drops_oldest_samples() {
        let mut source = AudioSource::new(0);
        let capacity = AUDIO_SOURCE_BUFFER_FRAMES * FRAME_LEN;
        source.push_samples(&vec![1i16; capacity]);
        source.push_samples(&vec![2i16; FRAME_LEN]);
        assert_eq!(source.samples_dropped(), FRAME_LEN as u64);
        assert_eq!(source.buffered(), capacity);
        // The front of the buffer should still be the old samples that
        // survived, ending with the newly pushed ones.
        let frame = source.pop_frame().unwrap();
        assert_eq!(frame[0], 1);
    }

    #[test]
    fn empty_source_underruns() {
        let mut source = AudioSource::new(0);
        assert!(source.pop_frame().is_none());
    }
}
