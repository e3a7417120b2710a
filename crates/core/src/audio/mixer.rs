//! Averaging mix rule.

use super::{silent_frame, AudioFrame};

/// Mixes frames already popped from each source's buffer this tick into a
/// single output frame.
///
/// A source that underran (had nothing buffered) simply contributes no
/// entry here; it is excluded from the average rather than counted as
/// silence - otherwise a single quiet/muted participant would pull the
/// whole mix's volume down every tick it has nothing queued. Sources are
/// averaged, not summed, so N simultaneous speakers never clip by simply
/// adding up.
///
/// If `frames` is empty, a full silent frame is returned.
#[must_use]
pub fn mix(frames: &[AudioFrame]) -> AudioFrame {
    if frames.is_empty() {
        return silent_frame();
    }
    if frames.len() == 1 {
        return frames[0].clone();
    }

    let len = frames.iter().map(Vec::len).max().unwrap_or(0);
    let mut out = vec![0i32; len];
    for frame in frames {
        for (i, &sample) in frame.iter().enumerate() {
            out[i] += i32::from(sample);
        }
    }

    let n = frames.len() as i32;
    out.into_iter()
        .map(|sum| (sum / n).clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_frames_yields_silence() {
        let mixed = mix(&[]);
        assert!(mixed.iter().all(|&s| s == 0));
    }

    #[test]
    fn single_frame_passes_through_unchanged() {
        let mixed = mix(&[vec![100, -100, 200, -200]]);
        assert_eq!(mixed, vec![100, -100, 200, -200]);
    }

    #[test]
    fn two_frames_are_averaged_not_summed() {
        let mixed = mix(&[vec![100, 100], vec![300, -300]]);
        assert_eq!(mixed, vec![200, -100]);
    }

    #[test]
    fn mix_clamps_to_i16_range() {
        let mixed = mix(&[vec![i16::MAX], vec![i16::MAX]]);
        assert_eq!(mixed[0], i16::MAX);
    }

    #[test]
    fn average_never_exceeds_loudest_source() {
        let a = vec![12000, -8000, 500, 0];
        let b = vec![-4000, 20000, -500, 31000];
        let c = vec![700, 700, 700, -700];
        let mixed = mix(&[a.clone(), b.clone(), c.clone()]);
        for i in 0..4 {
            let loudest = a[i]
                .unsigned_abs()
                .max(b[i].unsigned_abs())
                .max(c[i].unsigned_abs());
            assert!(mixed[i].unsigned_abs() <= loudest);
        }
    }

    #[test]
    fn underrun_source_is_excluded_and_keeps_its_partial_frame() {
        use crate::audio::{AudioSource, FRAME_LEN};

        let mut ready = AudioSource::new(0);
        ready.push_samples(&vec![1000i16; FRAME_LEN]);
        let mut lagging = AudioSource::new(1);
        lagging.push_samples(&vec![500i16; FRAME_LEN / 2]);

        let frames: Vec<_> = [&mut ready, &mut lagging]
            .iter_mut()
            .filter_map(|s| s.pop_frame())
            .collect();
        assert_eq!(frames.len(), 1);

        // Divisor is 1: the ready source passes through unattenuated.
        let mixed = mix(&frames);
        assert!(mixed.iter().all(|&s| s == 1000));

        // The lagging source's half frame is still queued for the next tick.
        assert_eq!(lagging.buffered(), FRAME_LEN / 2);
    }
}
