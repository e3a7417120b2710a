//! Frame Clock: pacemaker tick generation for video and audio composition.
//!
//! The compositor and mixer must produce exactly one output frame per tick
//! regardless of whether any input source has new data ready. This module
//! provides the metronome primitive that both rely on.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

use crate::protocol_constants::{AUDIO_TICK_MS, VIDEO_TICK_HZ};
use crate::runtime::TaskSpawner;
use std::sync::Arc;

/// A single tick of the frame clock.
#[derive(Debug, Clone, Copy)]
pub struct Tick {
    /// Monotonically increasing tick counter, starting at 0.
    pub sequence: u64,
}

/// Drives a fixed-cadence metronome, invoking `on_tick` exactly once per
/// interval.
///
/// Uses [`MissedTickBehavior::Delay`]: if the caller falls behind (GC pause,
/// CPU contention), ticks are not caught up in a burst. The next tick is
/// simply scheduled `duration` after the late one actually fired. Bursting
/// catch-up frames would flood the encoder with frames nobody asked for.
///
/// Runs until `on_tick` returns `false`.
pub async fn run_metronome<F>(duration: Duration, mut on_tick: F)
where
    F: FnMut(Tick) -> bool,
{
    let mut metronome = interval(duration);
    metronome.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sequence: u64 = 0;
    loop {
        metronome.tick().await;
        let tick = Tick { sequence };
        sequence += 1;
        if !on_tick(tick) {
            break;
        }
    }
}

/// Tick duration for the video compositor, derived from [`VIDEO_TICK_HZ`].
#[must_use]
pub fn video_tick_duration() -> Duration {
    Duration::from_secs_f64(1.0 / f64::from(VIDEO_TICK_HZ))
}

/// Tick duration for the audio mixer, equal to [`AUDIO_TICK_MS`].
#[must_use]
pub fn audio_tick_duration() -> Duration {
    Duration::from_millis(AUDIO_TICK_MS)
}

/// Bounded channel capacity for tick delivery. A backlog of more than one
/// pending tick means the consumer is falling behind; the metronome drops
/// the oldest unconsumed tick rather than letting the queue grow.
const TICK_CHANNEL_CAPACITY: usize = 2;

/// Owns the video and audio metronomes for a single recording session.
///
/// Each metronome runs on its own background task (via [`TaskSpawner`]) and
/// delivers ticks over a bounded channel. The compositor and mixer consume
/// from their respective receiver in their own drive loop.
pub struct FrameClock {
    video_rx: mpsc::Receiver<Tick>,
    audio_rx: mpsc::Receiver<Tick>,
}

impl FrameClock {
    /// Starts the video and audio metronomes on the given spawner.
    ///
    /// Returns a `FrameClock` exposing the tick receivers, plus a stop
    /// handle that halts both metronomes.
    #[must_use]
    pub fn start(spawner: &Arc<dyn TaskSpawner>) -> (Self, ClockHandle) {
        let (video_tx, video_rx) = mpsc::channel(TICK_CHANNEL_CAPACITY);
        let (audio_tx, audio_rx) = mpsc::channel(TICK_CHANNEL_CAPACITY);
        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));

        spawn_metronome(spawner, video_tick_duration(), video_tx, stop.clone());
        spawn_metronome(spawner, audio_tick_duration(), audio_tx, stop.clone());

        (Self { video_rx, audio_rx }, ClockHandle { stop })
    }

    /// Splits the clock into its video and audio tick receivers, so a
    /// consumer can await both independently in one `select!`.
    #[must_use]
    pub fn split(self) -> (mpsc::Receiver<Tick>, mpsc::Receiver<Tick>) {
        (self.video_rx, self.audio_rx)
    }
}

/// Stops a running [`FrameClock`]'s metronomes.
#[derive(Clone)]
pub struct ClockHandle {
    stop: Arc<std::sync::atomic::AtomicBool>,
}

impl ClockHandle {
    /// Signals both metronomes to stop ticking. The metronomes observe the
    /// flag on their next tick, so a stop may lag by up to one tick period.
    pub fn stop(&self) {
        self.stop.store(true, std::sync::atomic::Ordering::Relaxed);
    }
}

fn spawn_metronome(
    spawner: &Arc<dyn TaskSpawner>,
    duration: Duration,
    tx: mpsc::Sender<Tick>,
    stop: Arc<std::sync::atomic::AtomicBool>,
) {
    spawner.spawn(async move {
        run_metronome(duration, |tick| {
            if stop.load(std::sync::atomic::Ordering::Relaxed) {
                return false;
            }
            // A full channel means the consumer hasn't drained the prior
            // tick yet; drop this one rather than blocking the metronome.
            let _ = tx.try_send(tick);
            true
        })
        .await;
    });
}
