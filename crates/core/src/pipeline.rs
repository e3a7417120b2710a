//! Drives one recording session's compositor + mixer + encoder from its
//! [`FrameClock`] ticks until the session is stopped.
//!
//! The ffmpeg encoder lives on its own dedicated OS thread, fed composed
//! and mixed frames over a channel; dropping the sending half is the flush
//! signal. The async side therefore never holds an ffmpeg context across
//! an await point.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::audio::{mix, AudioFrame};
use crate::clock::FrameClock;
use crate::encoder::MediaEncoder;
use crate::error::{CoreError, CoreResult};
use crate::events::{EventEmitter, SessionEvent};
use crate::protocol_constants::{CANVAS_HEIGHT, CANVAS_WIDTH};
use crate::runtime::TaskSpawner;
use crate::session::{FinalizeOutcome, RecordingSession, SessionRegistry, SessionState};
use crate::utils::now_millis;
use crate::video::{compose, VideoFrame};

/// Spawns the composite/mix/encode task for `session`.
///
/// The task waits for the session to reach `Recording` (first track
/// attached), runs the tick loop until it leaves `Recording`, then flushes
/// the encoder within `flush_timeout`. A session that never reaches
/// `Recording` within `negotiation_timeout` is torn down with no file
/// persisted. Whatever happens, the task records the finalize outcome on
/// the session, marks it `Closed`, and removes it from `registry` - so the
/// registry only ever holds sessions in {Negotiating, Recording, Stopping}.
pub fn spawn(
    spawner: &Arc<dyn TaskSpawner>,
    session: Arc<RecordingSession>,
    registry: Arc<SessionRegistry>,
    events: Arc<dyn EventEmitter>,
    negotiation_timeout: Duration,
    flush_timeout: Duration,
) {
    let clock_spawner = Arc::clone(spawner);
    spawner.spawn(async move {
        // Closing and deregistering happen on drop, so even a panicking
        // pipeline leaves no phantom session behind in the registry.
        let cleanup = SessionCleanup {
            session: Arc::clone(&session),
            registry,
        };
        let outcome = run(&clock_spawner, &session, negotiation_timeout, flush_timeout).await;
        if let Err(e) = &outcome {
            log::error!("[Pipeline] Session {} ended with error: {e}", session.id);
        }
        session.set_finalize(outcome);
        if let Some(peer) = session.take_peer() {
            let _ = peer.close().await;
        }
        drop(cleanup);
        events.emit_session(SessionEvent::Closed {
            session_id: session.id.clone(),
            timestamp: now_millis(),
        });
    });
}

/// RAII guard that marks the session `Closed` and removes it from the
/// registry, however the pipeline task ends.
struct SessionCleanup {
    session: Arc<RecordingSession>,
    registry: Arc<SessionRegistry>,
}

impl Drop for SessionCleanup {
    fn drop(&mut self) {
        self.session.mark_closed();
        self.registry.remove(&self.session.id);
    }
}

/// One unit of work for the encoder thread.
enum EncoderJob {
    Video(VideoFrame),
    Audio(AudioFrame),
}

async fn run(
    spawner: &Arc<dyn TaskSpawner>,
    session: &Arc<RecordingSession>,
    negotiation_timeout: Duration,
    flush_timeout: Duration,
) -> FinalizeOutcome {
    if !wait_for_recording(session, negotiation_timeout).await {
        // Stopped, closed, or timed out before any media arrived. Not an
        // error from the caller's perspective; there is simply no file.
        return Ok(None);
    }

    // The encoder thread owns the ffmpeg contexts for their whole lifetime;
    // it drains jobs until the channel closes, then finalizes the container.
    let (job_tx, job_rx) = std::sync::mpsc::channel::<EncoderJob>();
    let (done_tx, done_rx) = oneshot::channel::<CoreResult<std::path::PathBuf>>();
    let output_path = session.output_path.clone();
    let thread = std::thread::Builder::new()
        .name(format!("encoder-{}", session.id))
        .spawn(move || {
            let _ = done_tx.send(encode_worker(&output_path, &job_rx));
        });
    if let Err(e) = thread {
        return Err(CoreError::Internal(format!("cannot spawn encoder thread: {e}")));
    }
    log::info!(
        "[Pipeline] Session {} recording to {}",
        session.id,
        session.output_path.display()
    );

    let (clock, clock_handle) = FrameClock::start(spawner);
    let (mut video_ticks, mut audio_ticks) = clock.split();
    while session.state() == SessionState::Recording {
        tokio::select! {
            Some(_tick) = video_ticks.recv() => {
                let frame = compose_current(session);
                if job_tx.send(EncoderJob::Video(frame)).is_err() {
                    // Encoder thread bailed early; its error arrives below.
                    break;
                }
            }
            Some(_tick) = audio_ticks.recv() => {
                let frames: Vec<_> = session
                    .audio_sources
                    .iter_mut()
                    .filter_map(|mut e| e.pop_frame())
                    .collect();
                let mixed = mix(&frames);
                if job_tx.send(EncoderJob::Audio(mixed)).is_err() {
                    break;
                }
            }
            else => break,
        }
    }
    clock_handle.stop();

    // Closing the channel tells the worker to flush and write the trailer.
    drop(job_tx);
    match tokio::time::timeout(flush_timeout, done_rx).await {
        Ok(Ok(result)) => result.map(Some),
        Ok(Err(_)) => Err(CoreError::Internal(
            "encoder thread exited without reporting an outcome".to_string(),
        )),
        Err(_) => Err(CoreError::EncoderFailure(format!(
            "flush exceeded {flush_timeout:?}; file may be truncated"
        ))),
    }
}

/// Runs on the dedicated encoder thread: open, drain, finalize.
fn encode_worker(
    output_path: &std::path::Path,
    jobs: &std::sync::mpsc::Receiver<EncoderJob>,
) -> CoreResult<std::path::PathBuf> {
    let mut encoder = MediaEncoder::open(output_path, CANVAS_WIDTH, CANVAS_HEIGHT)?;
    while let Ok(job) = jobs.recv() {
        match job {
            EncoderJob::Video(frame) => encoder.push_video(&frame)?,
            EncoderJob::Audio(frame) => encoder.push_audio(&frame)?,
        }
    }
    encoder.flush_and_close()
}

/// Waits until the session reaches `Recording`. Returns `false` if it was
/// torn down first or `negotiation_timeout` elapsed.
async fn wait_for_recording(session: &RecordingSession, negotiation_timeout: Duration) -> bool {
    let mut state_rx = session.watch_state();
    let deadline = tokio::time::sleep(negotiation_timeout);
    tokio::pin!(deadline);

    loop {
        match *state_rx.borrow_and_update() {
            SessionState::Recording => return true,
            SessionState::Stopping | SessionState::Closed => return false,
            SessionState::Negotiating => {}
        }
        tokio::select! {
            changed = state_rx.changed() => {
                if changed.is_err() {
                    return false;
                }
            }
            () = &mut deadline => {
                log::warn!(
                    "[Pipeline] Session {} never reached Recording within {negotiation_timeout:?}",
                    session.id
                );
                return false;
            }
        }
    }
}

/// Snapshots the video source set and composes one canvas frame.
///
/// Sources render in attachment order; equal orders (never produced by the
/// attachment counter, but tolerated) fall back to track id so the layout
/// can't flicker between ticks.
fn compose_current(session: &RecordingSession) -> VideoFrame {
    let mut ordered: Vec<(u32, String, Option<VideoFrame>)> = session
        .video_sources
        .iter()
        .map(|e| (e.order, e.key().clone(), e.current_frame().cloned()))
        .collect();
    ordered.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));

    let refs: Vec<_> = ordered.iter().map(|(o, _, f)| (*o, f.as_ref())).collect();
    compose(CANVAS_WIDTH, CANVAS_HEIGHT, &refs)
}
