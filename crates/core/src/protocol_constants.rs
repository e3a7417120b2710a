//! Fixed protocol constants that should NOT be changed.
//!
//! These values are defined by the compositing/mixing contract and changing
//! them would break frame shape guarantees downstream (encoder, tests).

// ─────────────────────────────────────────────────────────────────────────────
// Video Canvas
// ─────────────────────────────────────────────────────────────────────────────

/// Composed canvas width, pixels.
pub const CANVAS_WIDTH: u32 = 1280;

/// Composed canvas height, pixels.
pub const CANVAS_HEIGHT: u32 = 720;

/// Target video tick rate (Hz).
pub const VIDEO_TICK_HZ: u32 = 30;

/// How long a video source's last frame is reused after it stops delivering
/// before its slot is treated as empty (milliseconds).
pub const VIDEO_SOURCE_STALE_MS: u64 = 1000;

/// PiP tile width as a fraction of canvas width.
pub const PIP_WIDTH_FRACTION: f64 = 0.25;

/// PiP tile padding from canvas edges, pixels.
pub const PIP_PADDING_PX: u32 = 10;

// ─────────────────────────────────────────────────────────────────────────────
// Audio Mix
// ─────────────────────────────────────────────────────────────────────────────

/// Mixed output sample rate (Hz).
pub const AUDIO_SAMPLE_RATE: u32 = 48_000;

/// Mixed output channel count (stereo).
pub const AUDIO_CHANNELS: u16 = 2;

/// Audio tick interval, milliseconds. Also the mixed frame duration.
pub const AUDIO_TICK_MS: u64 = 20;

/// Samples per mixed frame: 20ms @ 48kHz.
pub const AUDIO_FRAME_SAMPLES: usize = (AUDIO_SAMPLE_RATE as u64 * AUDIO_TICK_MS / 1000) as usize;

/// Per-source ring buffer capacity, in mixed frames (= 200ms).
pub const AUDIO_SOURCE_BUFFER_FRAMES: usize = 10;

// ─────────────────────────────────────────────────────────────────────────────
// Session Lifecycle
// ─────────────────────────────────────────────────────────────────────────────

/// Time allowed for a session to reach `Recording` before `begin` fails (seconds).
pub const NEGOTIATION_TIMEOUT_SECS: u64 = 30;

/// Bounded duration for the encoder to flush and close on `end` (seconds).
pub const ENCODER_FLUSH_TIMEOUT_SECS: u64 = 10;

/// Default output container extension.
pub const DEFAULT_CONTAINER_EXT: &str = "mkv";

// ─────────────────────────────────────────────────────────────────────────────
// Room Hub / Signaling Socket
// ─────────────────────────────────────────────────────────────────────────────

/// WebSocket heartbeat timeout (seconds). A participant silent longer than
/// this is forcibly disconnected.
pub const WS_HEARTBEAT_TIMEOUT_SECS: u64 = 30;

/// Interval between server pings / liveness checks on a room socket
/// (seconds).
pub const WS_HEARTBEAT_CHECK_INTERVAL_SECS: u64 = 10;

/// Capacity of the per-room broadcast channel.
pub const ROOM_BROADCAST_CAPACITY: usize = 256;

// ─────────────────────────────────────────────────────────────────────────────
// Application Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Application name surfaced in health/status responses.
pub const APP_NAME: &str = "Classroom Streaming Core";
