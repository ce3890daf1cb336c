//! Shared player types (spec.md §3 "Player state", §4.7): the internal
//! command/event enum the producer thread consumes, the `PlayerEvent`s
//! emitted out to callers, and `ProgressState`. Built around the full
//! STOPPED/PLAYING/PAUSED state machine spec.md calls for.

use crate::cache::TrackInfoRef;
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerStatus {
    Stopped,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressState {
    /// Playback position, in seconds.
    pub position: f64,
    /// Track duration in seconds, -1 if unknown.
    pub duration: i32,
}

/// Commands sent from the controlling thread to the producer thread,
/// including `Seek` and `Shutdown` (spec.md's full state table names both).
#[derive(Debug, Clone)]
pub enum InternalEvent {
    Open(String),
    Play,
    Pause,
    Stop,
    /// Absolute seek target, in seconds.
    Seek(f64),
    Shutdown,
}

/// Events the engine reports back to its caller (spec.md §4.7's
/// "callback for next track" / failure signal).
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    TrackEnded,
    /// A decoder open or fatal read failure; the player has gone STOPPED.
    Failed(String),
    /// Device was lost and the second consecutive reopen attempt also
    /// failed (spec.md S6).
    DeviceError(String),
    MetadataChanged,
}

impl From<&EngineError> for PlayerEvent {
    fn from(e: &EngineError) -> Self {
        PlayerEvent::Failed(e.to_string())
    }
}

pub type TrackInfoHandle = Option<TrackInfoRef>;
