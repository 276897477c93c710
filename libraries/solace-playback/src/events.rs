//! Session Events
//!
//! Event-based communication for UI synchronization. The latest state is
//! always available as a snapshot; events describe the individual
//! transitions in the order they happened:
//! - Status changes (loading/playing/paused/ended/error)
//! - Track changes
//! - Position updates (periodic)
//! - Volume, mute and loop changes
//! - Fade-in start and completion

use crate::error::ErrorReason;
use crate::types::PlaybackStatus;
use serde::{Deserialize, Serialize};

/// Events emitted by the audio session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionEvent {
    /// Status changed
    StatusChanged {
        /// Track the status applies to
        track_id: Option<String>,
        /// The new status
        status: PlaybackStatus,
    },

    /// A different track became current
    TrackChanged {
        /// ID of the new (current) track
        track_id: String,
        /// ID of the previous track (if any)
        previous_track_id: Option<String>,
    },

    /// Track finished playing naturally (reached end)
    TrackEnded {
        /// ID of the finished track
        track_id: String,
    },

    /// Position update (periodic while playing)
    PositionUpdate {
        position_seconds: f64,
        duration_seconds: Option<f64>,
    },

    /// Volume or mute changed
    VolumeChanged { volume: f32, muted: bool },

    /// Loop flag changed
    LoopChanged { looping: bool },

    /// A fade-in ramp started
    FadeStarted { track_id: String, duration_ms: u64 },

    /// A fade-in ramp reached its target
    FadeCompleted { track_id: String },

    /// The primary source failed and the fallback is being loaded
    FallbackAttempted { track_id: String, url: String },

    /// The catalog was replaced
    CatalogChanged { length: usize },

    /// Playback failed
    Error {
        track_id: Option<String>,
        reason: ErrorReason,
    },
}

impl SessionEvent {
    /// Status carried by a `StatusChanged` event
    pub fn status(&self) -> Option<PlaybackStatus> {
        match self {
            SessionEvent::StatusChanged { status, .. } => Some(*status),
            _ => None,
        }
    }
}
