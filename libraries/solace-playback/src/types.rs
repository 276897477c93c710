//! Core types for audio session management

use crate::error::ErrorReason;
use serde::{Deserialize, Serialize};

/// Playable catalog entry
///
/// Constructed once when the catalog is loaded and never mutated afterwards.
/// The session refers to tracks by `id` only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Unique catalog key
    pub id: String,

    /// Name shown in the UI
    #[serde(alias = "name")]
    pub display_name: String,

    /// Primary media URL
    #[serde(alias = "url")]
    pub source_url: String,

    /// Tried once when the primary source fails to load
    #[serde(default)]
    pub fallback_url: Option<String>,

    /// Duration used until the media reports its own
    #[serde(default)]
    pub known_duration_seconds: Option<f64>,
}

impl Track {
    /// Create a track with only a primary source
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        source_url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            source_url: source_url.into(),
            fallback_url: None,
            known_duration_seconds: None,
        }
    }

    /// Attach a fallback source
    pub fn with_fallback(mut self, url: impl Into<String>) -> Self {
        self.fallback_url = Some(url.into());
        self
    }

    /// Attach a known duration
    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.known_duration_seconds = Some(seconds);
        self
    }

    /// Whether `url` is one of this track's sources
    pub fn has_source(&self, url: &str) -> bool {
        self.source_url == url || self.fallback_url.as_deref() == Some(url)
    }
}

/// Transport status of the session
///
/// A closed set: a session is in exactly one of these at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackStatus {
    /// Nothing playing (initial state, and after a track ends)
    Idle,

    /// Waiting for the media to become ready
    Loading,

    /// Audio is playing
    Playing,

    /// Paused mid-track
    Paused,

    /// Track reached its natural end
    Ended,

    /// Loading or starting failed; only a fresh `play` recovers
    Error(ErrorReason),
}

impl PlaybackStatus {
    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackStatus::Playing)
    }

    pub fn error_reason(&self) -> Option<ErrorReason> {
        match self {
            PlaybackStatus::Error(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Snapshot of the session state broadcast to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    /// Selected track, retained through `Ended` and `Idle` for replay
    pub current_track_id: Option<String>,

    pub status: PlaybackStatus,

    /// Always >= 0 and never past `duration_seconds` when that is known
    pub position_seconds: f64,

    /// `None` while the duration is unknown
    pub duration_seconds: Option<f64>,

    /// Configured volume in [0, 1]
    pub volume: f32,

    pub muted: bool,

    pub looping: bool,
}

impl PlaybackState {
    /// Initial state for a session
    pub fn new(volume: f32, looping: bool) -> Self {
        Self {
            current_track_id: None,
            status: PlaybackStatus::Idle,
            position_seconds: 0.0,
            duration_seconds: None,
            volume,
            muted: false,
            looping,
        }
    }

    /// Playback progress in percent (0-100), 0 when duration is unknown
    pub fn progress_percent(&self) -> f64 {
        match self.duration_seconds {
            Some(duration) if duration > 0.0 => {
                (self.position_seconds / duration * 100.0).clamp(0.0, 100.0)
            }
            _ => 0.0,
        }
    }

    /// Whether `track_id` is the current track and playing
    pub fn is_playing_track(&self, track_id: &str) -> bool {
        self.status.is_playing() && self.current_track_id.as_deref() == Some(track_id)
    }
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_VOLUME, false)
    }
}

/// Validate and normalize a duration reported by media or config
///
/// Only finite values greater than zero count as a known duration.
pub(crate) fn known_duration(seconds: Option<f64>) -> Option<f64> {
    seconds.filter(|s| s.is_finite() && *s > 0.0)
}
