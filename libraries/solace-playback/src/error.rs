//! Error types for audio session management

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a track ended up in the `Error` status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorReason {
    /// Network failure or an unusable source
    LoadFailed,

    /// Readiness wait exceeded the configured bound
    Timeout,

    /// The platform rejected programmatic playback (autoplay policy)
    AutoplayBlocked,

    /// The media could not be decoded
    DecodeError,
}

impl ErrorReason {
    /// Whether a later `play` after a user gesture may succeed
    /// without any change to the source.
    pub fn awaits_user_gesture(&self) -> bool {
        matches!(self, ErrorReason::AutoplayBlocked)
    }
}

impl std::fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ErrorReason::LoadFailed => "load failed",
            ErrorReason::Timeout => "timed out waiting for media",
            ErrorReason::AutoplayBlocked => "autoplay blocked",
            ErrorReason::DecodeError => "decode error",
        };
        f.write_str(text)
    }
}

/// Audio session errors
///
/// Every session operation reports one of these as a value; none of them
/// escape as a panic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    /// Track id is not in the catalog
    #[error("Track not found: {0}")]
    NotFound(String),

    /// Loading or starting the track failed
    #[error("Playback failed: {0}")]
    Failed(ErrorReason),

    /// The unlock gesture was itself rejected by the platform
    #[error("Autoplay is still blocked")]
    StillBlocked,

    /// A newer transport request replaced this one before it completed
    #[error("Superseded by a newer request")]
    Superseded,

    /// The session has been shut down
    #[error("Audio session closed")]
    SessionClosed,

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PlaybackError {
    /// The state-machine reason carried by this error, if any
    pub fn reason(&self) -> Option<ErrorReason> {
        match self {
            PlaybackError::Failed(reason) => Some(*reason),
            _ => None,
        }
    }
}

impl From<ErrorReason> for PlaybackError {
    fn from(reason: ErrorReason) -> Self {
        PlaybackError::Failed(reason)
    }
}

/// Result type for audio session operations
pub type Result<T> = std::result::Result<T, PlaybackError>;
