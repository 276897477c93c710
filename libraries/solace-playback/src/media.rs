//! Platform media primitive
//!
//! Abstracts "load a URL and play it" for different targets (browser audio
//! element, desktop output, headless test doubles).

use crate::error::ErrorReason;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Failure reported by the platform media primitive
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    /// Programmatic playback rejected by the autoplay policy
    #[error("Playback not allowed without user interaction")]
    NotAllowed,

    /// Network failure while fetching the source
    #[error("Network error")]
    Network,

    /// Source could not be decoded
    #[error("Decode error")]
    Decode,

    /// Source format is not supported
    #[error("Unsupported source")]
    Unsupported,

    /// Loading was aborted
    #[error("Load aborted")]
    Aborted,

    /// Anything else the platform reports
    #[error("Media error: {0}")]
    Other(String),
}

impl MediaError {
    /// Session-level reason for this failure
    pub fn reason(&self) -> ErrorReason {
        match self {
            MediaError::NotAllowed => ErrorReason::AutoplayBlocked,
            MediaError::Decode | MediaError::Unsupported => ErrorReason::DecodeError,
            MediaError::Network | MediaError::Aborted | MediaError::Other(_) => {
                ErrorReason::LoadFailed
            }
        }
    }
}

/// Notification from the media primitive
///
/// Load-related events echo the id of the `load` call they answer so the
/// session can discard events for loads it has already abandoned, even when
/// the same URL was loaded again since.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    /// Source is buffered enough to start playback
    Ready { load_id: u64 },

    /// Source failed to load or decode
    Error { load_id: u64, error: MediaError },

    /// Playback reached the end of the source (never fires while looping)
    Ended,

    /// Playback position moved
    TimeUpdate { position_seconds: f64 },
}

/// Sending half used by media implementations to report events
pub type MediaEventSender = mpsc::UnboundedSender<MediaEvent>;

/// Receiving half handed to the session
pub type MediaEventReceiver = mpsc::UnboundedReceiver<MediaEvent>;

/// Create a media event channel
pub fn media_event_channel() -> (MediaEventSender, MediaEventReceiver) {
    mpsc::unbounded_channel()
}

/// Platform-agnostic playable audio resource
///
/// The session owns exactly one implementor and is the only caller. Readiness
/// and failures of `load` are reported asynchronously through the event
/// channel given to the session next to the element.
#[async_trait]
pub trait MediaElement: Send + 'static {
    /// Replace the source and start loading it
    ///
    /// Must eventually emit `Ready` or `Error` carrying `load_id` (or
    /// neither, in which case the session times out). Ids are unique per
    /// call.
    fn load(&mut self, url: &str, load_id: u64);

    /// Start playback of the loaded source
    ///
    /// # Returns
    /// * `Ok(())` - Playback started
    /// * `Err(MediaError::NotAllowed)` - Rejected by autoplay policy
    async fn play(&mut self) -> Result<(), MediaError>;

    fn pause(&mut self);

    /// Whether the resource is currently paused
    fn is_paused(&self) -> bool;

    /// Current position in seconds
    fn current_time(&self) -> f64;

    fn set_current_time(&mut self, seconds: f64);

    /// Total duration, `None` while unknown
    fn duration(&self) -> Option<f64>;

    fn volume(&self) -> f32;

    fn set_volume(&mut self, volume: f32);

    fn is_muted(&self) -> bool;

    fn set_muted(&mut self, muted: bool);

    fn is_looping(&self) -> bool;

    fn set_looping(&mut self, looping: bool);

    /// Release the source on teardown
    ///
    /// Defaults to pausing.
    fn unload(&mut self) {
        self.pause();
    }
}
