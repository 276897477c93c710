//! Solace - Audio Session Management
//!
//! One shared audio session for the whole application: every screen that
//! plays sleep sounds, stories or ambient loops goes through it, so at most
//! one track is ever audible.
//!
//! This crate provides:
//! - Track catalog (built-in or loaded from config)
//! - Transport control (play, pause, stop, seek, volume, mute, loop)
//! - Bounded wait for source readiness with a one-shot fallback source
//! - Autoplay unlock gate for platforms that require a user gesture
//! - Fade-in playback
//! - State snapshots and ordered events for UI consumers
//!
//! # Architecture
//!
//! `solace-playback` is platform-agnostic:
//! - The playable resource is a [`MediaElement`] supplied by the platform
//! - The autoplay policy is satisfied by an [`UnlockGate`]
//! - The session itself is a tokio task; UI code holds [`SessionHandle`]s
//!
//! Requests that race (a second `play` while the first is still loading)
//! resolve in call order: the latest intent wins and stale completions are
//! dropped.
//!
//! # Example
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use solace_playback::{media_event_channel, AudioConfig, AudioSession, MediaElement, MediaError};
//!
//! // Platform adapter around the real audio output
//! struct Speaker;
//!
//! #[async_trait]
//! impl MediaElement for Speaker {
//!     fn load(&mut self, _url: &str, _load_id: u64) {}
//!     async fn play(&mut self) -> Result<(), MediaError> { Ok(()) }
//!     fn pause(&mut self) {}
//!     fn is_paused(&self) -> bool { true }
//!     fn current_time(&self) -> f64 { 0.0 }
//!     fn set_current_time(&mut self, _seconds: f64) {}
//!     fn duration(&self) -> Option<f64> { None }
//!     fn volume(&self) -> f32 { 1.0 }
//!     fn set_volume(&mut self, _volume: f32) {}
//!     fn is_muted(&self) -> bool { false }
//!     fn set_muted(&mut self, _muted: bool) {}
//!     fn is_looping(&self) -> bool { false }
//!     fn set_looping(&mut self, _looping: bool) {}
//! }
//!
//! # async fn run() -> solace_playback::Result<()> {
//! let config = AudioConfig::load(None)?;
//! let (_events_tx, events_rx) = media_event_channel();
//!
//! let session = AudioSession::builder(Speaker, events_rx)
//!     .config(&config)
//!     .spawn();
//!
//! session.set_volume(0.5).await?;
//! session.fade_in_play_default("rain-ambient").await?;
//!
//! let state = session.snapshot();
//! println!("{:?} at {:.0}%", state.status, state.progress_percent());
//!
//! session.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod config;
mod error;
pub mod events;
pub mod fade;
pub mod media;
mod session;
pub mod types;
pub mod unlock;
mod volume;

// Public exports
pub use catalog::{builtin_tracks, TrackCatalog};
pub use config::{AudioConfig, SessionSettings};
pub use error::{ErrorReason, PlaybackError, Result};
pub use events::SessionEvent;
pub use fade::{FadeCurve, FadeRamp};
pub use media::{
    media_event_channel, MediaElement, MediaError, MediaEvent, MediaEventReceiver,
    MediaEventSender,
};
pub use session::{AudioSession, SessionBuilder, SessionHandle};
pub use types::{PlaybackState, PlaybackStatus, Track};
pub use unlock::{NoUnlockRequired, ProbeUnlockGate, UnlockGate, UnlockState};
pub use volume::Volume;
