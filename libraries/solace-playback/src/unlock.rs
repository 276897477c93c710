//! Autoplay unlock
//!
//! Browsers refuse programmatic playback until the page has seen a user
//! gesture. The first genuine interaction is used to run a muted play/pause
//! round trip, after which playback is allowed for the rest of the page's
//! lifetime.

use crate::error::{PlaybackError, Result};
use crate::media::MediaElement;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

/// Page-lifetime unlock flag
///
/// Set at most once and never reset. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct UnlockState {
    unlocked: Arc<AtomicBool>,
}

impl UnlockState {
    /// A fresh, locked flag
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide flag
    pub fn process() -> Self {
        static PROCESS: OnceLock<UnlockState> = OnceLock::new();
        PROCESS.get_or_init(UnlockState::new).clone()
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked.load(Ordering::Acquire)
    }

    /// Mark as unlocked
    ///
    /// Returns true if this call performed the transition.
    pub fn mark_unlocked(&self) -> bool {
        !self.unlocked.swap(true, Ordering::AcqRel)
    }
}

/// Detects and satisfies the platform autoplay policy
#[async_trait]
pub trait UnlockGate: Send + 'static {
    /// Whether unprompted playback is currently permitted
    fn is_unlocked(&self) -> bool;

    /// Perform the minimal unlock gesture
    ///
    /// # Returns
    /// * `Ok(())` - Unlocked (or already was)
    /// * `Err(PlaybackError::StillBlocked)` - The gesture was rejected
    async fn unlock(&mut self) -> Result<()>;
}

/// Gate for platforms without an autoplay policy
#[derive(Debug, Clone, Copy, Default)]
pub struct NoUnlockRequired;

#[async_trait]
impl UnlockGate for NoUnlockRequired {
    fn is_unlocked(&self) -> bool {
        true
    }

    async fn unlock(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Gate that unlocks by playing and pausing a muted probe element
///
/// The probe should have a short (silent) source loaded; it is never
/// audible because it is muted before playing.
pub struct ProbeUnlockGate<P: MediaElement> {
    probe: P,
    state: UnlockState,
}

impl<P: MediaElement> ProbeUnlockGate<P> {
    pub fn new(probe: P, state: UnlockState) -> Self {
        Self { probe, state }
    }

    pub fn state(&self) -> &UnlockState {
        &self.state
    }
}

#[async_trait]
impl<P: MediaElement> UnlockGate for ProbeUnlockGate<P> {
    fn is_unlocked(&self) -> bool {
        self.state.is_unlocked()
    }

    async fn unlock(&mut self) -> Result<()> {
        if self.state.is_unlocked() {
            debug!("Autoplay already unlocked");
            return Ok(());
        }

        self.probe.set_muted(true);
        match self.probe.play().await {
            Ok(()) => {
                self.probe.pause();
                if self.state.mark_unlocked() {
                    info!("Autoplay unlocked");
                }
                Ok(())
            }
            Err(e) => {
                warn!("Autoplay unlock gesture rejected: {}", e);
                Err(PlaybackError::StillBlocked)
            }
        }
    }
}
