//! Volume control
//!
//! The media primitive takes a linear level in [0, 1], so no perceptual
//! mapping happens here. Mute is tracked separately and preserves the level.

/// Volume controller
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    /// Volume level (0.0-1.0)
    level: f32,

    /// Mute state (preserves volume level)
    muted: bool,
}

impl Volume {
    /// Create new volume controller
    ///
    /// Out-of-range levels are clamped.
    pub fn new(level: f32) -> Self {
        Self {
            level: Self::clamp(level),
            muted: false,
        }
    }

    /// Set volume level, clamped to [0, 1]
    ///
    /// NaN leaves the level unchanged. Returns the applied level.
    pub fn set_level(&mut self, level: f32) -> f32 {
        if !level.is_nan() {
            self.level = Self::clamp(level);
        }
        self.level
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    /// Toggle mute state, returning the new state
    pub fn toggle_mute(&mut self) -> bool {
        self.muted = !self.muted;
        self.muted
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    fn clamp(level: f32) -> f32 {
        if level.is_nan() {
            0.0
        } else {
            level.clamp(0.0, 1.0)
        }
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_VOLUME)
    }
}
