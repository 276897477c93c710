//! Audio session configuration

use crate::catalog::{builtin_tracks, TrackCatalog};
use crate::error::{PlaybackError, Result};
use crate::fade::FadeCurve;
use crate::types::Track;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Default session volume
pub const DEFAULT_VOLUME: f32 = 0.7;

/// Environment variable prefix (`SOLACE__SESSION__INITIAL_VOLUME=0.5`)
pub const ENV_PREFIX: &str = "SOLACE";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AudioConfig {
    #[serde(default)]
    pub session: SessionSettings,

    #[serde(default = "builtin_tracks")]
    pub tracks: Vec<Track>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SessionSettings {
    /// Bound on the wait for media readiness
    #[serde(default = "default_readiness_timeout_ms")]
    pub readiness_timeout_ms: u64,

    /// Position/end-of-track polling period while playing
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Number of volume steps in a fade-in
    #[serde(default = "default_fade_steps")]
    pub fade_steps: u32,

    /// Fade-in length when the caller does not pass one
    #[serde(default = "default_fade_ms")]
    pub default_fade_ms: u64,

    #[serde(default = "default_initial_volume")]
    pub initial_volume: f32,

    #[serde(default)]
    pub looping: bool,

    #[serde(default)]
    pub fade_curve: FadeCurve,
}

fn default_readiness_timeout_ms() -> u64 {
    5000
}

fn default_tick_interval_ms() -> u64 {
    250
}

fn default_fade_steps() -> u32 {
    60
}

fn default_fade_ms() -> u64 {
    2000
}

fn default_initial_volume() -> f32 {
    DEFAULT_VOLUME
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            readiness_timeout_ms: default_readiness_timeout_ms(),
            tick_interval_ms: default_tick_interval_ms(),
            fade_steps: default_fade_steps(),
            default_fade_ms: default_fade_ms(),
            initial_volume: default_initial_volume(),
            looping: false,
            fade_curve: FadeCurve::default(),
        }
    }
}

impl SessionSettings {
    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness_timeout_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn default_fade(&self) -> Duration {
        Duration::from_millis(self.default_fade_ms)
    }

    /// Validate settings
    pub fn validate(&self) -> Result<()> {
        if self.readiness_timeout_ms == 0 {
            return Err(PlaybackError::Config(
                "readiness_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(PlaybackError::Config(
                "tick_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.fade_steps == 0 {
            return Err(PlaybackError::Config(
                "fade_steps must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.initial_volume) {
            return Err(PlaybackError::Config(format!(
                "initial_volume must be within [0, 1], got {}",
                self.initial_volume
            )));
        }
        Ok(())
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            session: SessionSettings::default(),
            tracks: builtin_tracks(),
        }
    }
}

impl AudioConfig {
    /// Load configuration from an optional TOML file and the environment
    ///
    /// Environment variables use the `SOLACE` prefix and `__` as the
    /// nesting separator.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = ::config::Config::builder();

        if let Some(path) = path {
            settings = settings.add_source(::config::File::from(path).required(true));
        }

        settings = settings.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config = settings
            .build()
            .map_err(|e| PlaybackError::Config(e.to_string()))?;

        let config: Self = config
            .try_deserialize()
            .map_err(|e| PlaybackError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text (no environment overrides)
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config = ::config::Config::builder()
            .add_source(::config::File::from_str(text, ::config::FileFormat::Toml))
            .build()
            .map_err(|e| PlaybackError::Config(e.to_string()))?;

        let config: Self = config
            .try_deserialize()
            .map_err(|e| PlaybackError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.session.validate()?;

        let mut seen = HashSet::new();
        for track in &self.tracks {
            if track.id.is_empty() {
                return Err(PlaybackError::Config("track id must not be empty".to_string()));
            }
            if track.source_url.is_empty() {
                return Err(PlaybackError::Config(format!(
                    "track '{}' has an empty source_url",
                    track.id
                )));
            }
            if !seen.insert(track.id.as_str()) {
                return Err(PlaybackError::Config(format!(
                    "duplicate track id '{}'",
                    track.id
                )));
            }
        }

        Ok(())
    }

    /// Catalog built from the configured tracks
    pub fn catalog(&self) -> TrackCatalog {
        TrackCatalog::new(self.tracks.clone())
    }
}
