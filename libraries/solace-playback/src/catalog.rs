//! Track catalog
//!
//! Read-only registry of playable tracks. Insertion order is preserved so UI
//! lists stay stable.

use crate::types::Track;
use std::collections::HashMap;
use tracing::warn;

/// Ordered track registry with id lookup
#[derive(Debug, Clone, Default)]
pub struct TrackCatalog {
    tracks: Vec<Track>,
    index: HashMap<String, usize>,
}

impl TrackCatalog {
    /// Build a catalog from tracks in display order
    ///
    /// Ids must be unique; a later entry reusing an id is dropped.
    pub fn new(tracks: Vec<Track>) -> Self {
        let mut catalog = Self {
            tracks: Vec::with_capacity(tracks.len()),
            index: HashMap::with_capacity(tracks.len()),
        };

        for track in tracks {
            if catalog.index.contains_key(&track.id) {
                warn!("Dropping duplicate catalog entry: {}", track.id);
                continue;
            }
            catalog.index.insert(track.id.clone(), catalog.tracks.len());
            catalog.tracks.push(track);
        }

        catalog
    }

    /// Built-in ambient and guided tracks
    pub fn builtin() -> Self {
        Self::new(builtin_tracks())
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Track> {
        self.index.get(id).map(|&i| &self.tracks[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// All tracks in insertion order
    pub fn list(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

impl From<Vec<Track>> for TrackCatalog {
    fn from(tracks: Vec<Track>) -> Self {
        Self::new(tracks)
    }
}

/// Tracks shipped with the app
///
/// Guided sessions prefer a locally bundled file and fall back to a hosted copy.
pub fn builtin_tracks() -> Vec<Track> {
    vec![
        Track::new(
            "rain-ambient",
            "Rain Ambience",
            "https://actions.google.com/sounds/v1/weather/rain_heavy_loud.ogg",
        ),
        Track::new(
            "soft-piano",
            "Soft Piano",
            "https://actions.google.com/sounds/v1/ambiences/magical_chime.ogg",
        ),
        Track::new(
            "sleep-music",
            "Sleep Music",
            "https://actions.google.com/sounds/v1/ambiences/overnight_silence.ogg",
        ),
        Track::new(
            "nature-sounds",
            "Nature Sounds",
            "https://actions.google.com/sounds/v1/weather/thunder_crack.ogg",
        ),
        Track::new(
            "meditation",
            "Meditation",
            "https://actions.google.com/sounds/v1/ambiences/rolling_brook.ogg",
        ),
        Track::new(
            "relaxing-nature",
            "Relaxing Nature",
            "https://actions.google.com/sounds/v1/weather/wind.ogg",
        ),
        Track::new(
            "deep-relaxation",
            "Deep Relaxation Meditation",
            "/audio/piano-meditation-1.mp3",
        )
        .with_fallback("https://www.soundhelix.com/examples/mp3/SoundHelix-Song-1.mp3")
        .with_duration(300.0),
        Track::new(
            "starry-sleep-story",
            "Starry Sky Sleep Story",
            "/audio/piano-sleep-1.mp3",
        )
        .with_fallback("https://www.soundhelix.com/examples/mp3/SoundHelix-Song-2.mp3")
        .with_duration(600.0),
        Track::new(
            "forest-white-noise",
            "Forest White Noise",
            "/audio/piano-forest-1.mp3",
        )
        .with_fallback("https://www.soundhelix.com/examples/mp3/SoundHelix-Song-3.mp3")
        .with_duration(900.0),
    ]
}
