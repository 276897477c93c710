//! Shared test helpers: a scripted media element and logging setup

#![allow(dead_code)]

use async_trait::async_trait;
use solace_playback::{
    media_event_channel, AudioSession, MediaElement, MediaError, MediaEvent, MediaEventSender,
    SessionEvent, SessionSettings, Track, UnlockState,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Once};
use std::time::Duration;
use tokio::sync::broadcast;

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

/// Duration the fake reports once a source is ready
pub const MEDIA_DURATION: f64 = 120.0;

/// How the fake answers a `load` of a given URL
#[derive(Debug, Clone)]
pub enum LoadBehavior {
    /// Ready as soon as the session looks at its events
    Immediate,
    /// Ready after a delay
    After(Duration),
    /// Never becomes ready
    Never,
    /// Reports an error
    Fail(MediaError),
}

#[derive(Debug)]
pub struct FakeState {
    pub src: Option<String>,
    /// Id of the load that set `src`
    pub load_id: Option<u64>,
    pub loads: Vec<String>,
    pub load_ids: Vec<u64>,
    pub paused: bool,
    pub position: f64,
    pub duration: Option<f64>,
    pub volume: f32,
    pub volume_history: Vec<f32>,
    pub muted: bool,
    pub looping: bool,
    pub play_calls: usize,
    /// Volume set on the element at each successful play
    pub play_volumes: Vec<f32>,
    pub unloaded: bool,
    /// Every play is rejected with this error
    pub reject_play: Option<MediaError>,
    /// Plays are rejected with `NotAllowed` until this is unlocked
    pub autoplay_policy: Option<UnlockState>,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            src: None,
            load_id: None,
            loads: Vec::new(),
            load_ids: Vec::new(),
            paused: true,
            position: 0.0,
            duration: None,
            volume: 1.0,
            volume_history: Vec::new(),
            muted: false,
            looping: false,
            play_calls: 0,
            play_volumes: Vec::new(),
            unloaded: false,
            reject_play: None,
            autoplay_policy: None,
        }
    }
}

#[derive(Default)]
struct Shared {
    state: Mutex<FakeState>,
    behaviors: Mutex<HashMap<String, LoadBehavior>>,
}

/// Media element whose loading is scripted per URL
pub struct FakeMedia {
    shared: Arc<Shared>,
    events: MediaEventSender,
}

/// Test-side view of a [`FakeMedia`]
#[derive(Clone)]
pub struct FakeControl {
    shared: Arc<Shared>,
    events: MediaEventSender,
}

impl FakeControl {
    pub fn behave(&self, url: &str, behavior: LoadBehavior) {
        self.shared
            .behaviors
            .lock()
            .unwrap()
            .insert(url.to_string(), behavior);
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.shared.state.lock().unwrap()
    }

    pub fn loads(&self) -> Vec<String> {
        self.state().loads.clone()
    }

    pub fn volume(&self) -> f32 {
        self.state().volume
    }

    pub fn is_paused(&self) -> bool {
        self.state().paused
    }

    pub fn play_calls(&self) -> usize {
        self.state().play_calls
    }

    pub fn reject_play(&self, error: Option<MediaError>) {
        self.state().reject_play = error;
    }

    pub fn set_position(&self, seconds: f64) {
        self.state().position = seconds;
    }

    /// Play through to the end, as the platform would
    ///
    /// A looping element wraps around without pausing or reporting the end.
    pub fn finish(&self) {
        {
            let mut state = self.state();
            if state.looping {
                state.position = 0.0;
                return;
            }
            state.position = state.duration.unwrap_or(0.0);
            state.paused = true;
        }
        let _ = self.events.send(MediaEvent::Ended);
    }

    /// Report a media error on the current source
    pub fn fail_current(&self, error: MediaError) {
        let load_id = self.state().load_id.unwrap_or_default();
        let _ = self.events.send(MediaEvent::Error { load_id, error });
    }

    /// Id the session passed with the `n`th load
    pub fn load_id(&self, n: usize) -> u64 {
        self.state().load_ids[n]
    }

    /// Deliver a raw media event
    pub fn send(&self, event: MediaEvent) {
        let _ = self.events.send(event);
    }
}

impl FakeMedia {
    fn mark_ready(shared: &Shared, load_id: u64) {
        let mut state = shared.state.lock().unwrap();
        if state.load_id == Some(load_id) {
            state.duration = Some(MEDIA_DURATION);
        }
    }
}

#[async_trait]
impl MediaElement for FakeMedia {
    fn load(&mut self, url: &str, load_id: u64) {
        {
            let mut state = self.shared.state.lock().unwrap();
            state.loads.push(url.to_string());
            state.load_ids.push(load_id);
            state.src = Some(url.to_string());
            state.load_id = Some(load_id);
            state.paused = true;
            state.position = 0.0;
            state.duration = None;
        }

        let behavior = self
            .shared
            .behaviors
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or(LoadBehavior::Immediate);

        match behavior {
            LoadBehavior::Immediate => {
                Self::mark_ready(&self.shared, load_id);
                let _ = self.events.send(MediaEvent::Ready { load_id });
            }
            LoadBehavior::After(delay) => {
                let shared = self.shared.clone();
                let events = self.events.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    Self::mark_ready(&shared, load_id);
                    let _ = events.send(MediaEvent::Ready { load_id });
                });
            }
            LoadBehavior::Never => {}
            LoadBehavior::Fail(error) => {
                let _ = self.events.send(MediaEvent::Error { load_id, error });
            }
        }
    }

    async fn play(&mut self) -> Result<(), MediaError> {
        let mut state = self.shared.state.lock().unwrap();
        state.play_calls += 1;
        if let Some(error) = state.reject_play.clone() {
            return Err(error);
        }
        if let Some(policy) = &state.autoplay_policy {
            if !policy.is_unlocked() {
                return Err(MediaError::NotAllowed);
            }
        }
        state.paused = false;
        let volume = state.volume;
        state.play_volumes.push(volume);
        Ok(())
    }

    fn pause(&mut self) {
        self.shared.state.lock().unwrap().paused = true;
    }

    fn is_paused(&self) -> bool {
        self.shared.state.lock().unwrap().paused
    }

    fn current_time(&self) -> f64 {
        self.shared.state.lock().unwrap().position
    }

    fn set_current_time(&mut self, seconds: f64) {
        self.shared.state.lock().unwrap().position = seconds;
    }

    fn duration(&self) -> Option<f64> {
        self.shared.state.lock().unwrap().duration
    }

    fn volume(&self) -> f32 {
        self.shared.state.lock().unwrap().volume
    }

    fn set_volume(&mut self, volume: f32) {
        let mut state = self.shared.state.lock().unwrap();
        state.volume = volume;
        state.volume_history.push(volume);
    }

    fn is_muted(&self) -> bool {
        self.shared.state.lock().unwrap().muted
    }

    fn set_muted(&mut self, muted: bool) {
        self.shared.state.lock().unwrap().muted = muted;
    }

    fn is_looping(&self) -> bool {
        self.shared.state.lock().unwrap().looping
    }

    fn set_looping(&mut self, looping: bool) {
        self.shared.state.lock().unwrap().looping = looping;
    }

    fn unload(&mut self) {
        let mut state = self.shared.state.lock().unwrap();
        state.paused = true;
        state.src = None;
        state.load_id = None;
        state.unloaded = true;
    }
}

/// Create a fake media element, its control and the session's event stream
pub fn fake_media() -> (FakeMedia, FakeControl, solace_playback::MediaEventReceiver) {
    let (events, receiver) = media_event_channel();
    let shared = Arc::new(Shared::default());
    let media = FakeMedia {
        shared: shared.clone(),
        events: events.clone(),
    };
    (media, FakeControl { shared, events }, receiver)
}

/// Small catalog used across tests
pub fn test_tracks() -> Vec<Track> {
    vec![
        Track::new("rain", "Gentle Rain", "rain.ogg").with_fallback("rain-backup.ogg"),
        Track::new("storm", "Thunderstorm", "storm.ogg"),
        Track::new("forest", "Forest Night", "forest.ogg").with_duration(600.0),
        Track::new("waves", "Ocean Waves", "waves.ogg"),
    ]
}

/// Session over the test catalog with default settings
pub fn spawn_session() -> (AudioSession, FakeControl) {
    spawn_session_with(SessionSettings::default())
}

pub fn spawn_session_with(settings: SessionSettings) -> (AudioSession, FakeControl) {
    init_test_logging();
    let (media, control, events) = fake_media();
    let session = AudioSession::builder(media, events)
        .catalog(test_tracks())
        .settings(settings)
        .spawn();
    (session, control)
}

/// Drain every event currently buffered on a receiver
pub fn drain(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}
