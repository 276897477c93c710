//! Audio session - single owner of the playable resource
//!
//! The session runs as one tokio task (the driver) that exclusively owns the
//! media element, the unlock gate, the catalog and the playback state. UI code
//! talks to it through cloneable [`SessionHandle`]s: every operation is a
//! command with a reply channel, so state is only ever mutated on the driver
//! task and no locks are involved.
//!
//! The driver waits on four things at once:
//! - commands from handles
//! - media events (ready, error, ended, time update)
//! - the readiness deadline of an in-flight load
//! - the position tick and the fade-in step timer
//!
//! Every transport intent bumps an operation token. Loads and fades remember
//! the token they were started under; anything that fires under an older
//! token is ignored, so a slow first load can never clobber a later choice.

use crate::catalog::TrackCatalog;
use crate::config::{AudioConfig, SessionSettings};
use crate::error::{ErrorReason, PlaybackError, Result};
use crate::events::SessionEvent;
use crate::fade::FadeRamp;
use crate::media::{MediaElement, MediaError, MediaEvent, MediaEventReceiver};
use crate::types::{known_duration, PlaybackState, PlaybackStatus, Track};
use crate::unlock::{NoUnlockRequired, UnlockGate};
use crate::volume::Volume;
use std::future::Future;
use std::ops::{ControlFlow, Deref};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Capacity of the event broadcast channel
const EVENT_CAPACITY: usize = 64;

type Reply<T> = oneshot::Sender<Result<T>>;

enum Command {
    LoadCatalog {
        tracks: Vec<Track>,
        reply: Reply<()>,
    },
    Play {
        track_id: String,
        fade: Option<Duration>,
        unlock: bool,
        reply: Reply<()>,
    },
    Pause {
        reply: Reply<()>,
    },
    Stop {
        reply: Reply<()>,
    },
    ToggleMute {
        reply: Reply<bool>,
    },
    SetVolume {
        volume: f32,
        reply: Reply<f32>,
    },
    Seek {
        percent: f64,
        reply: Reply<()>,
    },
    SetLooping {
        looping: bool,
        reply: Reply<()>,
    },
    Tracks {
        reply: Reply<Vec<Track>>,
    },
    Track {
        track_id: String,
        reply: Reply<Option<Track>>,
    },
    Shutdown {
        reply: Option<oneshot::Sender<()>>,
    },
}

/// Builder for [`AudioSession`]
pub struct SessionBuilder<M: MediaElement, G: UnlockGate = NoUnlockRequired> {
    media: M,
    media_events: MediaEventReceiver,
    gate: G,
    catalog: TrackCatalog,
    settings: SessionSettings,
}

impl<M: MediaElement> SessionBuilder<M, NoUnlockRequired> {
    fn new(media: M, media_events: MediaEventReceiver) -> Self {
        Self {
            media,
            media_events,
            gate: NoUnlockRequired,
            catalog: TrackCatalog::default(),
            settings: SessionSettings::default(),
        }
    }
}

impl<M: MediaElement, G: UnlockGate> SessionBuilder<M, G> {
    /// Use `gate` to satisfy the platform autoplay policy
    pub fn unlock_gate<G2: UnlockGate>(self, gate: G2) -> SessionBuilder<M, G2> {
        SessionBuilder {
            media: self.media,
            media_events: self.media_events,
            gate,
            catalog: self.catalog,
            settings: self.settings,
        }
    }

    pub fn catalog(mut self, catalog: impl Into<TrackCatalog>) -> Self {
        self.catalog = catalog.into();
        self
    }

    pub fn settings(mut self, settings: SessionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Take both settings and tracks from a loaded configuration
    pub fn config(self, config: &AudioConfig) -> Self {
        self.settings(config.session.clone()).catalog(config.catalog())
    }

    /// Start the session driver
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self) -> AudioSession {
        let volume = Volume::new(self.settings.initial_volume);
        let state = PlaybackState::new(volume.level(), self.settings.looping);

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(state.clone());
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

        let handle = SessionHandle {
            commands: commands_tx,
            state: state_rx,
            events: events_tx.clone(),
            default_fade: self.settings.default_fade(),
        };

        let driver = SessionDriver {
            media: self.media,
            media_events: self.media_events,
            gate: self.gate,
            catalog: self.catalog,
            settings: self.settings,
            volume,
            state,
            token: 0,
            load_seq: 0,
            loaded: None,
            pending: None,
            ticker: None,
            fade: None,
            state_tx,
            events_tx,
        };

        let task = tokio::spawn(driver.run(commands_rx));

        AudioSession {
            handle,
            task: Some(task),
        }
    }
}

/// Owning side of an audio session
///
/// Created once by the application root; consumers get [`SessionHandle`]s via
/// [`AudioSession::handle`]. Dropping the session (or calling
/// [`AudioSession::shutdown`]) releases the media resource.
pub struct AudioSession {
    handle: SessionHandle,
    task: Option<JoinHandle<()>>,
}

impl AudioSession {
    /// Start building a session around a media element and its event stream
    pub fn builder<M: MediaElement>(
        media: M,
        media_events: MediaEventReceiver,
    ) -> SessionBuilder<M, NoUnlockRequired> {
        SessionBuilder::new(media, media_events)
    }

    /// A handle for a UI consumer
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Tear the session down and wait for the driver to finish
    ///
    /// Pending requests resolve with `SessionClosed`.
    pub async fn shutdown(mut self) {
        let (reply, done) = oneshot::channel();
        if self
            .handle
            .commands
            .send(Command::Shutdown { reply: Some(reply) })
            .is_ok()
        {
            let _ = done.await;
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Deref for AudioSession {
    type Target = SessionHandle;

    fn deref(&self) -> &SessionHandle {
        &self.handle
    }
}

impl Drop for AudioSession {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.handle.commands.send(Command::Shutdown { reply: None });
        }
    }
}

/// Cloneable access to a running session
///
/// Requests are queued the moment a method is called, so calls are processed
/// in call order; awaiting the returned future yields the outcome.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<PlaybackState>,
    events: broadcast::Sender<SessionEvent>,
    default_fade: Duration,
}

impl SessionHandle {
    /// Replace the catalog
    ///
    /// Playback stops (state resets to `Idle`) only if the current track is
    /// no longer present.
    pub fn load_catalog(
        &self,
        tracks: Vec<Track>,
    ) -> impl Future<Output = Result<()>> + Send + 'static {
        let (reply, response) = oneshot::channel();
        self.dispatch(Command::LoadCatalog { tracks, reply }, response)
    }

    /// Play a track from the catalog
    ///
    /// # Returns
    /// * `Ok(())` - The track is playing
    /// * `Err(NotFound)` - Unknown id, state unchanged
    /// * `Err(Failed(reason))` - Load or start failed; status is `Error(reason)`
    /// * `Err(Superseded)` - A newer transport request took over
    pub fn play(
        &self,
        track_id: impl Into<String>,
    ) -> impl Future<Output = Result<()>> + Send + 'static {
        let (reply, response) = oneshot::channel();
        let command = Command::Play {
            track_id: track_id.into(),
            fade: None,
            unlock: false,
            reply,
        };
        self.dispatch(command, response)
    }

    /// Play a track, ramping its volume up from silence over `duration`
    ///
    /// The ramp is abandoned if the track is paused or replaced mid-way.
    pub fn fade_in_play(
        &self,
        track_id: impl Into<String>,
        duration: Duration,
    ) -> impl Future<Output = Result<()>> + Send + 'static {
        let (reply, response) = oneshot::channel();
        let command = Command::Play {
            track_id: track_id.into(),
            fade: Some(duration),
            unlock: false,
            reply,
        };
        self.dispatch(command, response)
    }

    /// [`fade_in_play`](Self::fade_in_play) with the configured default length
    pub fn fade_in_play_default(
        &self,
        track_id: impl Into<String>,
    ) -> impl Future<Output = Result<()>> + Send + 'static {
        self.fade_in_play(track_id, self.default_fade)
    }

    /// Run the autoplay unlock gesture if needed, then play
    ///
    /// Call from a user-gesture handler. Returns the outcome of the play;
    /// a rejected unlock is logged and surfaces as `AutoplayBlocked` if the
    /// play is rejected too.
    pub fn unlock_and_play(
        &self,
        track_id: impl Into<String>,
    ) -> impl Future<Output = Result<()>> + Send + 'static {
        let (reply, response) = oneshot::channel();
        let command = Command::Play {
            track_id: track_id.into(),
            fade: None,
            unlock: true,
            reply,
        };
        self.dispatch(command, response)
    }

    /// Pause if playing; cancels a load still waiting for readiness
    pub fn pause(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        let (reply, response) = oneshot::channel();
        self.dispatch(Command::Pause { reply }, response)
    }

    /// Stop and rewind to the start; the current track stays selected
    pub fn stop(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        let (reply, response) = oneshot::channel();
        self.dispatch(Command::Stop { reply }, response)
    }

    /// Flip mute, returning the new mute state
    pub fn toggle_mute(&self) -> impl Future<Output = Result<bool>> + Send + 'static {
        let (reply, response) = oneshot::channel();
        self.dispatch(Command::ToggleMute { reply }, response)
    }

    /// Set the volume, clamped to [0, 1]; returns the applied level
    pub fn set_volume(&self, volume: f32) -> impl Future<Output = Result<f32>> + Send + 'static {
        let (reply, response) = oneshot::channel();
        self.dispatch(Command::SetVolume { volume, reply }, response)
    }

    /// Seek to a percentage (0-100) of the track
    ///
    /// No-op while the duration is unknown.
    pub fn seek(&self, percent: f64) -> impl Future<Output = Result<()>> + Send + 'static {
        let (reply, response) = oneshot::channel();
        self.dispatch(Command::Seek { percent, reply }, response)
    }

    pub fn set_looping(&self, looping: bool) -> impl Future<Output = Result<()>> + Send + 'static {
        let (reply, response) = oneshot::channel();
        self.dispatch(Command::SetLooping { looping, reply }, response)
    }

    /// Catalog tracks in display order
    pub fn tracks(&self) -> impl Future<Output = Result<Vec<Track>>> + Send + 'static {
        let (reply, response) = oneshot::channel();
        self.dispatch(Command::Tracks { reply }, response)
    }

    /// Look up one catalog entry
    pub fn track(
        &self,
        track_id: impl Into<String>,
    ) -> impl Future<Output = Result<Option<Track>>> + Send + 'static {
        let (reply, response) = oneshot::channel();
        let command = Command::Track {
            track_id: track_id.into(),
            reply,
        };
        self.dispatch(command, response)
    }

    /// Latest state snapshot
    pub fn snapshot(&self) -> PlaybackState {
        self.state.borrow().clone()
    }

    /// Receiver that always holds the latest state
    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.state.clone()
    }

    /// Stream of individual transitions from now on
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Whether the session has shut down
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    fn dispatch<T: Send + 'static>(
        &self,
        command: Command,
        response: oneshot::Receiver<Result<T>>,
    ) -> impl Future<Output = Result<T>> + Send + 'static {
        let sent = self.commands.send(command).is_ok();
        async move {
            if !sent {
                return Err(PlaybackError::SessionClosed);
            }
            response.await.unwrap_or(Err(PlaybackError::SessionClosed))
        }
    }
}

/// Source currently set on the media element
struct LoadedSource {
    url: String,
    load_id: u64,
    ready: bool,
}

/// A `play` waiting for its source to become ready
struct PendingLoad {
    token: u64,
    track_id: String,
    url: String,
    load_id: u64,
    /// Not yet tried
    fallback: Option<String>,
    deadline: Instant,
    fade: Option<Duration>,
    reply: Reply<()>,
}

struct ActiveFade {
    token: u64,
    track_id: String,
    ramp: FadeRamp,
    interval: Interval,
}

struct SessionDriver<M: MediaElement, G: UnlockGate> {
    media: M,
    media_events: MediaEventReceiver,
    gate: G,
    catalog: TrackCatalog,
    settings: SessionSettings,
    volume: Volume,
    state: PlaybackState,

    /// Bumped on every transport intent
    token: u64,
    /// Bumped on every `load` handed to the media element
    load_seq: u64,
    loaded: Option<LoadedSource>,
    pending: Option<PendingLoad>,
    ticker: Option<Interval>,
    fade: Option<ActiveFade>,

    state_tx: watch::Sender<PlaybackState>,
    events_tx: broadcast::Sender<SessionEvent>,
}

impl<M: MediaElement, G: UnlockGate> SessionDriver<M, G> {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        info!("Audio session started ({} tracks)", self.catalog.len());

        loop {
            let deadline = self.pending.as_ref().map(|p| p.deadline);

            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    if self.handle_command(command).await.is_break() {
                        break;
                    }
                }
                Some(event) = self.media_events.recv() => self.handle_media_event(event).await,
                () = sleep_until(deadline) => self.handle_readiness_timeout(),
                _ = tick(self.ticker.as_mut()) => self.handle_tick(),
                _ = tick(self.fade.as_mut().map(|f| &mut f.interval)) => self.handle_fade_step(),
            }
        }

        self.teardown();
        info!("Audio session stopped");
    }

    // ===== Commands =====

    async fn handle_command(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::LoadCatalog { tracks, reply } => {
                self.load_catalog(tracks);
                let _ = reply.send(Ok(()));
            }
            Command::Play {
                track_id,
                fade,
                unlock,
                reply,
            } => {
                // Unknown ids are rejected by `play` without an unlock gesture
                if unlock && self.catalog.contains(&track_id) {
                    self.ensure_unlocked().await;
                }
                self.play(track_id, fade, reply).await;
            }
            Command::Pause { reply } => {
                self.pause();
                let _ = reply.send(Ok(()));
            }
            Command::Stop { reply } => {
                self.stop();
                let _ = reply.send(Ok(()));
            }
            Command::ToggleMute { reply } => {
                let _ = reply.send(Ok(self.toggle_mute()));
            }
            Command::SetVolume { volume, reply } => {
                let _ = reply.send(Ok(self.set_volume(volume)));
            }
            Command::Seek { percent, reply } => {
                self.seek(percent);
                let _ = reply.send(Ok(()));
            }
            Command::SetLooping { looping, reply } => {
                self.set_looping(looping);
                let _ = reply.send(Ok(()));
            }
            Command::Tracks { reply } => {
                let _ = reply.send(Ok(self.catalog.list().to_vec()));
            }
            Command::Track { track_id, reply } => {
                let _ = reply.send(Ok(self.catalog.find_by_id(&track_id).cloned()));
            }
            Command::Shutdown { reply } => {
                self.teardown();
                if let Some(reply) = reply {
                    let _ = reply.send(());
                }
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn load_catalog(&mut self, tracks: Vec<Track>) {
        self.catalog = TrackCatalog::new(tracks);
        self.emit(SessionEvent::CatalogChanged {
            length: self.catalog.len(),
        });

        let Some(current) = self.state.current_track_id.clone() else {
            return;
        };
        if self.catalog.contains(&current) {
            return;
        }

        info!("Current track {} left the catalog, stopping", current);
        self.token += 1;
        self.cancel_pending(PlaybackError::Superseded);
        self.cancel_fade();
        self.stop_ticker();
        self.media.pause();
        self.loaded = None;
        self.state.current_track_id = None;
        self.state.position_seconds = 0.0;
        self.state.duration_seconds = None;
        self.set_status(PlaybackStatus::Idle);
    }

    async fn ensure_unlocked(&mut self) {
        if self.gate.is_unlocked() {
            return;
        }
        if let Err(e) = self.gate.unlock().await {
            warn!("Playing without autoplay unlock: {}", e);
        }
    }

    async fn play(&mut self, track_id: String, fade: Option<Duration>, reply: Reply<()>) {
        let Some(track) = self.catalog.find_by_id(&track_id).cloned() else {
            debug!("Play requested for unknown track: {}", track_id);
            let _ = reply.send(Err(PlaybackError::NotFound(track_id)));
            return;
        };

        if self.state.is_playing_track(&track.id) {
            debug!("Track {} already playing", track.id);
            let _ = reply.send(Ok(()));
            return;
        }

        // Same track still loading: the newer caller takes over the wait
        if let Some(pending) = self.pending.as_mut() {
            if pending.track_id == track.id {
                self.token += 1;
                pending.token = self.token;
                pending.fade = fade;
                let stale = std::mem::replace(&mut pending.reply, reply);
                let _ = stale.send(Err(PlaybackError::Superseded));
                return;
            }
        }

        self.token += 1;
        self.cancel_pending(PlaybackError::Superseded);
        self.cancel_fade();
        self.stop_ticker();

        let same_track = self.state.current_track_id.as_deref() == Some(track.id.as_str());

        if !same_track && self.state.status.is_playing() {
            self.media.pause();
            self.state.position_seconds = self.clamp_position(self.media.current_time());
            self.set_status(PlaybackStatus::Paused);
        }

        if same_track && self.source_ready_for(&track) {
            if matches!(self.state.status, PlaybackStatus::Idle | PlaybackStatus::Ended) {
                self.media.set_current_time(0.0);
                self.state.position_seconds = 0.0;
            }
            self.start_playback(track.id, fade, reply).await;
            return;
        }

        self.begin_load(&track, fade, reply);
    }

    fn pause(&mut self) {
        match self.state.status {
            PlaybackStatus::Playing => {
                self.token += 1;
                self.media.pause();
                self.stop_ticker();
                self.cancel_fade();
                self.state.position_seconds = self.clamp_position(self.media.current_time());
                self.set_status(PlaybackStatus::Paused);
            }
            PlaybackStatus::Loading => {
                debug!("Pause cancels pending load");
                self.token += 1;
                self.cancel_pending(PlaybackError::Superseded);
                self.set_status(PlaybackStatus::Idle);
            }
            _ => {}
        }
    }

    fn stop(&mut self) {
        self.token += 1;
        self.cancel_pending(PlaybackError::Superseded);
        self.cancel_fade();
        self.stop_ticker();
        self.media.pause();
        if self.loaded.is_some() {
            self.media.set_current_time(0.0);
        }
        self.state.position_seconds = 0.0;
        self.set_status(PlaybackStatus::Idle);
    }

    fn toggle_mute(&mut self) -> bool {
        let muted = self.volume.toggle_mute();
        self.media.set_muted(muted);
        self.state.muted = muted;
        self.publish();
        self.emit(SessionEvent::VolumeChanged {
            volume: self.volume.level(),
            muted,
        });
        muted
    }

    fn set_volume(&mut self, volume: f32) -> f32 {
        let level = self.volume.set_level(volume);
        if self.fade.take().is_some() {
            debug!("Volume change cancels fade-in");
        }
        self.media.set_volume(level);
        self.state.volume = level;
        self.publish();
        self.emit(SessionEvent::VolumeChanged {
            volume: level,
            muted: self.volume.is_muted(),
        });
        level
    }

    fn seek(&mut self, percent: f64) {
        let Some(duration) = self.state.duration_seconds else {
            debug!("Seek ignored: duration unknown");
            return;
        };
        if percent.is_nan() {
            return;
        }

        let position = percent.clamp(0.0, 100.0) / 100.0 * duration;
        self.media.set_current_time(position);
        self.state.position_seconds = position;
        self.publish();
        self.emit(SessionEvent::PositionUpdate {
            position_seconds: position,
            duration_seconds: Some(duration),
        });
    }

    fn set_looping(&mut self, looping: bool) {
        self.media.set_looping(looping);
        self.state.looping = looping;
        self.publish();
        self.emit(SessionEvent::LoopChanged { looping });
    }

    // ===== Loading =====

    fn begin_load(&mut self, track: &Track, fade: Option<Duration>, reply: Reply<()>) {
        let previous = self.state.current_track_id.replace(track.id.clone());
        if previous.as_deref() != Some(track.id.as_str()) {
            self.emit(SessionEvent::TrackChanged {
                track_id: track.id.clone(),
                previous_track_id: previous,
            });
        }

        self.state.position_seconds = 0.0;
        self.state.duration_seconds = known_duration(track.known_duration_seconds);
        self.set_status(PlaybackStatus::Loading);

        debug!("Loading {} from {}", track.id, track.source_url);
        let load_id = self.load_source(&track.source_url);
        self.pending = Some(PendingLoad {
            token: self.token,
            track_id: track.id.clone(),
            url: track.source_url.clone(),
            load_id,
            fallback: track.fallback_url.clone(),
            deadline: Instant::now() + self.settings.readiness_timeout(),
            fade,
            reply,
        });
    }

    fn load_source(&mut self, url: &str) -> u64 {
        self.load_seq += 1;
        let load_id = self.load_seq;
        self.loaded = Some(LoadedSource {
            url: url.to_string(),
            load_id,
            ready: false,
        });
        self.media.load(url, load_id);
        load_id
    }

    fn source_ready_for(&self, track: &Track) -> bool {
        self.loaded
            .as_ref()
            .is_some_and(|l| l.ready && track.has_source(&l.url))
    }

    /// Whether `load_id` answers the load currently on the element
    fn is_current_load(&self, load_id: u64) -> bool {
        self.loaded.as_ref().is_some_and(|l| l.load_id == load_id)
    }

    /// Retry with the fallback source once, otherwise fail the pending play
    fn pending_failed(&mut self, mut pending: PendingLoad, reason: ErrorReason) {
        if let Some(fallback) = pending.fallback.take() {
            warn!(
                "Source {} for {} failed ({}), trying fallback {}",
                pending.url, pending.track_id, reason, fallback
            );
            self.emit(SessionEvent::FallbackAttempted {
                track_id: pending.track_id.clone(),
                url: fallback.clone(),
            });
            pending.load_id = self.load_source(&fallback);
            pending.url = fallback;
            pending.deadline = Instant::now() + self.settings.readiness_timeout();
            self.pending = Some(pending);
            return;
        }

        warn!("Could not load {}: {}", pending.track_id, reason);
        if let Some(loaded) = self.loaded.as_mut() {
            loaded.ready = false;
        }
        self.fail(reason);
        let _ = pending.reply.send(Err(PlaybackError::Failed(reason)));
    }

    fn cancel_pending(&mut self, error: PlaybackError) {
        if let Some(pending) = self.pending.take() {
            debug!("Cancelling pending load of {}", pending.track_id);
            let _ = pending.reply.send(Err(error));
        }
    }

    async fn start_playback(&mut self, track_id: String, fade: Option<Duration>, reply: Reply<()>) {
        let ramp = fade.map(|duration| {
            FadeRamp::new(
                self.settings.fade_curve,
                self.volume.level(),
                duration,
                self.settings.fade_steps,
            )
        });
        let start_volume = ramp
            .as_ref()
            .map_or(self.volume.level(), FadeRamp::initial_volume);

        self.media.set_volume(start_volume);
        self.media.set_muted(self.volume.is_muted());
        self.media.set_looping(self.state.looping);

        match self.media.play().await {
            Ok(()) => {
                info!("Playing track: {}", track_id);
                self.set_status(PlaybackStatus::Playing);
                self.start_ticker();
                if let Some(ramp) = ramp {
                    self.start_fade(track_id, ramp);
                }
                let _ = reply.send(Ok(()));
            }
            Err(error) => {
                self.media.set_volume(self.volume.level());
                let reason = error.reason();
                warn!("Starting {} failed: {}", track_id, error);
                // A blocked start keeps the source ready for the gesture retry
                if !reason.awaits_user_gesture() {
                    if let Some(loaded) = self.loaded.as_mut() {
                        loaded.ready = false;
                    }
                }
                self.fail(reason);
                let _ = reply.send(Err(PlaybackError::Failed(reason)));
            }
        }
    }

    fn fail(&mut self, reason: ErrorReason) {
        self.stop_ticker();
        self.cancel_fade();
        self.set_status(PlaybackStatus::Error(reason));
        self.emit(SessionEvent::Error {
            track_id: self.state.current_track_id.clone(),
            reason,
        });
    }

    // ===== Media events =====

    async fn handle_media_event(&mut self, event: MediaEvent) {
        match event {
            MediaEvent::Ready { load_id } => self.on_ready(load_id).await,
            MediaEvent::Error { load_id, error } => self.on_media_error(load_id, &error),
            MediaEvent::Ended => self.on_ended(),
            MediaEvent::TimeUpdate { position_seconds } => {
                if self.state.status.is_playing() {
                    self.update_position(position_seconds, self.media.duration());
                }
            }
        }
    }

    async fn on_ready(&mut self, load_id: u64) {
        if !self.is_current_load(load_id) {
            debug!("Ignoring ready event for abandoned load #{}", load_id);
            return;
        }
        if let Some(loaded) = self.loaded.as_mut() {
            loaded.ready = true;
        }

        let Some(pending) = self.pending.take() else {
            debug!("Load #{} ready with no pending play", load_id);
            return;
        };
        if pending.token != self.token || pending.load_id != load_id {
            debug!("Ready event for {} is stale", pending.url);
            let _ = pending.reply.send(Err(PlaybackError::Superseded));
            return;
        }

        if let Some(duration) = known_duration(self.media.duration()) {
            self.state.duration_seconds = Some(duration);
            self.state.position_seconds = self.clamp_position(self.state.position_seconds);
        }
        self.start_playback(pending.track_id, pending.fade, pending.reply)
            .await;
    }

    fn on_media_error(&mut self, load_id: u64, error: &MediaError) {
        if !self.is_current_load(load_id) {
            debug!("Ignoring error for abandoned load #{}: {}", load_id, error);
            return;
        }

        if let Some(pending) = self.pending.take() {
            self.pending_failed(pending, error.reason());
            return;
        }

        if let Some(loaded) = self.loaded.as_mut() {
            loaded.ready = false;
        }
        if matches!(
            self.state.status,
            PlaybackStatus::Playing | PlaybackStatus::Paused
        ) {
            warn!(
                "Media error during playback of {:?}: {}",
                self.state.current_track_id, error
            );
            self.media.pause();
            self.fail(error.reason());
        }
    }

    fn on_ended(&mut self) {
        if !self.state.status.is_playing() || self.state.looping {
            return;
        }
        self.finish_track();
    }

    fn handle_readiness_timeout(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        if pending.token != self.token {
            debug!("Readiness timeout for {} is stale", pending.track_id);
            let _ = pending.reply.send(Err(PlaybackError::Superseded));
            return;
        }
        self.pending_failed(pending, ErrorReason::Timeout);
    }

    // ===== Position tick =====

    fn start_ticker(&mut self) {
        let period = self.settings.tick_interval().max(Duration::from_millis(1));
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.ticker = Some(interval);
    }

    fn stop_ticker(&mut self) {
        self.ticker = None;
    }

    fn handle_tick(&mut self) {
        if !self.state.status.is_playing() {
            self.stop_ticker();
            return;
        }

        self.update_position(self.media.current_time(), self.media.duration());

        let at_end = self
            .state
            .duration_seconds
            .is_some_and(|d| self.state.position_seconds >= d);
        if at_end && !self.state.looping && self.media.is_paused() {
            self.finish_track();
        }
    }

    fn update_position(&mut self, position: f64, media_duration: Option<f64>) {
        let mut changed = false;

        if let Some(duration) = known_duration(media_duration) {
            if self.state.duration_seconds != Some(duration) {
                self.state.duration_seconds = Some(duration);
                changed = true;
            }
        }

        let position = self.clamp_position(position);
        if position != self.state.position_seconds {
            self.state.position_seconds = position;
            changed = true;
        }

        if changed {
            self.publish();
            self.emit(SessionEvent::PositionUpdate {
                position_seconds: self.state.position_seconds,
                duration_seconds: self.state.duration_seconds,
            });
        }
    }

    fn clamp_position(&self, position: f64) -> f64 {
        let position = position.max(0.0);
        match self.state.duration_seconds {
            Some(duration) => position.min(duration),
            None => position,
        }
    }

    /// Natural end: `Playing -> Ended -> Idle`, track stays selected
    fn finish_track(&mut self) {
        self.stop_ticker();
        self.cancel_fade();

        if let Some(duration) = self.state.duration_seconds {
            self.state.position_seconds = duration;
        }
        self.set_status(PlaybackStatus::Ended);

        if let Some(track_id) = self.state.current_track_id.clone() {
            info!("Track finished: {}", track_id);
            self.emit(SessionEvent::TrackEnded { track_id });
        }

        self.state.position_seconds = 0.0;
        self.set_status(PlaybackStatus::Idle);
    }

    // ===== Fade-in =====

    fn start_fade(&mut self, track_id: String, ramp: FadeRamp) {
        let period = ramp.step_period();
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Burst);

        self.emit(SessionEvent::FadeStarted {
            track_id: track_id.clone(),
            duration_ms: u64::try_from(ramp.duration().as_millis()).unwrap_or(u64::MAX),
        });
        self.fade = Some(ActiveFade {
            token: self.token,
            track_id,
            ramp,
            interval,
        });
    }

    fn cancel_fade(&mut self) {
        if let Some(fade) = self.fade.take() {
            debug!(
                "Abandoning fade-in of {} at {:.0}%",
                fade.track_id,
                fade.ramp.progress() * 100.0
            );
        }
    }

    fn handle_fade_step(&mut self) {
        let Some(fade) = self.fade.as_mut() else {
            return;
        };
        if fade.token != self.token || !self.state.status.is_playing() {
            self.cancel_fade();
            return;
        }

        if let Some(volume) = fade.ramp.advance() {
            self.media.set_volume(volume);
        }

        if fade.ramp.is_complete() {
            let track_id = fade.track_id.clone();
            self.fade = None;
            debug!("Fade-in of {} complete", track_id);
            self.emit(SessionEvent::FadeCompleted { track_id });
        }
    }

    // ===== Broadcast =====

    fn set_status(&mut self, status: PlaybackStatus) {
        if self.state.status != status {
            debug!("Status {:?} -> {:?}", self.state.status, status);
            self.state.status = status;
            self.emit(SessionEvent::StatusChanged {
                track_id: self.state.current_track_id.clone(),
                status,
            });
        }
        self.publish();
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.state.clone());
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events_tx.send(event);
    }

    fn teardown(&mut self) {
        self.token += 1;
        self.cancel_pending(PlaybackError::SessionClosed);
        self.cancel_fade();
        self.stop_ticker();
        if self.loaded.take().is_some() {
            self.media.unload();
        }
        if self.state.status != PlaybackStatus::Idle {
            self.set_status(PlaybackStatus::Idle);
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn tick(interval: Option<&mut Interval>) -> Instant {
    match interval {
        Some(interval) => interval.tick().await,
        None => std::future::pending().await,
    }
}
