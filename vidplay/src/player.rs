/*!
    The transport: the public control surface of the playback engine.
*/

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use media_types::{Clock, MediaInfo};

use crate::atomic::{AtomicF32, AtomicF64};
use crate::audio::{AudioDevice, AudioOutput, NullOutput};
use crate::backend::MediaBackend;
use crate::config::PlayerConfig;
use crate::error::{PlayerError, Result};
use crate::pipeline::{Pipeline, PipelineContext, PipelineHealth, PipelineParts, PipelineStats, PlaybackStats};
use crate::source::open_media;
use crate::sync::MasterClock;
use crate::video::{RenderSurface, SurfaceSlot};

/// Granularity of `wait_for_end` polling.
const END_POLL: Duration = Duration::from_millis(50);

/**
    Where the transport currently is.
*/
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PlaybackState {
    /// Nothing has been started since the data source was set.
    #[default]
    None = 0,
    Playing = 1,
    Paused = 2,
    /// A seek is in progress; lasts for the duration of one `seek` call.
    Seeking = 3,
    /// Stopped, finished, or failed. `start` plays again from the beginning.
    End = 4,
}

impl PlaybackState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Playing,
            2 => Self::Paused,
            3 => Self::Seeking,
            4 => Self::End,
            _ => Self::None,
        }
    }

    /**
        Returns true while a session is running, paused or not.
    */
    pub fn is_active(self) -> bool {
        matches!(self, Self::Playing | Self::Paused)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Seeking => "seeking",
            Self::End => "end",
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/**
    State readable without the transition lock.
*/
struct Shared {
    state: AtomicU8,
    clock: RwLock<Option<Arc<dyn Clock>>>,
    info: RwLock<Option<MediaInfo>>,
    speed: AtomicF64,
    volume: Arc<AtomicF32>,
    stats: Arc<PipelineStats>,
    surface: Arc<SurfaceSlot>,
    last_error: Mutex<Option<PlayerError>>,
}

impl Shared {
    fn state(&self) -> PlaybackState {
        PlaybackState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn publish(&self, state: PlaybackState) {
        let previous = PlaybackState::from_u8(self.state.swap(state as u8, Ordering::AcqRel));
        if previous != state {
            tracing::info!(from = %previous, to = %state, "playback state changed");
        }
    }
}

/**
    One playback of the data source, from `start` until it ends.
*/
struct Session {
    pipeline: Option<Pipeline>,
    context: PipelineContext,
}

/**
    Everything guarded by the transition lock.
*/
#[derive(Default)]
struct Transport {
    source: Option<PathBuf>,
    session: Option<Session>,
}

/**
    A media player.

    Control calls are serialized by an internal transition lock, so at
    most one transition is ever in flight and callers never observe a
    half-applied one. Calls that make no sense in the current state (such
    as pausing a stopped player) are ignored. Queries like [`position`]
    and [`state`] never wait on a running transition.

    [`position`]: Player::position
    [`state`]: Player::state
*/
pub struct Player {
    backend: Arc<dyn MediaBackend>,
    output: Arc<dyn AudioOutput>,
    config: PlayerConfig,
    shared: Shared,
    transport: Mutex<Transport>,
}

impl Player {
    /**
        Create a player that opens files through `backend` and plays sound
        through `output`.
    */
    pub fn new(
        backend: impl MediaBackend + 'static,
        output: impl AudioOutput + 'static,
        config: PlayerConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            backend: Arc::new(backend),
            output: Arc::new(output),
            shared: Shared {
                state: AtomicU8::new(PlaybackState::None as u8),
                clock: RwLock::new(None),
                info: RwLock::new(None),
                speed: AtomicF64::new(1.0),
                volume: Arc::new(AtomicF32::new(config.volume)),
                stats: Arc::new(PipelineStats::default()),
                surface: Arc::new(SurfaceSlot::new()),
                last_error: Mutex::new(None),
            },
            config,
            transport: Mutex::new(Transport::default()),
        })
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    /**
        Set the file to play. Any running session is stopped and the player
        returns to `None`.
    */
    pub fn set_data_source(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let mut transport = self.transport.lock();
        self.teardown(&mut transport);
        tracing::debug!(path = %path.display(), "data source set");
        transport.source = Some(path);
        *self.shared.info.write() = None;
        *self.shared.clock.write() = None;
        *self.shared.last_error.lock() = None;
        self.shared.publish(PlaybackState::None);
    }

    /**
        Open `path` and report its streams without playing it.
    */
    pub fn probe(&self, path: impl AsRef<Path>) -> Result<MediaInfo> {
        open_media(&*self.backend, path.as_ref()).map(|opened| opened.info)
    }

    /**
        Start playing from the beginning.

        Only valid from `None` and `End`. If the source cannot be opened
        the player moves to `End` and the error is returned.
    */
    pub fn start(&self) -> Result<()> {
        let mut transport = self.transport.lock();
        self.refresh(&mut transport);
        if !matches!(self.shared.state(), PlaybackState::None | PlaybackState::End) {
            return Ok(());
        }
        let Some(path) = transport.source.clone() else {
            return Err(PlayerError::NoSource);
        };

        self.teardown(&mut transport);
        *self.shared.last_error.lock() = None;

        match self.open_session(&path) {
            Ok(session) => {
                transport.session = Some(session);
                self.shared.publish(PlaybackState::Playing);
                Ok(())
            }
            Err(e) => {
                tracing::error!(path = %path.display(), "failed to start playback: {e}");
                *self.shared.last_error.lock() = Some(e.clone());
                self.shared.publish(PlaybackState::End);
                Err(e)
            }
        }
    }

    /**
        Pause (`true`) or resume (`false`) playback.

        Pausing only has an effect while playing, resuming only while paused.
    */
    pub fn pause(&self, paused: bool) {
        let mut transport = self.transport.lock();
        self.refresh(&mut transport);
        let Some(session) = transport.session.as_ref() else {
            return;
        };
        let Some(pipeline) = session.pipeline.as_ref() else {
            return;
        };

        match (paused, self.shared.state()) {
            (true, PlaybackState::Playing) => {
                pipeline.set_paused(true);
                session.context.clock.set_paused(true);
                self.shared.publish(PlaybackState::Paused);
            }
            (false, PlaybackState::Paused) => {
                session.context.clock.set_paused(false);
                pipeline.set_paused(false);
                self.shared.publish(PlaybackState::Playing);
            }
            _ => {}
        }
    }

    /**
        Stop playback from any state and release the pipeline. The last
        position stays readable until the next `start`.
    */
    pub fn stop(&self) {
        let mut transport = self.transport.lock();
        self.teardown(&mut transport);
        self.shared.publish(PlaybackState::End);
    }

    /**
        Seek to `fraction` of the duration. Values outside `[0, 1]` are
        clamped; NaN is ignored.
    */
    pub fn seek(&self, fraction: f64) -> Result<()> {
        if fraction.is_nan() {
            return Ok(());
        }
        let target = self.duration().mul_f64(fraction.clamp(0.0, 1.0));
        self.seek_to(target)
    }

    /**
        Seek to an absolute position, clamped to the duration.

        Only valid while playing or paused; playback always resumes after a
        seek. Nothing decoded before the seek is presented after it. If the
        source cannot be repositioned the player moves to `End`.
    */
    pub fn seek_to(&self, position: Duration) -> Result<()> {
        let mut transport = self.transport.lock();
        self.refresh(&mut transport);
        if !self.shared.state().is_active() {
            return Ok(());
        }
        let Some(session) = transport.session.as_mut() else {
            return Ok(());
        };
        let Some(pipeline) = session.pipeline.take() else {
            return Ok(());
        };

        let target = position.min(self.duration());
        self.shared.publish(PlaybackState::Seeking);

        match self.reposition(pipeline, &session.context, target) {
            Ok(pipeline) => {
                session.pipeline = Some(pipeline);
                tracing::debug!(?target, "seek complete");
                self.shared.publish(PlaybackState::Playing);
                Ok(())
            }
            Err(e) => {
                tracing::error!(?target, "seek failed: {e}");
                *self.shared.last_error.lock() = Some(e.clone());
                self.teardown(&mut transport);
                self.shared.publish(PlaybackState::End);
                Err(e)
            }
        }
    }

    /**
        Set the playback speed. Returns false, changing nothing, unless
        `speed` is finite and positive.

        Takes effect on the running session without a flush and carries
        over to later sessions.
    */
    pub fn set_speed(&self, speed: f64) -> bool {
        if !(speed.is_finite() && speed > 0.0) {
            return false;
        }
        let transport = self.transport.lock();
        self.shared.speed.store(speed, Ordering::Release);
        if let Some(session) = transport.session.as_ref() {
            session.context.clock.set_speed(speed);
        }
        tracing::debug!(speed, "playback speed changed");
        true
    }

    pub fn speed(&self) -> f64 {
        self.shared.speed.load(Ordering::Acquire)
    }

    /**
        Current playback position. Never blocks on a running transition.
    */
    pub fn position(&self) -> Duration {
        let position = self
            .shared
            .clock
            .read()
            .as_ref()
            .map_or(Duration::ZERO, |clock| clock.position());
        match self.duration() {
            Duration::ZERO => position,
            duration => position.min(duration),
        }
    }

    pub fn duration(&self) -> Duration {
        self.shared
            .info
            .read()
            .as_ref()
            .map_or(Duration::ZERO, |info| info.duration)
    }

    /**
        Position as a fraction of the duration, in `[0, 1]`.
    */
    pub fn progress(&self) -> f64 {
        let duration = self.duration();
        if duration.is_zero() {
            return 0.0;
        }
        (self.position().as_secs_f64() / duration.as_secs_f64()).clamp(0.0, 1.0)
    }

    /**
        Current transport state.

        A session whose streams have run out, or that hit a fatal error, is
        reported (and finalized) as `End` here.
    */
    pub fn state(&self) -> PlaybackState {
        if let Some(mut transport) = self.transport.try_lock() {
            self.refresh(&mut transport);
        }
        self.shared.state()
    }

    /**
        Stream information of the current session, if one was started.
    */
    pub fn media_info(&self) -> Option<MediaInfo> {
        self.shared.info.read().clone()
    }

    /**
        Present video on `surface` from the next frame on, replacing any
        surface attached before.
    */
    pub fn attach_surface(&self, surface: impl RenderSurface + 'static) {
        self.shared.surface.attach(Box::new(surface));
    }

    pub fn detach_surface(&self) -> Option<Box<dyn RenderSurface>> {
        self.shared.surface.detach()
    }

    /**
        Set the output volume, clamped to `[0, 1]`.
    */
    pub fn set_volume(&self, volume: f32) {
        let volume = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };
        self.shared.volume.store(volume, Ordering::Relaxed);
    }

    pub fn volume(&self) -> f32 {
        self.shared.volume.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> PlaybackStats {
        self.shared.stats.snapshot()
    }

    /**
        The fatal error that ended the current session, if any.
    */
    pub fn last_error(&self) -> Option<PlayerError> {
        self.state();
        self.shared.last_error.lock().clone()
    }

    /**
        Block until playback reaches `End` or `timeout` elapses. Returns
        true if the player is in `End`.
    */
    pub fn wait_for_end(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let health = {
                let mut transport = self.transport.lock();
                self.refresh(&mut transport);
                if !self.shared.state().is_active() {
                    return self.shared.state() == PlaybackState::End;
                }
                transport
                    .session
                    .as_ref()
                    .and_then(|s| s.pipeline.as_ref())
                    .map(|p| Arc::clone(p.health()))
            };

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            match health {
                Some(health) => {
                    health.wait(remaining.min(END_POLL));
                }
                None => std::thread::sleep(remaining.min(END_POLL)),
            }
        }
    }

    fn open_session(&self, path: &Path) -> Result<Session> {
        let opened = open_media(&*self.backend, path)?;
        tracing::info!(
            path = %path.display(),
            duration = ?opened.info.duration,
            video = opened.info.has_video(),
            audio = opened.info.has_audio(),
            "opened media"
        );

        let master = MasterClock::select(opened.audio_decoder.is_some());
        let clock = master.clock();
        clock.set_speed(self.speed());
        clock.reset_to(Duration::ZERO);

        let audio_device = opened
            .info
            .audio
            .as_ref()
            .map(|audio| self.open_audio_device(audio.sample_rate, audio.channels));

        let context = PipelineContext {
            config: self.config.clone(),
            clock: Arc::clone(&clock),
            audio_clock: master.audio(),
            surface: Arc::clone(&self.shared.surface),
            volume: Arc::clone(&self.shared.volume),
            stats: Arc::clone(&self.shared.stats),
        };

        self.shared.stats.reset();
        let parts = PipelineParts {
            demuxer: opened.demuxer,
            video_decoder: opened.video_decoder,
            audio_decoder: opened.audio_decoder,
            audio_device,
        };
        let pipeline = Pipeline::spawn(parts, &context, None, false)?;

        *self.shared.info.write() = Some(opened.info);
        *self.shared.clock.write() = Some(clock);

        Ok(Session {
            pipeline: Some(pipeline),
            context,
        })
    }

    /**
        Open the audio device, degrading to silent output if that fails.
    */
    fn open_audio_device(&self, sample_rate: u32, channels: u16) -> Box<dyn AudioDevice> {
        let buffer = self.config.audio_buffer();
        self.output
            .configure(sample_rate, channels, buffer)
            .unwrap_or_else(|e| {
                tracing::warn!("audio output unavailable, playing silently: {e}");
                NullOutput::device(sample_rate, channels, buffer)
            })
    }

    /**
        Tear a pipeline down, move the source to `target` and start a new
        pipeline from there.
    */
    fn reposition(&self, pipeline: Pipeline, context: &PipelineContext, target: Duration) -> Result<Pipeline> {
        let mut parts = pipeline.shutdown()?;

        parts.demuxer.seek(target)?;
        if let Some(decoder) = parts.video_decoder.as_mut() {
            decoder.reset();
        }
        if let Some(decoder) = parts.audio_decoder.as_mut() {
            decoder.reset();
        }
        if let Some(device) = parts.audio_device.as_mut() {
            device.flush();
            device.resume();
        }

        context.clock.reset_to(target);
        context.clock.set_paused(false);
        Pipeline::spawn(parts, context, Some(target), false)
    }

    /**
        Finalize a session that ran out of streams or failed on a worker
        thread.
    */
    fn refresh(&self, transport: &mut Transport) {
        if !self.shared.state().is_active() {
            return;
        }
        let Some(health) = transport
            .session
            .as_ref()
            .and_then(|s| s.pipeline.as_ref())
            .map(|p| Arc::clone(p.health()))
        else {
            return;
        };
        if !health.is_over() {
            return;
        }
        self.finish(transport, &health);
    }

    fn finish(&self, transport: &mut Transport, health: &PipelineHealth) {
        match health.fatal() {
            Some(e) => {
                tracing::error!("playback failed: {e}");
                *self.shared.last_error.lock() = Some(e);
            }
            None => tracing::info!("playback finished"),
        }
        self.teardown(transport);
        self.shared.publish(PlaybackState::End);
    }

    /**
        Stop the session's threads, if any, and freeze its clock.
    */
    fn teardown(&self, transport: &mut Transport) {
        let Some(mut session) = transport.session.take() else {
            return;
        };
        session.context.clock.set_paused(true);
        if let Some(pipeline) = session.pipeline.take() {
            if let Err(e) = pipeline.shutdown() {
                tracing::error!("failed to stop playback cleanly: {e}");
                *self.shared.last_error.lock() = Some(e);
            }
        }
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        let transport = self.transport.get_mut();
        if let Some(mut session) = transport.session.take() {
            if let Some(pipeline) = session.pipeline.take() {
                let _ = pipeline.shutdown();
            }
        }
    }
}

static_assertions::assert_impl_all!(Player: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{SyntheticBackend, SyntheticMedia};

    fn player(seconds: u64) -> Player {
        let backend = SyntheticBackend::new(SyntheticMedia::new(Duration::from_secs(seconds)));
        let player = Player::new(backend, NullOutput, PlayerConfig::default()).unwrap();
        player.set_data_source("test.mp4");
        player
    }

    #[test]
    fn state_round_trips_through_u8() {
        for state in [
            PlaybackState::None,
            PlaybackState::Playing,
            PlaybackState::Paused,
            PlaybackState::Seeking,
            PlaybackState::End,
        ] {
            assert_eq!(PlaybackState::from_u8(state as u8), state);
        }
        assert_eq!(PlaybackState::End.to_string(), "end");
    }

    #[test]
    fn start_without_source_fails() {
        let player = Player::new(
            SyntheticBackend::new(SyntheticMedia::new(Duration::from_secs(1))),
            NullOutput,
            PlayerConfig::default(),
        )
        .unwrap();
        assert_eq!(player.start(), Err(PlayerError::NoSource));
        assert_eq!(player.state(), PlaybackState::None);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let backend = SyntheticBackend::new(SyntheticMedia::new(Duration::from_secs(1)));
        let config = PlayerConfig::default().with_frame_capacity(0, 4);
        assert!(matches!(
            Player::new(backend, NullOutput, config),
            Err(PlayerError::Config(_))
        ));
    }

    #[test]
    fn speed_must_be_positive_and_finite() {
        let player = player(1);
        assert!(!player.set_speed(0.0));
        assert!(!player.set_speed(-1.0));
        assert!(!player.set_speed(f64::NAN));
        assert!(!player.set_speed(f64::INFINITY));
        assert_eq!(player.speed(), 1.0);
        assert!(player.set_speed(0.5));
        assert_eq!(player.speed(), 0.5);
    }

    #[test]
    fn volume_is_clamped() {
        let player = player(1);
        player.set_volume(1.5);
        assert_eq!(player.volume(), 1.0);
        player.set_volume(-0.5);
        assert_eq!(player.volume(), 0.0);
    }

    #[test]
    fn probe_reports_streams_without_playing() {
        let player = player(3);
        let info = player.probe("other.mp4").unwrap();
        assert_eq!(info.duration, Duration::from_secs(3));
        assert!(info.has_video() && info.has_audio());
        assert_eq!(player.state(), PlaybackState::None);
        assert!(player.media_info().is_none());
    }

    #[test]
    fn set_data_source_resets_a_running_session() {
        let player = player(5);
        player.start().unwrap();
        assert_eq!(player.state(), PlaybackState::Playing);
        player.set_data_source("next.mp4");
        assert_eq!(player.state(), PlaybackState::None);
        assert_eq!(player.position(), Duration::ZERO);
    }
}
