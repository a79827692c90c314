/*!
    Audio/video synchronization.

    Audio is the master: the audio sink syncs the clock to what the device
    is playing, and video frames are released against it. Media
    without a usable audio stream runs on a wall clock instead.
*/

use std::sync::Arc;
use std::time::Duration;

use media_types::{AudioClock, Clock, WallClock};

/**
    What to do with a video frame right now.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameAction {
    /// The frame is due; present it.
    Present,
    /// The frame is early; check again after this much wall time.
    Wait(Duration),
    /// The frame missed its deadline by more than the drop threshold.
    Drop { late_by: Duration },
}

/**
    Decide what to do with a frame stamped `frame_ts` when the master clock
    reads `clock`.

    Frames within `epsilon` of the clock are presented. Early frames wait
    for the difference scaled by `1 / speed`, since the clock runs `speed`
    times faster than wall time. Frames later than `drop_threshold` are
    dropped so video can catch up with audio.
*/
pub fn schedule(
    frame_ts: Duration,
    clock: Duration,
    speed: f64,
    epsilon: Duration,
    drop_threshold: Duration,
) -> FrameAction {
    if frame_ts > clock {
        let ahead = frame_ts - clock;
        if ahead <= epsilon {
            return FrameAction::Present;
        }
        let speed = if speed.is_finite() && speed > 0.0 { speed } else { 1.0 };
        FrameAction::Wait(ahead.div_f64(speed))
    } else {
        let late_by = clock - frame_ts;
        if late_by > drop_threshold {
            FrameAction::Drop { late_by }
        } else {
            FrameAction::Present
        }
    }
}

/**
    Paces video frames against the master clock.
*/
#[derive(Clone)]
pub struct SyncController {
    clock: Arc<dyn Clock>,
    epsilon: Duration,
    drop_threshold: Duration,
}

impl SyncController {
    pub fn new(clock: Arc<dyn Clock>, epsilon: Duration, drop_threshold: Duration) -> Self {
        Self {
            clock,
            epsilon,
            drop_threshold,
        }
    }

    pub fn position(&self) -> Duration {
        self.clock.position()
    }

    pub fn schedule(&self, frame_ts: Duration) -> FrameAction {
        schedule(
            frame_ts,
            self.clock.position(),
            self.clock.speed(),
            self.epsilon,
            self.drop_threshold,
        )
    }
}

/**
    The clock a session runs on.
*/
#[derive(Clone)]
pub enum MasterClock {
    Audio(Arc<AudioClock>),
    Wall(Arc<WallClock>),
}

impl MasterClock {
    /**
        Audio drives the clock whenever there is an audio stream to play.
    */
    pub fn select(has_audio: bool) -> Self {
        if has_audio {
            Self::Audio(Arc::new(AudioClock::new()))
        } else {
            Self::Wall(Arc::new(WallClock::new()))
        }
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        match self {
            Self::Audio(clock) => Arc::clone(clock) as Arc<dyn Clock>,
            Self::Wall(clock) => Arc::clone(clock) as Arc<dyn Clock>,
        }
    }

    pub fn audio(&self) -> Option<Arc<AudioClock>> {
        match self {
            Self::Audio(clock) => Some(Arc::clone(clock)),
            Self::Wall(_) => None,
        }
    }
}
