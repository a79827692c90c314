/*!
    Master clocks for audio/video synchronization.
*/

use std::time::{Duration, Instant};

use parking_lot::Mutex;

/**
    Trait for playback clocks.

    A clock reports the current media position. The video sink compares
    frame timestamps against it, and the progress reporter publishes it.
    Positions are in media time: at speed 2.0 the clock advances two
    seconds per wall-clock second.
*/
pub trait Clock: Send + Sync {
    /// Current playback position.
    fn position(&self) -> Duration;

    /// Jump to `position`, e.g. after a seek.
    fn reset_to(&self, position: Duration);

    /// Freeze or unfreeze the clock.
    fn set_paused(&self, paused: bool);

    fn is_paused(&self) -> bool;

    /// Change the playback speed. Non-positive or non-finite values are ignored.
    fn set_speed(&self, speed: f64);

    fn speed(&self) -> f64;
}

fn valid_speed(speed: f64) -> bool {
    speed.is_finite() && speed > 0.0
}

/**
    Audio-driven clock.

    The audio sink reports, after each batch it hands to the output device,
    which position is audible right now and how far the device is fed.
    Between reports the clock runs on wall time (scaled by the speed), but
    never past the end of the audio handed to the device, so video follows
    whatever the listener actually hears. Only the audio sink reports during
    playback, and only the transport resets it while seeking.

    Once the audio stream runs out, `mark_finished` lifts the limit so
    trailing video keeps advancing on wall time.
*/
pub struct AudioClock {
    state: Mutex<AudioState>,
}

struct AudioState {
    /// Audible position at `anchor`.
    base: Duration,
    anchor: Instant,
    /// End of the audio handed to the device. `None` once audio has finished.
    limit: Option<Duration>,
    speed: f64,
    paused: bool,
}

impl AudioState {
    fn position(&self) -> Duration {
        if self.paused {
            return self.base;
        }
        let position = self.base + self.anchor.elapsed().mul_f64(self.speed);
        match self.limit {
            Some(limit) => position.min(limit.max(self.base)),
            None => position,
        }
    }

    fn rebase(&mut self) {
        self.base = self.position();
        self.anchor = Instant::now();
    }
}

impl AudioClock {
    /**
        Create a clock standing at position zero until audio is reported.
    */
    pub fn new() -> Self {
        Self {
            state: Mutex::new(AudioState {
                base: Duration::ZERO,
                anchor: Instant::now(),
                limit: Some(Duration::ZERO),
                speed: 1.0,
                paused: false,
            }),
        }
    }

    /**
        Report that `audible` is playing right now and that the device has
        been fed up to `buffered_to`.

        While running, the clock never moves backwards, except when audio
        returns after the clock ran on wall time: then it snaps back to
        what is actually audible. While paused, only the limit is updated.
    */
    pub fn sync(&self, audible: Duration, buffered_to: Duration) {
        let mut state = self.state.lock();
        if !state.paused {
            let current = state.position();
            state.base = match state.limit {
                Some(_) => audible.max(current),
                None => audible,
            };
            state.anchor = Instant::now();
        }
        state.limit = Some(buffered_to.max(state.base));
    }

    /**
        Mark the audio stream as exhausted, or starved.

        After this, `position()` runs on wall time (scaled by the current
        speed) from the current position, until the next `sync`.
    */
    pub fn mark_finished(&self) {
        let mut state = self.state.lock();
        state.rebase();
        state.limit = None;
    }

    pub fn is_finished(&self) -> bool {
        self.state.lock().limit.is_none()
    }
}

impl Default for AudioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for AudioClock {
    fn position(&self) -> Duration {
        self.state.lock().position()
    }

    fn reset_to(&self, position: Duration) {
        let mut state = self.state.lock();
        state.base = position;
        state.anchor = Instant::now();
        state.limit = Some(position);
    }

    fn set_paused(&self, paused: bool) {
        let mut state = self.state.lock();
        if state.paused == paused {
            return;
        }
        state.rebase();
        state.paused = paused;
    }

    fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    fn set_speed(&self, speed: f64) {
        if !valid_speed(speed) {
            return;
        }
        let mut state = self.state.lock();
        state.rebase();
        state.speed = speed;
    }

    fn speed(&self) -> f64 {
        self.state.lock().speed
    }
}

static_assertions::assert_impl_all!(AudioClock: Send, Sync, Clock);

/**
    Wall-time clock for media without a usable audio stream.
*/
pub struct WallClock {
    state: Mutex<WallState>,
}

struct WallState {
    /// Position at `anchor`.
    base: Duration,
    anchor: Instant,
    speed: f64,
    paused: bool,
}

impl WallState {
    fn position(&self) -> Duration {
        if self.paused {
            self.base
        } else {
            self.base + self.anchor.elapsed().mul_f64(self.speed)
        }
    }

    fn rebase(&mut self) {
        self.base = self.position();
        self.anchor = Instant::now();
    }
}

impl WallClock {
    /**
        Create a running wall clock starting at position zero.
    */
    pub fn new() -> Self {
        Self {
            state: Mutex::new(WallState {
                base: Duration::ZERO,
                anchor: Instant::now(),
                speed: 1.0,
                paused: false,
            }),
        }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for WallClock {
    fn position(&self) -> Duration {
        self.state.lock().position()
    }

    fn reset_to(&self, position: Duration) {
        let mut state = self.state.lock();
        state.base = position;
        state.anchor = Instant::now();
    }

    fn set_paused(&self, paused: bool) {
        let mut state = self.state.lock();
        if state.paused == paused {
            return;
        }
        state.rebase();
        state.paused = paused;
    }

    fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    fn set_speed(&self, speed: f64) {
        if !valid_speed(speed) {
            return;
        }
        let mut state = self.state.lock();
        state.rebase();
        state.speed = speed;
    }

    fn speed(&self) -> f64 {
        self.state.lock().speed
    }
}

static_assertions::assert_impl_all!(WallClock: Send, Sync, Clock);
