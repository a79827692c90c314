use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

use media_types::{AudioClock, AudioFrame, Clock, StreamType};

use super::convert::{Resampler, apply_volume, remix, to_f32};
use super::device::{AudioDevice, NullOutput};
use crate::atomic::AtomicF32;
use crate::pipeline::{PauseGate, PipelineHealth, PipelineStats};
use crate::queue::{BoundedQueue, Pop};

/// How long the sink waits for decoded audio before letting the clock run on wall time.
const STARVATION_TIMEOUT: Duration = Duration::from_millis(250);
const DRAIN_POLL: Duration = Duration::from_millis(5);
/// How long queued audio may sit without playing before the drain gives up.
const DRAIN_STALL: Duration = Duration::from_millis(500);

/**
    The audio sink thread: plays decoded audio and drives the master clock.
*/
pub(crate) struct AudioSink {
    pub frames: Arc<BoundedQueue<AudioFrame>>,
    pub clock: Arc<AudioClock>,
    pub volume: Arc<AtomicF32>,
    pub buffer: Duration,
    pub gate: Arc<PauseGate>,
    pub health: Arc<PipelineHealth>,
    pub stats: Arc<PipelineStats>,
}

impl AudioSink {
    /**
        Play frames until the queue is drained or the pipeline is torn
        down, then hand the device back.

        After each batch the clock is told what is audible right now: the
        end of the batch minus whatever the device still holds. Speed
        changes resample the audio so the device keeps playing at its own
        rate while media time passes faster or slower.
    */
    pub fn run(self, device: Option<Box<dyn AudioDevice>>) -> Option<Box<dyn AudioDevice>> {
        let mut device = device;
        let mut resampler: Option<Resampler> = None;
        let mut written_to = self.clock.position();
        let mut starving = false;

        loop {
            if !self.hold_while_paused(&mut device) {
                break;
            }

            let frame = match self.frames.pop_timeout(STARVATION_TIMEOUT) {
                Pop::Item(frame) => frame,
                Pop::TimedOut => {
                    if !starving && !self.gate.is_paused() {
                        tracing::debug!("audio starved, clock running on wall time");
                        self.clock.mark_finished();
                        starving = true;
                    }
                    continue;
                }
                Pop::Closed => break,
            };
            starving = false;
            // A pause may have arrived while we were waiting for this frame
            if !self.hold_while_paused(&mut device) {
                break;
            }

            let Some(samples) = to_f32(frame.format, &frame.data) else {
                tracing::warn!(format = ?frame.format, "skipping audio in an unsupported sample format");
                continue;
            };

            let output = device.get_or_insert_with(|| {
                NullOutput::device(frame.sample_rate, frame.channels, self.buffer)
            });
            let (out_rate, out_channels) = (output.sample_rate(), output.channels());

            let samples = remix(samples, frame.channels, out_channels);
            if resampler.as_ref().is_some_and(|r| r.channels() != out_channels) {
                resampler = None;
            }
            let resampler = resampler.get_or_insert_with(|| Resampler::new(out_channels));
            let speed = self.clock.speed();
            let step = frame.sample_rate as f64 * speed / out_rate as f64;
            let mut samples = resampler.process(&samples, step);
            apply_volume(&mut samples, self.volume.load(Ordering::Relaxed));

            let queued = match output.write(&samples) {
                Ok(()) => output.queued(),
                Err(e) => {
                    tracing::warn!("audio device failed, continuing without sound: {e}");
                    device = Some(NullOutput::device(out_rate, out_channels, self.buffer));
                    Duration::ZERO
                }
            };

            written_to = frame.end_time().unwrap_or(written_to + frame.duration());
            let audible = written_to.saturating_sub(queued.mul_f64(speed));
            self.clock.sync(audible, written_to);
            self.stats.record_audio_frame();
        }

        if self.drain(&mut device) {
            tracing::debug!("audio stream finished");
            self.clock.mark_finished();
            self.health.sink_finished(StreamType::Audio);
        }
        device
    }

    /**
        Wait for the device to play out what it holds. Returns false if the
        pipeline was cancelled meanwhile.
    */
    fn drain(&self, device: &mut Option<Box<dyn AudioDevice>>) -> bool {
        let mut last = Duration::MAX;
        let mut last_progress = Instant::now();
        loop {
            let was_paused = self.gate.is_paused();
            if !self.hold_while_paused(device) {
                return false;
            }
            if was_paused {
                last_progress = Instant::now();
            }
            let queued = device.as_ref().map_or(Duration::ZERO, |d| d.queued());
            if queued.is_zero() {
                return true;
            }
            if queued < last {
                last = queued;
                last_progress = Instant::now();
            } else if last_progress.elapsed() > DRAIN_STALL {
                tracing::warn!(?queued, "audio device stopped playing, not waiting for the rest");
                return true;
            }
            thread::sleep(queued.min(DRAIN_POLL));
        }
    }

    /**
        Pause the device and block while the pipeline is paused. Returns
        false once the pipeline is cancelled.
    */
    fn hold_while_paused(&self, device: &mut Option<Box<dyn AudioDevice>>) -> bool {
        if self.gate.is_paused() {
            if let Some(device) = device.as_mut() {
                device.pause();
            }
            if !self.gate.wait() {
                return false;
            }
            if let Some(device) = device.as_mut() {
                device.resume();
            }
        }
        !self.gate.is_cancelled()
    }
}
