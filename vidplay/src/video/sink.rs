use std::sync::Arc;
use std::thread;
use std::time::Duration;

use media_types::{StreamType, VideoFrame};

use super::surface::SurfaceSlot;
use crate::pipeline::{PauseGate, PipelineHealth, PipelineStats};
use crate::queue::BoundedQueue;
use crate::sync::{FrameAction, SyncController};

/// Longest single sleep while waiting for a frame's deadline.
const WAIT_SLICE: Duration = Duration::from_millis(5);

/**
    The video sink thread: releases frames to the render surface when the
    master clock reaches them.
*/
pub(crate) struct VideoSink {
    pub frames: Arc<BoundedQueue<VideoFrame>>,
    pub sync: SyncController,
    pub surface: Arc<SurfaceSlot>,
    pub gate: Arc<PauseGate>,
    pub health: Arc<PipelineHealth>,
    pub stats: Arc<PipelineStats>,
}

enum Outcome {
    Presented,
    Dropped,
    Cancelled,
}

impl VideoSink {
    pub fn run(self) {
        let mut last_presented: Option<Duration> = None;

        while let Some(frame) = self.frames.pop() {
            let ts = frame.presentation_time();

            // Presentation times never go backwards within a session
            if let (Some(ts), Some(last)) = (ts, last_presented) {
                if ts < last {
                    tracing::trace!(?ts, ?last, "dropping out-of-order frame");
                    self.stats.record_late_drop();
                    continue;
                }
            }

            match self.pace(&frame, ts) {
                Outcome::Presented => {
                    if ts.is_some() {
                        last_presented = ts;
                    }
                }
                Outcome::Dropped => {}
                Outcome::Cancelled => return,
            }
        }

        if !self.gate.is_cancelled() {
            tracing::debug!("video stream finished");
            self.health.sink_finished(StreamType::Video);
        }
    }

    /**
        Wait until `frame` is due, then present or drop it.
    */
    fn pace(&self, frame: &VideoFrame, ts: Option<Duration>) -> Outcome {
        let Some(ts) = ts else {
            // Nothing to pace against
            self.surface.present(frame);
            self.stats.record_presented(None);
            return Outcome::Presented;
        };

        loop {
            if !self.gate.wait() {
                return Outcome::Cancelled;
            }
            match self.sync.schedule(ts) {
                FrameAction::Present => {
                    self.surface.present(frame);
                    self.stats.record_presented(Some(ts));
                    return Outcome::Presented;
                }
                FrameAction::Drop { late_by } => {
                    tracing::trace!(?ts, ?late_by, "dropping late frame");
                    self.stats.record_late_drop();
                    return Outcome::Dropped;
                }
                FrameAction::Wait(wait) => thread::sleep(wait.min(WAIT_SLICE)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeviceError;
    use media_types::{AudioClock, Clock, PixelFormat, Pts, Rational, WallClock};
    use parking_lot::Mutex;
    use std::time::Instant;

    const EPS: Duration = Duration::from_millis(10);
    const DROP: Duration = Duration::from_millis(100);

    fn frame(ms: i64) -> VideoFrame {
        VideoFrame::new(vec![0; 4], 1, 1, PixelFormat::Rgba, Some(Pts(ms)), Rational::new(1, 1000))
    }

    fn recording_slot() -> (Arc<SurfaceSlot>, Arc<Mutex<Vec<i64>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let slot = Arc::new(SurfaceSlot::new());
        let sink_seen = Arc::clone(&seen);
        slot.attach(Box::new(move |f: &VideoFrame| -> Result<(), DeviceError> {
            sink_seen.lock().push(f.pts.map_or(-1, |p| p.0));
            Ok(())
        }));
        (slot, seen)
    }

    fn sink(frames: &Arc<BoundedQueue<VideoFrame>>, clock: Arc<dyn Clock>, slot: &Arc<SurfaceSlot>) -> VideoSink {
        VideoSink {
            frames: Arc::clone(frames),
            sync: SyncController::new(clock, EPS, DROP),
            surface: Arc::clone(slot),
            gate: Arc::new(PauseGate::new(false)),
            health: Arc::new(PipelineHealth::new(1)),
            stats: Arc::new(PipelineStats::default()),
        }
    }

    #[test]
    fn presents_frames_at_their_time() {
        let frames = Arc::new(BoundedQueue::new(8));
        for ms in [0, 40, 80, 120] {
            frames.push(frame(ms)).unwrap();
        }
        frames.close();

        let (slot, seen) = recording_slot();
        let sink = sink(&frames, Arc::new(WallClock::new()), &slot);
        let health = Arc::clone(&sink.health);

        let started = Instant::now();
        sink.run();
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(*seen.lock(), [0, 40, 80, 120]);
        assert!(health.is_drained());
    }

    #[test]
    fn drops_late_and_out_of_order_frames() {
        let frames = Arc::new(BoundedQueue::new(8));
        for ms in [0, 500, 1000, 990, 1040] {
            frames.push(frame(ms)).unwrap();
        }
        frames.close();

        let clock = Arc::new(AudioClock::new());
        // Nothing buffered past 1000ms, so the clock holds there
        clock.sync(Duration::from_millis(1000), Duration::from_millis(1000));

        let (slot, seen) = recording_slot();
        let sink = sink(&frames, clock.clone(), &slot);
        let stats = Arc::clone(&sink.stats);
        let worker = thread::spawn(move || sink.run());

        thread::sleep(Duration::from_millis(50));
        clock.sync(Duration::from_millis(1040), Duration::from_millis(1040));
        worker.join().unwrap();

        assert_eq!(*seen.lock(), [1000, 1040]);
        let stats = stats.snapshot();
        assert_eq!(stats.frames_presented, 2);
        assert_eq!(stats.frames_dropped, 3);
        assert_eq!(stats.last_video_pts, Some(Duration::from_millis(1040)));
    }

    #[test]
    fn cancel_interrupts_a_waiting_frame() {
        let frames = Arc::new(BoundedQueue::new(8));
        frames.push(frame(60_000)).unwrap();

        let (slot, seen) = recording_slot();
        let sink = sink(&frames, Arc::new(WallClock::new()), &slot);
        let gate = Arc::clone(&sink.gate);
        let health = Arc::clone(&sink.health);
        let worker = thread::spawn(move || sink.run());

        thread::sleep(Duration::from_millis(30));
        gate.cancel();
        frames.abort();
        worker.join().unwrap();

        assert!(seen.lock().is_empty());
        assert!(!health.is_drained());
    }
}
