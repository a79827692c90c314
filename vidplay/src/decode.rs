/*!
    Decode stage: one thread per stream, turning packets into frames.
*/

use std::sync::Arc;
use std::time::Duration;

use media_types::{AudioFrame, Packet, StreamType, VideoFrame};

use crate::backend::Decoder;
use crate::config::OverflowPolicy;
use crate::error::PlayerError;
use crate::pipeline::{PipelineHealth, PipelineStats};
use crate::queue::{BoundedQueue, PushError};

/**
    A decoded frame the decode stage can reason about in time.
*/
pub trait TimedFrame: Send + 'static {
    /**
        Returns true if the frame lies entirely before `target` and must
        not be presented after a seek to `target`.
    */
    fn is_before(&self, target: Duration) -> bool;
}

impl TimedFrame for VideoFrame {
    fn is_before(&self, target: Duration) -> bool {
        self.presentation_time().is_some_and(|ts| ts < target)
    }
}

impl TimedFrame for AudioFrame {
    fn is_before(&self, target: Duration) -> bool {
        self.end_time().is_some_and(|end| end <= target)
    }
}

/**
    Everything a decode thread needs besides its decoder.
*/
pub(crate) struct DecodeStage<F> {
    pub stream: StreamType,
    pub packets: Arc<BoundedQueue<Packet>>,
    pub frames: Arc<BoundedQueue<F>>,
    /// Frames before this position are stale output from before a seek.
    pub discard_before: Option<Duration>,
    pub overflow: OverflowPolicy,
    pub max_consecutive_errors: u32,
    pub health: Arc<PipelineHealth>,
    pub stats: Arc<PipelineStats>,
}

impl<F: TimedFrame> DecodeStage<F> {
    /**
        Decode until the packet queue is closed and drained, then close the
        frame queue. Returns the decoder so it can be reused after a seek.
    */
    pub fn run(self, mut decoder: Box<dyn Decoder<Frame = F>>) -> Box<dyn Decoder<Frame = F>> {
        let stream = self.stream.name();
        let mut consecutive_errors = 0u32;

        while let Some(packet) = self.packets.pop() {
            match decoder.decode(&packet) {
                Ok(frames) => {
                    consecutive_errors = 0;
                    for frame in frames {
                        if !self.deliver(frame) {
                            return decoder;
                        }
                    }
                }
                Err(e) => {
                    consecutive_errors += 1;
                    self.stats.record_decode_error();
                    if consecutive_errors > self.max_consecutive_errors {
                        tracing::error!(stream, "giving up after {consecutive_errors} consecutive decode failures: {e}");
                        self.health.report_fatal(PlayerError::decode(
                            self.stream,
                            format!("{consecutive_errors} consecutive failures, last: {e}"),
                        ));
                        self.frames.close();
                        return decoder;
                    }
                    tracing::warn!(stream, pts = ?packet.pts, "skipping undecodable packet: {e}");
                }
            }
        }

        // Input closed: drain the codec unless we are being torn down
        if !self.frames.is_closed() {
            match decoder.flush() {
                Ok(frames) => {
                    for frame in frames {
                        if !self.deliver(frame) {
                            break;
                        }
                    }
                }
                Err(e) => tracing::warn!(stream, "failed to drain decoder: {e}"),
            }
        }

        tracing::debug!(stream, "decode stage finished");
        self.frames.close();
        decoder
    }

    /**
        Queue one frame. Returns false once the output queue is closed.
    */
    fn deliver(&self, frame: F) -> bool {
        if let Some(target) = self.discard_before {
            if frame.is_before(target) {
                return true;
            }
        }

        match self.overflow {
            OverflowPolicy::Block => self.frames.push(frame).is_ok(),
            OverflowPolicy::DropOldest => match self.frames.push_drop_oldest(frame) {
                Ok(Some(_)) => {
                    self.stats.record_overflow_drop();
                    true
                }
                Ok(None) => true,
                Err(PushError::Closed(_) | PushError::Full(_)) => false,
            },
        }
    }
}
