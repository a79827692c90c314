/*!
    The running set of pipeline threads for one playback position.

    A pipeline is spawned from owned parts (demuxer, decoders, audio
    device) and hands them back when it is shut down, so a seek can tear
    the threads down, reposition the demuxer and spawn a fresh pipeline
    without reopening the file.
*/

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use media_types::{AudioClock, AudioFrame, Clock, Packet, StreamType, VideoFrame};

use crate::atomic::AtomicF32;
use crate::audio::{AudioDevice, AudioSink};
use crate::backend::{AudioDecoder, Demuxer, VideoDecoder};
use crate::config::{OverflowPolicy, PlayerConfig};
use crate::decode::DecodeStage;
use crate::error::{PlayerError, Result};
use crate::queue::BoundedQueue;
use crate::source::DemuxStage;
use crate::sync::SyncController;
use crate::video::{SurfaceSlot, VideoSink};

/**
    Pause and cancellation signal shared by every pipeline thread.
*/
pub(crate) struct PauseGate {
    state: Mutex<GateState>,
    changed: Condvar,
    cancelled: AtomicBool,
}

struct GateState {
    paused: bool,
    cancelled: bool,
}

impl PauseGate {
    pub fn new(paused: bool) -> Self {
        Self {
            state: Mutex::new(GateState {
                paused,
                cancelled: false,
            }),
            changed: Condvar::new(),
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn set_paused(&self, paused: bool) {
        let mut state = self.state.lock();
        state.paused = paused;
        self.changed.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    pub fn cancel(&self) {
        let mut state = self.state.lock();
        state.cancelled = true;
        self.cancelled.store(true, Ordering::Release);
        self.changed.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /**
        Block while paused. Returns false if the pipeline was cancelled.
    */
    pub fn wait(&self) -> bool {
        let mut state = self.state.lock();
        while state.paused && !state.cancelled {
            self.changed.wait(&mut state);
        }
        !state.cancelled
    }
}

/**
    How a pipeline is doing: which sinks have run out of input, and the
    first fatal error raised by any of its threads.
*/
pub(crate) struct PipelineHealth {
    state: Mutex<HealthState>,
    changed: Condvar,
}

struct HealthState {
    sinks_running: usize,
    fatal: Option<PlayerError>,
}

impl PipelineHealth {
    pub fn new(sinks: usize) -> Self {
        Self {
            state: Mutex::new(HealthState {
                sinks_running: sinks,
                fatal: None,
            }),
            changed: Condvar::new(),
        }
    }

    /**
        Called by a sink once its input is exhausted.
    */
    pub fn sink_finished(&self, stream: StreamType) {
        let mut state = self.state.lock();
        state.sinks_running = state.sinks_running.saturating_sub(1);
        tracing::debug!(stream = stream.name(), remaining = state.sinks_running, "sink drained");
        self.changed.notify_all();
    }

    /**
        Record a fatal error. Only the first one is kept.
    */
    pub fn report_fatal(&self, error: PlayerError) {
        let mut state = self.state.lock();
        if state.fatal.is_none() {
            state.fatal = Some(error);
        }
        self.changed.notify_all();
    }

    pub fn fatal(&self) -> Option<PlayerError> {
        self.state.lock().fatal.clone()
    }

    #[cfg(test)]
    pub fn is_drained(&self) -> bool {
        self.state.lock().sinks_running == 0
    }

    /**
        True once the pipeline has nothing more to do.
    */
    pub fn is_over(&self) -> bool {
        let state = self.state.lock();
        state.sinks_running == 0 || state.fatal.is_some()
    }

    /**
        Wait until the pipeline is over or `timeout` elapses.
    */
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.sinks_running > 0 && state.fatal.is_none() {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.sinks_running == 0 || state.fatal.is_some()
    }
}

/**
    Counters maintained by the pipeline threads.
*/
#[derive(Debug, Default)]
pub(crate) struct PipelineStats {
    frames_presented: AtomicU64,
    frames_dropped: AtomicU64,
    frames_overflowed: AtomicU64,
    decode_errors: AtomicU64,
    audio_frames_played: AtomicU64,
    /// Presentation time of the last presented video frame, in microseconds plus one.
    last_video_us: AtomicU64,
}

impl PipelineStats {
    pub fn record_presented(&self, ts: Option<Duration>) {
        self.frames_presented.fetch_add(1, Ordering::Relaxed);
        if let Some(ts) = ts {
            let us = u64::try_from(ts.as_micros()).unwrap_or(u64::MAX - 1);
            self.last_video_us.store(us + 1, Ordering::Relaxed);
        }
    }

    pub fn record_late_drop(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_overflow_drop(&self) {
        self.frames_overflowed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_audio_frame(&self) {
        self.audio_frames_played.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        for counter in [
            &self.frames_presented,
            &self.frames_dropped,
            &self.frames_overflowed,
            &self.decode_errors,
            &self.audio_frames_played,
            &self.last_video_us,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> PlaybackStats {
        let last = self.last_video_us.load(Ordering::Relaxed);
        PlaybackStats {
            frames_presented: self.frames_presented.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_overflowed: self.frames_overflowed.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            audio_frames_played: self.audio_frames_played.load(Ordering::Relaxed),
            last_video_pts: last.checked_sub(1).map(Duration::from_micros),
        }
    }
}

/**
    Snapshot of the playback counters of the current session.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    /// Video frames handed to the render surface (or discarded for lack of one).
    pub frames_presented: u64,
    /// Video frames dropped for missing their deadline.
    pub frames_dropped: u64,
    /// Video frames dropped by the `DropOldest` overflow policy.
    pub frames_overflowed: u64,
    /// Packets that failed to decode.
    pub decode_errors: u64,
    /// Audio sample batches written to the output device.
    pub audio_frames_played: u64,
    /// Timestamp of the most recently presented video frame.
    pub last_video_pts: Option<Duration>,
}

/**
    The owned resources a pipeline runs on.
*/
pub(crate) struct PipelineParts {
    pub demuxer: Box<dyn Demuxer>,
    pub video_decoder: Option<VideoDecoder>,
    pub audio_decoder: Option<AudioDecoder>,
    pub audio_device: Option<Box<dyn AudioDevice>>,
}

/**
    Session-wide collaborators shared by every pipeline of a session.
*/
#[derive(Clone)]
pub(crate) struct PipelineContext {
    pub config: PlayerConfig,
    pub clock: Arc<dyn Clock>,
    pub audio_clock: Option<Arc<AudioClock>>,
    pub surface: Arc<SurfaceSlot>,
    pub volume: Arc<AtomicF32>,
    pub stats: Arc<PipelineStats>,
}

/**
    A running pipeline.
*/
pub(crate) struct Pipeline {
    gate: Arc<PauseGate>,
    health: Arc<PipelineHealth>,
    video_packets: Option<Arc<BoundedQueue<Packet>>>,
    audio_packets: Option<Arc<BoundedQueue<Packet>>>,
    video_frames: Option<Arc<BoundedQueue<VideoFrame>>>,
    audio_frames: Option<Arc<BoundedQueue<AudioFrame>>>,
    demux: JoinHandle<Box<dyn Demuxer>>,
    video_decode: Option<JoinHandle<VideoDecoder>>,
    audio_decode: Option<JoinHandle<AudioDecoder>>,
    video_sink: Option<JoinHandle<()>>,
    audio_sink: Option<JoinHandle<Option<Box<dyn AudioDevice>>>>,
}

impl Pipeline {
    /**
        Spawn the demux, decode and sink threads.

        Frames before `discard_before` are dropped by the decode stages, so
        nothing from before a seek target reaches a sink.
    */
    pub fn spawn(
        parts: PipelineParts,
        context: &PipelineContext,
        discard_before: Option<Duration>,
        paused: bool,
    ) -> Result<Self> {
        let config = &context.config;
        let PipelineParts {
            demuxer,
            video_decoder,
            audio_decoder,
            audio_device,
        } = parts;

        let sinks = usize::from(video_decoder.is_some()) + usize::from(audio_decoder.is_some());
        let gate = Arc::new(PauseGate::new(paused));
        let health = Arc::new(PipelineHealth::new(sinks));

        let video_packets = video_decoder
            .as_ref()
            .map(|_| Arc::new(BoundedQueue::new(config.video_packet_capacity)));
        let audio_packets = audio_decoder
            .as_ref()
            .map(|_| Arc::new(BoundedQueue::new(config.audio_packet_capacity)));
        let video_frames = video_decoder
            .as_ref()
            .map(|_| Arc::new(BoundedQueue::new(config.video_frame_capacity)));
        let audio_frames = audio_decoder
            .as_ref()
            .map(|_| Arc::new(BoundedQueue::new(config.audio_frame_capacity)));

        let mut pipeline = PendingPipeline {
            gate: Arc::clone(&gate),
            disarmed: false,
            video_packets: video_packets.clone(),
            audio_packets: audio_packets.clone(),
            video_frames: video_frames.clone(),
            audio_frames: audio_frames.clone(),
        };

        let demux = {
            let stage = DemuxStage {
                video: video_packets.clone(),
                audio: audio_packets.clone(),
                gate: Arc::clone(&gate),
                health: Arc::clone(&health),
            };
            spawn_worker("demux", move || stage.run(demuxer))
                .inspect_err(|_| pipeline.abort())?
        };

        let video_decode = match (video_decoder, &video_packets, &video_frames) {
            (Some(decoder), Some(packets), Some(frames)) => {
                let stage = DecodeStage {
                    stream: StreamType::Video,
                    packets: Arc::clone(packets),
                    frames: Arc::clone(frames),
                    discard_before,
                    overflow: config.video_overflow,
                    max_consecutive_errors: config.max_consecutive_decode_errors,
                    health: Arc::clone(&health),
                    stats: Arc::clone(&context.stats),
                };
                Some(
                    spawn_worker("video-decode", move || stage.run(decoder))
                        .inspect_err(|_| pipeline.abort())?,
                )
            }
            _ => None,
        };

        let audio_decode = match (audio_decoder, &audio_packets, &audio_frames) {
            (Some(decoder), Some(packets), Some(frames)) => {
                let stage = DecodeStage {
                    stream: StreamType::Audio,
                    packets: Arc::clone(packets),
                    frames: Arc::clone(frames),
                    discard_before,
                    overflow: OverflowPolicy::Block,
                    max_consecutive_errors: config.max_consecutive_decode_errors,
                    health: Arc::clone(&health),
                    stats: Arc::clone(&context.stats),
                };
                Some(
                    spawn_worker("audio-decode", move || stage.run(decoder))
                        .inspect_err(|_| pipeline.abort())?,
                )
            }
            _ => None,
        };

        let video_sink = match &video_frames {
            Some(frames) => {
                let sink = VideoSink {
                    frames: Arc::clone(frames),
                    sync: SyncController::new(
                        Arc::clone(&context.clock),
                        config.sync_epsilon(),
                        config.drop_threshold(),
                    ),
                    surface: Arc::clone(&context.surface),
                    gate: Arc::clone(&gate),
                    health: Arc::clone(&health),
                    stats: Arc::clone(&context.stats),
                };
                Some(spawn_worker("video-sink", move || sink.run()).inspect_err(|_| pipeline.abort())?)
            }
            None => None,
        };

        let audio_sink = match (&audio_frames, &context.audio_clock) {
            (Some(frames), Some(clock)) => {
                let sink = AudioSink {
                    frames: Arc::clone(frames),
                    clock: Arc::clone(clock),
                    volume: Arc::clone(&context.volume),
                    buffer: config.audio_buffer(),
                    gate: Arc::clone(&gate),
                    health: Arc::clone(&health),
                    stats: Arc::clone(&context.stats),
                };
                Some(
                    spawn_worker("audio-sink", move || sink.run(audio_device))
                        .inspect_err(|_| pipeline.abort())?,
                )
            }
            _ => None,
        };

        pipeline.disarmed = true;
        tracing::debug!(?discard_before, sinks, "pipeline started");

        Ok(Self {
            gate,
            health,
            video_packets,
            audio_packets,
            video_frames,
            audio_frames,
            demux,
            video_decode,
            audio_decode,
            video_sink,
            audio_sink,
        })
    }

    pub fn set_paused(&self, paused: bool) {
        self.gate.set_paused(paused);
    }

    pub fn health(&self) -> &Arc<PipelineHealth> {
        &self.health
    }

    /**
        Stop every thread and take back the parts they were running on.

        All queues are aborted first, which wakes any thread blocked on a
        full or empty queue, so this returns within a bounded time.
    */
    pub fn shutdown(self) -> Result<PipelineParts> {
        self.gate.cancel();
        abort_all(
            &self.video_packets,
            &self.audio_packets,
            &self.video_frames,
            &self.audio_frames,
        );

        let demuxer = join(self.demux, "demux")?;
        let video_decoder = self.video_decode.map(|h| join(h, "video-decode")).transpose()?;
        let audio_decoder = self.audio_decode.map(|h| join(h, "audio-decode")).transpose()?;
        if let Some(handle) = self.video_sink {
            join(handle, "video-sink")?;
        }
        let audio_device = match self.audio_sink {
            Some(handle) => join(handle, "audio-sink")?,
            None => None,
        };

        tracing::debug!("pipeline stopped");
        Ok(PipelineParts {
            demuxer,
            video_decoder,
            audio_decoder,
            audio_device,
        })
    }
}

/**
    Cleanup guard for a pipeline whose threads are still being spawned.
*/
struct PendingPipeline {
    gate: Arc<PauseGate>,
    disarmed: bool,
    video_packets: Option<Arc<BoundedQueue<Packet>>>,
    audio_packets: Option<Arc<BoundedQueue<Packet>>>,
    video_frames: Option<Arc<BoundedQueue<VideoFrame>>>,
    audio_frames: Option<Arc<BoundedQueue<AudioFrame>>>,
}

impl PendingPipeline {
    fn abort(&mut self) {
        if self.disarmed {
            return;
        }
        self.disarmed = true;
        self.gate.cancel();
        abort_all(
            &self.video_packets,
            &self.audio_packets,
            &self.video_frames,
            &self.audio_frames,
        );
    }
}

fn abort_all(
    video_packets: &Option<Arc<BoundedQueue<Packet>>>,
    audio_packets: &Option<Arc<BoundedQueue<Packet>>>,
    video_frames: &Option<Arc<BoundedQueue<VideoFrame>>>,
    audio_frames: &Option<Arc<BoundedQueue<AudioFrame>>>,
) {
    for queue in [video_packets, audio_packets].into_iter().flatten() {
        queue.abort();
    }
    if let Some(queue) = video_frames {
        queue.abort();
    }
    if let Some(queue) = audio_frames {
        queue.abort();
    }
}

fn spawn_worker<T, F>(name: &'static str, f: F) -> Result<JoinHandle<T>>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    thread::Builder::new()
        .name(format!("vidplay-{name}"))
        .spawn(f)
        .map_err(|e| PlayerError::Source(format!("failed to start {name} thread: {e}")))
}

fn join<T>(handle: JoinHandle<T>, name: &'static str) -> Result<T> {
    handle.join().map_err(|_| {
        tracing::error!("{name} thread panicked");
        PlayerError::WorkerPanicked(name)
    })
}
