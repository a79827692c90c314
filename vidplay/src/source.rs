/*!
    Media source: opening the container and the demux thread.
*/

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use media_types::{MediaInfo, Packet, StreamType};

use crate::backend::{AudioDecoder, Demuxer, MediaBackend, VideoDecoder};
use crate::error::{PlayerError, Result};
use crate::pipeline::{PauseGate, PipelineHealth};
use crate::queue::{BoundedQueue, PushError};

/// How long the demuxer waits on a full queue before rechecking fairness.
const FAIRNESS_POLL: Duration = Duration::from_millis(10);

/**
    An opened media file, ready to be played.
*/
pub(crate) struct OpenedMedia {
    pub demuxer: Box<dyn Demuxer>,
    pub info: MediaInfo,
    pub video_decoder: Option<VideoDecoder>,
    pub audio_decoder: Option<AudioDecoder>,
}

/**
    Open `path`, validate its streams and create their decoders.

    A stream with unusable parameters or no working decoder is dropped with
    a warning; the file only fails to open if no stream is left.
*/
pub(crate) fn open_media(backend: &dyn MediaBackend, path: &Path) -> Result<OpenedMedia> {
    let mut demuxer = backend.open(path)?;
    let mut info = demuxer.info().clone();

    if let Some(video) = &info.video {
        if video.width == 0 || video.height == 0 {
            tracing::warn!(width = video.width, height = video.height, "ignoring video stream with empty frame size");
            info.video = None;
        }
    }
    if let Some(audio) = &info.audio {
        if audio.sample_rate == 0 || audio.channels == 0 {
            tracing::warn!(rate = audio.sample_rate, channels = audio.channels, "ignoring audio stream without samples");
            info.audio = None;
        }
    }

    let video_decoder = if info.has_video() {
        demuxer.open_video_decoder().unwrap_or_else(|e| {
            tracing::warn!("video stream is not decodable, playing audio only: {e}");
            None
        })
    } else {
        None
    };
    let audio_decoder = if info.has_audio() {
        demuxer.open_audio_decoder().unwrap_or_else(|e| {
            tracing::warn!("audio stream is not decodable, playing video only: {e}");
            None
        })
    } else {
        None
    };

    if video_decoder.is_none() {
        info.video = None;
    }
    if audio_decoder.is_none() {
        info.audio = None;
    }
    if video_decoder.is_none() && audio_decoder.is_none() {
        return Err(PlayerError::Source(format!(
            "{}: no playable audio or video stream",
            path.display()
        )));
    }

    Ok(OpenedMedia {
        demuxer,
        info,
        video_decoder,
        audio_decoder,
    })
}

/**
    Packet routing for the demux thread.
*/
pub(crate) struct DemuxStage {
    pub video: Option<Arc<BoundedQueue<Packet>>>,
    pub audio: Option<Arc<BoundedQueue<Packet>>>,
    pub gate: Arc<PauseGate>,
    pub health: Arc<PipelineHealth>,
}

impl DemuxStage {
    /**
        Read packets until end of file, a read error, or cancellation.
        Closes both packet queues on the way out and returns the demuxer.
    */
    pub fn run(self, mut demuxer: Box<dyn Demuxer>) -> Box<dyn Demuxer> {
        let mut packets = 0u64;

        while !self.gate.is_cancelled() {
            match demuxer.read_packet() {
                Ok(Some(packet)) => {
                    let (target, other) = match packet.stream_type {
                        StreamType::Video => (&self.video, &self.audio),
                        StreamType::Audio => (&self.audio, &self.video),
                    };
                    let Some(target) = target else {
                        continue;
                    };
                    if !push_fair(target, other.as_deref(), packet) {
                        break;
                    }
                    packets += 1;
                }
                Ok(None) => {
                    tracing::debug!(packets, "demuxer reached end of file");
                    break;
                }
                Err(e) => {
                    tracing::error!("failed to read from container: {e}");
                    self.health.report_fatal(e.into());
                    break;
                }
            }
        }

        for queue in [&self.video, &self.audio].into_iter().flatten() {
            queue.close();
        }
        demuxer
    }
}

/**
    Push a packet, blocking while `queue` is full, unless the other stream
    has run dry: then the queue may grow to twice its capacity so a starved
    decoder can still be fed. Returns false if the queue was closed.
*/
fn push_fair(queue: &BoundedQueue<Packet>, other: Option<&BoundedQueue<Packet>>, packet: Packet) -> bool {
    let mut packet = packet;
    loop {
        match queue.push_timeout(packet, FAIRNESS_POLL) {
            Ok(()) => return true,
            Err(PushError::Closed(_)) => return false,
            Err(PushError::Full(p)) => packet = p,
        }

        let other_starving = other.is_some_and(|o| o.is_empty() && !o.is_closed());
        if other_starving {
            match queue.push_overfill(packet, queue.capacity() * 2) {
                Ok(()) => return true,
                Err(PushError::Closed(_)) => return false,
                Err(PushError::Full(p)) => packet = p,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{SyntheticBackend, SyntheticMedia};
    use std::thread;

    fn backend(media: SyntheticMedia) -> SyntheticBackend {
        SyntheticBackend::new(media)
    }

    #[test]
    fn open_reports_partial_streams() {
        let media = SyntheticMedia::new(Duration::from_secs(1)).without_audio();
        let opened = open_media(&backend(media), Path::new("video.mp4")).unwrap();
        assert!(opened.info.has_video());
        assert!(!opened.info.has_audio());
        assert!(opened.audio_decoder.is_none());
    }

    #[test]
    fn open_rejects_files_without_streams() {
        let media = SyntheticMedia::new(Duration::from_secs(1))
            .without_audio()
            .without_video();
        let err = open_media(&backend(media), Path::new("empty.mp4")).err().unwrap();
        assert!(matches!(err, PlayerError::Source(_)));
    }

    #[test]
    fn open_drops_streams_with_bad_parameters() {
        let media = SyntheticMedia::new(Duration::from_secs(1)).with_video(0, 0, 25, 25);
        let opened = open_media(&backend(media), Path::new("odd.mp4")).unwrap();
        assert!(!opened.info.has_video());
        assert!(opened.video_decoder.is_none());
        assert!(opened.info.has_audio());
    }

    #[test]
    fn open_failure_is_a_source_error() {
        let media = SyntheticMedia::new(Duration::from_secs(1)).failing_open();
        let err = open_media(&backend(media), Path::new("broken.mp4")).err().unwrap();
        assert!(matches!(err, PlayerError::Source(msg) if msg.contains("broken.mp4")));
    }

    #[test]
    fn demux_routes_packets_in_order_and_closes_queues() {
        let opened = open_media(
            &backend(SyntheticMedia::new(Duration::from_secs(1))),
            Path::new("a.mp4"),
        )
        .unwrap();

        let video = Arc::new(BoundedQueue::new(64));
        let audio = Arc::new(BoundedQueue::new(64));
        let stage = DemuxStage {
            video: Some(Arc::clone(&video)),
            audio: Some(Arc::clone(&audio)),
            gate: Arc::new(PauseGate::new(false)),
            health: Arc::new(PipelineHealth::new(2)),
        };
        stage.run(opened.demuxer);

        assert!(video.is_closed() && audio.is_closed());
        let mut last = None;
        let mut count = 0;
        while let Some(packet) = video.pop() {
            assert!(packet.is_video());
            assert!(last < packet.pts);
            last = packet.pts;
            count += 1;
        }
        assert_eq!(count, 25);
        assert_eq!(audio.len(), 47);
    }

    #[test]
    fn full_queue_overfills_only_while_other_stream_starves() {
        let full = BoundedQueue::new(2);
        let other = BoundedQueue::new(2);
        let packet = || Packet::new(vec![1], StreamType::Video, media_types::Rational::new(1, 1000));

        full.push(packet()).unwrap();
        full.push(packet()).unwrap();

        // Other stream empty: overfill up to twice the capacity
        assert!(push_fair(&full, Some(&other), packet()));
        assert!(push_fair(&full, Some(&other), packet()));
        assert_eq!(full.len(), 4);

        // Other stream has data: block until the consumer drains below capacity
        other.push(packet()).unwrap();
        let full = Arc::new(full);
        let consumer = {
            let full = Arc::clone(&full);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(40));
                (0..3).filter_map(|_| full.pop()).count()
            })
        };
        assert!(push_fair(&full, Some(&other), packet()));
        assert_eq!(consumer.join().unwrap(), 3);
        assert_eq!(full.len(), 2);
    }

    #[test]
    fn demux_stops_when_queue_is_aborted() {
        let opened = open_media(
            &backend(SyntheticMedia::new(Duration::from_secs(30)).without_audio()),
            Path::new("long.mp4"),
        )
        .unwrap();
        let video = Arc::new(BoundedQueue::new(4));
        let stage = DemuxStage {
            video: Some(Arc::clone(&video)),
            audio: None,
            gate: Arc::new(PauseGate::new(false)),
            health: Arc::new(PipelineHealth::new(1)),
        };

        let worker = thread::spawn(move || stage.run(opened.demuxer));
        thread::sleep(Duration::from_millis(30));
        video.abort();
        let demuxer = worker.join().unwrap();
        assert_eq!(demuxer.info().duration, Duration::from_secs(30));
    }
}
