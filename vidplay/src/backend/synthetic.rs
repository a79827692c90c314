/*!
    A deterministic, in-process media source.

    Generates a moving test pattern and a sine tone without touching the
    filesystem or any codec library. Packets carry just enough payload for
    the matching decoder to rebuild the frame, so the whole pipeline (demux,
    decode, sync, sinks) runs for real.
*/

use std::collections::BTreeSet;
use std::f32::consts::TAU;
use std::path::Path;
use std::time::Duration;

use media_types::{
    AudioFrame, AudioStreamInfo, Error, MediaDuration, MediaInfo, Packet, PixelFormat, Pts,
    Rational, Result, SampleFormat, StreamType, VideoFrame, VideoStreamInfo,
};

use super::{AudioDecoder, Decoder, Demuxer, MediaBackend, VideoDecoder};

const VIDEO_TIME_BASE: Rational = Rational { num: 1, den: 90000 };
const SAMPLES_PER_PACKET: u64 = 1024;
const TONE_HZ: f32 = 440.0;

const VIDEO_TAG: u8 = b'V';
const AUDIO_TAG: u8 = b'A';

/**
    Description of a synthetic media file.
*/
#[derive(Clone, Debug)]
pub struct SyntheticMedia {
    pub duration: Duration,
    pub video: Option<SyntheticVideo>,
    pub audio: Option<SyntheticAudio>,
    /// Video packet indices whose payload is garbage.
    pub corrupt_video: BTreeSet<u64>,
    /// Audio packet indices whose payload is garbage.
    pub corrupt_audio: BTreeSet<u64>,
    /// Make `open` fail as if the file were unreadable.
    pub fail_open: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct SyntheticVideo {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Distance between keyframes, in frames.
    pub gop: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct SyntheticAudio {
    pub sample_rate: u32,
    pub channels: u16,
}

impl SyntheticMedia {
    /**
        A file with a small 25 fps video stream and 48 kHz stereo audio.
    */
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            video: Some(SyntheticVideo {
                width: 64,
                height: 36,
                fps: 25,
                gop: 25,
            }),
            audio: Some(SyntheticAudio {
                sample_rate: 48000,
                channels: 2,
            }),
            corrupt_video: BTreeSet::new(),
            corrupt_audio: BTreeSet::new(),
            fail_open: false,
        }
    }

    pub fn with_video(mut self, width: u32, height: u32, fps: u32, gop: u32) -> Self {
        self.video = Some(SyntheticVideo {
            width,
            height,
            fps,
            gop: gop.max(1),
        });
        self
    }

    pub fn with_audio(mut self, sample_rate: u32, channels: u16) -> Self {
        self.audio = Some(SyntheticAudio {
            sample_rate,
            channels,
        });
        self
    }

    pub fn without_video(mut self) -> Self {
        self.video = None;
        self
    }

    pub fn without_audio(mut self) -> Self {
        self.audio = None;
        self
    }

    pub fn with_corrupt_packets(
        mut self,
        stream: StreamType,
        indices: impl IntoIterator<Item = u64>,
    ) -> Self {
        let set = match stream {
            StreamType::Video => &mut self.corrupt_video,
            StreamType::Audio => &mut self.corrupt_audio,
        };
        set.extend(indices);
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    fn video_packet_count(&self) -> u64 {
        self.video
            .map(|v| (self.duration.as_secs_f64() * v.fps as f64).ceil() as u64)
            .unwrap_or(0)
    }

    fn audio_packet_count(&self) -> u64 {
        self.audio
            .map(|a| {
                let samples = (self.duration.as_secs_f64() * a.sample_rate as f64).ceil() as u64;
                samples.div_ceil(SAMPLES_PER_PACKET)
            })
            .unwrap_or(0)
    }

    fn info(&self) -> MediaInfo {
        MediaInfo {
            duration: self.duration,
            video: self.video.map(|v| VideoStreamInfo {
                width: v.width,
                height: v.height,
                codec: "testsrc".into(),
                frame_rate: Some(Rational::new(v.fps as i32, 1)),
                time_base: VIDEO_TIME_BASE,
            }),
            audio: self.audio.map(|a| AudioStreamInfo {
                sample_rate: a.sample_rate,
                channels: a.channels,
                codec: "sine".into(),
                time_base: Rational::new(1, a.sample_rate as i32),
            }),
        }
    }
}

/**
    Backend that opens the same [`SyntheticMedia`] for every path.
*/
#[derive(Clone, Debug)]
pub struct SyntheticBackend {
    media: SyntheticMedia,
}

impl SyntheticBackend {
    pub fn new(media: SyntheticMedia) -> Self {
        Self { media }
    }
}

impl MediaBackend for SyntheticBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn Demuxer>> {
        if self.media.fail_open {
            return Err(Error::invalid_data(format!(
                "{}: corrupt container header",
                path.display()
            )));
        }
        Ok(Box::new(SyntheticDemuxer::new(self.media.clone())))
    }
}

struct SyntheticDemuxer {
    info: MediaInfo,
    media: SyntheticMedia,
    video_total: u64,
    audio_total: u64,
    next_video: u64,
    next_audio: u64,
}

impl SyntheticDemuxer {
    fn new(media: SyntheticMedia) -> Self {
        Self {
            info: media.info(),
            video_total: media.video_packet_count(),
            audio_total: media.audio_packet_count(),
            next_video: 0,
            next_audio: 0,
            media,
        }
    }

    fn video_time(&self, index: u64) -> Option<f64> {
        let video = self.media.video?;
        (index < self.video_total).then(|| index as f64 / video.fps as f64)
    }

    fn audio_time(&self, index: u64) -> Option<f64> {
        let audio = self.media.audio?;
        (index < self.audio_total)
            .then(|| (index * SAMPLES_PER_PACKET) as f64 / audio.sample_rate as f64)
    }

    fn video_packet(&self, video: SyntheticVideo, index: u64) -> Packet {
        let ticks_per_frame = VIDEO_TIME_BASE.den as i64 / video.fps as i64;
        let keyframe = index % video.gop as u64 == 0;
        let data = if self.media.corrupt_video.contains(&index) {
            vec![0xFF; 3]
        } else {
            let mut data = vec![VIDEO_TAG];
            data.extend_from_slice(&index.to_le_bytes());
            data
        };
        Packet::new(data, StreamType::Video, VIDEO_TIME_BASE)
            .with_pts(Pts(index as i64 * ticks_per_frame))
            .with_dts(Pts(index as i64 * ticks_per_frame))
            .with_duration(MediaDuration(ticks_per_frame))
            .with_keyframe(keyframe)
    }

    fn audio_packet(&self, audio: SyntheticAudio, index: u64) -> Packet {
        let start = index * SAMPLES_PER_PACKET;
        let total = (self.media.duration.as_secs_f64() * audio.sample_rate as f64).ceil() as u64;
        let samples = SAMPLES_PER_PACKET.min(total.saturating_sub(start)) as u32;
        let data = if self.media.corrupt_audio.contains(&index) {
            vec![0xFF; 3]
        } else {
            let mut data = vec![AUDIO_TAG];
            data.extend_from_slice(&samples.to_le_bytes());
            data
        };
        Packet::new(
            data,
            StreamType::Audio,
            Rational::new(1, audio.sample_rate as i32),
        )
        .with_pts(Pts(start as i64))
        .with_dts(Pts(start as i64))
        .with_duration(MediaDuration(samples as i64))
        .with_keyframe(true)
    }
}

impl Demuxer for SyntheticDemuxer {
    fn info(&self) -> &MediaInfo {
        &self.info
    }

    fn read_packet(&mut self) -> Result<Option<Packet>> {
        let video_at = self.video_time(self.next_video);
        let audio_at = self.audio_time(self.next_audio);

        let take_video = match (video_at, audio_at) {
            (None, None) => return Ok(None),
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (Some(v), Some(a)) => v < a,
        };

        if take_video {
            let Some(video) = self.media.video else {
                return Ok(None);
            };
            let packet = self.video_packet(video, self.next_video);
            self.next_video += 1;
            Ok(Some(packet))
        } else {
            let Some(audio) = self.media.audio else {
                return Ok(None);
            };
            let packet = self.audio_packet(audio, self.next_audio);
            self.next_audio += 1;
            Ok(Some(packet))
        }
    }

    fn seek(&mut self, position: Duration) -> Result<()> {
        let position = position.min(self.media.duration);
        let mut start = position.as_secs_f64();

        if let Some(video) = self.media.video {
            let frame = (start * video.fps as f64).floor() as u64;
            let keyframe = frame - frame % video.gop as u64;
            self.next_video = keyframe;
            start = keyframe as f64 / video.fps as f64;
        }
        if let Some(audio) = self.media.audio {
            let sample = (start * audio.sample_rate as f64).floor() as u64;
            self.next_audio = sample / SAMPLES_PER_PACKET;
        }
        Ok(())
    }

    fn open_video_decoder(&mut self) -> Result<Option<VideoDecoder>> {
        Ok(self.media.video.map(|video| {
            Box::new(PatternDecoder {
                video,
                needs_keyframe: true,
            }) as VideoDecoder
        }))
    }

    fn open_audio_decoder(&mut self) -> Result<Option<AudioDecoder>> {
        Ok(self
            .media
            .audio
            .map(|audio| Box::new(ToneDecoder { audio }) as AudioDecoder))
    }
}

/**
    Paints a frame whose colour and bar position depend on the frame index.
*/
struct PatternDecoder {
    video: SyntheticVideo,
    needs_keyframe: bool,
}

impl Decoder for PatternDecoder {
    type Frame = VideoFrame;

    fn decode(&mut self, packet: &Packet) -> Result<Vec<VideoFrame>> {
        let index = match packet.data.split_first() {
            Some((&VIDEO_TAG, rest)) if rest.len() == 8 => {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(rest);
                u64::from_le_bytes(bytes)
            }
            _ => return Err(Error::codec("invalid video bitstream")),
        };

        // Like a real codec, nothing decodes until a keyframe arrives
        if self.needs_keyframe {
            if !packet.is_keyframe {
                return Ok(Vec::new());
            }
            self.needs_keyframe = false;
        }

        let SyntheticVideo { width, height, .. } = self.video;
        let shade = (index % 256) as u8;
        let bar = (index % width.max(1) as u64) as u32;
        let mut data = Vec::with_capacity(PixelFormat::Rgba.frame_size(width, height));
        for _ in 0..height {
            for x in 0..width {
                if x == bar {
                    data.extend_from_slice(&[255, 255, 255, 255]);
                } else {
                    data.extend_from_slice(&[shade, 255 - shade, 96, 255]);
                }
            }
        }

        Ok(vec![VideoFrame::new(
            data,
            width,
            height,
            PixelFormat::Rgba,
            packet.pts,
            packet.time_base,
        )])
    }

    fn flush(&mut self) -> Result<Vec<VideoFrame>> {
        Ok(Vec::new())
    }

    fn reset(&mut self) {
        self.needs_keyframe = true;
    }
}

/**
    Produces a continuous sine tone, phase-locked to the packet timestamps.
*/
struct ToneDecoder {
    audio: SyntheticAudio,
}

impl Decoder for ToneDecoder {
    type Frame = AudioFrame;

    fn decode(&mut self, packet: &Packet) -> Result<Vec<AudioFrame>> {
        let samples = match packet.data.split_first() {
            Some((&AUDIO_TAG, rest)) if rest.len() == 4 => {
                let mut bytes = [0u8; 4];
                bytes.copy_from_slice(rest);
                u32::from_le_bytes(bytes) as usize
            }
            _ => return Err(Error::codec("invalid audio bitstream")),
        };
        if samples == 0 {
            return Ok(Vec::new());
        }

        let SyntheticAudio {
            sample_rate,
            channels,
        } = self.audio;
        let first = packet.pts.map(|p| p.0).unwrap_or(0).max(0) as u64;
        let mut interleaved = Vec::with_capacity(samples * channels as usize);
        for i in 0..samples as u64 {
            let t = (first + i) as f32 / sample_rate as f32;
            let value = (t * TONE_HZ * TAU).sin() * 0.2;
            for _ in 0..channels {
                interleaved.push(value);
            }
        }

        Ok(vec![AudioFrame::new(
            bytemuck::cast_slice::<f32, u8>(&interleaved).to_vec(),
            samples,
            sample_rate,
            channels,
            SampleFormat::F32,
            packet.pts,
            packet.time_base,
        )])
    }

    fn flush(&mut self) -> Result<Vec<AudioFrame>> {
        Ok(Vec::new())
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(media: SyntheticMedia) -> Box<dyn Demuxer> {
        SyntheticBackend::new(media)
            .open(Path::new("synthetic.mp4"))
            .unwrap()
    }

    fn drain(demuxer: &mut dyn Demuxer) -> Vec<Packet> {
        let mut packets = Vec::new();
        while let Some(packet) = demuxer.read_packet().unwrap() {
            packets.push(packet);
        }
        packets
    }

    #[test]
    fn reports_stream_info() {
        let demuxer = open(SyntheticMedia::new(Duration::from_secs(2)));
        let info = demuxer.info();
        assert_eq!(info.duration, Duration::from_secs(2));
        assert_eq!(info.video.as_ref().map(|v| (v.width, v.height)), Some((64, 36)));
        assert_eq!(info.audio.as_ref().map(|a| a.sample_rate), Some(48000));
    }

    #[test]
    fn packets_are_interleaved_and_monotonic_per_stream() {
        let mut demuxer = open(SyntheticMedia::new(Duration::from_secs(1)));
        let packets = drain(demuxer.as_mut());

        let video: Vec<_> = packets.iter().filter(|p| p.is_video()).collect();
        let audio: Vec<_> = packets.iter().filter(|p| p.is_audio()).collect();
        assert_eq!(video.len(), 25);
        assert_eq!(audio.len(), 47);

        for stream in [&video, &audio] {
            for pair in stream.windows(2) {
                assert!(pair[0].pts < pair[1].pts);
            }
        }

        // Neither stream runs far ahead of the other in container order
        let first_audio = packets.iter().position(|p| p.is_audio()).unwrap();
        assert!(first_audio < 3);
    }

    #[test]
    fn open_failure_is_reported() {
        let backend = SyntheticBackend::new(SyntheticMedia::new(Duration::from_secs(1)).failing_open());
        assert!(backend.open(Path::new("broken.mp4")).is_err());
    }

    #[test]
    fn seek_lands_on_keyframe_at_or_before_target() {
        let media = SyntheticMedia::new(Duration::from_secs(10)).with_video(32, 18, 25, 10);
        let mut demuxer = open(media);
        demuxer.seek(Duration::from_millis(5100)).unwrap();

        let first_video = loop {
            let packet = demuxer.read_packet().unwrap().unwrap();
            if packet.is_video() {
                break packet;
            }
        };
        assert!(first_video.is_keyframe);
        let at = first_video.presentation_time().unwrap();
        assert!(at <= Duration::from_millis(5100));
        assert!(at >= Duration::from_millis(4700));
    }

    #[test]
    fn seek_past_end_exhausts_streams() {
        let mut demuxer = open(SyntheticMedia::new(Duration::from_secs(1)).without_video());
        demuxer.seek(Duration::from_secs(5)).unwrap();
        assert!(demuxer.read_packet().unwrap().is_none());
    }

    #[test]
    fn video_decoder_waits_for_keyframe_after_reset() {
        let mut demuxer = open(SyntheticMedia::new(Duration::from_secs(1)).without_audio());
        let mut decoder = demuxer.open_video_decoder().unwrap().unwrap();
        let packets = drain(demuxer.as_mut());

        let frames = decoder.decode(&packets[0]).unwrap();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_complete());

        decoder.reset();
        assert!(decoder.decode(&packets[1]).unwrap().is_empty());
    }

    #[test]
    fn corrupt_packets_fail_to_decode() {
        let media = SyntheticMedia::new(Duration::from_secs(1))
            .without_video()
            .with_corrupt_packets(StreamType::Audio, [1]);
        let mut demuxer = open(media);
        let mut decoder = demuxer.open_audio_decoder().unwrap().unwrap();
        let packets = drain(demuxer.as_mut());

        assert!(decoder.decode(&packets[0]).is_ok());
        assert!(decoder.decode(&packets[1]).is_err());
        assert!(decoder.decode(&packets[2]).is_ok());
    }

    #[test]
    fn tone_frames_match_packet_timing() {
        let mut demuxer = open(SyntheticMedia::new(Duration::from_secs(1)).without_video());
        let mut decoder = demuxer.open_audio_decoder().unwrap().unwrap();
        let packets = drain(demuxer.as_mut());
        let frame = decoder.decode(&packets[1]).unwrap().remove(0);

        assert_eq!(frame.samples, 1024);
        assert_eq!(frame.channels, 2);
        assert_eq!(frame.data.len(), frame.expected_data_len());
        assert_eq!(frame.presentation_time(), packets[1].presentation_time());

        // Last packet holds the remainder
        let last = packets.last().unwrap();
        assert_eq!(last.duration, MediaDuration(48000 - 46 * 1024));
    }
}
