use std::path::Path;
use std::time::Duration;

use ffmpeg_next::{codec, format, media};

use media_types::{
    AudioStreamInfo, Error, MediaDuration, MediaInfo, Packet, Pts, Rational, Result, StreamType,
    VideoStreamInfo,
};

use super::audio::FfmpegAudioDecoder;
use super::video::FfmpegVideoDecoder;
use super::{codec_error, rational_from_ffmpeg};
use crate::backend::{AudioDecoder, Demuxer, VideoDecoder};

struct StreamSlot {
    index: usize,
    time_base: Rational,
}

/**
    A container opened through libavformat.

    Only the best video and the best audio stream are read; packets of any
    other stream are skipped.
*/
pub(super) struct FfmpegDemuxer {
    input: format::context::Input,
    info: MediaInfo,
    video: Option<StreamSlot>,
    audio: Option<StreamSlot>,
}

impl FfmpegDemuxer {
    pub fn open(path: &Path) -> Result<Self> {
        let input = format::input(&path)
            .map_err(|e| Error::invalid_data(format!("{}: {e}", path.display())))?;

        let duration = if input.duration() > 0 {
            Duration::from_micros(input.duration() as u64)
        } else {
            Duration::ZERO
        };

        let mut info = MediaInfo {
            duration,
            video: None,
            audio: None,
        };
        let mut video = None;
        let mut audio = None;

        if let Some(stream) = input.streams().best(media::Type::Video) {
            let time_base = rational_from_ffmpeg(stream.time_base());
            let codec_name = stream.parameters().id().name().to_string();
            let decoder = codec::context::Context::from_parameters(stream.parameters())
                .and_then(|ctx| ctx.decoder().video())
                .map_err(codec_error)?;
            let frame_rate = rational_from_ffmpeg(stream.avg_frame_rate());

            info.video = Some(VideoStreamInfo {
                width: decoder.width(),
                height: decoder.height(),
                codec: codec_name,
                frame_rate: frame_rate.is_positive().then_some(frame_rate),
                time_base,
            });
            video = Some(StreamSlot {
                index: stream.index(),
                time_base,
            });
        }

        if let Some(stream) = input.streams().best(media::Type::Audio) {
            let time_base = rational_from_ffmpeg(stream.time_base());
            let codec_name = stream.parameters().id().name().to_string();
            let decoder = codec::context::Context::from_parameters(stream.parameters())
                .and_then(|ctx| ctx.decoder().audio())
                .map_err(codec_error)?;

            info.audio = Some(AudioStreamInfo {
                sample_rate: decoder.rate(),
                channels: decoder.channels() as u16,
                codec: codec_name,
                time_base,
            });
            audio = Some(StreamSlot {
                index: stream.index(),
                time_base,
            });
        }

        tracing::debug!(
            path = %path.display(),
            format = input.format().name(),
            ?info,
            "opened container"
        );

        Ok(Self {
            input,
            info,
            video,
            audio,
        })
    }

    fn classify(&self, index: usize) -> Option<(StreamType, Rational)> {
        match (&self.video, &self.audio) {
            (Some(v), _) if v.index == index => Some((StreamType::Video, v.time_base)),
            (_, Some(a)) if a.index == index => Some((StreamType::Audio, a.time_base)),
            _ => None,
        }
    }

    fn parameters(&self, slot: &Option<StreamSlot>) -> Option<codec::Parameters> {
        let slot = slot.as_ref()?;
        self.input.stream(slot.index).map(|s| s.parameters())
    }
}

impl Demuxer for FfmpegDemuxer {
    fn info(&self) -> &MediaInfo {
        &self.info
    }

    fn read_packet(&mut self) -> Result<Option<Packet>> {
        loop {
            let mut raw = ffmpeg_next::Packet::empty();
            match raw.read(&mut self.input) {
                Ok(()) => {}
                Err(ffmpeg_next::Error::Eof) => return Ok(None),
                Err(e) => return Err(Error::invalid_data(e.to_string())),
            }

            let Some((stream_type, time_base)) = self.classify(raw.stream()) else {
                continue;
            };

            let mut packet = Packet::new(
                raw.data().map(<[u8]>::to_vec).unwrap_or_default(),
                stream_type,
                time_base,
            )
            .with_duration(MediaDuration(raw.duration()))
            .with_keyframe(raw.is_key());
            packet.pts = raw.pts().map(Pts);
            packet.dts = raw.dts().map(Pts);
            return Ok(Some(packet));
        }
    }

    fn seek(&mut self, position: Duration) -> Result<()> {
        // Container-level timestamps are in AV_TIME_BASE (microseconds)
        let ts = i64::try_from(position.as_micros()).unwrap_or(i64::MAX);
        self.input.seek(ts, ..ts).map_err(codec_error)
    }

    fn open_video_decoder(&mut self) -> Result<Option<VideoDecoder>> {
        let Some(parameters) = self.parameters(&self.video) else {
            return Ok(None);
        };
        let time_base = self.info.video.as_ref().map(|v| v.time_base);
        let decoder = FfmpegVideoDecoder::new(parameters, time_base.unwrap_or(Rational::new(1, 1)))?;
        Ok(Some(Box::new(decoder)))
    }

    fn open_audio_decoder(&mut self) -> Result<Option<AudioDecoder>> {
        let Some(parameters) = self.parameters(&self.audio) else {
            return Ok(None);
        };
        let time_base = self.info.audio.as_ref().map(|a| a.time_base);
        let decoder = FfmpegAudioDecoder::new(parameters, time_base.unwrap_or(Rational::new(1, 1)))?;
        Ok(Some(Box::new(decoder)))
    }
}
