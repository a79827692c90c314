use ffmpeg_next::{
    codec::{self, decoder::Audio as FfmpegDecoder},
    util::frame::audio::Audio as FfmpegFrame,
};

use media_types::{AudioFrame, Error, Packet, Pts, Rational, Result, SampleFormat};

use super::{codec_error, is_again, packet_to_ffmpeg};
use crate::backend::Decoder;

/**
    Audio decoder producing interleaved sample batches.
*/
pub(super) struct FfmpegAudioDecoder {
    decoder: FfmpegDecoder,
    time_base: Rational,
}

impl FfmpegAudioDecoder {
    pub fn new(parameters: codec::Parameters, time_base: Rational) -> Result<Self> {
        let decoder = codec::context::Context::from_parameters(parameters)
            .and_then(|ctx| ctx.decoder().audio())
            .map_err(codec_error)?;
        Ok(Self { decoder, time_base })
    }

    fn receive_frames(&mut self) -> Result<Vec<AudioFrame>> {
        let mut frames = Vec::new();
        let mut decoded = FfmpegFrame::empty();

        loop {
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => match self.convert_frame(&decoded) {
                    Ok(frame) => frames.push(frame),
                    Err(e) => tracing::warn!("skipping audio frame: {e}"),
                },
                Err(ffmpeg_next::Error::Eof) => break,
                Err(e) if is_again(&e) => break,
                Err(e) => return Err(codec_error(e)),
            }
        }

        Ok(frames)
    }

    fn convert_frame(&self, frame: &FfmpegFrame) -> Result<AudioFrame> {
        let samples = frame.samples();
        let channels = frame.channels() as u16;
        if samples == 0 || channels == 0 {
            return Err(Error::invalid_data("audio frame has no samples"));
        }

        let format = sample_format_from_ffmpeg(frame.format()).ok_or_else(|| {
            Error::unsupported_format(format!("sample format {:?}", frame.format()))
        })?;

        Ok(AudioFrame::new(
            interleave(frame, format, samples, channels),
            samples,
            frame.rate(),
            channels,
            format,
            frame.pts().map(Pts),
            self.time_base,
        ))
    }
}

impl Decoder for FfmpegAudioDecoder {
    type Frame = AudioFrame;

    fn decode(&mut self, packet: &Packet) -> Result<Vec<AudioFrame>> {
        self.decoder
            .send_packet(&packet_to_ffmpeg(packet))
            .map_err(codec_error)?;
        self.receive_frames()
    }

    fn flush(&mut self) -> Result<Vec<AudioFrame>> {
        self.decoder.send_eof().map_err(codec_error)?;
        self.receive_frames()
    }

    fn reset(&mut self) {
        self.decoder.flush();
    }
}

/**
    Copy sample data out of the frame, interleaving planar layouts.
*/
fn interleave(frame: &FfmpegFrame, format: SampleFormat, samples: usize, channels: u16) -> Vec<u8> {
    let width = format.bytes_per_sample();
    let channels = channels as usize;
    let total = samples * channels * width;

    if !frame.is_planar() {
        return frame.data(0)[..total].to_vec();
    }

    let mut out = vec![0u8; total];
    for ch in 0..channels {
        let plane = frame.data(ch);
        for s in 0..samples {
            let src = s * width;
            let dst = (s * channels + ch) * width;
            out[dst..dst + width].copy_from_slice(&plane[src..src + width]);
        }
    }
    out
}

fn sample_format_from_ffmpeg(format: ffmpeg_next::format::Sample) -> Option<SampleFormat> {
    use ffmpeg_next::format::Sample;

    match format {
        Sample::F32(_) => Some(SampleFormat::F32),
        Sample::F64(_) => Some(SampleFormat::F64),
        Sample::I16(_) => Some(SampleFormat::S16),
        Sample::I32(_) => Some(SampleFormat::S32),
        Sample::U8(_) => Some(SampleFormat::U8),
        _ => None,
    }
}
