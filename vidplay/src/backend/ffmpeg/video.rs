use ffmpeg_next::{
    codec::{self, decoder::Video as FfmpegDecoder},
    format::Pixel,
    software::scaling::{self, flag::Flags},
    util::frame::video::Video as FfmpegFrame,
};

use media_types::{PixelFormat, Pts, Rational, Result, VideoFrame};

use super::{codec_error, is_again, packet_to_ffmpeg};
use crate::backend::Decoder;

/**
    Scaler context that may move to the video decode thread.

    SAFETY: an `SwsContext` has no thread affinity. It is only ever used
    through `&mut self` on whichever thread currently owns the decoder, so
    it is never touched from two threads at once.
*/
struct Scaler {
    context: scaling::Context,
    input: (Pixel, u32, u32),
}

unsafe impl Send for Scaler {}

/**
    Video decoder producing tightly packed RGBA frames.
*/
pub(super) struct FfmpegVideoDecoder {
    decoder: FfmpegDecoder,
    scaler: Option<Scaler>,
    time_base: Rational,
}

impl FfmpegVideoDecoder {
    pub fn new(parameters: codec::Parameters, time_base: Rational) -> Result<Self> {
        let decoder = codec::context::Context::from_parameters(parameters)
            .and_then(|ctx| ctx.decoder().video())
            .map_err(codec_error)?;
        Ok(Self {
            decoder,
            scaler: None,
            time_base,
        })
    }

    fn receive_frames(&mut self) -> Result<Vec<VideoFrame>> {
        let mut frames = Vec::new();
        let mut decoded = FfmpegFrame::empty();

        loop {
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => frames.push(self.convert_frame(&decoded)?),
                Err(ffmpeg_next::Error::Eof) => break,
                Err(e) if is_again(&e) => break,
                Err(e) => return Err(codec_error(e)),
            }
        }

        Ok(frames)
    }

    fn convert_frame(&mut self, frame: &FfmpegFrame) -> Result<VideoFrame> {
        let (width, height) = (frame.width(), frame.height());
        let input = (frame.format(), width, height);

        // Streams may change resolution mid-way; rebuild the scaler if so
        let stale = self.scaler.as_ref().is_none_or(|s| s.input != input);
        if stale {
            let context = scaling::Context::get(
                frame.format(),
                width,
                height,
                Pixel::RGBA,
                width,
                height,
                Flags::BILINEAR,
            )
            .map_err(codec_error)?;
            self.scaler = Some(Scaler { context, input });
        }

        let mut rgba = FfmpegFrame::empty();
        if let Some(scaler) = self.scaler.as_mut() {
            scaler.context.run(frame, &mut rgba).map_err(codec_error)?;
        }

        // Strip row padding
        let row = width as usize * 4;
        let stride = rgba.stride(0);
        let plane = rgba.data(0);
        let mut data = Vec::with_capacity(PixelFormat::Rgba.frame_size(width, height));
        for y in 0..height as usize {
            data.extend_from_slice(&plane[y * stride..y * stride + row]);
        }

        Ok(VideoFrame::new(
            data,
            width,
            height,
            PixelFormat::Rgba,
            frame.timestamp().or(frame.pts()).map(Pts),
            self.time_base,
        ))
    }
}

impl Decoder for FfmpegVideoDecoder {
    type Frame = VideoFrame;

    fn decode(&mut self, packet: &media_types::Packet) -> Result<Vec<VideoFrame>> {
        self.decoder
            .send_packet(&packet_to_ffmpeg(packet))
            .map_err(codec_error)?;
        self.receive_frames()
    }

    fn flush(&mut self) -> Result<Vec<VideoFrame>> {
        self.decoder.send_eof().map_err(codec_error)?;
        self.receive_frames()
    }

    fn reset(&mut self) {
        self.decoder.flush();
    }
}
