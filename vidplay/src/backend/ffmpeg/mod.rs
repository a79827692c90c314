/*!
    Codec backend built on the system FFmpeg libraries.

    Container parsing goes through libavformat, decoding through libavcodec.
    Video is converted to RGBA with libswscale; audio keeps its sample format
    but is always handed out interleaved.
*/

use std::path::Path;

use media_types::{Error, Rational, Result};

use super::{Demuxer, MediaBackend};

mod audio;
mod demuxer;
mod video;

use demuxer::FfmpegDemuxer;

/**
    Backend that opens files with libavformat.
*/
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegBackend;

impl FfmpegBackend {
    pub fn new() -> Result<Self> {
        ffmpeg_next::init().map_err(codec_error)?;
        Ok(Self)
    }
}

impl MediaBackend for FfmpegBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn Demuxer>> {
        Ok(Box::new(FfmpegDemuxer::open(path)?))
    }
}

/**
    Versions of the linked libavformat and libavcodec, e.g.
    `"libavformat 61.7.100, libavcodec 61.19.100"`.
*/
pub fn ffmpeg_version() -> String {
    fn split(version: u32) -> String {
        format!(
            "{}.{}.{}",
            version >> 16,
            (version >> 8) & 0xff,
            version & 0xff
        )
    }
    format!(
        "libavformat {}, libavcodec {}",
        split(ffmpeg_next::format::version()),
        split(ffmpeg_next::codec::version())
    )
}

fn codec_error(e: ffmpeg_next::Error) -> Error {
    Error::codec(e.to_string())
}

fn rational_from_ffmpeg(r: ffmpeg_next::Rational) -> Rational {
    if r.denominator() == 0 {
        return Rational { num: 0, den: 1 };
    }
    Rational::new(r.numerator(), r.denominator())
}

/**
    Build an FFmpeg packet carrying the payload and timing of ours.
*/
fn packet_to_ffmpeg(packet: &media_types::Packet) -> ffmpeg_next::Packet {
    let mut out = if packet.data.is_empty() {
        ffmpeg_next::Packet::empty()
    } else {
        ffmpeg_next::Packet::copy(&packet.data)
    };
    out.set_pts(packet.pts.map(|p| p.0));
    out.set_dts(packet.dts.map(|p| p.0));
    out.set_duration(packet.duration.0);
    out
}

/**
    True for the "try again" result of `receive_frame`.
*/
fn is_again(e: &ffmpeg_next::Error) -> bool {
    matches!(e, ffmpeg_next::Error::Other { errno } if *errno == ffmpeg_next::ffi::AVERROR(ffmpeg_next::ffi::EAGAIN))
}
