/*!
    The boundary between the playback engine and the codec library.

    The engine never parses containers or bitstreams itself. It opens a
    [`Demuxer`] through a [`MediaBackend`], pulls packets from it on the
    demux thread, and hands them to the [`Decoder`]s the demuxer creates.
*/

use std::path::Path;
use std::time::Duration;

use media_types::{AudioFrame, MediaInfo, Packet, Result, VideoFrame};

#[cfg(feature = "ffmpeg")]
mod ffmpeg;
mod synthetic;

#[cfg(feature = "ffmpeg")]
pub use ffmpeg::{FfmpegBackend, ffmpeg_version};
pub use synthetic::{SyntheticBackend, SyntheticMedia};

/**
    Something that can open media files.
*/
pub trait MediaBackend: Send + Sync {
    /**
        Open the container at `path` and read its stream parameters.

        Fails if the file is unreadable, the container is unsupported, or
        its header is corrupt.
    */
    fn open(&self, path: &Path) -> Result<Box<dyn Demuxer>>;
}

/**
    An opened container, read sequentially by the demux thread.
*/
pub trait Demuxer: Send {
    fn info(&self) -> &MediaInfo;

    /**
        Read the next packet of either stream, in container order.

        Returns `Ok(None)` at the end of the file.
    */
    fn read_packet(&mut self) -> Result<Option<Packet>>;

    /**
        Reposition so that the next packets read start at or before
        `position`, on a point every decoder can start from.
    */
    fn seek(&mut self, position: Duration) -> Result<()>;

    /**
        Create a decoder for the video stream, if there is one.
    */
    fn open_video_decoder(&mut self) -> Result<Option<VideoDecoder>>;

    /**
        Create a decoder for the audio stream, if there is one.
    */
    fn open_audio_decoder(&mut self) -> Result<Option<AudioDecoder>>;
}

/**
    Turns compressed packets of one stream into decoded frames.
*/
pub trait Decoder: Send {
    type Frame;

    /**
        Decode a packet. May return zero, one or several frames.
    */
    fn decode(&mut self, packet: &Packet) -> Result<Vec<Self::Frame>>;

    /**
        Drain frames still buffered inside the codec at end of stream.
    */
    fn flush(&mut self) -> Result<Vec<Self::Frame>>;

    /**
        Forget all buffered state, after a seek.
    */
    fn reset(&mut self);
}

pub type VideoDecoder = Box<dyn Decoder<Frame = VideoFrame>>;
pub type AudioDecoder = Box<dyn Decoder<Frame = AudioFrame>>;
