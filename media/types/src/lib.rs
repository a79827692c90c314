/*!
    Shared types for the vidplay playback engine.

    This crate holds the vocabulary that crosses component boundaries: the
    demuxer hands out [`Packet`]s, decoders turn them into [`VideoFrame`]s and
    [`AudioFrame`]s, and the sinks pace those frames against a [`Clock`].
    It has no dependency on FFmpeg, so codec adapters and test sources can
    both speak it without pulling in native bindings.

    # Timing

    - [`Rational`] - time bases and frame rates
    - [`Pts`] and [`MediaDuration`] - timestamps in time_base units

    # Data

    - [`Packet`] and [`StreamType`] - compressed stream data
    - [`VideoFrame`] and [`AudioFrame`] - decoded, presentable units
    - [`PixelFormat`] and [`SampleFormat`] - raw data layouts

    # Stream Information

    - [`VideoStreamInfo`], [`AudioStreamInfo`] and [`MediaInfo`]

    # Clocks

    - [`Clock`] - the master clock every sink paces against
    - [`AudioClock`] - synced by the audio sink to what the device is playing
    - [`WallClock`] - wall-time clock for media without an audio stream

    # Errors

    - [`Error`] and [`Result`] - failures reported by codec adapters
*/

mod clock;
mod error;
mod format;
mod frame;
mod packet;
mod rational;
mod stream;
mod timestamp;

pub use clock::{AudioClock, Clock, WallClock};
pub use error::{Error, Result};
pub use format::{PixelFormat, SampleFormat};
pub use frame::{AudioFrame, VideoFrame};
pub use packet::{Packet, StreamType};
pub use rational::Rational;
pub use stream::{AudioStreamInfo, MediaInfo, VideoStreamInfo};
pub use timestamp::{MediaDuration, Pts};
