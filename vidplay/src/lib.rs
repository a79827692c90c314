/*!
    A threaded audio/video playback engine.

    A [`Player`] opens a media file through a [`MediaBackend`], then runs a
    small pipeline of threads for it:

    - a demux thread reading packets from the container,
    - one decode thread per stream turning packets into frames,
    - an audio sink writing samples to an [`AudioDevice`] and advancing the
      master clock as it does,
    - a video sink releasing frames to a [`RenderSurface`] when the clock
      reaches them.

    All threads talk through bounded queues, so memory stays bounded and a
    slow consumer applies backpressure all the way up to the demuxer.

    # Backends

    - [`SyntheticBackend`] - a generated test pattern and tone, always available
    - `FfmpegBackend` - real files through the system FFmpeg libraries
      (cargo feature `ffmpeg`)

    # Audio outputs

    - [`NullOutput`] - silent, real-time paced output
    - `CpalOutput` - the default system device (cargo feature `cpal`)
*/

mod atomic;
mod config;
mod decode;
mod error;
mod pipeline;
mod player;
mod queue;
mod source;
mod sync;

pub mod audio;
pub mod backend;
pub mod video;

pub use media_types;

pub use audio::{AudioDevice, AudioOutput, NullOutput};
pub use backend::{Decoder, Demuxer, MediaBackend, SyntheticBackend, SyntheticMedia};
pub use config::{OverflowPolicy, PlayerConfig};
pub use error::{DeviceError, PlayerError, Result, SnapshotError};
pub use pipeline::PlaybackStats;
pub use player::{PlaybackState, Player};
pub use queue::{BoundedQueue, Pop, PushError};
pub use sync::{FrameAction, MasterClock, SyncController, schedule};
pub use video::{RenderSurface, SnapshotSurface};

#[cfg(feature = "ffmpeg")]
pub use backend::{FfmpegBackend, ffmpeg_version};

#[cfg(feature = "cpal")]
pub use audio::CpalOutput;
