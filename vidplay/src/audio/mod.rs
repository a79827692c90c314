/*!
    Audio output: device abstraction, sample conversion and the audio sink.
*/

mod convert;
mod device;
mod sink;

#[cfg(feature = "cpal")]
mod host;

pub use convert::{Resampler, apply_volume, remix, to_f32};
pub use device::{AudioDevice, AudioOutput, NullOutput};

#[cfg(feature = "cpal")]
pub use host::CpalOutput;

pub(crate) use sink::AudioSink;
