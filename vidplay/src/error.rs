use media_types::{PixelFormat, StreamType};
use thiserror::Error;

/**
    Failures of an output device (audio device or render surface).

    These never end a session: the affected stream degrades to silent or
    blank output while the other keeps playing.
*/
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("no audio output device available")]
    NoDevice,
    #[error("unsupported output configuration: {0}")]
    Unsupported(String),
    #[error("audio stream error: {0}")]
    Stream(String),
    #[error("audio device stopped accepting samples")]
    Stalled,
    #[error("render surface error: {0}")]
    Surface(String),
}

/**
    Failures writing a [`SnapshotSurface`](crate::SnapshotSurface) frame to disk.
*/
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("cannot save {0:?} frames")]
    Format(PixelFormat),
    #[error("frame data does not match its {width}x{height} size")]
    Size { width: u32, height: u32 },
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

/**
    Errors surfaced by the player's control calls.

    Source and decode errors are fatal to the current session and force
    the transport into `End`. Commands that are not valid in the current
    state are ignored rather than reported.
*/
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlayerError {
    /// The file could not be opened, parsed or read.
    #[error("source error: {0}")]
    Source(String),
    /// A stream kept failing to decode.
    #[error("{} decode error: {message}", .stream.name())]
    Decode { stream: StreamType, message: String },
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("no data source set")]
    NoSource,
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("{0} thread panicked")]
    WorkerPanicked(&'static str),
}

impl PlayerError {
    pub fn decode(stream: StreamType, message: impl Into<String>) -> Self {
        Self::Decode {
            stream,
            message: message.into(),
        }
    }

    /**
        Returns true if this error ends the playback session.
    */
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Device(_) | Self::NoSource | Self::Config(_))
    }
}

impl From<media_types::Error> for PlayerError {
    fn from(e: media_types::Error) -> Self {
        Self::Source(e.to_string())
    }
}

pub type Result<T, E = PlayerError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_error_names_the_stream() {
        let e = PlayerError::decode(StreamType::Video, "9 consecutive failures");
        assert_eq!(e.to_string(), "video decode error: 9 consecutive failures");
        assert!(e.is_fatal());
    }

    #[test]
    fn device_errors_are_not_fatal() {
        let e: PlayerError = DeviceError::NoDevice.into();
        assert_eq!(e.to_string(), "no audio output device available");
        assert!(!e.is_fatal());
    }

    #[test]
    fn snapshot_errors_describe_the_frame() {
        assert_eq!(
            SnapshotError::Format(PixelFormat::Yuv420p).to_string(),
            "cannot save Yuv420p frames"
        );
        assert_eq!(
            SnapshotError::Size { width: 4, height: 2 }.to_string(),
            "frame data does not match its 4x2 size"
        );
    }

    #[test]
    fn codec_errors_become_source_errors() {
        let e: PlayerError = media_types::Error::invalid_data("corrupt header").into();
        assert_eq!(e, PlayerError::Source("invalid data: corrupt header".into()));
    }
}
