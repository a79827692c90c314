/*!
    Errors reported across the codec boundary.
*/

use thiserror::Error;

/**
    Error raised by a demuxer or decoder.
*/
#[derive(Debug, Error)]
pub enum Error {
    /// I/O failure while reading the container.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Decoder rejected the input or failed internally.
    #[error("codec error: {message}")]
    Codec { message: String },
    /// Malformed container or packet data.
    #[error("invalid data: {message}")]
    InvalidData { message: String },
    /// Valid media that this engine cannot handle.
    #[error("unsupported format: {message}")]
    UnsupportedFormat { message: String },
    /// End of stream.
    #[error("end of stream")]
    Eof,
}

impl Error {
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    pub fn unsupported_format(message: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            message: message.into(),
        }
    }

    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Eof)
    }
}

/**
    Result alias for codec boundary operations.
*/
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn display_messages() {
        assert_eq!(
            Error::codec("bad bitstream").to_string(),
            "codec error: bad bitstream"
        );
        assert_eq!(
            Error::invalid_data("truncated header").to_string(),
            "invalid data: truncated header"
        );
        assert_eq!(
            Error::unsupported_format("no streams").to_string(),
            "unsupported format: no streams"
        );
        assert_eq!(Error::Eof.to_string(), "end of stream");
    }

    #[test]
    fn io_errors_keep_their_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.mp4");
        let e: Error = io.into();
        assert!(e.to_string().contains("missing.mp4"));
        assert!(StdError::source(&e).is_some());
        assert!(!e.is_eof());
    }
}
