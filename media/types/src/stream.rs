/*!
    Container and stream metadata.
*/

use std::time::Duration;

use crate::Rational;

/**
    Parameters of the video stream.
*/
#[derive(Clone, Debug, PartialEq)]
pub struct VideoStreamInfo {
    /// Width in pixels, always > 0.
    pub width: u32,
    /// Height in pixels, always > 0.
    pub height: u32,
    /// Codec name as reported by the codec library (e.g. "h264").
    pub codec: String,
    /// Nominal frame rate, if the container declares one.
    pub frame_rate: Option<Rational>,
    /// Time base of the stream's timestamps.
    pub time_base: Rational,
}

/**
    Parameters of the audio stream.
*/
#[derive(Clone, Debug, PartialEq)]
pub struct AudioStreamInfo {
    /// Sample rate in Hz, always > 0.
    pub sample_rate: u32,
    /// Channel count, always >= 1.
    pub channels: u16,
    /// Codec name as reported by the codec library (e.g. "aac").
    pub codec: String,
    /// Time base of the stream's timestamps.
    pub time_base: Rational,
}

/**
    Immutable snapshot of an opened media file.

    Produced once when playback starts. Either stream may be missing; a
    file with neither is rejected when it is opened.
*/
#[derive(Clone, Debug, PartialEq)]
pub struct MediaInfo {
    /// Container duration (zero if unknown).
    pub duration: Duration,
    pub video: Option<VideoStreamInfo>,
    pub audio: Option<AudioStreamInfo>,
}

impl MediaInfo {
    pub fn has_video(&self) -> bool {
        self.video.is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    /**
        Duration in seconds.
    */
    pub fn duration_secs(&self) -> f64 {
        self.duration.as_secs_f64()
    }

    /**
        Width divided by height of the video stream.
    */
    pub fn aspect_ratio(&self) -> Option<f32> {
        let video = self.video.as_ref()?;
        if video.height == 0 {
            return None;
        }
        Some(video.width as f32 / video.height as f32)
    }

    /**
        Size to lay the video out at when it has to fill `max_width`
        pixels horizontally, keeping the aspect ratio.
    */
    pub fn display_size(&self, max_width: u32) -> Option<(u32, u32)> {
        let ratio = self.aspect_ratio()?;
        let height = (max_width as f32 / ratio).round() as u32;
        Some((max_width, height.max(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(width: u32, height: u32) -> MediaInfo {
        MediaInfo {
            duration: Duration::from_secs(10),
            video: Some(VideoStreamInfo {
                width,
                height,
                codec: "h264".into(),
                frame_rate: Some(Rational::new(25, 1)),
                time_base: Rational::new(1, 90000),
            }),
            audio: None,
        }
    }

    #[test]
    fn stream_presence() {
        let info = info(1920, 1080);
        assert!(info.has_video());
        assert!(!info.has_audio());
        assert_eq!(info.duration_secs(), 10.0);
    }

    #[test]
    fn display_size_keeps_aspect() {
        assert_eq!(info(1920, 1080).display_size(1280), Some((1280, 720)));
        assert_eq!(info(1080, 1920).display_size(720), Some((720, 1280)));
    }

    #[test]
    fn audio_only_has_no_display_size() {
        let info = MediaInfo {
            duration: Duration::ZERO,
            video: None,
            audio: Some(AudioStreamInfo {
                sample_rate: 44100,
                channels: 2,
                codec: "mp3".into(),
                time_base: Rational::new(1, 44100),
            }),
        };
        assert_eq!(info.aspect_ratio(), None);
        assert_eq!(info.display_size(100), None);
    }
}
