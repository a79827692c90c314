/*!
    Decoded frame types.
*/

use std::time::Duration;

use crate::{PixelFormat, Pts, Rational, SampleFormat};

/**
    A decoded video frame.

    Ownership moves from the decode stage into the frame queue and from
    there into the video sink, which drops the frame right after presenting
    (or skipping) it.
*/
#[derive(Clone, Debug, PartialEq)]
pub struct VideoFrame {
    /// Pixel data, tightly packed.
    pub data: Vec<u8>,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Layout of `data`.
    pub format: PixelFormat,
    /// Presentation timestamp (None if the codec did not report one).
    pub pts: Option<Pts>,
    /// Time base for interpreting the PTS.
    pub time_base: Rational,
}

impl VideoFrame {
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
        pts: Option<Pts>,
        time_base: Rational,
    ) -> Self {
        Self {
            data,
            width,
            height,
            format,
            pts,
            time_base,
        }
    }

    /**
        Returns the presentation time as a Duration, if PTS is set.
    */
    pub fn presentation_time(&self) -> Option<Duration> {
        self.pts.map(|pts| pts.to_duration(self.time_base))
    }

    /**
        Returns true if `data` holds exactly one frame of `format`.
    */
    pub fn is_complete(&self) -> bool {
        self.data.len() == self.format.frame_size(self.width, self.height)
    }
}

/**
    A decoded batch of audio samples.

    Samples are interleaved: for stereo, `[L0, R0, L1, R1, ...]`.
*/
#[derive(Clone, Debug)]
pub struct AudioFrame {
    /// Raw sample bytes, interpreted according to `format`.
    pub data: Vec<u8>,
    /// Number of samples per channel.
    pub samples: usize,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
    /// Sample format.
    pub format: SampleFormat,
    /// Presentation timestamp (None if the codec did not report one).
    pub pts: Option<Pts>,
    /// Time base for interpreting the PTS.
    pub time_base: Rational,
}

impl AudioFrame {
    pub fn new(
        data: Vec<u8>,
        samples: usize,
        sample_rate: u32,
        channels: u16,
        format: SampleFormat,
        pts: Option<Pts>,
        time_base: Rational,
    ) -> Self {
        Self {
            data,
            samples,
            sample_rate,
            channels,
            format,
            pts,
            time_base,
        }
    }

    /**
        Returns the presentation time as a Duration, if PTS is set.
    */
    pub fn presentation_time(&self) -> Option<Duration> {
        self.pts.map(|pts| pts.to_duration(self.time_base))
    }

    /**
        Playback length of this batch at its own sample rate.
    */
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples as f64 / self.sample_rate as f64)
    }

    /**
        Presentation time of the first sample after this batch.
    */
    pub fn end_time(&self) -> Option<Duration> {
        self.presentation_time().map(|start| start + self.duration())
    }

    /**
        Total number of samples across all channels.
    */
    pub fn total_samples(&self) -> usize {
        self.samples * self.channels as usize
    }

    /**
        Expected length of `data` in bytes.
    */
    pub fn expected_data_len(&self) -> usize {
        self.total_samples() * self.format.bytes_per_sample()
    }
}

static_assertions::assert_impl_all!(VideoFrame: Send, Sync);
static_assertions::assert_impl_all!(AudioFrame: Send, Sync);
