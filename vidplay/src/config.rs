/*!
    Player configuration.
*/

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PlayerError, Result};

/**
    What the video decode stage does when its output queue is full.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Block the decode thread until the sink makes room.
    #[default]
    Block,
    /// Discard the oldest unread frame to make room.
    DropOldest,
}

/**
    Tunables for the playback pipeline.

    Every field has a default, so a JSON file only needs to name the
    values it changes.
*/
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Compressed video packets buffered between demux and decode.
    pub video_packet_capacity: usize,
    /// Compressed audio packets buffered between demux and decode.
    pub audio_packet_capacity: usize,
    /// Decoded video frames buffered ahead of the video sink.
    pub video_frame_capacity: usize,
    /// Decoded audio batches buffered ahead of the audio sink.
    pub audio_frame_capacity: usize,
    pub video_overflow: OverflowPolicy,
    /// Frames due within this many milliseconds are presented right away.
    pub sync_epsilon_ms: u64,
    /// Frames later than this many milliseconds are dropped.
    pub drop_threshold_ms: u64,
    /// Decode failures in a row before a stream is declared broken.
    pub max_consecutive_decode_errors: u32,
    /// Audio queued in the output device, in milliseconds.
    pub audio_buffer_ms: u64,
    /// Initial volume, 0.0 to 1.0.
    pub volume: f32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            video_packet_capacity: 120,
            audio_packet_capacity: 240,
            video_frame_capacity: 16,
            audio_frame_capacity: 32,
            video_overflow: OverflowPolicy::Block,
            sync_epsilon_ms: 10,
            drop_threshold_ms: 100,
            max_consecutive_decode_errors: 8,
            audio_buffer_ms: 100,
            volume: 1.0,
        }
    }
}

impl PlayerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /**
        Load a configuration from a JSON file.
    */
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| PlayerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&contents)
    }

    /**
        Parse and validate a configuration from JSON text.
    */
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| PlayerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /**
        Check that every value is usable.
    */
    pub fn validate(&self) -> Result<()> {
        let capacities = [
            ("video_packet_capacity", self.video_packet_capacity),
            ("audio_packet_capacity", self.audio_packet_capacity),
            ("video_frame_capacity", self.video_frame_capacity),
            ("audio_frame_capacity", self.audio_frame_capacity),
        ];
        for (name, value) in capacities {
            if value == 0 {
                return Err(PlayerError::Config(format!("{name} must be at least 1")));
            }
        }
        if self.drop_threshold_ms <= self.sync_epsilon_ms {
            return Err(PlayerError::Config(
                "drop_threshold_ms must be larger than sync_epsilon_ms".into(),
            ));
        }
        if self.max_consecutive_decode_errors == 0 {
            return Err(PlayerError::Config(
                "max_consecutive_decode_errors must be at least 1".into(),
            ));
        }
        if self.audio_buffer_ms == 0 {
            return Err(PlayerError::Config("audio_buffer_ms must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(PlayerError::Config("volume must be within 0.0..=1.0".into()));
        }
        Ok(())
    }

    pub fn sync_epsilon(&self) -> Duration {
        Duration::from_millis(self.sync_epsilon_ms)
    }

    pub fn drop_threshold(&self) -> Duration {
        Duration::from_millis(self.drop_threshold_ms)
    }

    pub fn audio_buffer(&self) -> Duration {
        Duration::from_millis(self.audio_buffer_ms)
    }

    pub fn with_packet_capacity(mut self, video: usize, audio: usize) -> Self {
        self.video_packet_capacity = video;
        self.audio_packet_capacity = audio;
        self
    }

    pub fn with_frame_capacity(mut self, video: usize, audio: usize) -> Self {
        self.video_frame_capacity = video;
        self.audio_frame_capacity = audio;
        self
    }

    pub fn with_video_overflow(mut self, policy: OverflowPolicy) -> Self {
        self.video_overflow = policy;
        self
    }

    pub fn with_sync_window(mut self, epsilon_ms: u64, drop_threshold_ms: u64) -> Self {
        self.sync_epsilon_ms = epsilon_ms;
        self.drop_threshold_ms = drop_threshold_ms;
        self
    }

    pub fn with_max_decode_errors(mut self, count: u32) -> Self {
        self.max_consecutive_decode_errors = count;
        self
    }

    pub fn with_audio_buffer_ms(mut self, ms: u64) -> Self {
        self.audio_buffer_ms = ms;
        self
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }
}
