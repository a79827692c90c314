/*!
    Compressed packets handed from the demuxer to the decoders.
*/

use std::time::Duration;

use crate::{MediaDuration, Pts, Rational};

/**
    Kind of elementary stream a packet or frame belongs to.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamType {
    Video,
    Audio,
}

impl StreamType {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }
}

/**
    A chunk of compressed data from one stream.

    Timestamps are monotonic within a stream. The packet is owned by the
    demuxer until it is queued, and by the matching decode stage after that.
*/
#[derive(Clone, Debug)]
pub struct Packet {
    /// Compressed payload.
    pub data: Vec<u8>,
    /// Presentation timestamp.
    pub pts: Option<Pts>,
    /// Decode timestamp (differs from PTS when frames are reordered).
    pub dts: Option<Pts>,
    /// Duration of the packet's content.
    pub duration: MediaDuration,
    /// Time base of the stream this packet came from.
    pub time_base: Rational,
    /// Whether the packet starts an independently decodable unit.
    pub is_keyframe: bool,
    /// Stream this packet belongs to.
    pub stream_type: StreamType,
}

impl Packet {
    pub fn new(data: Vec<u8>, stream_type: StreamType, time_base: Rational) -> Self {
        Self {
            data,
            pts: None,
            dts: None,
            duration: MediaDuration(0),
            time_base,
            is_keyframe: false,
            stream_type,
        }
    }

    pub fn with_pts(mut self, pts: Pts) -> Self {
        self.pts = Some(pts);
        self
    }

    pub fn with_dts(mut self, dts: Pts) -> Self {
        self.dts = Some(dts);
        self
    }

    pub fn with_duration(mut self, duration: MediaDuration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_keyframe(mut self, is_keyframe: bool) -> Self {
        self.is_keyframe = is_keyframe;
        self
    }

    /**
        Payload size in bytes.
    */
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /**
        Presentation time as a Duration, if the packet has a PTS.
    */
    pub fn presentation_time(&self) -> Option<Duration> {
        self.pts.map(|pts| pts.to_duration(self.time_base))
    }

    pub fn is_video(&self) -> bool {
        self.stream_type == StreamType::Video
    }

    pub fn is_audio(&self) -> bool {
        self.stream_type == StreamType::Audio
    }
}

static_assertions::assert_impl_all!(Packet: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    const TB_MS: Rational = Rational { num: 1, den: 1000 };

    #[test]
    fn builder_sets_timing() {
        let packet = Packet::new(vec![0; 12], StreamType::Video, TB_MS)
            .with_pts(Pts(1500))
            .with_dts(Pts(1460))
            .with_duration(MediaDuration(40))
            .with_keyframe(true);

        assert_eq!(packet.size(), 12);
        assert!(packet.is_keyframe);
        assert!(packet.is_video());
        assert!(!packet.is_audio());
        assert_eq!(
            packet.presentation_time(),
            Some(Duration::from_millis(1500))
        );
        assert_eq!(packet.duration.to_duration(TB_MS), Duration::from_millis(40));
    }

    #[test]
    fn missing_pts_has_no_presentation_time() {
        let packet = Packet::new(Vec::new(), StreamType::Audio, TB_MS);
        assert_eq!(packet.presentation_time(), None);
        assert_eq!(StreamType::Audio.name(), "audio");
    }
}
