//! Media frame data model
//!
//! Timestamped payloads produced by capture/encode sources and consumed by
//! the recorder worker.

use crate::format::{AudioEncoding, VideoEncoding};
use std::sync::Arc;

/// Monotonic presentation timestamp, in microsecond ticks.
pub type Timestamp = u64;

/// A span of timeline ticks.
pub type TickDuration = u64;

/// Timeline resolution: timestamps and durations are in microseconds.
pub const TICKS_PER_SECOND: u64 = 1_000_000;

/// Media kind carried by a frame.
///
/// Encoded kinds carry their format so the recorder can match them against
/// the format a session was negotiated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    RawVideo,
    EncodedVideo(VideoEncoding),
    RawAudio,
    EncodedAudio(AudioEncoding),
    Other,
}

/// A single captured or encoded media frame.
///
/// Frames are shared between the producing source and the recorder as
/// `Arc<MediaFrame>`. Every ingestion branch consumes the recorder's
/// reference by value, so exactly one release happens per dequeued frame,
/// and the payload is freed when the last holder drops.
#[derive(Debug, Clone)]
pub struct MediaFrame {
    /// What kind of media the payload holds
    pub kind: FrameKind,

    /// Presentation timestamp in timeline ticks
    pub timestamp: Timestamp,

    /// Presentation duration in timeline ticks
    pub duration: TickDuration,

    /// Raw sample bytes
    pub payload: Vec<u8>,
}

impl MediaFrame {
    /// Create a new shared frame
    pub fn new(
        kind: FrameKind,
        timestamp: Timestamp,
        duration: TickDuration,
        payload: Vec<u8>,
    ) -> Arc<Self> {
        Arc::new(Self {
            kind,
            timestamp,
            duration,
            payload,
        })
    }

    /// Convert the frame duration from timeline ticks to a track timescale
    pub fn duration_in(&self, timescale: u32) -> u64 {
        self.duration * timescale as u64 / TICKS_PER_SECOND
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_conversion_to_track_units() {
        // 1024 samples at 44.1kHz is ~23.22ms
        let frame = MediaFrame::new(FrameKind::RawAudio, 0, 23_220, vec![0; 4096]);
        assert_eq!(frame.duration_in(44_100), 1024);
    }

    #[test]
    fn test_duration_conversion_identity_at_tick_rate() {
        let frame = MediaFrame::new(FrameKind::RawVideo, 0, 33_333, vec![]);
        assert_eq!(frame.duration_in(TICKS_PER_SECOND as u32), 33_333);
    }
}
