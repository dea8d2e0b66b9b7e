//! Recorder state tracking
//!
//! Defines the observable worker state and per-session bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current state of the recorder worker, as seen by producers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderState {
    /// No session is open
    Idle,
    /// A session is open and accepting frames
    Recording,
}

impl Default for RecorderState {
    fn default() -> Self {
        Self::Idle
    }
}

/// Bookkeeping for one recording session, reported when the session closes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Session id, for correlating log lines
    pub id: Uuid,

    /// Wall-clock time the session was opened
    pub started_at: DateTime<Utc>,

    /// Samples written per track
    pub raw_video_frames: u64,
    pub encoded_video_frames: u64,
    pub raw_audio_frames: u64,
    pub encoded_audio_frames: u64,

    /// Total synthetic silence written across audio tracks, in native samples
    pub audio_gap_samples: u64,

    /// Frames released without being written (gate closed, skew, wrong kind)
    pub dropped_frames: u64,
}

impl SessionInfo {
    /// Create bookkeeping for a session starting now
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            raw_video_frames: 0,
            encoded_video_frames: 0,
            raw_audio_frames: 0,
            encoded_audio_frames: 0,
            audio_gap_samples: 0,
            dropped_frames: 0,
        }
    }
}

impl Default for SessionInfo {
    fn default() -> Self {
        Self::new()
    }
}
