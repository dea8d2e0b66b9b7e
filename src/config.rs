//! Recorder configuration
//!
//! Read-only settings queried by the recorder at session setup. Loadable
//! from a JSON file; every field has a documented default.

use crate::format::{AudioEncoding, VideoEncoding};
use crate::utils::error::{RecorderError, RecorderResult};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for a recorder instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecorderConfig {
    /// Whether video capture is enabled at all
    pub video_enabled: bool,

    /// Whether audio capture is enabled at all
    pub audio_enabled: bool,

    /// Record the raw (uncompressed) video substream
    pub record_raw_video: bool,

    /// Record the encoded video substream
    pub record_encoded_video: bool,

    /// Record the raw (PCM) audio substream
    pub record_raw_audio: bool,

    /// Record the encoded audio substream
    pub record_encoded_audio: bool,

    /// Output container file path
    pub file_path: PathBuf,

    /// Create a fresh file; when false, modify an existing file in place
    pub overwrite_file: bool,

    /// Video frame width in pixels
    pub video_width: u16,

    /// Video frame height in pixels
    pub video_height: u16,

    /// Video track timescale (ticks per second)
    pub video_timescale: u32,

    /// Encoded video format
    pub video_encoding: VideoEncoding,

    /// Video profile/level indication for the movie header
    pub video_profile_level: u8,

    /// Decoder configuration blob produced by the video encoder
    pub video_encoder_config: Option<Vec<u8>>,

    /// Audio sample rate, also used as the audio track timescale
    pub audio_sample_rate: u32,

    /// Encoded audio format
    pub audio_encoding: AudioEncoding,

    /// Audio profile/level indication for the movie header
    pub audio_profile_level: u8,

    /// Decoder configuration blob produced by the audio encoder
    pub audio_encoder_config: Option<Vec<u8>>,

    /// Expected recording duration, in `duration_units`
    pub duration_limit: u64,

    /// Seconds per duration unit (e.g. 60 for minutes)
    pub duration_units: u64,

    /// Estimated output file size in bytes, for huge-file mode selection
    pub estimated_file_size: u64,

    /// Generate streaming hint tracks at session end
    pub hint_tracks: bool,

    /// Maximum transport payload size for hint packetization, in bytes
    pub rtp_payload_size: u32,

    /// Run layout optimization over the finalized file
    pub optimize: bool,

    /// Minimum audio gap worth filling with a silence sample, in milliseconds
    pub audio_gap_threshold_ms: u64,

    /// Admit the first audio frame when its timestamp equals the movie start
    /// timestamp (when false, only strictly later frames are admitted)
    pub admit_equal_audio_timestamp: bool,

    /// Ask the embedding application to run capture under a real-time
    /// scheduler
    pub use_realtime_scheduler: bool,

    /// Signal names the embedding service wrapper treats as a graceful halt
    pub halt_signals: Vec<String>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            video_enabled: true,
            audio_enabled: true,
            record_raw_video: false,
            record_encoded_video: true,
            record_raw_audio: false,
            record_encoded_audio: true,
            file_path: PathBuf::from("capture.mp4"),
            overwrite_file: true,
            video_width: 320,
            video_height: 240,
            video_timescale: 90_000,
            video_encoding: VideoEncoding::Mpeg4,
            video_profile_level: 0x03,
            video_encoder_config: None,
            audio_sample_rate: 44_100,
            audio_encoding: AudioEncoding::Aac,
            audio_profile_level: 0x0F,
            audio_encoder_config: None,
            duration_limit: 1,
            duration_units: 3_600,
            estimated_file_size: 0,
            hint_tracks: true,
            rtp_payload_size: 1_460,
            optimize: false,
            audio_gap_threshold_ms: 100,
            admit_equal_audio_timestamp: true,
            use_realtime_scheduler: false,
            halt_signals: vec!["SIGINT".to_string(), "SIGTERM".to_string()],
        }
    }
}

impl RecorderConfig {
    /// Load configuration from a JSON file
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Whether any video substream is being recorded
    pub fn recording_video(&self) -> bool {
        self.video_enabled && (self.record_raw_video || self.record_encoded_video)
    }

    /// Whether any audio substream is being recorded
    pub fn recording_audio(&self) -> bool {
        self.audio_enabled && (self.record_raw_audio || self.record_encoded_audio)
    }

    /// Reject configurations a session could never be set up from
    pub fn validate(&self) -> RecorderResult<()> {
        if !self.recording_video() && !self.recording_audio() {
            return Err(RecorderError::Config(
                "no media substream is enabled for recording".to_string(),
            ));
        }
        if self.file_path.as_os_str().is_empty() {
            return Err(RecorderError::Config("output file path is empty".to_string()));
        }
        if self.audio_sample_rate == 0 || self.video_timescale == 0 {
            return Err(RecorderError::Config(
                "timescales must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        assert!(RecorderConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_all_substreams_disabled() {
        let config = RecorderConfig {
            video_enabled: false,
            audio_enabled: false,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_enable_flag_gates_substreams() {
        // record flags set, but the top-level enable flags are off
        let config = RecorderConfig {
            video_enabled: false,
            audio_enabled: false,
            record_encoded_video: true,
            record_encoded_audio: true,
            ..Default::default()
        };
        assert!(!config.recording_video());
        assert!(!config.recording_audio());
    }

    #[test]
    fn test_load_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "filePath": "/tmp/session.mp4",
                "videoEncoding": "h264",
                "recordRawAudio": true,
                "audioGapThresholdMs": 250
            }}"#
        )
        .unwrap();

        let config = RecorderConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.file_path, PathBuf::from("/tmp/session.mp4"));
        assert_eq!(config.video_encoding, VideoEncoding::H264);
        assert!(config.record_raw_audio);
        assert_eq!(config.audio_gap_threshold_ms, 250);
        // unspecified keys fall back to defaults
        assert_eq!(config.audio_sample_rate, 44_100);
    }

    #[test]
    fn test_load_rejects_invalid_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"videoEnabled": false, "audioEnabled": false}}"#).unwrap();
        assert!(RecorderConfig::from_json_file(file.path()).is_err());
    }
}
