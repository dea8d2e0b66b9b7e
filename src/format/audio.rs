//! Encoded audio formats
//!
//! Track setup metadata for the encoded audio formats the recorder can
//! record alongside (or instead of) video.

use crate::config::RecorderConfig;
use crate::mux::AudioSampleType;
use serde::{Deserialize, Serialize};

/// Profile/level indication for formats outside the descriptor scheme.
const AUDIO_PROFILE_UNSPECIFIED: u8 = 0xFE;

/// Encoded audio formats the recorder can record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioEncoding {
    Aac,
    Mp3,
}

/// Elementary-stream metadata attached to an encoded audio track.
#[derive(Debug, Clone)]
pub struct AudioStreamInfo {
    /// Codec sample type passed to the muxer at track creation
    pub sample_type: AudioSampleType,

    /// Profile/level indication for the movie header
    pub profile_level: u8,

    /// Decoder configuration blob, when the format carries one
    pub decoder_config: Option<Vec<u8>>,

    /// Whether the format content supports companion object descriptors
    pub companion_objects: bool,

    /// Whether the content qualifies for the cross-vendor compliance tag
    pub cross_vendor_compliant: bool,
}

impl AudioEncoding {
    /// Track setup metadata for this format
    ///
    /// AAC carries a decoder configuration and qualifies for compliance
    /// tagging; MP3 has neither.
    pub fn stream_info(&self, config: &RecorderConfig) -> AudioStreamInfo {
        match self {
            AudioEncoding::Aac => AudioStreamInfo {
                sample_type: AudioSampleType::Aac,
                profile_level: config.audio_profile_level,
                decoder_config: config.audio_encoder_config.clone(),
                companion_objects: true,
                cross_vendor_compliant: true,
            },
            AudioEncoding::Mp3 => AudioStreamInfo {
                sample_type: AudioSampleType::Mp3,
                profile_level: AUDIO_PROFILE_UNSPECIFIED,
                decoder_config: None,
                companion_objects: false,
                cross_vendor_compliant: false,
            },
        }
    }
}
