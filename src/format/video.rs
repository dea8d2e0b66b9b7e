//! Encoded video formats
//!
//! Per-format key-frame detection and track setup metadata. Key-frame
//! detection runs on every encoded frame, so the parsers only look as deep
//! into the bitstream as the coding-type bits require.

use crate::config::RecorderConfig;
use crate::mux::VideoSampleType;
use serde::{Deserialize, Serialize};

/// MPEG-4 VOP start code suffix (after the 00 00 01 prefix).
const MPEG4_VOP_START: u8 = 0xB6;

/// Encoded video formats the recorder can record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoEncoding {
    Mpeg4,
    H264,
}

/// Elementary-stream metadata attached to an encoded video track.
#[derive(Debug, Clone)]
pub struct VideoStreamInfo {
    /// Codec sample type passed to the muxer at track creation
    pub sample_type: VideoSampleType,

    /// Profile/level indication for the movie header
    pub profile_level: u8,

    /// Decoder configuration blob, when the format carries one
    pub decoder_config: Option<Vec<u8>>,

    /// Whether the format content supports companion object descriptors
    pub companion_objects: bool,

    /// Whether the content qualifies for the cross-vendor compliance tag
    pub cross_vendor_compliant: bool,
}

impl VideoEncoding {
    /// Classify an encoded frame as a key-frame (safe session start point)
    pub fn detect_key_frame(&self, data: &[u8]) -> bool {
        match self {
            VideoEncoding::Mpeg4 => mpeg4_vop_is_intra(data),
            VideoEncoding::H264 => h264_contains_idr(data),
        }
    }

    /// Track setup metadata for this format
    ///
    /// MPEG-4 content supports companion object descriptors and the
    /// cross-vendor compliance tag; H.264 predates that descriptor scheme
    /// and qualifies for neither.
    pub fn stream_info(&self, config: &RecorderConfig) -> VideoStreamInfo {
        match self {
            VideoEncoding::Mpeg4 => VideoStreamInfo {
                sample_type: VideoSampleType::Mpeg4Visual,
                profile_level: config.video_profile_level,
                decoder_config: config.video_encoder_config.clone(),
                companion_objects: true,
                cross_vendor_compliant: true,
            },
            VideoEncoding::H264 => VideoStreamInfo {
                sample_type: VideoSampleType::H264,
                profile_level: config.video_profile_level,
                decoder_config: config.video_encoder_config.clone(),
                companion_objects: false,
                cross_vendor_compliant: false,
            },
        }
    }
}

/// Find the VOP header in an MPEG-4 elementary stream and check whether its
/// coding type is intra (I-VOP).
///
/// The two bits following the VOP start code encode the coding type:
/// 0 = I, 1 = P, 2 = B, 3 = S.
fn mpeg4_vop_is_intra(data: &[u8]) -> bool {
    let mut i = 0;
    while i + 4 < data.len() {
        if data[i] == 0x00
            && data[i + 1] == 0x00
            && data[i + 2] == 0x01
            && data[i + 3] == MPEG4_VOP_START
        {
            return data[i + 4] >> 6 == 0;
        }
        i += 1;
    }
    false
}

/// Walk Annex-B NAL units and report whether any is an IDR slice (type 5).
fn h264_contains_idr(data: &[u8]) -> bool {
    let mut i = 0;
    while i + 3 < data.len() {
        if data[i] == 0x00 && data[i + 1] == 0x00 {
            let nal_offset = if data[i + 2] == 0x01 {
                Some(i + 3)
            } else if i + 4 < data.len() && data[i + 2] == 0x00 && data[i + 3] == 0x01 {
                Some(i + 4)
            } else {
                None
            };

            if let Some(offset) = nal_offset {
                if offset < data.len() && data[offset] & 0x1F == 5 {
                    return true;
                }
                i = offset;
                continue;
            }
        }
        i += 1;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mpeg4_vop(coding_type: u8) -> Vec<u8> {
        vec![0x00, 0x00, 0x01, 0xB6, coding_type << 6, 0xAB, 0xCD]
    }

    #[test]
    fn test_mpeg4_i_vop_is_key_frame() {
        assert!(VideoEncoding::Mpeg4.detect_key_frame(&mpeg4_vop(0)));
    }

    #[test]
    fn test_mpeg4_p_and_b_vops_are_not_key_frames() {
        assert!(!VideoEncoding::Mpeg4.detect_key_frame(&mpeg4_vop(1)));
        assert!(!VideoEncoding::Mpeg4.detect_key_frame(&mpeg4_vop(2)));
    }

    #[test]
    fn test_mpeg4_vop_after_leading_headers() {
        // VOL header bytes before the VOP start code
        let mut data = vec![0x00, 0x00, 0x01, 0x20, 0x08, 0x40];
        data.extend(mpeg4_vop(0));
        assert!(VideoEncoding::Mpeg4.detect_key_frame(&data));
    }

    #[test]
    fn test_mpeg4_missing_vop_is_not_key_frame() {
        assert!(!VideoEncoding::Mpeg4.detect_key_frame(&[0x00, 0x00, 0x01, 0x20]));
        assert!(!VideoEncoding::Mpeg4.detect_key_frame(&[]));
    }

    #[test]
    fn test_h264_idr_slice_detected() {
        // SPS, PPS, then an IDR slice, all with 4-byte start codes
        let data = [
            0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x1E, // SPS
            0x00, 0x00, 0x00, 0x01, 0x68, 0xCE, 0x38, 0x80, // PPS
            0x00, 0x00, 0x00, 0x01, 0x65, 0x88, 0x84, 0x00, // IDR
        ];
        assert!(VideoEncoding::H264.detect_key_frame(&data));
    }

    #[test]
    fn test_h264_non_idr_slice_is_not_key_frame() {
        let data = [0x00, 0x00, 0x01, 0x41, 0x9A, 0x22]; // non-IDR slice
        assert!(!VideoEncoding::H264.detect_key_frame(&data));
    }

    #[test]
    fn test_compliance_flags_per_format() {
        let config = RecorderConfig::default();
        let mpeg4 = VideoEncoding::Mpeg4.stream_info(&config);
        assert!(mpeg4.companion_objects);
        assert!(mpeg4.cross_vendor_compliant);

        let h264 = VideoEncoding::H264.stream_info(&config);
        assert!(!h264.companion_objects);
        assert!(!h264.cross_vendor_compliant);
    }
}
