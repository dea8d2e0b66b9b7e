//! Format-specific stream parsers
//!
//! Key-frame detection and elementary-stream metadata for the encoded
//! formats the recorder can anchor a session on.

pub mod audio;
pub mod video;

pub use audio::{AudioEncoding, AudioStreamInfo};
pub use video::{VideoEncoding, VideoStreamInfo};
