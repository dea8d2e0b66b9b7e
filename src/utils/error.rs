//! Error types and handling
//!
//! Common error types used across the recorder.

use crate::mux::MuxerError;
use thiserror::Error;

/// Recorder-wide error type
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("muxer error: {0}")]
    Muxer(#[from] MuxerError),

    #[error("recorder worker is not running")]
    WorkerGone,
}

/// Result type alias using RecorderError
pub type RecorderResult<T> = Result<T, RecorderError>;
