//! Recording system module
//!
//! This module implements the message-driven recording engine:
//! - RecorderHandle for producers to enqueue commands and frames
//! - RecorderEngine, the worker-thread session state machine
//! - RecorderState/SessionInfo for observation

pub mod engine;
pub mod handle;
pub mod state;

pub use handle::{RecorderCommand, RecorderHandle, RecorderSender};
pub use state::{RecorderState, SessionInfo};
