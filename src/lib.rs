//! Open MediaRec - synchronized audio/video recording, made simple.
//!
//! This crate consumes a continuous stream of timestamped media frames and
//! serializes them into a seekable container file with synchronized
//! audio/video timelines, gap compensation, and post-record finalization.
//!
//! The recording engine runs on a single dedicated worker thread; capture
//! and encoding sources enqueue frames through a [`recorder::RecorderHandle`]
//! and never touch the open container file themselves.

pub mod config;
pub mod format;
pub mod frame;
pub mod mux;
pub mod recorder;
pub mod utils;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging for embedding applications
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "open_mediarec=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Open MediaRec v{}", env!("CARGO_PKG_VERSION"));
}
