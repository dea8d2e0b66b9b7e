//! Recorder command queue and worker handle
//!
//! Producers talk to the recorder exclusively through this queue: an
//! ordered, many-producer/one-consumer channel drained by a dedicated
//! worker thread. Enqueueing never blocks beyond the queue's internal
//! synchronization.

use crate::config::RecorderConfig;
use crate::frame::MediaFrame;
use crate::mux::MuxerBackend;
use crate::recorder::engine::RecorderEngine;
use crate::recorder::state::RecorderState;
use crate::utils::error::{RecorderError, RecorderResult};
use parking_lot::RwLock;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Control and data messages accepted by the recorder worker.
///
/// Messages are processed strictly in enqueue order, so a `Stop` is never
/// handled before a `Frame` enqueued earlier by the same producer.
pub enum RecorderCommand {
    /// Open a session; no-op if one is already open
    Start,
    /// Finalize the session; no-op if none is open
    Stop,
    /// Deliver one media frame (fire-and-forget)
    Frame(Arc<MediaFrame>),
    /// Finalize any open session, then terminate the worker
    Shutdown,
}

/// Cloneable producer endpoint.
///
/// Capture and encoding sources hold one of these per thread; they only
/// ever enqueue, never touch session or track state.
#[derive(Clone)]
pub struct RecorderSender {
    queue: Sender<RecorderCommand>,
    state: Arc<RwLock<RecorderState>>,
}

impl RecorderSender {
    /// Ask the worker to open a recording session
    pub fn start(&self) -> RecorderResult<()> {
        self.send(RecorderCommand::Start)
    }

    /// Ask the worker to finalize the current session
    pub fn stop(&self) -> RecorderResult<()> {
        self.send(RecorderCommand::Stop)
    }

    /// Deliver one frame to the worker
    ///
    /// Frame delivery is fire-and-forget: invalid or premature frames are
    /// dropped by the ingestion policy, never reported back. If the worker
    /// is gone, the frame reference is released by the failed send.
    pub fn deliver(&self, frame: Arc<MediaFrame>) -> RecorderResult<()> {
        self.send(RecorderCommand::Frame(frame))
    }

    /// Snapshot of the worker state
    pub fn state(&self) -> RecorderState {
        *self.state.read()
    }

    fn send(&self, command: RecorderCommand) -> RecorderResult<()> {
        self.queue
            .send(command)
            .map_err(|_| RecorderError::WorkerGone)
    }
}

/// Owning handle to a recorder worker thread.
///
/// Dropping the handle without calling [`RecorderHandle::shutdown`] still
/// sends a shutdown and joins the worker, so an open session is always
/// finalized.
pub struct RecorderHandle {
    sender: RecorderSender,
    worker: Option<JoinHandle<()>>,
}

impl RecorderHandle {
    /// Validate the configuration and spawn the worker thread
    pub fn spawn(config: RecorderConfig, backend: Box<dyn MuxerBackend>) -> RecorderResult<Self> {
        config.validate()?;

        let (queue, receiver) = mpsc::channel();
        let state = Arc::new(RwLock::new(RecorderState::Idle));
        let engine = RecorderEngine::new(config, backend, Arc::clone(&state));

        let worker = std::thread::Builder::new()
            .name("recorder".to_string())
            .spawn(move || engine.run(receiver))?;

        tracing::info!("recorder worker started");
        Ok(Self {
            sender: RecorderSender { queue, state },
            worker: Some(worker),
        })
    }

    /// A new producer endpoint for another thread
    pub fn sender(&self) -> RecorderSender {
        self.sender.clone()
    }

    /// Ask the worker to open a recording session
    pub fn start(&self) -> RecorderResult<()> {
        self.sender.start()
    }

    /// Ask the worker to finalize the current session
    pub fn stop(&self) -> RecorderResult<()> {
        self.sender.stop()
    }

    /// Deliver one frame to the worker
    pub fn deliver(&self, frame: Arc<MediaFrame>) -> RecorderResult<()> {
        self.sender.deliver(frame)
    }

    /// Snapshot of the worker state
    pub fn state(&self) -> RecorderState {
        self.sender.state()
    }

    /// Finalize any open session, terminate the worker, and wait for it
    pub fn shutdown(mut self) {
        self.shutdown_worker();
    }

    fn shutdown_worker(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        // the send fails only if the worker already exited
        let _ = self.sender.send(RecorderCommand::Shutdown);
        if worker.join().is_err() {
            tracing::error!("recorder worker panicked");
        } else {
            tracing::info!("recorder worker stopped");
        }
    }
}

impl Drop for RecorderHandle {
    fn drop(&mut self) {
        self.shutdown_worker();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::VideoEncoding;
    use crate::frame::FrameKind;
    use crate::mux::mock::{MockBackend, MuxOp};

    fn test_config() -> RecorderConfig {
        RecorderConfig {
            audio_enabled: false,
            hint_tracks: false,
            ..Default::default()
        }
    }

    fn key_frame(ts: u64) -> Arc<MediaFrame> {
        MediaFrame::new(
            FrameKind::EncodedVideo(VideoEncoding::Mpeg4),
            ts,
            33_333,
            vec![0x00, 0x00, 0x01, 0xB6, 0x00],
        )
    }

    #[test]
    fn test_shutdown_finalizes_open_session_exactly_once() {
        let backend = MockBackend::new();
        let handle = RecorderHandle::spawn(test_config(), Box::new(backend.clone())).unwrap();

        handle.start().unwrap();
        handle.deliver(key_frame(0)).unwrap();
        handle.deliver(key_frame(33_333)).unwrap();
        handle.shutdown();

        // the worker has exited; commands were processed in enqueue order
        let ops = backend.ops();
        let closes = ops.iter().filter(|op| matches!(op, MuxOp::Close)).count();
        assert_eq!(closes, 1);
        let writes = ops
            .iter()
            .filter(|op| matches!(op, MuxOp::WriteSample { .. }))
            .count();
        assert_eq!(writes, 2);
    }

    #[test]
    fn test_drop_without_shutdown_still_finalizes() {
        let backend = MockBackend::new();
        {
            let handle = RecorderHandle::spawn(test_config(), Box::new(backend.clone())).unwrap();
            handle.start().unwrap();
            handle.deliver(key_frame(0)).unwrap();
            // handle dropped here
        }

        let ops = backend.ops();
        assert!(ops.contains(&MuxOp::Close));
    }

    #[test]
    fn test_stop_then_start_brackets_sessions() {
        let backend = MockBackend::new();
        let handle = RecorderHandle::spawn(test_config(), Box::new(backend.clone())).unwrap();

        handle.start().unwrap();
        handle.deliver(key_frame(0)).unwrap();
        handle.stop().unwrap();
        handle.start().unwrap();
        handle.deliver(key_frame(0)).unwrap();
        handle.shutdown();

        let ops = backend.ops();
        let opens = ops
            .iter()
            .filter(|op| matches!(op, MuxOp::Open { .. }))
            .count();
        let closes = ops.iter().filter(|op| matches!(op, MuxOp::Close)).count();
        assert_eq!(opens, 2);
        assert_eq!(closes, 2);
    }

    #[test]
    fn test_frames_from_multiple_producer_threads() {
        let backend = MockBackend::new();
        let handle = RecorderHandle::spawn(test_config(), Box::new(backend.clone())).unwrap();

        handle.start().unwrap();
        handle.deliver(key_frame(0)).unwrap();

        let sender = handle.sender();
        let producer = std::thread::spawn(move || {
            for i in 1..4u64 {
                sender.deliver(key_frame(i * 33_333)).unwrap();
            }
        });
        producer.join().unwrap();
        handle.shutdown();

        let writes = backend
            .ops()
            .iter()
            .filter(|op| matches!(op, MuxOp::WriteSample { .. }))
            .count();
        assert_eq!(writes, 4);
    }

    #[test]
    fn test_state_returns_to_idle_after_shutdown() {
        let backend = MockBackend::new();
        let handle = RecorderHandle::spawn(test_config(), Box::new(backend.clone())).unwrap();
        let sender = handle.sender();

        handle.start().unwrap();
        handle.deliver(key_frame(0)).unwrap();
        handle.shutdown();

        assert_eq!(sender.state(), RecorderState::Idle);
    }

    #[test]
    fn test_spawn_rejects_invalid_config() {
        let config = RecorderConfig {
            video_enabled: false,
            audio_enabled: false,
            ..Default::default()
        };
        assert!(RecorderHandle::spawn(config, Box::new(MockBackend::new())).is_err());
    }
}
