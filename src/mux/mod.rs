//! Container muxer boundary
//!
//! Track-oriented sample-writing service consumed by the recorder. The
//! box-level file format writer itself lives behind these traits; the
//! recorder only decides track layout, sample order, durations, and
//! key-frame flags.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Opaque handle to a track inside an open container file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackId(pub u32);

/// Errors surfaced by the container muxer.
#[derive(Error, Debug)]
pub enum MuxerError {
    #[error("failed to open container file {path}: {reason}")]
    Open { path: PathBuf, reason: String },

    #[error("can't create {kind} track: {reason}")]
    TrackCreation { kind: &'static str, reason: String },

    #[error("failed to write sample to track {track:?}: {reason}")]
    SampleWrite { track: TrackId, reason: String },

    #[error("failed to finalize container file: {reason}")]
    Finalize { reason: String },
}

/// Result type alias for muxer operations
pub type MuxerResult<T> = Result<T, MuxerError>;

/// Codec sample type for video tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoSampleType {
    /// Uncompressed 4:2:0 planar frames
    Yuv12,
    Mpeg4Visual,
    H264,
}

/// Codec sample type for audio tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioSampleType {
    /// Uncompressed 16-bit big-endian PCM
    Pcm16BigEndian,
    Aac,
    Mp3,
}

/// Options for opening a container file at session start.
#[derive(Debug, Clone)]
pub struct MuxerOptions {
    pub path: PathBuf,

    /// Create a fresh file; when false, modify the existing file in place
    pub overwrite: bool,

    /// Use 64-bit offsets for very long or very large recordings
    pub huge_file: bool,
}

/// Packetization parameters for streaming hint-track generation.
#[derive(Debug, Clone, Copy)]
pub struct HintParams {
    /// Maximum transport payload size, in bytes
    pub payload_size: u32,
}

/// Post-processing qualifications carried from track negotiation to
/// finalization.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComplianceFlags {
    /// The recorded content supports companion object/scene descriptors
    pub companion_objects: bool,

    /// The content qualifies for the cross-vendor compliance tag
    pub cross_vendor: bool,
}

/// An open container file accepting tracks and samples.
///
/// All calls happen on the recorder worker thread; implementations do not
/// need internal synchronization.
pub trait ContainerMuxer: Send {
    /// Set the movie-level timescale used for cross-track timing
    fn set_movie_timescale(&mut self, timescale: u32);

    /// Create a video track; `duration_hint` of `None` means unknown
    fn add_video_track(
        &mut self,
        timescale: u32,
        duration_hint: Option<u64>,
        width: u16,
        height: u16,
        sample_type: VideoSampleType,
    ) -> MuxerResult<TrackId>;

    /// Create an audio track; `duration_hint` of `None` means unknown
    fn add_audio_track(
        &mut self,
        timescale: u32,
        duration_hint: Option<u64>,
        sample_type: AudioSampleType,
    ) -> MuxerResult<TrackId>;

    /// Set the movie-level video profile/level indication
    fn set_video_profile_level(&mut self, value: u8);

    /// Set the movie-level audio profile/level indication
    fn set_audio_profile_level(&mut self, value: u8);

    /// Attach an elementary-stream decoder configuration to a track
    fn set_track_es_configuration(&mut self, track: TrackId, config: &[u8]);

    /// Append one sample; empty `data` writes a synthetic silence/empty
    /// sample spanning `duration`
    ///
    /// `is_key_frame` feeds the track's sync-sample table: true for every
    /// independently decodable sample (all audio and raw video), and the
    /// key-frame detector's verdict for encoded video
    fn write_sample(
        &mut self,
        track: TrackId,
        data: &[u8],
        duration: u64,
        is_key_frame: bool,
    ) -> MuxerResult<()>;

    /// Convert a tick span into the track's native sample units
    fn to_track_duration(&self, track: TrackId, ticks: u64, ticks_per_second: u64) -> u64;

    /// Generate a streaming hint track for an existing media track
    fn generate_hint_track(&mut self, track: TrackId, params: &HintParams) -> MuxerResult<()>;

    /// Flush and close the container file
    fn close(&mut self) -> MuxerResult<()>;
}

/// Factory and path-level post-processing operations of the muxing library.
///
/// The post-close operations rewrite the finished file on disk, which is why
/// they live here rather than on [`ContainerMuxer`].
pub trait MuxerBackend: Send {
    /// Open a container file for writing
    fn open(&self, options: &MuxerOptions) -> MuxerResult<Box<dyn ContainerMuxer>>;

    /// Rewrite a closed file to add companion object/scene descriptors and,
    /// when the flags allow, the cross-vendor compliance tag
    fn add_compliance_metadata(&self, path: &Path, flags: &ComplianceFlags) -> MuxerResult<()>;

    /// Defragment/compact the layout of a closed file
    fn optimize(&self, path: &Path) -> MuxerResult<()>;
}

#[cfg(test)]
pub(crate) mod mock {
    //! Operation-recording muxer used by the recorder tests.

    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    /// One recorded muxer call.
    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum MuxOp {
        Open {
            overwrite: bool,
            huge_file: bool,
        },
        MovieTimescale(u32),
        AddVideoTrack {
            track: TrackId,
            timescale: u32,
            sample_type: VideoSampleType,
        },
        AddAudioTrack {
            track: TrackId,
            timescale: u32,
            sample_type: AudioSampleType,
        },
        VideoProfileLevel(u8),
        AudioProfileLevel(u8),
        EsConfiguration {
            track: TrackId,
            config: Vec<u8>,
        },
        WriteSample {
            track: TrackId,
            len: usize,
            duration: u64,
            is_key_frame: bool,
        },
        HintTrack {
            track: TrackId,
            payload_size: u32,
        },
        Close,
        ComplianceMetadata {
            cross_vendor: bool,
        },
        Optimize,
    }

    /// Failures the mock should inject.
    #[derive(Debug, Default)]
    pub(crate) struct FailurePlan {
        pub fail_open: bool,
        pub fail_video_track: bool,
        pub fail_audio_track: bool,
        pub fail_hint: bool,
        /// 1-based index of the first `write_sample` call that fails
        pub fail_write_at: Option<usize>,
    }

    #[derive(Clone, Default)]
    pub(crate) struct MockBackend {
        ops: Arc<Mutex<Vec<MuxOp>>>,
        failures: Arc<FailurePlan>,
    }

    impl MockBackend {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn with_failures(failures: FailurePlan) -> Self {
            Self {
                ops: Arc::new(Mutex::new(Vec::new())),
                failures: Arc::new(failures),
            }
        }

        /// Snapshot of every call recorded so far
        pub(crate) fn ops(&self) -> Vec<MuxOp> {
            self.ops.lock().clone()
        }
    }

    impl MuxerBackend for MockBackend {
        fn open(&self, options: &MuxerOptions) -> MuxerResult<Box<dyn ContainerMuxer>> {
            if self.failures.fail_open {
                return Err(MuxerError::Open {
                    path: options.path.clone(),
                    reason: "injected".into(),
                });
            }
            self.ops.lock().push(MuxOp::Open {
                overwrite: options.overwrite,
                huge_file: options.huge_file,
            });
            Ok(Box::new(MockMuxer {
                ops: Arc::clone(&self.ops),
                failures: Arc::clone(&self.failures),
                timescales: HashMap::new(),
                next_track: 1,
                writes: 0,
            }))
        }

        fn add_compliance_metadata(
            &self,
            _path: &Path,
            flags: &ComplianceFlags,
        ) -> MuxerResult<()> {
            self.ops.lock().push(MuxOp::ComplianceMetadata {
                cross_vendor: flags.cross_vendor,
            });
            Ok(())
        }

        fn optimize(&self, _path: &Path) -> MuxerResult<()> {
            self.ops.lock().push(MuxOp::Optimize);
            Ok(())
        }
    }

    pub(crate) struct MockMuxer {
        ops: Arc<Mutex<Vec<MuxOp>>>,
        failures: Arc<FailurePlan>,
        timescales: HashMap<TrackId, u32>,
        next_track: u32,
        writes: usize,
    }

    impl ContainerMuxer for MockMuxer {
        fn set_movie_timescale(&mut self, timescale: u32) {
            self.ops.lock().push(MuxOp::MovieTimescale(timescale));
        }

        fn add_video_track(
            &mut self,
            timescale: u32,
            _duration_hint: Option<u64>,
            _width: u16,
            _height: u16,
            sample_type: VideoSampleType,
        ) -> MuxerResult<TrackId> {
            if self.failures.fail_video_track {
                return Err(MuxerError::TrackCreation {
                    kind: "video",
                    reason: "injected".into(),
                });
            }
            let track = TrackId(self.next_track);
            self.next_track += 1;
            self.timescales.insert(track, timescale);
            self.ops.lock().push(MuxOp::AddVideoTrack {
                track,
                timescale,
                sample_type,
            });
            Ok(track)
        }

        fn add_audio_track(
            &mut self,
            timescale: u32,
            _duration_hint: Option<u64>,
            sample_type: AudioSampleType,
        ) -> MuxerResult<TrackId> {
            if self.failures.fail_audio_track {
                return Err(MuxerError::TrackCreation {
                    kind: "audio",
                    reason: "injected".into(),
                });
            }
            let track = TrackId(self.next_track);
            self.next_track += 1;
            self.timescales.insert(track, timescale);
            self.ops.lock().push(MuxOp::AddAudioTrack {
                track,
                timescale,
                sample_type,
            });
            Ok(track)
        }

        fn set_video_profile_level(&mut self, value: u8) {
            self.ops.lock().push(MuxOp::VideoProfileLevel(value));
        }

        fn set_audio_profile_level(&mut self, value: u8) {
            self.ops.lock().push(MuxOp::AudioProfileLevel(value));
        }

        fn set_track_es_configuration(&mut self, track: TrackId, config: &[u8]) {
            self.ops.lock().push(MuxOp::EsConfiguration {
                track,
                config: config.to_vec(),
            });
        }

        fn write_sample(
            &mut self,
            track: TrackId,
            data: &[u8],
            duration: u64,
            is_key_frame: bool,
        ) -> MuxerResult<()> {
            self.writes += 1;
            if self.failures.fail_write_at == Some(self.writes) {
                return Err(MuxerError::SampleWrite {
                    track,
                    reason: "injected".into(),
                });
            }
            self.ops.lock().push(MuxOp::WriteSample {
                track,
                len: data.len(),
                duration,
                is_key_frame,
            });
            Ok(())
        }

        fn to_track_duration(&self, track: TrackId, ticks: u64, ticks_per_second: u64) -> u64 {
            let timescale = self.timescales.get(&track).copied().unwrap_or(1);
            ticks * timescale as u64 / ticks_per_second
        }

        fn generate_hint_track(&mut self, track: TrackId, params: &HintParams) -> MuxerResult<()> {
            if self.failures.fail_hint {
                return Err(MuxerError::Finalize {
                    reason: "injected hint failure".into(),
                });
            }
            self.ops.lock().push(MuxOp::HintTrack {
                track,
                payload_size: params.payload_size,
            });
            Ok(())
        }

        fn close(&mut self) -> MuxerResult<()> {
            self.ops.lock().push(MuxOp::Close);
            Ok(())
        }
    }
}
