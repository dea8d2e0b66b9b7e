//! Recorder engine
//!
//! Single-threaded session state machine. The engine drains the command
//! queue, negotiates tracks at session start, keeps the audio and video
//! timelines in lock-step during frame ingestion, and finalizes the
//! container file when the session stops.
//!
//! Everything here runs on the recorder worker thread; producers only ever
//! enqueue commands.

use crate::config::RecorderConfig;
use crate::frame::{FrameKind, MediaFrame, Timestamp, TICKS_PER_SECOND};
use crate::mux::{
    AudioSampleType, ComplianceFlags, ContainerMuxer, HintParams, MuxerBackend, MuxerOptions,
    MuxerResult, TrackId, VideoSampleType,
};
use crate::recorder::handle::RecorderCommand;
use crate::recorder::state::{RecorderState, SessionInfo};
use parking_lot::RwLock;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

/// Estimated file size above which the muxer is asked for 64-bit offsets.
const HUGE_FILE_SIZE_BYTES: u64 = 1_000_000_000;

/// Profile/level value meaning "no profile applies" for raw tracks.
const PROFILE_LEVEL_RAW: u8 = 0xFF;

/// Per-track bookkeeping while a session is open.
#[derive(Debug)]
struct TrackState {
    id: TrackId,

    /// Running frame counter; the next frame to arrive is this one
    frame_number: u64,

    /// Accumulated written duration, in timeline ticks
    written_ticks: u64,

    /// Timestamp of the first accepted frame
    start_timestamp: Option<Timestamp>,
}

impl TrackState {
    fn new(id: TrackId) -> Self {
        Self {
            id,
            frame_number: 1,
            written_ticks: 0,
            start_timestamp: None,
        }
    }

    fn frames_written(&self) -> u64 {
        self.frame_number - 1
    }
}

/// Which of the two audio substreams a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AudioSlot {
    Raw,
    Encoded,
}

/// The tracks negotiated during session setup.
#[derive(Default)]
struct NegotiatedTracks {
    raw_video: Option<TrackState>,
    encoded_video: Option<TrackState>,
    raw_audio: Option<TrackState>,
    encoded_audio: Option<TrackState>,
}

/// State held between Start and Stop.
struct Session {
    muxer: Box<dyn ContainerMuxer>,
    info: SessionInfo,

    video_timescale: u32,
    audio_timescale: u32,

    /// Whether any video substream is part of this session
    record_video: bool,

    /// Audio-admission gate: closed until the anchoring video frame arrives
    audio_admitted: bool,

    /// Timestamp anchoring the shared movie timeline
    movie_start: Timestamp,

    /// Minimum audio gap worth filling, in native audio samples
    gap_threshold_samples: u64,

    /// Post-processing qualifications accumulated during track negotiation
    compliance: ComplianceFlags,

    /// Set after a mid-stream write failure; no further samples are
    /// attempted, but Stop still closes the file
    write_failed: bool,

    raw_video: Option<TrackState>,
    encoded_video: Option<TrackState>,
    raw_audio: Option<TrackState>,
    encoded_audio: Option<TrackState>,
}

impl Session {
    fn audio_track(&self, slot: AudioSlot) -> Option<&TrackState> {
        match slot {
            AudioSlot::Raw => self.raw_audio.as_ref(),
            AudioSlot::Encoded => self.encoded_audio.as_ref(),
        }
    }

    fn audio_track_mut(&mut self, slot: AudioSlot) -> Option<&mut TrackState> {
        match slot {
            AudioSlot::Raw => self.raw_audio.as_mut(),
            AudioSlot::Encoded => self.encoded_audio.as_mut(),
        }
    }
}

/// The recorder's session state machine, owned by the worker thread.
pub(crate) struct RecorderEngine {
    config: RecorderConfig,
    backend: Box<dyn MuxerBackend>,
    shared_state: Arc<RwLock<RecorderState>>,
    session: Option<Session>,
}

impl RecorderEngine {
    pub(crate) fn new(
        config: RecorderConfig,
        backend: Box<dyn MuxerBackend>,
        shared_state: Arc<RwLock<RecorderState>>,
    ) -> Self {
        Self {
            config,
            backend,
            shared_state,
            session: None,
        }
    }

    /// Worker loop: block on the queue, process one command at a time in
    /// arrival order, exit only on shutdown.
    pub(crate) fn run(mut self, queue: Receiver<RecorderCommand>) {
        loop {
            let command = match queue.recv() {
                Ok(command) => command,
                Err(_) => {
                    // every producer handle is gone; treat it as a shutdown
                    tracing::debug!("command queue disconnected, stopping recorder worker");
                    self.stop_session();
                    break;
                }
            };

            match command {
                RecorderCommand::Start => {
                    if let Err(e) = self.start_session() {
                        tracing::error!("failed to start recording session: {}", e);
                    }
                }
                RecorderCommand::Frame(frame) => self.write_frame(frame),
                RecorderCommand::Stop => self.stop_session(),
                RecorderCommand::Shutdown => {
                    self.stop_session();
                    break;
                }
            }
        }
    }

    /// Negotiate tracks and open the container file.
    ///
    /// On any track-creation failure the partially created file is closed
    /// and no session is left open.
    fn start_session(&mut self) -> MuxerResult<()> {
        // already recording
        if self.session.is_some() {
            return Ok(());
        }

        let config = &self.config;
        let video_timescale = config.video_timescale;
        let audio_timescale = config.audio_sample_rate;

        // when video is part of the session, the movie timeline is anchored
        // by video and audio must wait for it
        let record_video = config.recording_video();
        let (movie_timescale, audio_admitted) = if record_video {
            (video_timescale, false)
        } else {
            (audio_timescale, true)
        };

        // 64-bit offsets for very long or very large recordings
        let duration_ticks = config
            .duration_limit
            .saturating_mul(config.duration_units)
            .saturating_mul(movie_timescale as u64);
        let huge_file = duration_ticks > u32::MAX as u64
            || config.estimated_file_size > HUGE_FILE_SIZE_BYTES;

        let options = MuxerOptions {
            path: config.file_path.clone(),
            overwrite: config.overwrite_file,
            huge_file,
        };
        let mut muxer = self.backend.open(&options)?;
        muxer.set_movie_timescale(movie_timescale);

        let mut compliance = ComplianceFlags {
            companion_objects: true,
            cross_vendor: true,
        };

        let tracks = match Self::negotiate_tracks(config, muxer.as_mut(), &mut compliance) {
            Ok(tracks) => tracks,
            Err(e) => {
                // leave no partial session behind
                if let Err(close_err) = muxer.close() {
                    tracing::warn!("failed to close file after aborted setup: {}", close_err);
                }
                return Err(e);
            }
        };

        let gap_threshold_samples =
            config.audio_gap_threshold_ms * audio_timescale as u64 / 1_000;

        let info = SessionInfo::new();
        tracing::info!(
            session = %info.id,
            file = %config.file_path.display(),
            movie_timescale,
            "recording session started"
        );

        self.session = Some(Session {
            muxer,
            info,
            video_timescale,
            audio_timescale,
            record_video,
            audio_admitted,
            movie_start: 0,
            gap_threshold_samples,
            compliance,
            write_failed: false,
            raw_video: tracks.raw_video,
            encoded_video: tracks.encoded_video,
            raw_audio: tracks.raw_audio,
            encoded_audio: tracks.encoded_audio,
        });
        *self.shared_state.write() = RecorderState::Recording;
        Ok(())
    }

    /// Create every enabled track, accumulating compliance flags from the
    /// encoded formats.
    fn negotiate_tracks(
        config: &RecorderConfig,
        muxer: &mut dyn ContainerMuxer,
        compliance: &mut ComplianceFlags,
    ) -> MuxerResult<NegotiatedTracks> {
        let mut tracks = NegotiatedTracks::default();

        if config.video_enabled {
            if config.record_raw_video {
                let id = muxer.add_video_track(
                    config.video_timescale,
                    None,
                    config.video_width,
                    config.video_height,
                    VideoSampleType::Yuv12,
                )?;
                muxer.set_video_profile_level(PROFILE_LEVEL_RAW);
                tracks.raw_video = Some(TrackState::new(id));
            }

            if config.record_encoded_video {
                let stream = config.video_encoding.stream_info(config);
                compliance.companion_objects &= stream.companion_objects;
                compliance.cross_vendor &= stream.cross_vendor_compliant;

                let id = muxer.add_video_track(
                    config.video_timescale,
                    None,
                    config.video_width,
                    config.video_height,
                    stream.sample_type,
                )?;
                muxer.set_video_profile_level(stream.profile_level);
                if let Some(es_config) = &stream.decoder_config {
                    muxer.set_track_es_configuration(id, es_config);
                }
                tracks.encoded_video = Some(TrackState::new(id));
            }
        }

        if config.audio_enabled {
            if config.record_raw_audio {
                let id = muxer.add_audio_track(
                    config.audio_sample_rate,
                    Some(0),
                    AudioSampleType::Pcm16BigEndian,
                )?;
                muxer.set_audio_profile_level(PROFILE_LEVEL_RAW);
                tracks.raw_audio = Some(TrackState::new(id));
            }

            if config.record_encoded_audio {
                let stream = config.audio_encoding.stream_info(config);
                compliance.companion_objects &= stream.companion_objects;
                compliance.cross_vendor &= stream.cross_vendor_compliant;

                muxer.set_audio_profile_level(stream.profile_level);
                let id =
                    muxer.add_audio_track(config.audio_sample_rate, None, stream.sample_type)?;
                if let Some(es_config) = &stream.decoder_config {
                    muxer.set_track_es_configuration(id, es_config);
                }
                tracks.encoded_audio = Some(TrackState::new(id));
            }
        }

        Ok(tracks)
    }

    /// Ingest one frame: accept, gap-fill, or drop it.
    ///
    /// The recorder's frame reference is consumed here on every path; the
    /// `Arc` drops when this function returns.
    fn write_frame(&mut self, frame: Arc<MediaFrame>) {
        // while no session is open, inbound frames have no effect
        let Some(session) = self.session.as_mut() else {
            return;
        };

        if session.write_failed {
            session.info.dropped_frames += 1;
            return;
        }

        let config = &self.config;
        let result = match frame.kind {
            FrameKind::RawAudio if session.raw_audio.is_some() => {
                Self::write_audio_frame(config, session, AudioSlot::Raw, &frame)
            }
            FrameKind::EncodedAudio(encoding)
                if session.encoded_audio.is_some() && encoding == config.audio_encoding =>
            {
                Self::write_audio_frame(config, session, AudioSlot::Encoded, &frame)
            }
            FrameKind::RawVideo if session.raw_video.is_some() => {
                Self::write_raw_video_frame(session, &frame)
            }
            FrameKind::EncodedVideo(encoding)
                if session.encoded_video.is_some() && encoding == config.video_encoding =>
            {
                Self::write_encoded_video_frame(session, encoding, &frame)
            }
            _ => {
                // no enabled track matches this frame kind
                session.info.dropped_frames += 1;
                Ok(())
            }
        };

        if let Err(e) = result {
            // mid-stream write failures are session-fatal: stop attempting
            // samples, but keep the session so Stop still closes the file
            tracing::error!(
                session = %session.info.id,
                "sample write failed, no further samples will be written: {}",
                e
            );
            session.write_failed = true;
        }
    }

    /// Audio path: admission gate, timeline anchoring, gap compensation.
    fn write_audio_frame(
        config: &RecorderConfig,
        session: &mut Session,
        slot: AudioSlot,
        frame: &MediaFrame,
    ) -> MuxerResult<()> {
        let Some((track_id, first, written_ticks)) = session
            .audio_track(slot)
            .map(|t| (t.id, t.frame_number == 1, t.written_ticks))
        else {
            return Ok(());
        };

        // the first frame of an audio track needs the admission checks
        if first {
            // can't record yet, awaiting the anchoring video frame
            if !session.audio_admitted {
                session.info.dropped_frames += 1;
                tracing::debug!("dropping audio frame, audio admission gate is closed");
                return Ok(());
            }

            if !session.record_video {
                // audio-only session: the very first audio frame across both
                // audio tracks anchors the movie timeline
                let raw_first = session
                    .raw_audio
                    .as_ref()
                    .map_or(true, |t| t.frame_number == 1);
                let encoded_first = session
                    .encoded_audio
                    .as_ref()
                    .map_or(true, |t| t.frame_number == 1);
                if raw_first && encoded_first {
                    session.movie_start = frame.timestamp;
                }
            } else {
                // clock-skew safety net: drop errant audio frames that
                // precede the established movie start
                let too_early = if config.admit_equal_audio_timestamp {
                    frame.timestamp < session.movie_start
                } else {
                    frame.timestamp <= session.movie_start
                };
                if too_early {
                    session.info.dropped_frames += 1;
                    tracing::debug!(
                        timestamp = frame.timestamp,
                        movie_start = session.movie_start,
                        "dropping audio frame preceding the movie start"
                    );
                    return Ok(());
                }
            }

            if let Some(track) = session.audio_track_mut(slot) {
                track.start_timestamp = Some(frame.timestamp);
            }
        }

        // gap between elapsed presentation time and what the track has
        // actually written
        let elapsed_ticks = frame.timestamp as i64 - session.movie_start as i64;
        let gap_ticks = elapsed_ticks - written_ticks as i64;
        let gap_samples = if gap_ticks > 0 {
            session
                .muxer
                .to_track_duration(track_id, gap_ticks as u64, TICKS_PER_SECOND)
        } else {
            0
        };

        let mut gap_written_ticks = 0;
        if gap_samples > 0 && gap_samples >= session.gap_threshold_samples {
            // one silence sample spanning the whole gap, before the real one;
            // every audio sample is independently decodable, so it is a sync
            // sample
            session.muxer.write_sample(track_id, &[], gap_samples, true)?;
            session.info.audio_gap_samples += gap_samples;
            gap_written_ticks = gap_ticks as u64;
            tracing::debug!(gap_samples, "filled audio gap with a silence sample");
        }

        session.muxer.write_sample(
            track_id,
            &frame.payload,
            frame.duration_in(session.audio_timescale),
            true,
        )?;

        if let Some(track) = session.audio_track_mut(slot) {
            track.frame_number += 1;
            track.written_ticks += gap_written_ticks + frame.duration;
        }
        Ok(())
    }

    /// Raw video path: starts in lock-step with encoded video when both are
    /// recorded, otherwise anchors the movie itself.
    fn write_raw_video_frame(session: &mut Session, frame: &MediaFrame) -> MuxerResult<()> {
        let Some((track_id, first)) = session
            .raw_video
            .as_ref()
            .map(|t| (t.id, t.frame_number == 1))
        else {
            return Ok(());
        };

        if first {
            if session.encoded_video.is_some() {
                // the source sends the encoded frame first; don't accept raw
                // video until the encoded key-frame has arrived
                let encoded_started = session
                    .encoded_video
                    .as_ref()
                    .map_or(false, |t| t.frame_number > 1);
                if !encoded_started {
                    session.info.dropped_frames += 1;
                    tracing::debug!("dropping raw video frame, awaiting encoded key-frame");
                    return Ok(());
                }
            } else {
                // raw video is the only video form: it anchors the movie
                session.movie_start = frame.timestamp;
                session.audio_admitted = true;
            }
        }

        // uncompressed frames have no inter-frame dependencies: every raw
        // video sample is a sync sample
        session.muxer.write_sample(
            track_id,
            &frame.payload,
            frame.duration_in(session.video_timescale),
            true,
        )?;

        if let Some(track) = session.raw_video.as_mut() {
            if first {
                track.start_timestamp = Some(frame.timestamp);
            }
            track.frame_number += 1;
            track.written_ticks += frame.duration;
        }
        Ok(())
    }

    /// Encoded video path: the first written sample must be a key-frame, and
    /// it anchors the movie timeline.
    fn write_encoded_video_frame(
        session: &mut Session,
        encoding: crate::format::VideoEncoding,
        frame: &MediaFrame,
    ) -> MuxerResult<()> {
        let Some((track_id, first)) = session
            .encoded_video
            .as_ref()
            .map(|t| (t.id, t.frame_number == 1))
        else {
            return Ok(());
        };

        let is_key_frame = encoding.detect_key_frame(&frame.payload);

        if first {
            // a recording must start on a key-frame
            if !is_key_frame {
                session.info.dropped_frames += 1;
                tracing::debug!("dropping leading non-key encoded video frame");
                return Ok(());
            }
            session.movie_start = frame.timestamp;
            session.audio_admitted = true;
        }

        session.muxer.write_sample(
            track_id,
            &frame.payload,
            frame.duration_in(session.video_timescale),
            is_key_frame,
        )?;

        if let Some(track) = session.encoded_video.as_mut() {
            if first {
                track.start_timestamp = Some(frame.timestamp);
            }
            track.frame_number += 1;
            track.written_ticks += frame.duration;
        }
        Ok(())
    }

    /// Close the active session: hint tracks, file close, compliance
    /// tagging, layout optimization.
    ///
    /// Post-processing failures are logged and never abort the stop
    /// sequence.
    fn stop_session(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        // streaming hint tracks are generated while the file is still open
        if self.config.hint_tracks {
            let params = HintParams {
                payload_size: self.config.rtp_payload_size,
            };
            if let Some(track) = &session.encoded_video {
                if let Err(e) = session.muxer.generate_hint_track(track.id, &params) {
                    tracing::warn!("encoded video hint track generation failed: {}", e);
                }
            }
            if let Some(track) = &session.encoded_audio {
                if let Err(e) = session.muxer.generate_hint_track(track.id, &params) {
                    tracing::warn!("encoded audio hint track generation failed: {}", e);
                }
            }
            if let Some(track) = &session.raw_audio {
                if let Err(e) = session.muxer.generate_hint_track(track.id, &params) {
                    tracing::warn!("raw audio hint track generation failed: {}", e);
                }
            }
        }

        if let Err(e) = session.muxer.close() {
            tracing::error!("failed to close container file: {}", e);
        }

        // companion descriptors and the compliance tag are rewrites over the
        // closed file
        let any_encoded = session.encoded_video.is_some() || session.encoded_audio.is_some();
        if any_encoded && session.compliance.companion_objects {
            if let Err(e) = self
                .backend
                .add_compliance_metadata(&self.config.file_path, &session.compliance)
            {
                tracing::warn!("compliance tagging failed: {}", e);
            }
        }

        if self.config.optimize {
            if let Err(e) = self.backend.optimize(&self.config.file_path) {
                tracing::warn!("file layout optimization failed: {}", e);
            }
        }

        let info = &mut session.info;
        info.raw_video_frames = session.raw_video.as_ref().map_or(0, TrackState::frames_written);
        info.encoded_video_frames = session
            .encoded_video
            .as_ref()
            .map_or(0, TrackState::frames_written);
        info.raw_audio_frames = session.raw_audio.as_ref().map_or(0, TrackState::frames_written);
        info.encoded_audio_frames = session
            .encoded_audio
            .as_ref()
            .map_or(0, TrackState::frames_written);

        tracing::info!(
            session = %info.id,
            video_frames = info.raw_video_frames + info.encoded_video_frames,
            audio_frames = info.raw_audio_frames + info.encoded_audio_frames,
            gap_samples = info.audio_gap_samples,
            dropped = info.dropped_frames,
            "recording session finished"
        );

        *self.shared_state.write() = RecorderState::Idle;
    }
}
