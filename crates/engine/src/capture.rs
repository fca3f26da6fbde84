use std::fmt::{Display, Formatter};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::Event;
use crate::error::{EngineError, Result};
use crate::surface::{EncodingFormat, MediaSurface, Recorder, Screenshot, encode_png};

/// Identifier of one recording session.
pub type SessionId = u64;

/// Positions closer than this to the record-in point are not re-seeked.
const SEEK_TOLERANCE_SECONDS: f64 = 0.01;

/// What a segment recording keeps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    #[default]
    Video,
    Audio,
}

impl Display for CaptureMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
        }
    }
}

/// Requested span of a recording. `end: None` records until stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordTarget {
    pub start: f64,
    pub end: Option<f64>,
    pub filename: String,
}

impl RecordTarget {
    fn validate(&self) -> Result<()> {
        let start_ok = self.start.is_finite() && self.start >= 0.0;
        let end_ok = self
            .end
            .is_none_or(|end| end.is_finite() && end > self.start);
        if start_ok && end_ok {
            Ok(())
        } else {
            Err(EngineError::InvalidRecordWindow {
                start: self.start,
                end: self.end,
            })
        }
    }
}

/// Lifecycle of the single recording session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    #[default]
    Idle,
    Starting,
    Active,
    Stopping,
}

/// State of the in-flight recording.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingSession {
    pub id: SessionId,
    pub mode: CaptureMode,
    pub target: RecordTarget,
    pub format: EncodingFormat,
    pub phase: SessionPhase,
    pub owner_video_id: Option<String>,
    chunks: Vec<Vec<u8>>,
    stopped_at: Option<f64>,
}

impl RecordingSession {
    pub fn is_active(&self) -> bool {
        self.phase != SessionPhase::Idle
    }

    pub fn buffered_bytes(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }
}

/// Bytes produced by one finished session.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedMedia {
    pub session: SessionId,
    pub mode: CaptureMode,
    pub target: RecordTarget,
    pub format: EncodingFormat,
    pub duration_seconds: f64,
    pub owner_video_id: Option<String>,
    pub bytes: Vec<u8>,
}

/// Result of asking the coordinator to stop.
#[derive(Debug)]
pub enum StopOutcome {
    /// No running session; nothing was touched.
    NotRunning,
    /// The recorder accepted the stop; its final callback is pending.
    Stopping(SessionId),
    /// The recorder refused the stop. The session is gone and `events` are
    /// whatever the waiting caller produced from `error`.
    Failed {
        session: SessionId,
        error: EngineError,
        events: Vec<Event>,
    },
}

/// One-shot continuation receiving the outcome of a recording.
pub type PendingRecording =
    Box<dyn FnOnce(std::result::Result<RecordedMedia, EngineError>) -> Vec<Event> + Send>;

/// Single-slot holder for the caller waiting on the current recording.
#[derive(Default)]
pub struct PendingSlot {
    callback: Option<PendingRecording>,
}

impl std::fmt::Debug for PendingSlot {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingSlot")
            .field("occupied", &self.callback.is_some())
            .finish()
    }
}

impl PendingSlot {
    /// Stores `callback`; refuses when another caller is already waiting.
    pub fn fill(
        &mut self,
        callback: PendingRecording,
    ) -> std::result::Result<(), PendingRecording> {
        if self.callback.is_some() {
            return Err(callback);
        }
        self.callback = Some(callback);
        Ok(())
    }

    /// Removes the waiting caller. A second call returns `None`.
    pub fn take(&mut self) -> Option<PendingRecording> {
        self.callback.take()
    }

    pub fn is_occupied(&self) -> bool {
        self.callback.is_some()
    }
}

/// What happened to a finished recording.
pub enum Handoff {
    /// A pending caller consumed the bytes; these are its events.
    Caller(Vec<Event>),
    /// Nobody was waiting; the bytes become a library clip.
    Clip(RecordedMedia),
}

/// Orchestrates screenshots and the single recording session.
#[derive(Debug)]
pub struct CaptureCoordinator {
    next_session_id: SessionId,
    session: Option<RecordingSession>,
    pending: PendingSlot,
    video_formats: Vec<EncodingFormat>,
    audio_formats: Vec<EncodingFormat>,
    timeslice: Duration,
}

impl CaptureCoordinator {
    pub fn new(
        video_formats: Vec<EncodingFormat>,
        audio_formats: Vec<EncodingFormat>,
        timeslice: Duration,
    ) -> Self {
        Self {
            next_session_id: 1,
            session: None,
            pending: PendingSlot::default(),
            video_formats,
            audio_formats,
            timeslice,
        }
    }

    pub fn session(&self) -> Option<&RecordingSession> {
        self.session.as_ref()
    }

    pub fn phase(&self) -> SessionPhase {
        self.session
            .as_ref()
            .map_or(SessionPhase::Idle, |session| session.phase)
    }

    pub fn is_idle(&self) -> bool {
        self.session.is_none()
    }

    pub fn has_pending_caller(&self) -> bool {
        self.pending.is_occupied()
    }

    /// Draws the current frame and encodes it as PNG.
    pub fn screenshot<S: MediaSurface>(&self, surface: &S) -> Result<Screenshot> {
        let at_seconds = surface.current_time();
        let frame = surface.grab_frame()?;
        let png = encode_png(&frame)?;
        debug!(
            at_seconds,
            width = frame.width,
            height = frame.height,
            bytes = png.len(),
            "screenshot captured"
        );
        Ok(Screenshot {
            at_seconds,
            width: frame.width,
            height: frame.height,
            png: png.into(),
        })
    }

    /// Starts a bounded or open-ended recording.
    ///
    /// Returns the session id and whether a seek was requested. Nothing is
    /// left running when this fails: capability checks happen before the
    /// surface or recorder is touched.
    pub fn begin<S, R>(
        &mut self,
        surface: &mut S,
        recorder: &mut R,
        target: RecordTarget,
        mode: CaptureMode,
        owner_video_id: Option<String>,
        pending: Option<PendingRecording>,
    ) -> Result<(SessionId, bool)>
    where
        S: MediaSurface,
        R: Recorder,
    {
        if let Some(session) = &self.session {
            warn!(
                session = session.id,
                phase = ?session.phase,
                "recording rejected: session in progress"
            );
            return Err(EngineError::RecordingInProgress {
                session: session.id,
            });
        }
        target.validate()?;

        let stream = surface.capture_stream(mode)?;
        if mode == CaptureMode::Audio && stream.audio_tracks == 0 {
            return Err(EngineError::MissingAudioTrack);
        }
        let format = self
            .negotiate_format(mode, &recorder.supported_formats(mode))
            .ok_or(EngineError::NoSupportedFormat { mode })?;

        let session_id = self.next_session_id;
        let seeked = (surface.current_time() - target.start).abs() > SEEK_TOLERANCE_SECONDS;
        if seeked {
            surface.seek_to(target.start);
        }
        surface.play();

        if let Err(error) = recorder.start(session_id, &stream, &format, self.timeslice) {
            surface.pause();
            return Err(error);
        }
        self.next_session_id += 1;

        if let Some(callback) = pending {
            if self.pending.fill(callback).is_err() {
                warn!(session = session_id, "pending caller slot already occupied");
            }
        }

        info!(
            session = session_id,
            %mode,
            start = target.start,
            end = ?target.end,
            format = %format.mime_type,
            seeked,
            "recording starting"
        );
        self.session = Some(RecordingSession {
            id: session_id,
            mode,
            target,
            format,
            phase: SessionPhase::Starting,
            owner_video_id,
            chunks: Vec::new(),
            stopped_at: None,
        });
        Ok((session_id, seeked))
    }

    /// Recorder confirmed start. Returns false for stale sessions.
    pub fn on_started(&mut self, session_id: SessionId) -> bool {
        let Some(session) = self.current_mut(session_id, "started") else {
            return false;
        };
        if session.phase != SessionPhase::Starting {
            return false;
        }
        session.phase = SessionPhase::Active;
        true
    }

    /// Recorder delivered one time slice.
    pub fn on_data(&mut self, session_id: SessionId, chunk: Vec<u8>) -> bool {
        let Some(session) = self.current_mut(session_id, "data") else {
            return false;
        };
        if !chunk.is_empty() {
            session.chunks.push(chunk);
        }
        true
    }

    /// Checks the target end on each accepted sample, stopping the recording
    /// once it is reached.
    pub fn on_sample<S, R>(&mut self, time: f64, surface: &mut S, recorder: &mut R) -> StopOutcome
    where
        S: MediaSurface,
        R: Recorder,
    {
        let Some(session) = &self.session else {
            return StopOutcome::NotRunning;
        };
        let running = matches!(session.phase, SessionPhase::Starting | SessionPhase::Active);
        let reached_end = session.target.end.is_some_and(|end| time >= end);
        if !(running && reached_end) {
            return StopOutcome::NotRunning;
        }

        let session_id = session.id;
        debug!(session = session_id, time, "recording reached target end");
        self.stop(surface, recorder, time)
    }

    /// Stops the current session. Idempotent: idle or already stopping
    /// sessions are left untouched.
    ///
    /// A refused stop drops the session and settles the waiting caller with
    /// the error, so the coordinator is idle afterwards either way.
    pub fn stop<S, R>(&mut self, surface: &mut S, recorder: &mut R, at: f64) -> StopOutcome
    where
        S: MediaSurface,
        R: Recorder,
    {
        let Some(session) = self.session.as_mut() else {
            return StopOutcome::NotRunning;
        };
        if !matches!(session.phase, SessionPhase::Starting | SessionPhase::Active) {
            return StopOutcome::NotRunning;
        }

        surface.pause();
        session.phase = SessionPhase::Stopping;
        session.stopped_at = Some(at);
        let session_id = session.id;
        if let Err(cause) = recorder.stop(session_id) {
            warn!(session = session_id, error = %cause, "recorder stop failed");
            let reason = match &cause {
                EngineError::Recorder { reason, .. } => reason.clone(),
                other => other.to_string(),
            };
            let error = EngineError::Recorder {
                session: session_id,
                reason: format!("recorder did not accept stop: {reason}"),
            };
            let events = self.abort(session_id, cause);
            return StopOutcome::Failed {
                session: session_id,
                error,
                events,
            };
        }
        info!(session = session_id, at, "recording stopping");
        StopOutcome::Stopping(session_id)
    }

    /// Recorder finalized. Hands the bytes to the pending caller if any.
    ///
    /// When the recorder finished on its own, before any stop was requested,
    /// the surface is paused and `now` closes the recorded span.
    pub fn on_stopped<S: MediaSurface>(
        &mut self,
        session_id: SessionId,
        surface: &mut S,
        now: f64,
    ) -> Option<Handoff> {
        self.current_mut(session_id, "stopped")?;
        let session = self.session.take()?;

        let stopped_at = match session.stopped_at {
            Some(at) => at,
            None => {
                debug!(session = session_id, now, "recorder finished without a stop request");
                surface.pause();
                now
            }
        };
        let duration_seconds = (stopped_at - session.target.start).max(0.0);
        let bytes = session.chunks.concat();
        info!(
            session = session_id,
            duration_seconds,
            bytes = bytes.len(),
            "recording finished"
        );

        let media = RecordedMedia {
            session: session.id,
            mode: session.mode,
            target: session.target,
            format: session.format,
            duration_seconds,
            owner_video_id: session.owner_video_id,
            bytes,
        };
        Some(match self.pending.take() {
            Some(callback) => Handoff::Caller(callback(Ok(media))),
            None => Handoff::Clip(media),
        })
    }

    /// Recorder reported a failure. Returns the pending caller's events, or
    /// `None` for stale sessions.
    pub fn on_failed(&mut self, session_id: SessionId, reason: String) -> Option<Vec<Event>> {
        self.current_mut(session_id, "failed")?;
        warn!(session = session_id, %reason, "recording failed");
        Some(self.abort(
            session_id,
            EngineError::Recorder {
                session: session_id,
                reason,
            },
        ))
    }

    /// Drops the current session without waiting for the recorder.
    pub fn cancel<S, R>(&mut self, surface: &mut S, recorder: &mut R) -> Vec<Event>
    where
        S: MediaSurface,
        R: Recorder,
    {
        let Some(session) = &self.session else {
            return Vec::new();
        };
        let session_id = session.id;
        if matches!(session.phase, SessionPhase::Starting | SessionPhase::Active) {
            surface.pause();
            if let Err(error) = recorder.stop(session_id) {
                debug!(session = session_id, %error, "recorder stop during cancel failed");
            }
        }
        info!(session = session_id, "recording cancelled");
        self.abort(
            session_id,
            EngineError::RecordingCancelled {
                session: session_id,
            },
        )
    }

    fn abort(&mut self, session_id: SessionId, error: EngineError) -> Vec<Event> {
        if self.session.as_ref().is_some_and(|session| session.id == session_id) {
            self.session = None;
        }
        match self.pending.take() {
            Some(callback) => callback(Err(error)),
            None => Vec::new(),
        }
    }

    fn current_mut(&mut self, session_id: SessionId, what: &str) -> Option<&mut RecordingSession> {
        match self.session.as_mut() {
            Some(session) if session.id == session_id => Some(session),
            current => {
                debug!(
                    session = session_id,
                    current = ?current.map(|session| session.id),
                    callback = what,
                    "ignoring stale recorder callback"
                );
                None
            }
        }
    }

    fn negotiate_format(
        &self,
        mode: CaptureMode,
        supported: &[EncodingFormat],
    ) -> Option<EncodingFormat> {
        let preferred = match mode {
            CaptureMode::Video => &self.video_formats,
            CaptureMode::Audio => &self.audio_formats,
        };
        preferred
            .iter()
            .find(|format| supported.contains(format))
            .cloned()
    }
}
