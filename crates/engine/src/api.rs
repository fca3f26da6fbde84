use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::capture::{
    CaptureCoordinator, CaptureMode, Handoff, PendingRecording, RecordTarget, RecordedMedia,
    SessionId, SessionPhase, StopOutcome,
};
use crate::clock::{PlaybackClock, SeekLock};
use crate::config::EngineConfig;
use crate::cue::{CueTrack, TimedCue};
use crate::error::{EngineError, Result};
use crate::library::{CapturedClip, ClipLibrary, ClipStore, ClipSummary};
use crate::marker::{
    LoopState, MarkerEffect, MarkerEvent, MarkerMachine, MarkerMode, ensure_markable,
};
use crate::note::{
    FlashcardSink, NoteContext, NoteDraft, NoteMedia, NoteRequest, attachment_filename, build_note,
};
use crate::surface::{MediaSurface, Recorder, Screenshot};

/// Media item the engine is attached to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: String,
    pub title: Option<String>,
    pub duration: f64,
    pub has_video: bool,
    pub has_audio: bool,
}

/// Which of the two subtitle tracks a command or event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackSlot {
    /// Target-language line, used as the note sentence.
    Primary,
    /// Native-language line, used as the note translation.
    Secondary,
}

/// Subtitle-relative seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CueStep {
    Previous,
    Replay,
    Next,
}

/// Commands accepted by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Attaches a new media item. Loops, subtitles and any recording of the
    /// previous item are dropped.
    LoadMedia(MediaItem),
    /// Replaces one subtitle track wholesale.
    LoadSubtitles {
        slot: TrackSlot,
        cues: Vec<TimedCue>,
    },
    /// Shifts a track in seconds. Positive values show lines later.
    SetSubtitleOffset {
        slot: TrackSlot,
        offset: f64,
    },
    SetMarkerMode(MarkerMode),
    /// Playback position reported by the surface adapter.
    Sample {
        time: f64,
        buffering: bool,
    },
    /// The surface finished a seek the engine requested.
    SeekCompleted {
        time: f64,
    },
    Seek {
        time: f64,
    },
    StepCue(CueStep),
    /// Presses the marker button at media time `at`. In loop mode two presses
    /// arm and then close an A/B loop; in record mode they start and stop an
    /// open-ended recording.
    Mark {
        at: f64,
    },
    ClearLoop,
    CaptureScreenshot,
    /// Records `target` from the surface. `end: None` records until
    /// [`Command::StopRecording`].
    Record {
        target: RecordTarget,
        mode: CaptureMode,
    },
    StopRecording,
    RecorderStarted {
        session: SessionId,
    },
    RecorderData {
        session: SessionId,
        chunk: Vec<u8>,
    },
    RecorderStopped {
        session: SessionId,
    },
    RecorderFailed {
        session: SessionId,
        reason: String,
    },
    /// Builds a note at the current position and delivers it to the
    /// flashcard sink, after recording its audio when requested.
    CreateFlashcard(NoteRequest),
    ListClips,
    DeleteClip {
        id: Uuid,
    },
}

/// Events emitted by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    MediaChanged(MediaItem),
    SubtitlesLoaded {
        slot: TrackSlot,
        cue_count: usize,
    },
    CueChanged {
        slot: TrackSlot,
        index: Option<usize>,
        text: Option<String>,
    },
    LoopChanged(LoopState),
    SeekRequested {
        time: f64,
    },
    RecordingChanged {
        session: SessionId,
        phase: SessionPhase,
    },
    ScreenshotCaptured(Screenshot),
    ClipCaptured(ClipSummary),
    ClipsListed(Vec<ClipSummary>),
    ClipDeleted {
        id: Uuid,
    },
    PreviewReleased {
        id: Uuid,
    },
    NoteDelivered {
        term: String,
    },
    Notification(Notification),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Classification of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    /// The platform cannot do what was asked; nothing was started.
    UnsupportedCapability,
    /// The request did not fit the current state and was corrected.
    InvalidTransition,
    /// Clip storage or note delivery failed.
    Storage,
    Other,
}

impl From<&EngineError> for NotificationKind {
    fn from(value: &EngineError) -> Self {
        match value {
            EngineError::MissingAudioTrack
            | EngineError::NoSupportedFormat { .. }
            | EngineError::FrameUnavailable { .. }
            | EngineError::TaintedFrame
            | EngineError::ImageEncode(_) => Self::UnsupportedCapability,
            EngineError::MediaNotLoaded
            | EngineError::EmptyMedia { .. }
            | EngineError::InvalidLoopRange { .. }
            | EngineError::InvalidRecordWindow { .. }
            | EngineError::RecordingInProgress { .. } => Self::InvalidTransition,
            EngineError::StoreIo { .. }
            | EngineError::StoreSerialization { .. }
            | EngineError::Storage { .. }
            | EngineError::FlashcardDelivery { .. } => Self::Storage,
            _ => Self::Other,
        }
    }
}

/// User-facing message emitted as an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub severity: Severity,
    pub kind: NotificationKind,
    pub message: String,
}

impl Notification {
    pub fn from_error(error: &EngineError) -> Self {
        let kind = NotificationKind::from(error);
        let severity = match (error, kind) {
            (EngineError::RecordingCancelled { .. }, _) => Severity::Info,
            (_, NotificationKind::UnsupportedCapability) => Severity::Warning,
            _ => Severity::Error,
        };
        Self {
            severity,
            kind,
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct SubtitleTrack {
    cues: CueTrack,
    offset: f64,
    active: Option<usize>,
}

/// Playback-synchronized subtitle, loop and capture engine.
///
/// Owned by one thread. Adapters feed it [`Command`]s, including time samples
/// and recorder callbacks, and apply the [`Event`]s it returns.
pub struct Engine<S, R> {
    config: EngineConfig,
    surface: S,
    recorder: R,
    media: Option<MediaItem>,
    clock: PlaybackClock,
    seek_lock: SeekLock,
    primary: SubtitleTrack,
    secondary: SubtitleTrack,
    marker: MarkerMachine,
    loop_state: LoopState,
    capture: CaptureCoordinator,
    library: ClipLibrary,
    flashcards: Arc<dyn FlashcardSink>,
}

impl<S, R> Engine<S, R>
where
    S: MediaSurface,
    R: Recorder,
{
    pub fn new(
        config: EngineConfig,
        surface: S,
        recorder: R,
        store: Box<dyn ClipStore + Send>,
        flashcards: Arc<dyn FlashcardSink>,
    ) -> Self {
        let capture = CaptureCoordinator::new(
            config.video_encoding_formats(),
            config.audio_encoding_formats(),
            config.recorder_timeslice(),
        );
        Self {
            marker: MarkerMachine::new(config.marker_mode, config.loop_epsilon_seconds),
            seek_lock: SeekLock::new(config.seek_lock_max_samples),
            config,
            surface,
            recorder,
            media: None,
            clock: PlaybackClock::default(),
            primary: SubtitleTrack::default(),
            secondary: SubtitleTrack::default(),
            loop_state: LoopState::None,
            capture,
            library: ClipLibrary::new(store),
            flashcards,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn media(&self) -> Option<&MediaItem> {
        self.media.as_ref()
    }

    pub fn clock(&self) -> PlaybackClock {
        self.clock
    }

    pub fn loop_state(&self) -> LoopState {
        self.loop_state
    }

    pub fn marker_mode(&self) -> MarkerMode {
        self.marker.mode()
    }

    pub fn recording_phase(&self) -> SessionPhase {
        self.capture.phase()
    }

    pub fn active_cue(&self, slot: TrackSlot) -> Option<&TimedCue> {
        let track = self.track(slot);
        track.active.and_then(|index| track.cues.get(index))
    }

    pub fn clips(&self) -> Vec<ClipSummary> {
        self.library.list()
    }

    /// Applies one command and returns emitted events.
    pub fn handle_command(&mut self, command: Command) -> Result<Vec<Event>> {
        match command {
            Command::LoadMedia(media) => Ok(self.load_media(media)),
            Command::LoadSubtitles { slot, cues } => Ok(self.load_subtitles(slot, cues)),
            Command::SetSubtitleOffset { slot, offset } => self.set_subtitle_offset(slot, offset),
            Command::SetMarkerMode(mode) => Ok(self.set_marker_mode(mode)),
            Command::Sample { time, buffering } => self.sample(time, buffering),
            Command::SeekCompleted { time } => Ok(self.seek_completed(time)),
            Command::Seek { time } => self.seek(time),
            Command::StepCue(step) => self.step_cue(step),
            Command::Mark { at } => self.mark(at),
            Command::ClearLoop => Ok(self.clear_loop()),
            Command::CaptureScreenshot => self.capture_screenshot(),
            Command::Record { target, mode } => self.record(target, mode),
            Command::StopRecording => Ok(self.stop_recording()),
            Command::RecorderStarted { session } => Ok(self.recorder_started(session)),
            Command::RecorderData { session, chunk } => {
                self.capture.on_data(session, chunk);
                Ok(Vec::new())
            }
            Command::RecorderStopped { session } => Ok(self.recorder_stopped(session)),
            Command::RecorderFailed { session, reason } => {
                Ok(self.recorder_failed(session, reason))
            }
            Command::CreateFlashcard(request) => self.create_flashcard(request),
            Command::ListClips => Ok(vec![Event::ClipsListed(self.library.list())]),
            Command::DeleteClip { id } => Ok(self.library.delete(id)),
        }
    }

    /// Like [`Engine::handle_command`], but reports failures as
    /// [`Event::Notification`] instead of returning them.
    pub fn dispatch(&mut self, command: Command) -> Vec<Event> {
        match self.handle_command(command) {
            Ok(events) => events,
            Err(error) => {
                warn!(%error, "command failed");
                vec![Event::Notification(Notification::from_error(&error))]
            }
        }
    }

    fn load_media(&mut self, media: MediaItem) -> Vec<Event> {
        let mut events = self.cancel_recording();
        events.extend(self.apply_marker(MarkerEvent::MediaChanged));

        self.clock = PlaybackClock::default();
        self.seek_lock.release();
        self.primary = SubtitleTrack::default();
        self.secondary = SubtitleTrack::default();

        info!(
            media = %media.id,
            duration = media.duration,
            has_video = media.has_video,
            has_audio = media.has_audio,
            "media loaded"
        );
        events.push(Event::MediaChanged(media.clone()));
        events.extend(self.library.switch_owner(Some(media.id.clone())));
        self.media = Some(media);
        events
    }

    fn load_subtitles(&mut self, slot: TrackSlot, cues: Vec<TimedCue>) -> Vec<Event> {
        let track = self.track_mut(slot);
        track.cues = CueTrack::new(cues);
        track.active = None;
        let cue_count = track.cues.len();

        let mut events = vec![Event::SubtitlesLoaded { slot, cue_count }];
        events.extend(self.refresh_cues());
        events
    }

    fn set_subtitle_offset(&mut self, slot: TrackSlot, offset: f64) -> Result<Vec<Event>> {
        if !offset.is_finite() {
            return Ok(Vec::new());
        }
        debug!(?slot, offset, "subtitle offset changed");
        self.track_mut(slot).offset = offset;
        Ok(self.refresh_cues())
    }

    fn set_marker_mode(&mut self, mode: MarkerMode) -> Vec<Event> {
        if self.marker.mode() == mode {
            return Vec::new();
        }
        let events = self.clear_loop();
        self.marker.set_mode(mode);
        info!(?mode, "marker mode changed");
        events
    }

    fn sample(&mut self, time: f64, buffering: bool) -> Result<Vec<Event>> {
        if !time.is_finite() {
            return Ok(Vec::new());
        }
        if self.seek_lock.should_drop(time) {
            debug!(time, target = ?self.seek_lock.target(), "sample dropped during seek");
            return Ok(Vec::new());
        }

        self.clock.observe(time, buffering);
        self.clock.is_seeking = false;

        let mut events = self.refresh_cues();
        let outcome = self
            .capture
            .on_sample(time, &mut self.surface, &mut self.recorder);
        events.extend(self.stop_events(outcome));
        events.extend(self.apply_marker(MarkerEvent::Sample { at: time }));
        Ok(events)
    }

    fn seek_completed(&mut self, time: f64) -> Vec<Event> {
        self.seek_lock.release();
        self.clock.is_seeking = false;
        if time.is_finite() {
            self.clock.current_time = time;
        }
        self.refresh_cues()
    }

    fn seek(&mut self, time: f64) -> Result<Vec<Event>> {
        let media = self.media.as_ref().ok_or(EngineError::MediaNotLoaded)?;
        let time = time.clamp(0.0, media.duration.max(0.0));
        Ok(vec![self.request_seek(time)])
    }

    fn step_cue(&mut self, step: CueStep) -> Result<Vec<Event>> {
        if self.media.is_none() {
            return Err(EngineError::MediaNotLoaded);
        }
        let now = self.clock.current_time;
        let track = &self.primary;
        let active_start = track
            .active
            .and_then(|index| track.cues.get(index))
            .map(|cue| cue.start + track.offset);

        let target = match step {
            CueStep::Replay => active_start,
            CueStep::Previous => track
                .cues
                .previous_start_before(active_start.unwrap_or(now), track.offset),
            CueStep::Next => track.cues.next_start_after(now, track.offset),
        };
        match target {
            Some(time) => self.seek(time),
            None => {
                debug!(?step, now, "no subtitle line to step to");
                Ok(Vec::new())
            }
        }
    }

    fn mark(&mut self, at: f64) -> Result<Vec<Event>> {
        let media_id = self.media.as_ref().map(|media| media.id.as_str());
        let duration = self.media.as_ref().map_or(0.0, |media| media.duration);
        if let Err(notification) = ensure_markable(media_id, duration) {
            debug!(at, "mark ignored: {}", notification.message);
            return Ok(vec![Event::Notification(notification)]);
        }
        Ok(self.apply_marker(MarkerEvent::Mark { at }))
    }

    fn clear_loop(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        let recording_by_marker = self.marker.mode() == MarkerMode::Record
            && matches!(self.loop_state, LoopState::ArmedAt(_));
        if recording_by_marker {
            events.extend(self.stop_capture());
        }
        events.extend(self.apply_marker(MarkerEvent::Clear));
        events
    }

    fn capture_screenshot(&mut self) -> Result<Vec<Event>> {
        if self.media.is_none() {
            return Err(EngineError::MediaNotLoaded);
        }
        let (screenshot, notification) = self.try_screenshot();
        Ok(screenshot
            .map(Event::ScreenshotCaptured)
            .into_iter()
            .chain(notification.map(Event::Notification))
            .collect())
    }

    fn record(&mut self, mut target: RecordTarget, mode: CaptureMode) -> Result<Vec<Event>> {
        let media = self.media.as_ref().ok_or(EngineError::MediaNotLoaded)?;
        if let Some(end) = target.end {
            target.end = Some(end.min(media.duration));
        }
        let owner = Some(media.id.clone());
        self.begin_recording(target, mode, owner, None)
    }

    fn stop_recording(&mut self) -> Vec<Event> {
        let mut events = self.stop_capture();
        if self.marker.mode() == MarkerMode::Record
            && matches!(self.loop_state, LoopState::ArmedAt(_))
        {
            self.loop_state = LoopState::None;
            events.push(Event::LoopChanged(LoopState::None));
        }
        events
    }

    fn recorder_started(&mut self, session: SessionId) -> Vec<Event> {
        if !self.capture.on_started(session) {
            return Vec::new();
        }
        vec![Event::RecordingChanged {
            session,
            phase: SessionPhase::Active,
        }]
    }

    fn recorder_stopped(&mut self, session: SessionId) -> Vec<Event> {
        let now = self.clock.current_time;
        let Some(handoff) = self.capture.on_stopped(session, &mut self.surface, now) else {
            return Vec::new();
        };
        let mut events = vec![Event::RecordingChanged {
            session,
            phase: SessionPhase::Idle,
        }];
        events.extend(self.disarm_record_marker());
        match handoff {
            Handoff::Caller(caller_events) => events.extend(caller_events),
            Handoff::Clip(recording) => {
                events.extend(self.library.add(CapturedClip::from_recording(recording)));
            }
        }
        events
    }

    fn recorder_failed(&mut self, session: SessionId, reason: String) -> Vec<Event> {
        let error = EngineError::Recorder {
            session,
            reason: reason.clone(),
        };
        let Some(caller_events) = self.capture.on_failed(session, reason) else {
            return Vec::new();
        };
        self.surface.pause();
        let mut events = vec![
            Event::RecordingChanged {
                session,
                phase: SessionPhase::Idle,
            },
            Event::Notification(Notification::from_error(&error)),
        ];
        events.extend(self.disarm_record_marker());
        events.extend(caller_events);
        events
    }

    fn create_flashcard(&mut self, request: NoteRequest) -> Result<Vec<Event>> {
        let media = self.media.clone().ok_or(EngineError::MediaNotLoaded)?;
        let (screenshot, notification) = self.try_screenshot();
        let mut events: Vec<Event> = notification.map(Event::Notification).into_iter().collect();

        let context = NoteContext {
            media_id: media.id.clone(),
            media_title: media.title.clone(),
            current_time: self.clock.current_time,
            duration: media.duration,
            primary_cue: self.active_cue(TrackSlot::Primary).cloned(),
            primary_offset: self.primary.offset,
            secondary_cue: self.active_cue(TrackSlot::Secondary).cloned(),
            fallback_padding: self.config.fallback_audio_padding_seconds,
        };
        let draft = build_note(&request, &context, screenshot.as_ref());
        let window = draft.audio_window;

        if !(request.attach_audio && media.has_audio && window.duration() > 0.0) {
            events.extend(deliver_note(self.flashcards.as_ref(), &draft));
            return Ok(events);
        }

        let target = RecordTarget {
            start: window.start,
            end: Some(window.end),
            filename: attachment_filename(&media.id, &window, "audio"),
        };
        let sink = Arc::clone(&self.flashcards);
        let pending_draft = draft.clone();
        let pending: PendingRecording =
            Box::new(move |result| attach_audio_and_deliver(sink.as_ref(), pending_draft, result));

        match self.begin_recording(target, CaptureMode::Audio, Some(media.id), Some(pending)) {
            Ok(recording_events) => events.extend(recording_events),
            Err(error) => {
                warn!(%error, "note audio could not be recorded");
                events.push(Event::Notification(Notification::from_error(&error)));
                events.extend(deliver_note(self.flashcards.as_ref(), &draft));
            }
        }
        Ok(events)
    }

    fn begin_recording(
        &mut self,
        target: RecordTarget,
        mode: CaptureMode,
        owner: Option<String>,
        pending: Option<PendingRecording>,
    ) -> Result<Vec<Event>> {
        let start = target.start;
        let (session, seeked) = self.capture.begin(
            &mut self.surface,
            &mut self.recorder,
            target,
            mode,
            owner,
            pending,
        )?;

        let mut events = Vec::new();
        if seeked {
            self.seek_lock.engage(start);
            self.clock.is_seeking = true;
            events.push(Event::SeekRequested { time: start });
        }
        events.push(Event::RecordingChanged {
            session,
            phase: SessionPhase::Starting,
        });
        Ok(events)
    }

    fn stop_capture(&mut self) -> Vec<Event> {
        let at = self.clock.current_time;
        let outcome = self.capture.stop(&mut self.surface, &mut self.recorder, at);
        self.stop_events(outcome)
    }

    fn stop_events(&mut self, outcome: StopOutcome) -> Vec<Event> {
        match outcome {
            StopOutcome::NotRunning => Vec::new(),
            StopOutcome::Stopping(session) => vec![Event::RecordingChanged {
                session,
                phase: SessionPhase::Stopping,
            }],
            StopOutcome::Failed {
                session,
                error,
                events: caller_events,
            } => {
                let mut events = vec![
                    Event::RecordingChanged {
                        session,
                        phase: SessionPhase::Idle,
                    },
                    Event::Notification(Notification::from_error(&error)),
                ];
                events.extend(self.disarm_record_marker());
                events.extend(caller_events);
                events
            }
        }
    }

    fn cancel_recording(&mut self) -> Vec<Event> {
        let Some(session) = self.capture.session().map(|session| session.id) else {
            return Vec::new();
        };
        let caller_events = self.capture.cancel(&mut self.surface, &mut self.recorder);
        let mut events = vec![Event::RecordingChanged {
            session,
            phase: SessionPhase::Idle,
        }];
        events.extend(caller_events);
        events
    }

    fn disarm_record_marker(&mut self) -> Vec<Event> {
        if self.marker.mode() == MarkerMode::Record
            && matches!(self.loop_state, LoopState::ArmedAt(_))
        {
            self.loop_state = LoopState::None;
            return vec![Event::LoopChanged(LoopState::None)];
        }
        Vec::new()
    }

    fn apply_marker(&mut self, event: MarkerEvent) -> Vec<Event> {
        let (next, effects) = self.marker.transition(self.loop_state, event);
        let mut events = Vec::new();
        if next != self.loop_state {
            self.loop_state = next;
            events.push(Event::LoopChanged(next));
        }

        for effect in effects {
            match effect {
                MarkerEffect::Seek { to } => {
                    debug!(to, "loop jump");
                    events.push(self.request_seek(to));
                }
                MarkerEffect::StartRecording { start } => {
                    events.extend(self.start_marker_recording(start));
                }
                MarkerEffect::StopRecording => events.extend(self.stop_capture()),
                MarkerEffect::Notify(notification) => {
                    events.push(Event::Notification(notification));
                }
            }
        }
        events
    }

    fn start_marker_recording(&mut self, start: f64) -> Vec<Event> {
        let Some(media) = self.media.as_ref() else {
            return Vec::new();
        };
        let target = RecordTarget {
            start,
            end: None,
            filename: format!("{}_{}", media.id, crate::time::seconds_to_millis(start)),
        };
        let owner = Some(media.id.clone());
        match self.begin_recording(target, self.config.record_capture_mode, owner, None) {
            Ok(events) => events,
            Err(error) => {
                warn!(%error, start, "record marker could not start recording");
                self.loop_state = LoopState::None;
                vec![
                    Event::LoopChanged(LoopState::None),
                    Event::Notification(Notification::from_error(&error)),
                ]
            }
        }
    }

    fn request_seek(&mut self, time: f64) -> Event {
        self.surface.seek_to(time);
        self.seek_lock.engage(time);
        self.clock.is_seeking = true;
        Event::SeekRequested { time }
    }

    fn try_screenshot(&self) -> (Option<Screenshot>, Option<Notification>) {
        match self.capture.screenshot(&self.surface) {
            Ok(screenshot) => (Some(screenshot), None),
            Err(error) => {
                warn!(%error, "screenshot unavailable");
                (None, Some(Notification::from_error(&error)))
            }
        }
    }

    fn refresh_cues(&mut self) -> Vec<Event> {
        let time = self.clock.current_time;
        [TrackSlot::Primary, TrackSlot::Secondary]
            .into_iter()
            .filter_map(|slot| {
                let track = self.track_mut(slot);
                let next = track.cues.resolve(time, track.offset, track.active);
                if next == track.active {
                    return None;
                }
                track.active = next;
                let text = next
                    .and_then(|index| track.cues.get(index))
                    .map(|cue| cue.text.clone());
                Some(Event::CueChanged {
                    slot,
                    index: next,
                    text,
                })
            })
            .collect()
    }

    fn track(&self, slot: TrackSlot) -> &SubtitleTrack {
        match slot {
            TrackSlot::Primary => &self.primary,
            TrackSlot::Secondary => &self.secondary,
        }
    }

    fn track_mut(&mut self, slot: TrackSlot) -> &mut SubtitleTrack {
        match slot {
            TrackSlot::Primary => &mut self.primary,
            TrackSlot::Secondary => &mut self.secondary,
        }
    }
}

fn deliver_note(sink: &dyn FlashcardSink, draft: &NoteDraft) -> Vec<Event> {
    match sink.deliver(draft) {
        Ok(()) => {
            info!(
                term = %draft.term,
                has_image = draft.image.is_some(),
                has_audio = draft.audio.is_some(),
                "note delivered"
            );
            vec![Event::NoteDelivered {
                term: draft.term.clone(),
            }]
        }
        Err(error) => {
            warn!(%error, term = %draft.term, "note delivery failed");
            vec![Event::Notification(Notification::from_error(&error))]
        }
    }
}

fn attach_audio_and_deliver(
    sink: &dyn FlashcardSink,
    mut draft: NoteDraft,
    recording: std::result::Result<RecordedMedia, EngineError>,
) -> Vec<Event> {
    let mut events = Vec::new();
    match recording {
        Ok(recording) => {
            draft.audio = Some(NoteMedia {
                filename: attachment_filename(
                    &draft.media_id,
                    &draft.audio_window,
                    recording.format.extension(),
                ),
                mime_type: recording.format.mime_type,
                bytes: recording.bytes,
            });
        }
        Err(error) => {
            events.push(Event::Notification(Notification::from_error(&error)));
        }
    }
    events.extend(deliver_note(sink, &draft));
    events
}
