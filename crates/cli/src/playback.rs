//! File-backed playback surface and recorder driven by the ffmpeg CLI.
//!
//! There is no display: playback is a wall clock scaled by a rate, and
//! frames and segments are decoded from the source file on demand.

use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use media_ffmpeg::{MediaInfo, SegmentRequest, extract_segment, grab_frame_rgba};
use subclip_engine::{
    CaptureMode, CaptureStream, Command, EncodingFormat, EngineError, MediaItem, MediaSurface,
    Recorder, Result, SessionId, VideoFrame,
};
use tracing::{debug, info, warn};

/// Shortest segment handed to the encoder.
const MIN_SEGMENT_SECONDS: f64 = 0.05;

#[derive(Debug)]
struct ClockState {
    position: f64,
    playing_since: Option<Instant>,
    rate: f64,
    duration: f64,
}

impl ClockState {
    fn now(&self) -> f64 {
        let elapsed = self
            .playing_since
            .map_or(0.0, |since| since.elapsed().as_secs_f64() * self.rate);
        (self.position + elapsed).clamp(0.0, self.duration)
    }
}

/// Playback position shared by the surface, the recorder and the sampler.
#[derive(Debug, Clone)]
pub struct SharedClock {
    state: Arc<Mutex<ClockState>>,
}

impl SharedClock {
    pub fn new(duration: f64, rate: f64) -> Self {
        Self {
            state: Arc::new(Mutex::new(ClockState {
                position: 0.0,
                playing_since: None,
                rate: if rate.is_finite() && rate > 0.0 { rate } else { 1.0 },
                duration: duration.max(0.0),
            })),
        }
    }

    pub fn now(&self) -> f64 {
        self.lock().now()
    }

    pub fn is_playing(&self) -> bool {
        self.lock().playing_since.is_some()
    }

    /// True once the position has reached the end of the media.
    pub fn at_end(&self) -> bool {
        let state = self.lock();
        state.now() >= state.duration
    }

    pub fn play(&self) {
        let mut state = self.lock();
        if state.playing_since.is_none() {
            state.playing_since = Some(Instant::now());
        }
    }

    pub fn pause(&self) {
        let mut state = self.lock();
        state.position = state.now();
        state.playing_since = None;
    }

    pub fn seek(&self, time: f64) {
        let mut state = self.lock();
        state.position = time.clamp(0.0, state.duration);
        if state.playing_since.is_some() {
            state.playing_since = Some(Instant::now());
        }
    }

    fn lock(&self) -> MutexGuard<'_, ClockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// [`MediaSurface`] over a local media file.
///
/// Seeks complete immediately; completion is reported back through the
/// engine's command channel like any other surface callback.
pub struct FileSurface {
    info: MediaInfo,
    clock: SharedClock,
    commands: Sender<Command>,
}

impl FileSurface {
    pub fn new(info: MediaInfo, clock: SharedClock, commands: Sender<Command>) -> Self {
        Self {
            info,
            clock,
            commands,
        }
    }

    pub fn path(&self) -> &Path {
        &self.info.path
    }

    /// Describes the file as the engine's media item; the id is the file stem.
    pub fn media_item(&self) -> MediaItem {
        media_item(&self.info)
    }
}

pub fn media_item(info: &MediaInfo) -> MediaItem {
    let id = info
        .path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| info.path.to_string_lossy().into_owned());
    MediaItem {
        id,
        title: info
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned()),
        duration: info.duration_seconds.unwrap_or(0.0),
        has_video: info.video_track_count() > 0,
        has_audio: info.audio_track_count() > 0,
    }
}

impl MediaSurface for FileSurface {
    fn current_time(&self) -> f64 {
        self.clock.now()
    }

    fn seek_to(&mut self, time: f64) {
        self.clock.seek(time);
        let time = self.clock.now();
        if self.commands.send(Command::SeekCompleted { time }).is_err() {
            debug!(time, "engine gone before seek completed");
        }
    }

    fn play(&mut self) {
        self.clock.play();
    }

    fn pause(&mut self) {
        self.clock.pause();
    }

    fn grab_frame(&self) -> Result<VideoFrame> {
        let at = self.clock.now();
        let frame = grab_frame_rgba(&self.info.path, at).map_err(|err| EngineError::Surface {
            reason: err.to_string(),
        })?;
        Ok(VideoFrame {
            width: frame.width,
            height: frame.height,
            ready: true,
            rgba: Arc::from(frame.rgba),
        })
    }

    fn capture_stream(&self, mode: CaptureMode) -> Result<CaptureStream> {
        let video_tracks = match mode {
            CaptureMode::Video => self.info.video_track_count(),
            CaptureMode::Audio => 0,
        };
        Ok(CaptureStream {
            video_tracks,
            audio_tracks: self.info.audio_track_count(),
            source: self.info.path.to_string_lossy().into_owned(),
        })
    }
}

#[derive(Debug)]
struct ActiveSegment {
    session: SessionId,
    start: f64,
    mime_type: String,
    timeslice: Duration,
}

/// [`Recorder`] that re-encodes the recorded span from the source file.
///
/// `start` marks the playhead and `stop` encodes `[start, playhead)` on a
/// background thread, streaming the result back as timeslice-sized chunks.
pub struct FfmpegRecorder {
    input: PathBuf,
    clock: SharedClock,
    commands: Sender<Command>,
    video_formats: Vec<EncodingFormat>,
    audio_formats: Vec<EncodingFormat>,
    active: Option<ActiveSegment>,
}

impl FfmpegRecorder {
    pub fn new(
        input: impl Into<PathBuf>,
        clock: SharedClock,
        commands: Sender<Command>,
        video_formats: Vec<EncodingFormat>,
        audio_formats: Vec<EncodingFormat>,
    ) -> Self {
        Self {
            input: input.into(),
            clock,
            commands,
            video_formats,
            audio_formats,
            active: None,
        }
    }

    /// Builds a recorder offering what the local ffmpeg can encode.
    pub fn detect(
        input: impl Into<PathBuf>,
        clock: SharedClock,
        commands: Sender<Command>,
    ) -> Self {
        let (video, audio) = match media_ffmpeg::list_encoders() {
            Ok(encoders) => (
                media_ffmpeg::supported_mime_types(&encoders, false),
                media_ffmpeg::supported_mime_types(&encoders, true),
            ),
            Err(err) => {
                warn!(%err, "ffmpeg encoders unavailable, recording disabled");
                (Vec::new(), Vec::new())
            }
        };
        debug!(?video, ?audio, "recorder formats detected");
        Self::new(
            input,
            clock,
            commands,
            video.into_iter().map(EncodingFormat::new).collect(),
            audio.into_iter().map(EncodingFormat::new).collect(),
        )
    }
}

impl Recorder for FfmpegRecorder {
    fn supported_formats(&self, mode: CaptureMode) -> Vec<EncodingFormat> {
        match mode {
            CaptureMode::Video => self.video_formats.clone(),
            CaptureMode::Audio => self.audio_formats.clone(),
        }
    }

    fn start(
        &mut self,
        session: SessionId,
        stream: &CaptureStream,
        format: &EncodingFormat,
        timeslice: Duration,
    ) -> Result<()> {
        if let Some(active) = &self.active {
            return Err(EngineError::Recorder {
                session,
                reason: format!("session {} still encoding", active.session),
            });
        }
        let start = self.clock.now();
        info!(
            session,
            start,
            mime_type = %format.mime_type,
            source = %stream.source,
            "recording started"
        );
        self.active = Some(ActiveSegment {
            session,
            start,
            mime_type: format.mime_type.clone(),
            timeslice,
        });
        self.commands
            .send(Command::RecorderStarted { session })
            .map_err(|_| EngineError::Recorder {
                session,
                reason: "engine command channel closed".to_string(),
            })
    }

    fn stop(&mut self, session: SessionId) -> Result<()> {
        let Some(active) = self.active.take_if(|active| active.session == session) else {
            debug!(session, "stop for unknown recorder session ignored");
            return Ok(());
        };
        let end = self.clock.now().max(active.start + MIN_SEGMENT_SECONDS);
        let request = SegmentRequest {
            input: self.input.clone(),
            start_seconds: active.start,
            end_seconds: end,
            mime_type: active.mime_type,
        };
        let commands = self.commands.clone();
        let timeslice = active.timeslice;

        thread::Builder::new()
            .name(format!("subclip-encode-{session}"))
            .spawn(move || encode_segment(session, &request, timeslice, &commands))
            .map(|_| ())
            .map_err(|err| EngineError::Recorder {
                session,
                reason: format!("spawn encoder thread: {err}"),
            })
    }
}

fn encode_segment(
    session: SessionId,
    request: &SegmentRequest,
    timeslice: Duration,
    commands: &Sender<Command>,
) {
    let outcome = match extract_segment(request) {
        Ok(bytes) => {
            let duration = request.end_seconds - request.start_seconds;
            let chunk_len = chunk_len(bytes.len(), duration, timeslice);
            let delivered = bytes.chunks(chunk_len).all(|chunk| {
                commands
                    .send(Command::RecorderData {
                        session,
                        chunk: chunk.to_vec(),
                    })
                    .is_ok()
            });
            debug!(session, bytes = bytes.len(), chunk_len, "segment encoded");
            delivered && commands.send(Command::RecorderStopped { session }).is_ok()
        }
        Err(err) => {
            warn!(session, %err, "segment encode failed");
            commands
                .send(Command::RecorderFailed {
                    session,
                    reason: err.to_string(),
                })
                .is_ok()
        }
    };
    if !outcome {
        debug!(session, "engine gone before recording was delivered");
    }
}

/// Bytes per chunk so that `total` bytes spanning `duration` seconds arrive
/// in pieces covering roughly one `timeslice` each.
fn chunk_len(total: usize, duration: f64, timeslice: Duration) -> usize {
    if total == 0 || duration.is_nan() || duration <= 0.0 {
        return total.max(1);
    }
    let slices = (duration / timeslice.as_secs_f64()).ceil().max(1.0);
    (total as f64 / slices).ceil().max(1.0) as usize
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::mpsc;
    use std::time::Duration;

    use media_ffmpeg::{MediaInfo, StreamInfo, StreamKind};
    use subclip_engine::{
        CaptureMode, CaptureStream, Command, EncodingFormat, MediaSurface, Recorder,
    };

    use super::{FfmpegRecorder, FileSurface, SharedClock, chunk_len, media_item};

    fn info(kinds: &[StreamKind]) -> MediaInfo {
        MediaInfo {
            path: PathBuf::from("/media/ep01.mkv"),
            streams: kinds
                .iter()
                .enumerate()
                .map(|(index, kind)| StreamInfo {
                    index: index as u32,
                    kind: *kind,
                    codec_name: None,
                    width: None,
                    height: None,
                    sample_rate: None,
                    channels: None,
                })
                .collect(),
            duration_seconds: Some(30.0),
        }
    }

    #[test]
    fn paused_clock_holds_position_and_seek_clamps() {
        let clock = SharedClock::new(10.0, 1.0);
        clock.seek(4.0);
        assert_eq!(clock.now(), 4.0);
        assert!(!clock.is_playing());

        clock.seek(25.0);
        assert_eq!(clock.now(), 10.0);
        assert!(clock.at_end());
        clock.seek(-1.0);
        assert_eq!(clock.now(), 0.0);
    }

    #[test]
    fn playing_clock_advances_at_rate() {
        let clock = SharedClock::new(100.0, 50.0);
        clock.play();
        std::thread::sleep(Duration::from_millis(20));
        clock.pause();
        let position = clock.now();
        assert!(position >= 1.0, "position {position}");
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(clock.now(), position);
    }

    #[test]
    fn media_item_uses_file_stem_and_tracks() {
        let item = media_item(&info(&[StreamKind::Video, StreamKind::Audio]));
        assert_eq!(item.id, "ep01");
        assert_eq!(item.title.as_deref(), Some("ep01.mkv"));
        assert_eq!(item.duration, 30.0);
        assert!(item.has_video && item.has_audio);
    }

    #[test]
    fn seek_reports_completion_through_command_channel() {
        let (tx, rx) = mpsc::channel();
        let clock = SharedClock::new(30.0, 1.0);
        let mut surface = FileSurface::new(info(&[StreamKind::Audio]), clock, tx);

        surface.seek_to(12.5);
        assert_eq!(surface.current_time(), 12.5);
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(1)).expect("seek completion"),
            Command::SeekCompleted { time: 12.5 }
        );
    }

    #[test]
    fn audio_capture_stream_drops_video_tracks() {
        let (tx, _rx) = mpsc::channel();
        let surface = FileSurface::new(
            info(&[StreamKind::Video, StreamKind::Audio, StreamKind::Audio]),
            SharedClock::new(30.0, 1.0),
            tx,
        );
        let stream = surface.capture_stream(CaptureMode::Audio).expect("stream");
        assert_eq!((stream.video_tracks, stream.audio_tracks), (0, 2));
        let stream = surface.capture_stream(CaptureMode::Video).expect("stream");
        assert_eq!(stream.video_tracks, 1);
    }

    #[test]
    fn recorder_start_acknowledges_and_rejects_overlap() {
        let (tx, rx) = mpsc::channel();
        let clock = SharedClock::new(30.0, 1.0);
        let format = EncodingFormat::new("audio/webm");
        let mut recorder =
            FfmpegRecorder::new("/media/ep01.mkv", clock, tx, Vec::new(), vec![format.clone()]);
        let stream = CaptureStream {
            video_tracks: 0,
            audio_tracks: 1,
            source: "/media/ep01.mkv".to_string(),
        };

        assert_eq!(recorder.supported_formats(CaptureMode::Audio), vec![format.clone()]);
        assert!(recorder.supported_formats(CaptureMode::Video).is_empty());

        recorder
            .start(7, &stream, &format, Duration::from_millis(100))
            .expect("start");
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(1)).expect("started"),
            Command::RecorderStarted { session: 7 }
        );
        assert!(recorder.start(8, &stream, &format, Duration::from_millis(100)).is_err());

        // Unknown sessions are ignored.
        recorder.stop(99).expect("stop unknown");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn chunk_len_splits_by_timeslice() {
        assert_eq!(chunk_len(1000, 1.0, Duration::from_millis(100)), 100);
        assert_eq!(chunk_len(1001, 1.0, Duration::from_millis(100)), 101);
        assert_eq!(chunk_len(50, 0.0, Duration::from_millis(100)), 50);
        assert_eq!(chunk_len(0, 2.0, Duration::from_millis(100)), 1);
    }
}
