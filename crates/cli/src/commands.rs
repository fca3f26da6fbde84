use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, mpsc};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use media_ffmpeg::{list_encoders, probe_media, supported_mime_types};
use subclip_engine::{
    CaptureMode, ClipStore, Command, CueTrack, Engine, Event, FlashcardSink, FsClipStore,
    MarkerMode, MediaItem, NoteRequest, Notification, NotificationKind, RecordTarget, Severity,
    TrackSlot,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::playback::{FfmpegRecorder, FileSurface, SharedClock};
use crate::sinks::JsonLinesDeck;
use crate::subtitles::load_cues;
use crate::worker::{
    EngineCommandSender, EngineEventReceiver, Sampler, spawn_engine_worker, spawn_sampler,
};
use crate::{CardArgs, ClipArgs, PlayArgs, Settings, SubtitleArgs};

/// Extra time allowed for ffmpeg to encode a recorded span.
const ENCODE_GRACE: Duration = Duration::from_secs(120);
/// Longest subtitle line a flashcard is expected to record.
const NOTE_AUDIO_SPAN_SECONDS: f64 = 60.0;
const LOAD_TIMEOUT: Duration = Duration::from_secs(10);

/// One media file wired to an engine worker and a sampler.
struct Session {
    clock: SharedClock,
    commands: EngineCommandSender,
    events: EngineEventReceiver,
    media: MediaItem,
    poll: Duration,
    _sampler: Sampler,
}

impl Session {
    fn open(
        settings: &Settings,
        media_path: &Path,
        rate: f64,
        deck: JsonLinesDeck,
    ) -> Result<Self> {
        let info = probe_media(media_path)
            .with_context(|| format!("failed to probe {}", media_path.display()))?;
        let clock = SharedClock::new(info.duration_seconds.unwrap_or(0.0), rate);
        let (command_tx, command_rx) = mpsc::channel();

        let recorder = FfmpegRecorder::detect(media_path, clock.clone(), command_tx.clone());
        let surface = FileSurface::new(info, clock.clone(), command_tx.clone());
        let media = surface.media_item();
        let flashcards: Arc<dyn FlashcardSink> = Arc::new(deck);
        let engine = Engine::new(
            settings.config.clone(),
            surface,
            recorder,
            Box::new(FsClipStore::new(settings.clips_dir())),
            flashcards,
        );

        let events = spawn_engine_worker(engine, command_rx);
        let poll = settings.config.poll_interval();
        let sampler = spawn_sampler(clock.clone(), command_tx.clone(), poll);
        let session = Self {
            clock,
            commands: command_tx,
            events,
            media,
            poll,
            _sampler: sampler,
        };

        session.send(Command::LoadMedia(session.media.clone()))?;
        session.wait_for(LOAD_TIMEOUT, |event| {
            matches!(event, Event::MediaChanged(_)).then_some(Ok(()))
        })?;
        info!(media = %session.media.id, duration = session.media.duration, "media opened");
        Ok(session)
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| anyhow!("engine worker stopped"))
    }

    fn load_subtitles(&self, args: &SubtitleArgs) -> Result<()> {
        let tracks = [
            (TrackSlot::Primary, &args.subs, args.offset),
            (TrackSlot::Secondary, &args.secondary, args.secondary_offset),
        ];
        for (slot, path, offset) in tracks {
            let Some(path) = path else {
                continue;
            };
            let cues = load_cues(path)
                .with_context(|| format!("failed to load subtitles {}", path.display()))?;
            self.send(Command::LoadSubtitles { slot, cues })?;
            if offset != 0.0 {
                self.send(Command::SetSubtitleOffset { slot, offset })?;
            }
        }
        Ok(())
    }

    /// Moves the playhead the way a user scrubbing the player would and
    /// reports the new position.
    fn scrub_to(&self, time: f64) -> Result<()> {
        self.clock.seek(time);
        self.send(Command::Sample {
            time: self.clock.now(),
            buffering: false,
        })
    }

    /// Reports events until `pick` returns an outcome or `timeout` passes.
    fn wait_for<T>(
        &self,
        timeout: Duration,
        mut pick: impl FnMut(&Event) -> Option<Result<T>>,
    ) -> Result<T> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let event = match self.events.recv_timeout(remaining) {
                Ok(event) => event,
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    bail!("timed out after {:.0}s", timeout.as_secs_f64())
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => bail!("engine worker stopped"),
            };
            self.report(&event);
            if let Some(outcome) = pick(&event) {
                return outcome;
            }
        }
    }

    /// Reports events for up to one poll interval.
    fn pump(&self) -> Result<()> {
        match self.events.recv_timeout(self.poll) {
            Ok(event) => {
                self.report(&event);
                while let Ok(event) = self.events.try_recv() {
                    self.report(&event);
                }
                Ok(())
            }
            Err(mpsc::RecvTimeoutError::Timeout) => Ok(()),
            Err(mpsc::RecvTimeoutError::Disconnected) => bail!("engine worker stopped"),
        }
    }

    fn report(&self, event: &Event) {
        match event {
            Event::CueChanged { slot, text, .. } => {
                let label = match slot {
                    TrackSlot::Primary => "primary",
                    TrackSlot::Secondary => "secondary",
                };
                let text = text.as_deref().unwrap_or("");
                println!("[{:>8.2}] {label:<9} {}", self.clock.now(), text.replace('\n', " / "));
            }
            Event::LoopChanged(state) => info!(?state, "loop changed"),
            Event::SeekRequested { time } => debug!(time, "seek requested"),
            Event::RecordingChanged { session, phase } => info!(session, ?phase, "recording"),
            Event::ScreenshotCaptured(shot) => {
                debug!(
                    at = shot.at_seconds,
                    width = shot.width,
                    height = shot.height,
                    "screenshot"
                );
            }
            Event::ClipCaptured(clip) => {
                info!(clip = %clip.id, title = %clip.title, "clip captured");
            }
            Event::NoteDelivered { term } => info!(%term, "note delivered"),
            Event::Notification(notification) => log_notification(notification),
            Event::MediaChanged(_)
            | Event::SubtitlesLoaded { .. }
            | Event::ClipsListed(_)
            | Event::ClipDeleted { .. }
            | Event::PreviewReleased { .. } => debug!(?event, "engine event"),
        }
    }
}

fn log_notification(notification: &Notification) {
    let kind = notification.kind;
    match notification.severity {
        Severity::Info => info!(?kind, "{}", notification.message),
        Severity::Warning => warn!(?kind, "{}", notification.message),
        Severity::Error => error!(?kind, "{}", notification.message),
    }
}

fn default_deck(settings: &Settings) -> JsonLinesDeck {
    JsonLinesDeck::new(settings.deck_path(), settings.deck_media_dir())
}

fn capture_timeout(span_seconds: f64, rate: f64) -> Duration {
    let rate = if rate.is_finite() && rate > 0.0 { rate } else { 1.0 };
    let playback = (span_seconds.max(0.0) / rate).min(86_400.0);
    Duration::from_secs_f64(playback) + ENCODE_GRACE
}

/// Fails the wait on notifications that end the capture.
fn capture_failure<T>(notification: &Notification) -> Option<Result<T>> {
    let fatal = notification.severity == Severity::Error
        || notification.kind == NotificationKind::UnsupportedCapability;
    fatal.then(|| Err(anyhow!(notification.message.clone())))
}

pub fn probe(media: &Path) -> Result<()> {
    let info =
        probe_media(media).with_context(|| format!("failed to probe {}", media.display()))?;
    println!("{}", media.display());
    match info.duration_seconds {
        Some(duration) => println!("  duration  {duration:.3}s"),
        None => println!("  duration  unknown"),
    }
    for stream in &info.streams {
        let codec = stream.codec_name.as_deref().unwrap_or("?");
        match (stream.width, stream.height, stream.sample_rate) {
            (Some(width), Some(height), _) => {
                println!("  #{} {:?} {codec} {width}x{height}", stream.index, stream.kind);
            }
            (_, _, Some(rate)) => {
                println!("  #{} {:?} {codec} {rate} Hz", stream.index, stream.kind);
            }
            _ => println!("  #{} {:?} {codec}", stream.index, stream.kind),
        }
    }

    match list_encoders() {
        Ok(encoders) => {
            println!("  video clips  {}", supported_mime_types(&encoders, false).join(", "));
            println!("  audio clips  {}", supported_mime_types(&encoders, true).join(", "));
        }
        Err(err) => warn!(%err, "could not list ffmpeg encoders"),
    }
    Ok(())
}

pub fn cues(subtitles: &Path, at: Option<f64>, offset: f64) -> Result<()> {
    let track = CueTrack::new(
        load_cues(subtitles)
            .with_context(|| format!("failed to load subtitles {}", subtitles.display()))?,
    );

    let Some(at) = at else {
        for cue in track.cues() {
            println!(
                "{:>5} {:>9.3} --> {:<9.3} {}",
                cue.index,
                cue.start + offset,
                cue.end + offset,
                cue.text.replace('\n', " / ")
            );
        }
        return Ok(());
    };

    match track.resolve(at, offset, None).and_then(|index| track.get(index)) {
        Some(cue) => println!("{} {}", cue.index, cue.text.replace('\n', " / ")),
        None => println!("no line at {at:.3}s"),
    }
    Ok(())
}

pub fn play(settings: &Settings, args: &PlayArgs) -> Result<()> {
    let limit = args
        .seconds
        .map(Duration::try_from_secs_f64)
        .transpose()
        .context("--seconds must be a non-negative number")?;

    let session = Session::open(settings, &args.media, args.rate, default_deck(settings))?;
    session.load_subtitles(&args.subtitles)?;

    let mut start_at = args.from;
    if let Some(range) = &args.loop_range {
        let &[a, b] = range.as_slice() else {
            bail!("--loop takes a start and an end time");
        };
        session.send(Command::SetMarkerMode(MarkerMode::Loop))?;
        session.send(Command::Mark { at: a })?;
        session.send(Command::Mark { at: b })?;
        if !(a..b).contains(&start_at) {
            start_at = a;
        }
    }
    session.scrub_to(start_at)?;

    session.clock.play();
    let started = Instant::now();
    while !session.clock.at_end() && limit.is_none_or(|limit| started.elapsed() < limit) {
        session.pump()?;
    }
    session.clock.pause();
    info!(position = session.clock.now(), "playback stopped");
    Ok(())
}

pub fn clip(settings: &Settings, args: &ClipArgs) -> Result<()> {
    let session = Session::open(settings, &args.media, args.rate, default_deck(settings))?;
    let mode = if args.audio {
        CaptureMode::Audio
    } else {
        CaptureMode::Video
    };
    let filename = args.name.clone().unwrap_or_else(|| {
        format!("{}_{:.1}-{:.1}", session.media.id, args.start, args.end)
    });

    session.send(Command::Record {
        target: RecordTarget {
            start: args.start,
            end: Some(args.end),
            filename,
        },
        mode,
    })?;
    let clip = session.wait_for(capture_timeout(args.end - args.start, args.rate), |event| {
        match event {
            Event::ClipCaptured(clip) => Some(Ok(clip.clone())),
            Event::Notification(notification) => capture_failure(notification),
            _ => None,
        }
    })?;

    let stored = FsClipStore::new(settings.clips_dir())
        .list(Some(&session.media.id))
        .context("failed to read the clip library")?;
    if !stored.iter().any(|stored| stored.id == clip.id) {
        bail!("clip {} was captured but not saved", clip.id);
    }

    println!(
        "{} {} {:.2}s {} bytes {}",
        clip.id, clip.kind, clip.duration_seconds, clip.size_bytes, clip.mime_type
    );
    Ok(())
}

pub fn shot(settings: &Settings, media: &Path, at: f64, output: &Path) -> Result<()> {
    let session = Session::open(settings, media, 1.0, default_deck(settings))?;
    session.scrub_to(at)?;
    session.send(Command::CaptureScreenshot)?;

    let png = session.wait_for(LOAD_TIMEOUT + ENCODE_GRACE, |event| match event {
        Event::ScreenshotCaptured(shot) => Some(Ok(Arc::clone(&shot.png))),
        Event::Notification(notification) => Some(Err(anyhow!(notification.message.clone()))),
        _ => None,
    })?;
    fs::write(output, &png[..]).with_context(|| format!("failed to write {}", output.display()))?;
    println!("{}", output.display());
    Ok(())
}

pub fn card(settings: &Settings, args: &CardArgs) -> Result<()> {
    let deck = match &args.deck {
        Some(path) => {
            let media_dir = path
                .parent()
                .map_or_else(|| PathBuf::from("media"), |parent| parent.join("media"));
            JsonLinesDeck::new(path, media_dir)
        }
        None => default_deck(settings),
    };
    let session = Session::open(settings, &args.media, args.rate, deck)?;
    session.load_subtitles(&args.subtitles)?;
    session.scrub_to(args.at)?;

    let request = NoteRequest {
        term: args.term.clone(),
        definition: args.definition.clone(),
        sentence: args.sentence.clone(),
        translation: args.translation.clone(),
        tags: args.tags.clone(),
        attach_audio: !args.no_audio,
    };
    session.send(Command::CreateFlashcard(request))?;

    let term = session.wait_for(capture_timeout(NOTE_AUDIO_SPAN_SECONDS, args.rate), |event| {
        match event {
            Event::NoteDelivered { term } => Some(Ok(term.clone())),
            Event::Notification(notification)
                if notification.kind == NotificationKind::Storage =>
            {
                Some(Err(anyhow!(notification.message.clone())))
            }
            _ => None,
        }
    })?;
    println!("note delivered: {term}");
    Ok(())
}

pub fn list_clips(settings: &Settings, owner: Option<&str>) -> Result<()> {
    let clips = FsClipStore::new(settings.clips_dir())
        .list(owner)
        .context("failed to read the clip library")?;
    for clip in clips.iter().map(|clip| clip.summary()) {
        println!(
            "{} {:<5} {:>7.2}s {:>9} {} {} {}",
            clip.id,
            clip.kind,
            clip.duration_seconds,
            clip.size_bytes,
            clip.created_at.format("%Y-%m-%d %H:%M"),
            clip.owner_video_id.as_deref().unwrap_or("-"),
            clip.title
        );
    }
    if clips.is_empty() {
        println!("no clips in {}", settings.clips_dir().display());
    }
    Ok(())
}

pub fn delete_clip(settings: &Settings, id: Uuid) -> Result<()> {
    FsClipStore::new(settings.clips_dir())
        .delete(id)
        .with_context(|| format!("failed to delete clip {id}"))?;
    println!("deleted {id}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use subclip_engine::{Notification, NotificationKind, Severity};

    use super::{ENCODE_GRACE, capture_failure, capture_timeout};

    fn notification(severity: Severity, kind: NotificationKind) -> Notification {
        Notification {
            severity,
            kind,
            message: "boom".to_string(),
        }
    }

    #[test]
    fn capture_timeout_scales_with_rate() {
        assert_eq!(capture_timeout(10.0, 2.0), Duration::from_secs(5) + ENCODE_GRACE);
        assert_eq!(capture_timeout(10.0, 0.0), Duration::from_secs(10) + ENCODE_GRACE);
        assert_eq!(capture_timeout(-3.0, 1.0), ENCODE_GRACE);
    }

    #[test]
    fn unsupported_capability_and_errors_end_a_capture() {
        assert!(
            capture_failure::<()>(&notification(Severity::Info, NotificationKind::Other)).is_none()
        );
        assert!(
            capture_failure::<()>(&notification(
                Severity::Warning,
                NotificationKind::UnsupportedCapability
            ))
            .is_some()
        );
        assert!(
            capture_failure::<()>(&notification(Severity::Error, NotificationKind::Storage))
                .is_some()
        );
    }
}
