use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use subclip_engine::{Command, Engine, Event, MediaSurface, Recorder};
use tracing::{debug, trace};

use crate::playback::SharedClock;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Sender used to dispatch commands to the engine thread.
///
/// Unbounded: the engine's own adapters post callbacks through it from the
/// engine thread and from encoder threads.
pub type EngineCommandSender = mpsc::Sender<Command>;

/// Receiver used to read events emitted by the engine thread.
pub type EngineEventReceiver = mpsc::Receiver<Event>;

/// Runs `engine` on its own thread, feeding it every command from
/// `command_rx` and forwarding the resulting events.
///
/// The thread ends when every command sender is gone or the event receiver
/// is dropped.
pub fn spawn_engine_worker<S, R>(
    mut engine: Engine<S, R>,
    command_rx: mpsc::Receiver<Command>,
) -> EngineEventReceiver
where
    S: MediaSurface + Send + 'static,
    R: Recorder + Send + 'static,
{
    let (event_tx, event_rx) = mpsc::sync_channel::<Event>(EVENT_CHANNEL_CAPACITY);

    thread::spawn(move || {
        while let Ok(command) = command_rx.recv() {
            trace!(?command, "engine command");
            for event in engine.dispatch(command) {
                if event_tx.send(event).is_err() {
                    debug!("event receiver dropped, engine worker exiting");
                    return;
                }
            }
        }
        debug!("command channel closed, engine worker exiting");
    });

    event_rx
}

/// Periodic playback sampler; stops when dropped.
pub struct Sampler {
    stop: Arc<AtomicBool>,
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

/// Posts [`Command::Sample`] with the clock position every `interval` while
/// the clock is playing.
pub fn spawn_sampler(
    clock: SharedClock,
    commands: EngineCommandSender,
    interval: Duration,
) -> Sampler {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop);

    thread::spawn(move || {
        while !stop_flag.load(Ordering::Relaxed) {
            thread::sleep(interval);
            if !clock.is_playing() {
                continue;
            }
            let sample = Command::Sample {
                time: clock.now(),
                buffering: false,
            };
            if commands.send(sample).is_err() {
                return;
            }
        }
    });

    Sampler { stop }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, mpsc};
    use std::time::Duration;

    use subclip_engine::{
        CaptureMode, CaptureStream, Command, EncodingFormat, Engine, EngineConfig, EngineError,
        Event, FlashcardSink, FsClipStore, MediaItem, MediaSurface, NoteDraft, NotificationKind,
        Recorder, Result, SessionId, VideoFrame,
    };

    use super::{spawn_engine_worker, spawn_sampler};
    use crate::playback::SharedClock;

    struct StillSurface {
        time: f64,
    }

    impl MediaSurface for StillSurface {
        fn current_time(&self) -> f64 {
            self.time
        }

        fn seek_to(&mut self, time: f64) {
            self.time = time;
        }

        fn play(&mut self) {}

        fn pause(&mut self) {}

        fn grab_frame(&self) -> Result<VideoFrame> {
            Ok(VideoFrame {
                width: 1,
                height: 1,
                ready: true,
                rgba: Arc::from(vec![0u8; 4]),
            })
        }

        fn capture_stream(&self, _mode: CaptureMode) -> Result<CaptureStream> {
            Ok(CaptureStream {
                video_tracks: 1,
                audio_tracks: 1,
                source: "still".to_string(),
            })
        }
    }

    struct NoRecorder;

    impl Recorder for NoRecorder {
        fn supported_formats(&self, _mode: CaptureMode) -> Vec<EncodingFormat> {
            Vec::new()
        }

        fn start(
            &mut self,
            session: SessionId,
            _stream: &CaptureStream,
            _format: &EncodingFormat,
            _timeslice: Duration,
        ) -> Result<()> {
            Err(EngineError::Recorder {
                session,
                reason: "unavailable".to_string(),
            })
        }

        fn stop(&mut self, _session: SessionId) -> Result<()> {
            Ok(())
        }
    }

    struct DropNotes;

    impl FlashcardSink for DropNotes {
        fn deliver(&self, _note: &NoteDraft) -> Result<()> {
            Ok(())
        }
    }

    fn worker() -> (mpsc::Sender<Command>, mpsc::Receiver<Event>, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = Engine::new(
            EngineConfig::default(),
            StillSurface { time: 0.0 },
            NoRecorder,
            Box::new(FsClipStore::new(dir.path())),
            Arc::new(DropNotes),
        );
        let (command_tx, command_rx) = mpsc::channel();
        let event_rx = spawn_engine_worker(engine, command_rx);
        (command_tx, event_rx, dir)
    }

    fn media() -> MediaItem {
        MediaItem {
            id: "ep01".to_string(),
            title: None,
            duration: 20.0,
            has_video: true,
            has_audio: true,
        }
    }

    #[test]
    fn worker_forwards_engine_events() {
        let (command_tx, event_rx, _dir) = worker();
        command_tx
            .send(Command::LoadMedia(media()))
            .expect("send command");

        let event = event_rx
            .recv_timeout(Duration::from_secs(1))
            .expect("receive event");
        assert_eq!(event, Event::MediaChanged(media()));
    }

    #[test]
    fn worker_turns_errors_into_notifications() {
        let (command_tx, event_rx, _dir) = worker();
        command_tx
            .send(Command::Seek { time: 3.0 })
            .expect("send command");

        match event_rx.recv_timeout(Duration::from_secs(1)) {
            Ok(Event::Notification(notification)) => {
                assert_eq!(notification.kind, NotificationKind::InvalidTransition);
            }
            other => panic!("expected notification, got {other:?}"),
        }
    }

    #[test]
    fn worker_exits_when_commands_close() {
        let (command_tx, event_rx, _dir) = worker();
        drop(command_tx);
        assert!(matches!(
            event_rx.recv_timeout(Duration::from_secs(1)),
            Err(mpsc::RecvTimeoutError::Disconnected)
        ));
    }

    #[test]
    fn sampler_posts_only_while_playing() {
        let clock = SharedClock::new(60.0, 1.0);
        clock.seek(4.0);
        let (command_tx, command_rx) = mpsc::channel();
        let sampler = spawn_sampler(clock.clone(), command_tx, Duration::from_millis(5));

        assert!(command_rx.recv_timeout(Duration::from_millis(50)).is_err());

        clock.play();
        match command_rx.recv_timeout(Duration::from_secs(1)) {
            Ok(Command::Sample { time, buffering }) => {
                assert!(time >= 4.0);
                assert!(!buffering);
            }
            other => panic!("expected sample, got {other:?}"),
        }
        drop(sampler);
    }
}
