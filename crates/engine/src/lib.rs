//! Subtitle-synchronized playback and clip-capture engine.
//!
//! Platform facilities are traits ([`MediaSurface`], [`Recorder`],
//! [`ClipStore`], [`FlashcardSink`]); the engine itself is a single-threaded
//! command/event state machine.

pub mod api;
pub mod capture;
pub mod clock;
pub mod config;
pub mod cue;
pub mod error;
pub mod library;
pub mod marker;
pub mod note;
pub mod surface;
pub mod time;

pub use api::{
    Command, CueStep, Engine, Event, MediaItem, Notification, NotificationKind, Severity,
    TrackSlot,
};
pub use capture::{CaptureMode, RecordTarget, SessionId, SessionPhase};
pub use config::EngineConfig;
pub use cue::{CueTrack, TimedCue};
pub use error::{EngineError, Result};
pub use library::{CapturedClip, ClipStore, ClipSummary, FsClipStore, PreviewHandle};
pub use marker::{LoopState, MarkerMode};
pub use note::{FlashcardSink, NoteDraft, NoteMedia, NoteRequest};
pub use surface::{CaptureStream, EncodingFormat, MediaSurface, Recorder, Screenshot, VideoFrame};
pub use time::TimeWindow;
