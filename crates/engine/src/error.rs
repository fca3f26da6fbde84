use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use uuid::Uuid;

use crate::capture::{CaptureMode, SessionId};

/// Result type used by the engine crate.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors produced by engine commands, capture and persistence.
#[derive(Debug)]
pub enum EngineError {
    MediaNotLoaded,
    EmptyMedia {
        media_id: String,
    },
    InvalidLoopRange {
        start: f64,
        end: f64,
    },
    InvalidRecordWindow {
        start: f64,
        end: Option<f64>,
    },
    RecordingInProgress {
        session: SessionId,
    },
    RecordingCancelled {
        session: SessionId,
    },
    MissingAudioTrack,
    NoSupportedFormat {
        mode: CaptureMode,
    },
    FrameUnavailable {
        width: u32,
        height: u32,
        ready: bool,
    },
    TaintedFrame,
    ImageEncode(image::ImageError),
    Surface {
        reason: String,
    },
    Recorder {
        session: SessionId,
        reason: String,
    },
    ClipNotFound {
        id: Uuid,
    },
    StoreIo {
        context: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    StoreSerialization {
        path: PathBuf,
        source: serde_json::Error,
    },
    Storage {
        reason: String,
    },
    FlashcardDelivery {
        reason: String,
    },
    ConfigIo {
        path: PathBuf,
        source: std::io::Error,
    },
    ConfigParse {
        path: Option<PathBuf>,
        source: serde_json::Error,
    },
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MediaNotLoaded => write!(f, "no media is loaded"),
            Self::EmptyMedia { media_id } => write!(f, "media {media_id} has zero duration"),
            Self::InvalidLoopRange { start, end } => write!(
                f,
                "end point must be after start point ({start:.3}s..{end:.3}s)"
            ),
            Self::InvalidRecordWindow { start, end } => match end {
                Some(end) => write!(f, "invalid record window {start:.3}s..{end:.3}s"),
                None => write!(f, "invalid record start {start:.3}s"),
            },
            Self::RecordingInProgress { session } => {
                write!(f, "recording session {session} is still in progress")
            }
            Self::RecordingCancelled { session } => {
                write!(f, "recording session {session} was cancelled")
            }
            Self::MissingAudioTrack => write!(f, "captured stream has no audio track"),
            Self::NoSupportedFormat { mode } => {
                write!(f, "no supported {mode} encoding format is available")
            }
            Self::FrameUnavailable {
                width,
                height,
                ready,
            } => {
                if *ready {
                    write!(f, "video frame has no pixels ({width}x{height})")
                } else {
                    write!(f, "video frame is not decoded yet")
                }
            }
            Self::TaintedFrame => write!(f, "video frame is cross-origin and cannot be read"),
            Self::ImageEncode(err) => write!(f, "screenshot encoding failed: {err}"),
            Self::Surface { reason } => write!(f, "playback surface error: {reason}"),
            Self::Recorder { session, reason } => {
                write!(f, "recorder error in session {session}: {reason}")
            }
            Self::ClipNotFound { id } => write!(f, "clip not found: {id}"),
            Self::StoreIo {
                context,
                path,
                source,
            } => write!(f, "{context}: {} ({source})", path.display()),
            Self::StoreSerialization { path, source } => write!(
                f,
                "clip metadata serialization failed at {} ({source})",
                path.display()
            ),
            Self::Storage { reason } => write!(f, "clip storage error: {reason}"),
            Self::FlashcardDelivery { reason } => write!(f, "flashcard delivery failed: {reason}"),
            Self::ConfigIo { path, source } => {
                write!(f, "failed to read config {} ({source})", path.display())
            }
            Self::ConfigParse { path, source } => match path {
                Some(path) => write!(f, "invalid config {} ({source})", path.display()),
                None => write!(f, "invalid config ({source})"),
            },
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ImageEncode(err) => Some(err),
            Self::StoreIo { source, .. } => Some(source),
            Self::StoreSerialization { source, .. } => Some(source),
            Self::ConfigIo { source, .. } => Some(source),
            Self::ConfigParse { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<image::ImageError> for EngineError {
    fn from(value: image::ImageError) -> Self {
        Self::ImageEncode(value)
    }
}
