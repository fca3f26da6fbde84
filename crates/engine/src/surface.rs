use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use image::{ImageFormat, RgbaImage};

use crate::capture::{CaptureMode, SessionId};
use crate::error::{EngineError, Result};

/// Raw RGBA frame read from the playback surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// False until the surface has decoded at least one frame.
    pub ready: bool,
    pub rgba: Arc<[u8]>,
}

/// Encoded still captured from playback.
#[derive(Debug, Clone, PartialEq)]
pub struct Screenshot {
    pub at_seconds: f64,
    pub width: u32,
    pub height: u32,
    pub png: Arc<[u8]>,
}

/// Tracks available on a capture stream derived from the surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureStream {
    pub video_tracks: u32,
    pub audio_tracks: u32,
    /// Adapter-defined source description, e.g. a file path or stream id.
    pub source: String,
}

/// Container/codec combination understood by a recorder, as a MIME type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EncodingFormat {
    pub mime_type: String,
}

impl EncodingFormat {
    pub fn new(mime_type: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
        }
    }

    /// File extension for the container part of the MIME type.
    ///
    /// # Example
    /// ```
    /// use subclip_engine::surface::EncodingFormat;
    ///
    /// assert_eq!(EncodingFormat::new("audio/webm;codecs=opus").extension(), "webm");
    /// assert_eq!(EncodingFormat::new("audio/mpeg").extension(), "mp3");
    /// ```
    pub fn extension(&self) -> &'static str {
        let essence = self
            .mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim();
        match essence {
            "video/webm" | "audio/webm" => "webm",
            "video/mp4" => "mp4",
            "audio/mp4" => "m4a",
            "audio/ogg" => "ogg",
            "audio/mpeg" => "mp3",
            "video/x-matroska" | "audio/x-matroska" => "mkv",
            _ => "bin",
        }
    }
}

/// Playback surface operations the engine relies on.
///
/// Implementations must tolerate every call before the media is ready,
/// either by ignoring it or by queueing it.
pub trait MediaSurface {
    /// Current playback position in seconds.
    fn current_time(&self) -> f64;

    /// Requests a seek. Completion is reported back as a separate command.
    fn seek_to(&mut self, time: f64);

    fn play(&mut self);

    fn pause(&mut self);

    /// Reads the frame currently displayed.
    fn grab_frame(&self) -> Result<VideoFrame>;

    /// Derives a capture stream; audio mode keeps only audio tracks.
    fn capture_stream(&self, mode: CaptureMode) -> Result<CaptureStream>;
}

/// Media recorder operations.
///
/// `start` and `stop` only request the transition. The adapter reports
/// progress back as `RecorderStarted`, `RecorderData`, `RecorderStopped` or
/// `RecorderFailed` commands tagged with the same session id.
pub trait Recorder {
    /// Formats the runtime can encode for `mode`.
    fn supported_formats(&self, mode: CaptureMode) -> Vec<EncodingFormat>;

    fn start(
        &mut self,
        session: SessionId,
        stream: &CaptureStream,
        format: &EncodingFormat,
        timeslice: Duration,
    ) -> Result<()>;

    fn stop(&mut self, session: SessionId) -> Result<()>;
}

/// Encodes one frame as PNG, rejecting frames that have nothing to draw.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use subclip_engine::surface::{VideoFrame, encode_png};
///
/// let frame = VideoFrame { width: 1, height: 1, ready: true, rgba: Arc::from(vec![255u8; 4]) };
/// let png = encode_png(&frame).expect("encode");
/// assert_eq!(&png[1..4], b"PNG");
/// ```
pub fn encode_png(frame: &VideoFrame) -> Result<Vec<u8>> {
    if !frame.ready || frame.width == 0 || frame.height == 0 {
        return Err(EngineError::FrameUnavailable {
            width: frame.width,
            height: frame.height,
            ready: frame.ready,
        });
    }

    let image = RgbaImage::from_raw(frame.width, frame.height, frame.rgba.to_vec()).ok_or(
        EngineError::FrameUnavailable {
            width: frame.width,
            height: frame.height,
            ready: frame.ready,
        },
    )?;

    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}
