use std::path::PathBuf;
use std::process::{Command, Stdio};

use tracing::debug;

use crate::error::{MediaFfmpegError, Result};

/// FFmpeg muxer and codecs producing one MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFormat {
    pub muxer: &'static str,
    pub video_codec: Option<&'static str>,
    pub audio_codec: &'static str,
    /// Extra muxer flags needed to write to a pipe.
    pub muxer_flags: &'static [&'static str],
}

impl OutputFormat {
    /// Maps a recorder MIME type onto ffmpeg output arguments.
    ///
    /// # Example
    /// ```
    /// use media_ffmpeg::OutputFormat;
    ///
    /// let format = OutputFormat::for_mime("audio/webm;codecs=opus").expect("known format");
    /// assert_eq!(format.muxer, "webm");
    /// assert_eq!(format.video_codec, None);
    /// ```
    pub fn for_mime(mime_type: &str) -> Option<Self> {
        const FRAGMENTED_MP4: &[&str] = &["-movflags", "frag_keyframe+empty_moov"];
        let format = match mime_type.trim() {
            "video/webm;codecs=vp9,opus" => Self::video("webm", "libvpx-vp9", "libopus", &[]),
            "video/webm;codecs=vp8,opus" | "video/webm" => {
                Self::video("webm", "libvpx", "libopus", &[])
            }
            "video/mp4" => Self::video("mp4", "libx264", "aac", FRAGMENTED_MP4),
            "audio/webm;codecs=opus" | "audio/webm" => Self::audio("webm", "libopus", &[]),
            "audio/ogg;codecs=opus" | "audio/ogg" => Self::audio("ogg", "libopus", &[]),
            "audio/mp4" => Self::audio("mp4", "aac", FRAGMENTED_MP4),
            "audio/mpeg" => Self::audio("mp3", "libmp3lame", &[]),
            _ => return None,
        };
        Some(format)
    }

    pub fn is_audio_only(&self) -> bool {
        self.video_codec.is_none()
    }

    /// Encoders this format needs.
    pub fn encoders(&self) -> impl Iterator<Item = &'static str> {
        self.video_codec
            .into_iter()
            .chain(std::iter::once(self.audio_codec))
    }

    fn video(
        muxer: &'static str,
        video_codec: &'static str,
        audio_codec: &'static str,
        muxer_flags: &'static [&'static str],
    ) -> Self {
        Self {
            muxer,
            video_codec: Some(video_codec),
            audio_codec,
            muxer_flags,
        }
    }

    fn audio(
        muxer: &'static str,
        audio_codec: &'static str,
        muxer_flags: &'static [&'static str],
    ) -> Self {
        Self {
            muxer,
            video_codec: None,
            audio_codec,
            muxer_flags,
        }
    }
}

/// One time-bounded segment to encode to stdout.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRequest {
    pub input: PathBuf,
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub mime_type: String,
}

impl SegmentRequest {
    fn validate(&self) -> Result<OutputFormat> {
        let start_ok = self.start_seconds.is_finite() && self.start_seconds >= 0.0;
        let end_ok = self.end_seconds.is_finite() && self.end_seconds > self.start_seconds;
        if !(start_ok && end_ok) {
            return Err(MediaFfmpegError::InvalidSegment {
                start: self.start_seconds,
                end: self.end_seconds,
            });
        }
        OutputFormat::for_mime(&self.mime_type).ok_or_else(|| {
            MediaFfmpegError::UnsupportedFormat {
                mime_type: self.mime_type.clone(),
            }
        })
    }
}

/// Builds the ffmpeg argument list for `request`, writing to stdout.
///
/// # Example
/// ```
/// use std::path::PathBuf;
/// use media_ffmpeg::{SegmentRequest, segment_args};
///
/// let args = segment_args(&SegmentRequest {
///     input: PathBuf::from("ep.mkv"),
///     start_seconds: 1.0,
///     end_seconds: 4.0,
///     mime_type: "audio/ogg".to_string(),
/// })
/// .expect("valid request");
/// assert!(args.windows(2).any(|pair| pair[0] == "-t" && pair[1] == "3.000"));
/// assert_eq!(args.last().map(String::as_str), Some("pipe:1"));
/// ```
pub fn segment_args(request: &SegmentRequest) -> Result<Vec<String>> {
    let format = request.validate()?;

    let mut args: Vec<String> = ["-hide_banner", "-nostdin", "-v", "error"]
        .into_iter()
        .map(str::to_string)
        .collect();
    args.extend(["-ss".to_string(), format!("{:.3}", request.start_seconds)]);
    args.push("-i".to_string());
    args.push(request.input.to_string_lossy().into_owned());
    args.extend([
        "-t".to_string(),
        format!("{:.3}", request.end_seconds - request.start_seconds),
    ]);

    match format.video_codec {
        Some(video_codec) => {
            args.extend(["-map", "0:v:0", "-map", "0:a:0?", "-c:v", video_codec].map(String::from));
        }
        None => {
            args.extend(["-map", "0:a:0", "-vn"].map(String::from));
        }
    }
    args.extend(["-c:a", format.audio_codec].map(String::from));
    args.extend(format.muxer_flags.iter().map(|flag| flag.to_string()));
    args.extend(["-f", format.muxer, "pipe:1"].map(String::from));
    Ok(args)
}

/// Encodes a bounded segment and returns the encoded bytes.
///
/// # Example
/// ```no_run
/// use std::path::PathBuf;
/// use media_ffmpeg::{SegmentRequest, extract_segment};
///
/// let bytes = extract_segment(&SegmentRequest {
///     input: PathBuf::from("episode.mkv"),
///     start_seconds: 12.0,
///     end_seconds: 15.5,
///     mime_type: "audio/ogg;codecs=opus".to_string(),
/// })
/// .expect("segment should encode");
/// assert!(!bytes.is_empty());
/// ```
pub fn extract_segment(request: &SegmentRequest) -> Result<Vec<u8>> {
    let args = segment_args(request)?;
    debug!(
        input = %request.input.display(),
        start = request.start_seconds,
        end = request.end_seconds,
        mime_type = %request.mime_type,
        "encoding segment"
    );
    let output = Command::new("ffmpeg")
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|source| MediaFfmpegError::Io {
            context: "run ffmpeg segment encoder",
            source,
        })?;

    if !output.status.success() {
        return Err(MediaFfmpegError::CommandFailed {
            command: format!(
                "ffmpeg segment {} {}s..{}s",
                request.input.display(),
                request.start_seconds,
                request.end_seconds
            ),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(output.stdout)
}
