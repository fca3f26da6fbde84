use std::path::Path;
use std::process::Command;

use tracing::debug;

use crate::error::{MediaFfmpegError, Result};
use crate::probe::probe_media;

/// A decoded video frame in RGBA format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbaFrame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Decodes the frame displayed at `at_seconds`.
///
/// Uses an input-side seek, so the returned frame is the first one at or
/// after the requested position.
///
/// # Example
/// ```no_run
/// use media_ffmpeg::grab_frame_rgba;
///
/// let frame = grab_frame_rgba("episode.mkv", 12.5).expect("frame should decode");
/// assert_eq!(frame.rgba.len(), (frame.width * frame.height * 4) as usize);
/// ```
pub fn grab_frame_rgba(path: impl AsRef<Path>, at_seconds: f64) -> Result<RgbaFrame> {
    if !at_seconds.is_finite() || at_seconds < 0.0 {
        return Err(MediaFfmpegError::InvalidTimestampSeconds(at_seconds));
    }

    let path = path.as_ref();
    let media = probe_media(path)?;
    let video = media
        .first_video()
        .ok_or_else(|| MediaFfmpegError::MissingVideoStream(path.to_path_buf()))?;
    let (Some(width), Some(height)) = (video.width, video.height) else {
        return Err(MediaFfmpegError::MissingVideoDimensions(path.to_path_buf()));
    };

    let output = Command::new("ffmpeg")
        .args(["-hide_banner", "-v", "error", "-ss"])
        .arg(format!("{at_seconds:.3}"))
        .arg("-i")
        .arg(path)
        .args([
            "-map", "0:v:0", "-frames:v", "1", "-f", "rawvideo", "-pix_fmt", "rgba", "-",
        ])
        .output()
        .map_err(|source| MediaFfmpegError::Io {
            context: "run ffmpeg frame grab",
            source,
        })?;

    if !output.status.success() {
        return Err(MediaFfmpegError::CommandFailed {
            command: format!("ffmpeg frame grab {} at {at_seconds:.3}s", path.display()),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    let expected_size = width as usize * height as usize * 4;
    if output.stdout.len() != expected_size {
        return Err(MediaFfmpegError::Parse {
            context: "decoded rgba size",
            value: format!("expected {expected_size} bytes, got {}", output.stdout.len()),
        });
    }

    debug!(path = %path.display(), at_seconds, width, height, "frame grabbed");
    Ok(RgbaFrame {
        width,
        height,
        rgba: output.stdout,
    })
}
