use std::collections::HashSet;
use std::process::Command;

use tracing::debug;

use crate::error::{MediaFfmpegError, Result};
use crate::segment::OutputFormat;

/// Recorder MIME types in the order they are offered.
const CANDIDATE_MIME_TYPES: &[&str] = &[
    "video/webm;codecs=vp9,opus",
    "video/webm;codecs=vp8,opus",
    "video/webm",
    "video/mp4",
    "audio/webm;codecs=opus",
    "audio/webm",
    "audio/ogg;codecs=opus",
    "audio/ogg",
    "audio/mp4",
    "audio/mpeg",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderKind {
    Video,
    Audio,
    Subtitle,
}

/// One entry of `ffmpeg -encoders`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderInfo {
    pub name: String,
    pub kind: EncoderKind,
}

/// Lists the encoders compiled into the local ffmpeg.
pub fn list_encoders() -> Result<Vec<EncoderInfo>> {
    let output = Command::new("ffmpeg")
        .args(["-hide_banner", "-encoders"])
        .output()
        .map_err(|source| MediaFfmpegError::Io {
            context: "run ffmpeg -encoders",
            source,
        })?;

    if !output.status.success() {
        return Err(MediaFfmpegError::CommandFailed {
            command: "ffmpeg -encoders".to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    let encoders = parse_encoders(&String::from_utf8(output.stdout)?);
    debug!(count = encoders.len(), "ffmpeg encoders listed");
    Ok(encoders)
}

/// MIME types whose encoders are all present, most preferred first.
///
/// # Example
/// ```
/// use media_ffmpeg::{EncoderInfo, EncoderKind, supported_mime_types};
///
/// let encoders = vec![EncoderInfo { name: "libopus".into(), kind: EncoderKind::Audio }];
/// let audio = supported_mime_types(&encoders, true);
/// assert_eq!(audio[0], "audio/webm;codecs=opus");
/// assert!(supported_mime_types(&encoders, false).is_empty());
/// ```
pub fn supported_mime_types(encoders: &[EncoderInfo], audio_only: bool) -> Vec<String> {
    let available: HashSet<&str> = encoders.iter().map(|encoder| encoder.name.as_str()).collect();
    CANDIDATE_MIME_TYPES
        .iter()
        .filter_map(|mime_type| {
            let format = OutputFormat::for_mime(mime_type)?;
            let usable = format.is_audio_only() == audio_only
                && format.encoders().all(|name| available.contains(name));
            usable.then(|| mime_type.to_string())
        })
        .collect()
}

/// Parses the table printed by `ffmpeg -encoders`.
///
/// Lines after the `------` separator look like ` V....D libx264   description`;
/// the first flag column gives the kind.
fn parse_encoders(stdout: &str) -> Vec<EncoderInfo> {
    stdout
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("------"))
        .skip(1)
        .filter_map(|line| {
            let mut columns = line.split_whitespace();
            let flags = columns.next()?;
            let name = columns.next()?;
            let kind = match flags.chars().next()? {
                'V' => EncoderKind::Video,
                'A' => EncoderKind::Audio,
                'S' => EncoderKind::Subtitle,
                _ => return None,
            };
            Some(EncoderInfo {
                name: name.to_string(),
                kind,
            })
        })
        .collect()
}
