use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::error::{MediaFfmpegError, Result};

/// Stream kind discovered by probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
    Subtitle,
    Other,
}

/// Stream metadata read from `ffprobe`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub index: u32,
    pub kind: StreamKind,
    pub codec_name: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
}

/// Media probe result.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub path: PathBuf,
    pub streams: Vec<StreamInfo>,
    pub duration_seconds: Option<f64>,
}

impl MediaInfo {
    /// Returns the first video stream.
    ///
    /// # Example
    /// ```no_run
    /// use media_ffmpeg::probe_media;
    ///
    /// let info = probe_media("sample.mp4").expect("probe should succeed");
    /// let _video = info.first_video().expect("video stream exists");
    /// ```
    pub fn first_video(&self) -> Option<&StreamInfo> {
        self.streams
            .iter()
            .find(|stream| stream.kind == StreamKind::Video)
    }

    pub fn first_audio(&self) -> Option<&StreamInfo> {
        self.streams
            .iter()
            .find(|stream| stream.kind == StreamKind::Audio)
    }

    pub fn audio_track_count(&self) -> u32 {
        self.count(StreamKind::Audio)
    }

    pub fn video_track_count(&self) -> u32 {
        self.count(StreamKind::Video)
    }

    fn count(&self, kind: StreamKind) -> u32 {
        self.streams
            .iter()
            .filter(|stream| stream.kind == kind)
            .count() as u32
    }
}

/// Probes a media file via `ffprobe`.
///
/// # Example
/// ```no_run
/// use media_ffmpeg::probe_media;
///
/// let info = probe_media("episode.mkv").expect("probe should succeed");
/// assert!(!info.streams.is_empty());
/// ```
pub fn probe_media(path: impl AsRef<Path>) -> Result<MediaInfo> {
    let path = path.as_ref();

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "stream=index,codec_type,codec_name,width,height,sample_rate,channels:format=duration",
            "-of",
            "compact=p=1:nk=0",
        ])
        .arg(path)
        .output()
        .map_err(|source| MediaFfmpegError::Io {
            context: "run ffprobe",
            source,
        })?;

    if !output.status.success() {
        return Err(MediaFfmpegError::CommandFailed {
            command: format!("ffprobe {}", path.display()),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    let stdout = String::from_utf8(output.stdout)?;
    let info = parse_probe_output(path, &stdout)?;
    debug!(
        path = %path.display(),
        streams = info.streams.len(),
        duration_seconds = ?info.duration_seconds,
        "media probed"
    );
    Ok(info)
}

/// Parses `compact=p=1` output: `stream|key=value|...` and `format|duration=...` lines.
fn parse_probe_output(path: &Path, stdout: &str) -> Result<MediaInfo> {
    let mut streams = Vec::new();
    let mut duration_seconds = None;

    for line in stdout.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let (section, fields) = line.split_once('|').unwrap_or((line, ""));
        let map = parse_fields(fields)?;
        match section {
            "stream" => streams.push(stream_from_fields(&map, line)?),
            "format" => {
                duration_seconds = parse_optional_f64(map.get("duration").copied(), "duration")?;
            }
            _ => {}
        }
    }

    if streams.is_empty() {
        return Err(MediaFfmpegError::Parse {
            context: "streams",
            value: "no streams found".to_string(),
        });
    }

    Ok(MediaInfo {
        path: path.to_path_buf(),
        streams,
        duration_seconds,
    })
}

fn parse_fields(fields: &str) -> Result<HashMap<&str, &str>> {
    let mut map = HashMap::new();
    for field in fields.split('|').filter(|field| !field.is_empty()) {
        let (key, value) = field
            .split_once('=')
            .ok_or_else(|| MediaFfmpegError::Parse {
                context: "probe field",
                value: field.to_string(),
            })?;
        map.insert(key.trim(), value.trim().trim_matches('"'));
    }
    Ok(map)
}

fn stream_from_fields(map: &HashMap<&str, &str>, line: &str) -> Result<StreamInfo> {
    let kind = match map.get("codec_type").copied() {
        Some("video") => StreamKind::Video,
        Some("audio") => StreamKind::Audio,
        Some("subtitle") => StreamKind::Subtitle,
        Some(_) => StreamKind::Other,
        None => {
            return Err(MediaFfmpegError::Parse {
                context: "codec_type",
                value: line.to_string(),
            });
        }
    };
    let index = parse_optional_int::<u32>(map.get("index").copied(), "stream index")?.ok_or_else(
        || MediaFfmpegError::Parse {
            context: "stream index",
            value: line.to_string(),
        },
    )?;

    Ok(StreamInfo {
        index,
        kind,
        codec_name: map
            .get("codec_name")
            .filter(|value| !value.is_empty() && **value != "N/A")
            .map(|value| value.to_string()),
        width: parse_optional_int(map.get("width").copied(), "width")?,
        height: parse_optional_int(map.get("height").copied(), "height")?,
        sample_rate: parse_optional_int(map.get("sample_rate").copied(), "sample_rate")?,
        channels: parse_optional_int(map.get("channels").copied(), "channels")?,
    })
}

fn parse_optional_int<T>(value: Option<&str>, context: &'static str) -> Result<Option<T>>
where
    T: std::str::FromStr<Err = std::num::ParseIntError>,
{
    let Some(raw) = value else {
        return Ok(None);
    };
    if raw.is_empty() || raw == "N/A" {
        return Ok(None);
    }

    raw.parse::<T>()
        .map(Some)
        .map_err(|_| MediaFfmpegError::Parse {
            context,
            value: raw.to_string(),
        })
}

fn parse_optional_f64(value: Option<&str>, context: &'static str) -> Result<Option<f64>> {
    let Some(raw) = value else {
        return Ok(None);
    };
    if raw.is_empty() || raw == "N/A" {
        return Ok(None);
    }

    raw.parse::<f64>()
        .map(Some)
        .map_err(|_| MediaFfmpegError::Parse {
            context,
            value: raw.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{StreamKind, parse_probe_output};

    #[test]
    fn parses_streams_and_format_duration() {
        let stdout = "\
stream|index=0|codec_name=h264|codec_type=video|width=160|height=90|sample_rate=N/A|channels=N/A
stream|index=1|codec_name=aac|codec_type=audio|sample_rate=48000|channels=2
stream|index=2|codec_name=subrip|codec_type=subtitle
format|duration=12.500000
";
        let info = parse_probe_output(Path::new("ep.mkv"), stdout).expect("parse probe output");

        assert_eq!(info.streams.len(), 3);
        assert_eq!(info.video_track_count(), 1);
        assert_eq!(info.audio_track_count(), 1);
        assert_eq!(info.streams[2].kind, StreamKind::Subtitle);
        let audio = info.first_audio().expect("audio stream");
        assert_eq!(audio.sample_rate, Some(48_000));
        assert_eq!(audio.channels, Some(2));
        assert_eq!(info.duration_seconds, Some(12.5));
    }

    #[test]
    fn missing_duration_is_none() {
        let stdout = "stream|index=0|codec_type=audio|codec_name=opus\nformat|duration=N/A\n";
        let info = parse_probe_output(Path::new("a.ogg"), stdout).expect("parse");
        assert_eq!(info.duration_seconds, None);
        assert!(info.first_video().is_none());
    }

    #[test]
    fn output_without_streams_is_an_error() {
        assert!(parse_probe_output(Path::new("x"), "format|duration=1.0\n").is_err());
    }
}
