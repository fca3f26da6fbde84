//! SubRip and WebVTT loading.

use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use subclip_engine::TimedCue;
use tracing::debug;

#[derive(Debug)]
pub enum SubtitleError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Timestamp {
        line: usize,
        value: String,
    },
    Pattern(regex::Error),
}

impl Display for SubtitleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "read {}: {source}", path.display()),
            Self::Timestamp { line, value } => {
                write!(f, "line {line}: invalid cue timing `{value}`")
            }
            Self::Pattern(err) => write!(f, "markup pattern: {err}"),
        }
    }
}

impl std::error::Error for SubtitleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Pattern(err) => Some(err),
            Self::Timestamp { .. } => None,
        }
    }
}

impl From<regex::Error> for SubtitleError {
    fn from(value: regex::Error) -> Self {
        Self::Pattern(value)
    }
}

pub fn load_cues(path: &Path) -> Result<Vec<TimedCue>, SubtitleError> {
    let raw = fs::read_to_string(path).map_err(|source| SubtitleError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let cues = parse_cues(&raw)?;
    debug!(path = %path.display(), cues = cues.len(), "subtitles loaded");
    Ok(cues)
}

/// Parses SubRip or WebVTT text into cues ordered by start time.
///
/// Blocks without a `-->` timing line (the WebVTT header, `NOTE` and `STYLE`
/// blocks) are skipped. Markup tags are stripped from the text.
///
/// # Example
/// ```ignore
/// let cues = parse_cues("1\n00:00:01,000 --> 00:00:02,500\n<i>Hola</i>\n").unwrap();
/// assert_eq!(cues[0].text, "Hola");
/// ```
pub fn parse_cues(raw: &str) -> Result<Vec<TimedCue>, SubtitleError> {
    let raw = raw.trim_start_matches('\u{feff}').replace("\r\n", "\n");
    let tags = Regex::new(MARKUP_PATTERN)?;
    let mut cues = Vec::new();
    let mut line_number = 0;

    for block in raw.split("\n\n") {
        let block_start = line_number + 1;
        line_number += block.lines().count() + 1;

        let mut lines = block.lines().enumerate().skip_while(|(_, line)| line.trim().is_empty());
        let Some((timing_offset, timing)) = lines.by_ref().find(|(_, line)| line.contains("-->"))
        else {
            continue;
        };
        let line = block_start + timing_offset;
        let (start, end) = parse_timing(timing, line)?;

        let text = lines
            .map(|(_, line)| tags.replace_all(line.trim(), "").into_owned())
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        cues.push(TimedCue {
            index: 0,
            start,
            end,
            text,
        });
    }

    cues.sort_by(|a, b| a.start.total_cmp(&b.start));
    for (index, cue) in cues.iter_mut().enumerate() {
        cue.index = index;
    }
    Ok(cues)
}

/// HTML-style tags and ASS override blocks such as `{\an8}`.
const MARKUP_PATTERN: &str = r"<[^>]*>|\{\\[^}]*\}";

fn parse_timing(line: &str, line_number: usize) -> Result<(f64, f64), SubtitleError> {
    let invalid = || SubtitleError::Timestamp {
        line: line_number,
        value: line.trim().to_string(),
    };
    let (start, rest) = line.split_once("-->").ok_or_else(invalid)?;
    // WebVTT cue settings follow the end time.
    let end = rest.split_whitespace().next().ok_or_else(invalid)?;
    let start = parse_timestamp(start.trim()).ok_or_else(invalid)?;
    let end = parse_timestamp(end).ok_or_else(invalid)?;
    Ok((start, end))
}

/// `hh:mm:ss,mmm`, `hh:mm:ss.mmm` or `mm:ss.mmm`.
fn parse_timestamp(value: &str) -> Option<f64> {
    let (clock, fraction) = value
        .split_once([',', '.'])
        .map_or((value, "0"), |(clock, fraction)| (clock, fraction));
    let mut parts = clock.split(':').rev();
    let seconds: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let hours: u64 = match parts.next() {
        Some(hours) => hours.parse().ok()?,
        None => 0,
    };
    if parts.next().is_some() || seconds >= 60 || minutes >= 60 {
        return None;
    }
    if fraction.is_empty() || fraction.len() > 3 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let millis: u64 = format!("{fraction:0<3}").parse().ok()?;
    let total_ms = (hours * 3600 + minutes * 60 + seconds) * 1000 + millis;
    Some(total_ms as f64 / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::{SubtitleError, parse_cues, parse_timestamp};

    #[test]
    fn parses_srt_blocks_and_strips_markup() {
        let raw = "1\r\n00:00:01,000 --> 00:00:02,500\r\n<i>Hola</i>\r\n\r\n2\r\n00:00:02,500 --> 00:00:04,000\r\n¿Qué tal?\r\n{\\an8}Bien\r\n";
        let cues = parse_cues(raw).expect("parse srt");

        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].text, "Hola");
        assert_eq!((cues[0].start, cues[0].end), (1.0, 2.5));
        assert_eq!(cues[1].index, 1);
        assert_eq!(cues[1].text, "¿Qué tal?\nBien");
    }

    #[test]
    fn parses_webvtt_with_header_settings_and_short_timestamps() {
        let raw = "WEBVTT\n\nNOTE translated by hand\n\nintro\n00:05.000 --> 00:07.250 align:start position:10%\nBonjour\n\n00:00:01.000 --> 00:00:03.000\nSalut\n";
        let cues = parse_cues(raw).expect("parse vtt");

        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].text, "Salut");
        assert_eq!(cues[0].index, 0);
        assert_eq!((cues[1].start, cues[1].end), (5.0, 7.25));
    }

    #[test]
    fn reports_line_of_bad_timing() {
        let raw = "1\n00:00:01,000 --> 00:00:02,000\na\n\n2\n00:00:xx,000 --> 00:00:03,000\nb\n";
        match parse_cues(raw) {
            Err(SubtitleError::Timestamp { line, .. }) => assert_eq!(line, 6),
            other => panic!("expected timestamp error, got {other:?}"),
        }
    }

    #[test]
    fn timestamp_rejects_out_of_range_fields() {
        assert_eq!(parse_timestamp("01:02:03,450"), Some(3723.45));
        assert_eq!(parse_timestamp("00:61:00,000"), None);
        assert_eq!(parse_timestamp("1:2:3:4.0"), None);
    }
}
