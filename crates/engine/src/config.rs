//! Engine tuning loaded from JSON.
//!
//! Every field has a default, so a config file only needs the keys it
//! changes.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capture::CaptureMode;
use crate::error::{EngineError, Result};
use crate::marker::MarkerMode;
use crate::surface::EncodingFormat;
use crate::time::{FALLBACK_AUDIO_PADDING_SECONDS, LOOP_EPSILON_SECONDS};

/// Runtime settings for [`crate::Engine`] and its adapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// What the marker button does: A/B loop or open-ended recording.
    pub marker_mode: MarkerMode,
    pub loop_epsilon_seconds: f64,
    /// Interval at which adapters should sample the playback position.
    pub poll_interval_ms: u64,
    /// Size of the chunks a recorder delivers.
    pub recorder_timeslice_ms: u64,
    pub fallback_audio_padding_seconds: f64,
    /// Samples dropped after a seek before the lock opens on its own.
    pub seek_lock_max_samples: u32,
    /// Capture mode used by record-mode markers.
    pub record_capture_mode: CaptureMode,
    /// Preferred video MIME types, most preferred first.
    pub video_formats: Vec<String>,
    /// Preferred audio MIME types, most preferred first.
    pub audio_formats: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            marker_mode: MarkerMode::Loop,
            loop_epsilon_seconds: LOOP_EPSILON_SECONDS,
            poll_interval_ms: 100,
            recorder_timeslice_ms: 100,
            fallback_audio_padding_seconds: FALLBACK_AUDIO_PADDING_SECONDS,
            seek_lock_max_samples: 20,
            record_capture_mode: CaptureMode::Video,
            video_formats: vec![
                "video/webm;codecs=vp9,opus".to_string(),
                "video/webm;codecs=vp8,opus".to_string(),
                "video/webm".to_string(),
                "video/mp4".to_string(),
            ],
            audio_formats: vec![
                "audio/webm;codecs=opus".to_string(),
                "audio/webm".to_string(),
                "audio/ogg;codecs=opus".to_string(),
                "audio/mp4".to_string(),
                "audio/mpeg".to_string(),
            ],
        }
    }
}

impl EngineConfig {
    /// Parses a JSON document. Missing keys keep their defaults.
    ///
    /// # Example
    /// ```
    /// use subclip_engine::EngineConfig;
    ///
    /// let config = EngineConfig::from_json_str(r#"{ "marker_mode": "record" }"#).expect("parse");
    /// assert_eq!(config.poll_interval_ms, 100);
    /// ```
    pub fn from_json_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|source| EngineError::ConfigParse { path: None, source })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| EngineError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| EngineError::ConfigParse {
            path: Some(path.to_path_buf()),
            source,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn recorder_timeslice(&self) -> Duration {
        Duration::from_millis(self.recorder_timeslice_ms.max(1))
    }

    pub fn video_encoding_formats(&self) -> Vec<EncodingFormat> {
        self.video_formats.iter().map(EncodingFormat::new).collect()
    }

    pub fn audio_encoding_formats(&self) -> Vec<EncodingFormat> {
        self.audio_formats.iter().map(EncodingFormat::new).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::EngineConfig;
    use crate::capture::CaptureMode;
    use crate::error::EngineError;
    use crate::marker::MarkerMode;

    #[test]
    fn partial_json_keeps_defaults_for_missing_keys() {
        let config = EngineConfig::from_json_str(
            r#"{ "marker_mode": "record", "record_capture_mode": "audio",
                 "poll_interval_ms": 50 }"#,
        )
        .expect("parse config");

        assert_eq!(config.marker_mode, MarkerMode::Record);
        assert_eq!(config.record_capture_mode, CaptureMode::Audio);
        assert_eq!(config.poll_interval(), Duration::from_millis(50));
        assert_eq!(config.loop_epsilon_seconds, 0.05);
        assert_eq!(config.audio_formats, EngineConfig::default().audio_formats);
    }

    #[test]
    fn invalid_json_reports_parse_error() {
        assert!(matches!(
            EngineConfig::from_json_str("{ marker_mode"),
            Err(EngineError::ConfigParse { path: None, .. })
        ));
    }

    #[test]
    fn load_reads_file_and_reports_missing_file() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "seek_lock_max_samples": 3 }"#).expect("write config");

        let config = EngineConfig::load(&path).expect("load config");
        assert_eq!(config.seek_lock_max_samples, 3);

        assert!(matches!(
            EngineConfig::load(&dir.path().join("missing.json")),
            Err(EngineError::ConfigIo { .. })
        ));
    }

    #[test]
    fn zero_intervals_are_raised_to_one_millisecond() {
        let config = EngineConfig {
            poll_interval_ms: 0,
            recorder_timeslice_ms: 0,
            ..EngineConfig::default()
        };
        assert_eq!(config.poll_interval(), Duration::from_millis(1));
        assert_eq!(config.recorder_timeslice(), Duration::from_millis(1));
    }
}
