use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Lead time before the B point at which an A/B loop jumps back.
pub const LOOP_EPSILON_SECONDS: f64 = 0.05;

/// Padding used around the playhead when no cue bounds are available.
pub const FALLBACK_AUDIO_PADDING_SECONDS: f64 = 2.0;

/// Half-open span of media time in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: f64,
    pub end: f64,
}

impl TimeWindow {
    /// Creates a validated window.
    ///
    /// # Example
    /// ```
    /// use subclip_engine::TimeWindow;
    ///
    /// let window = TimeWindow::new(1.0, 4.0).expect("valid");
    /// assert_eq!(window.duration(), 3.0);
    /// assert!(TimeWindow::new(4.0, 1.0).is_err());
    /// ```
    pub fn new(start: f64, end: f64) -> Result<Self> {
        if !start.is_finite() || !end.is_finite() || start < 0.0 || end <= start {
            return Err(EngineError::InvalidRecordWindow {
                start,
                end: Some(end),
            });
        }
        Ok(Self { start, end })
    }

    /// Builds `[at - padding, at + padding]` clamped to `[0, duration]`.
    ///
    /// # Example
    /// ```
    /// use subclip_engine::TimeWindow;
    ///
    /// let window = TimeWindow::around(1.0, 2.0, 10.0);
    /// assert_eq!(window, TimeWindow { start: 0.0, end: 3.0 });
    /// ```
    pub fn around(at: f64, padding: f64, duration: f64) -> Self {
        Self {
            start: at - padding,
            end: at + padding,
        }
        .clamped(duration)
    }

    /// Clamps both bounds into `[0, duration]`.
    pub fn clamped(self, duration: f64) -> Self {
        let upper = duration.max(0.0);
        Self {
            start: self.start.clamp(0.0, upper),
            end: self.end.clamp(0.0, upper),
        }
    }

    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    pub fn contains(&self, t: f64) -> bool {
        self.start <= t && t < self.end
    }
}

/// Converts seconds to whole milliseconds, rounding to nearest.
pub fn seconds_to_millis(seconds: f64) -> i64 {
    if !seconds.is_finite() {
        return 0;
    }
    (seconds * 1_000.0).round() as i64
}

#[cfg(test)]
mod tests {
    use super::{TimeWindow, seconds_to_millis};

    #[test]
    fn around_clamps_to_media_duration() {
        let window = TimeWindow::around(9.0, 2.0, 10.0);
        assert_eq!(window, TimeWindow { start: 7.0, end: 10.0 });
    }

    #[test]
    fn new_rejects_empty_and_negative_windows() {
        assert!(TimeWindow::new(2.0, 2.0).is_err());
        assert!(TimeWindow::new(-1.0, 2.0).is_err());
        assert!(TimeWindow::new(0.0, f64::NAN).is_err());
    }

    #[test]
    fn contains_is_half_open() {
        let window = TimeWindow::new(1.0, 2.0).expect("valid");
        assert!(window.contains(1.0));
        assert!(!window.contains(2.0));
    }

    #[test]
    fn seconds_to_millis_rounds_to_nearest() {
        assert_eq!(seconds_to_millis(1.2346), 1_235);
        assert_eq!(seconds_to_millis(f64::INFINITY), 0);
    }
}
