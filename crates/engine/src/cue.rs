use serde::{Deserialize, Serialize};
use tracing::debug;

/// One timed subtitle line. Bounds are in seconds of subtitle time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedCue {
    pub index: usize,
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl TimedCue {
    /// Returns true when media time `t` falls inside this cue shifted by `offset`.
    ///
    /// Cues are half-open: `start + offset <= t < end + offset`. A cue ending
    /// exactly where the next one starts hands over at that instant, and
    /// zero-length cues never match.
    pub fn contains(&self, t: f64, offset: f64) -> bool {
        self.start + offset <= t && t < self.end + offset
    }
}

/// Immutable cue list for one subtitle track.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CueTrack {
    cues: Vec<TimedCue>,
    sorted_disjoint: bool,
}

impl CueTrack {
    /// Builds a track in file order.
    ///
    /// Each cue's `index` is rewritten to its position so resolver results
    /// and cue indices agree.
    pub fn new(mut cues: Vec<TimedCue>) -> Self {
        for (position, cue) in cues.iter_mut().enumerate() {
            cue.index = position;
        }
        let sorted_disjoint = cues
            .windows(2)
            .all(|pair| pair[0].start <= pair[1].start && pair[0].end <= pair[1].start);

        debug!(
            cue_count = cues.len(),
            sorted_disjoint, "subtitle track loaded"
        );
        Self {
            cues,
            sorted_disjoint,
        }
    }

    pub fn cues(&self) -> &[TimedCue] {
        &self.cues
    }

    pub fn get(&self, index: usize) -> Option<&TimedCue> {
        self.cues.get(index)
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    /// Finds the active cue at media time `time`.
    ///
    /// `previous` is checked first so playback inside one line never
    /// re-scans. Sorted tracks without overlaps use a binary search; other
    /// tracks fall back to a scan that returns the lowest matching index.
    ///
    /// # Example
    /// ```
    /// use subclip_engine::cue::{CueTrack, TimedCue};
    ///
    /// let track = CueTrack::new(vec![
    ///     TimedCue { index: 0, start: 0.0, end: 2.0, text: "a".into() },
    ///     TimedCue { index: 1, start: 2.0, end: 4.0, text: "b".into() },
    /// ]);
    /// assert_eq!(track.resolve(3.9, 0.0, None), Some(1));
    /// assert_eq!(track.resolve(2.0, 0.0, Some(0)), Some(1));
    /// assert_eq!(track.resolve(4.5, 0.0, Some(1)), None);
    /// ```
    pub fn resolve(&self, time: f64, offset: f64, previous: Option<usize>) -> Option<usize> {
        if let Some(previous) = previous {
            if self
                .cues
                .get(previous)
                .is_some_and(|cue| cue.contains(time, offset))
            {
                return Some(previous);
            }
        }

        if self.sorted_disjoint {
            resolve_sorted(&self.cues, time, offset)
        } else {
            resolve(&self.cues, time, offset, None)
        }
    }

    /// Start of the earliest cue beginning strictly after `time`, in media time.
    pub fn next_start_after(&self, time: f64, offset: f64) -> Option<f64> {
        self.cues
            .iter()
            .map(|cue| cue.start + offset)
            .filter(|start| *start > time)
            .min_by(f64::total_cmp)
    }

    /// Start of the latest cue beginning strictly before `time`, in media time.
    pub fn previous_start_before(&self, time: f64, offset: f64) -> Option<f64> {
        self.cues
            .iter()
            .map(|cue| cue.start + offset)
            .filter(|start| *start < time)
            .max_by(f64::total_cmp)
    }
}

/// Resolves the active cue by linear scan.
///
/// Returns the lowest index containing `time`, or `None` in gaps. When
/// `previous` still contains `time` it wins even if an earlier overlapping
/// cue also matches, which keeps the active line stable.
pub fn resolve(
    cues: &[TimedCue],
    time: f64,
    offset: f64,
    previous: Option<usize>,
) -> Option<usize> {
    if let Some(previous) = previous {
        if cues
            .get(previous)
            .is_some_and(|cue| cue.contains(time, offset))
        {
            return Some(previous);
        }
    }

    cues.iter().position(|cue| cue.contains(time, offset))
}

fn resolve_sorted(cues: &[TimedCue], time: f64, offset: f64) -> Option<usize> {
    let upper = cues.partition_point(|cue| cue.start + offset <= time);
    let candidate = upper.checked_sub(1)?;
    cues[candidate]
        .contains(time, offset)
        .then_some(candidate)
}
