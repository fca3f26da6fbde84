use tracing::debug;

/// Read mirror of the playback surface position.
///
/// The surface adapter is the only writer of the real position. The engine
/// updates this mirror from accepted time samples and never seeks by mutating
/// it; seeks go out as commands to the surface.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlaybackClock {
    pub current_time: f64,
    pub is_seeking: bool,
    pub is_buffering: bool,
}

/// Drops time samples while a requested seek is in flight.
///
/// A seek request and the samples it produces would otherwise feed back into
/// loop and recording decisions with a stale position. The lock opens on
/// [`SeekLock::release`] or after `max_dropped` samples, whichever comes first,
/// so a surface that never reports completion cannot stall the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeekLock {
    target: Option<f64>,
    dropped: u32,
    max_dropped: u32,
}

impl SeekLock {
    pub fn new(max_dropped: u32) -> Self {
        Self {
            target: None,
            dropped: 0,
            max_dropped,
        }
    }

    pub fn engage(&mut self, target: f64) {
        self.target = Some(target);
        self.dropped = 0;
    }

    pub fn release(&mut self) {
        self.target = None;
        self.dropped = 0;
    }

    pub fn is_engaged(&self) -> bool {
        self.target.is_some()
    }

    pub fn target(&self) -> Option<f64> {
        self.target
    }

    /// Returns true when the sample at `time` must be ignored.
    pub fn should_drop(&mut self, time: f64) -> bool {
        let Some(target) = self.target else {
            return false;
        };

        if self.dropped >= self.max_dropped {
            debug!(
                target,
                time,
                dropped = self.dropped,
                "seek lock expired without completion"
            );
            self.release();
            return false;
        }

        self.dropped += 1;
        true
    }
}

impl PlaybackClock {
    /// Applies one accepted sample.
    pub fn observe(&mut self, time: f64, buffering: bool) {
        self.current_time = time;
        self.is_buffering = buffering;
    }
}
