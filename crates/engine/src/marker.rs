use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::api::Notification;
use crate::error::EngineError;
use crate::time::LOOP_EPSILON_SECONDS;

/// A/B marker state. `ArmedAt` holds the A point, `Looping` holds A and B.
///
/// In record mode `ArmedAt` holds the record-in point of an open-ended
/// recording instead; the shape is shared so switching modes never needs a
/// conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub enum LoopState {
    #[default]
    None,
    ArmedAt(f64),
    Looping(f64, f64),
}

/// Meaning of the marker button.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerMode {
    #[default]
    Loop,
    Record,
}

/// Inputs to the marker state machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MarkerEvent {
    Mark { at: f64 },
    Sample { at: f64 },
    Clear,
    MediaChanged,
}

/// Requests produced by a transition. The machine never performs them.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkerEffect {
    Seek { to: f64 },
    StartRecording { start: f64 },
    StopRecording,
    Notify(Notification),
}

/// Pure A/B loop and record controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerMachine {
    mode: MarkerMode,
    epsilon: f64,
}

impl Default for MarkerMachine {
    fn default() -> Self {
        Self::new(MarkerMode::Loop, LOOP_EPSILON_SECONDS)
    }
}

impl MarkerMachine {
    pub fn new(mode: MarkerMode, epsilon: f64) -> Self {
        Self {
            mode,
            epsilon: epsilon.max(0.0),
        }
    }

    pub fn mode(&self) -> MarkerMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: MarkerMode) {
        self.mode = mode;
    }

    /// Computes the next state and the effects the caller must apply.
    ///
    /// # Example
    /// ```
    /// use subclip_engine::marker::{LoopState, MarkerEffect, MarkerEvent, MarkerMachine};
    ///
    /// let machine = MarkerMachine::default();
    /// let (state, _) = machine.transition(LoopState::None, MarkerEvent::Mark { at: 5.0 });
    /// let (state, _) = machine.transition(state, MarkerEvent::Mark { at: 10.0 });
    /// assert_eq!(state, LoopState::Looping(5.0, 10.0));
    ///
    /// let (state, effects) = machine.transition(state, MarkerEvent::Sample { at: 9.96 });
    /// assert_eq!(state, LoopState::Looping(5.0, 10.0));
    /// assert_eq!(effects, vec![MarkerEffect::Seek { to: 5.0 }]);
    /// ```
    pub fn transition(
        &self,
        state: LoopState,
        event: MarkerEvent,
    ) -> (LoopState, Vec<MarkerEffect>) {
        match event {
            MarkerEvent::MediaChanged | MarkerEvent::Clear => (LoopState::None, Vec::new()),
            MarkerEvent::Mark { at } => match self.mode {
                MarkerMode::Loop => self.mark_loop(state, at),
                MarkerMode::Record => self.mark_record(state, at),
            },
            MarkerEvent::Sample { at } => self.sample(state, at),
        }
    }

    fn mark_loop(&self, state: LoopState, at: f64) -> (LoopState, Vec<MarkerEffect>) {
        match state {
            LoopState::None => {
                debug!(a = at, "loop armed");
                (LoopState::ArmedAt(at), Vec::new())
            }
            LoopState::ArmedAt(a) if at > a => {
                debug!(a, b = at, "loop closed");
                (LoopState::Looping(a, at), Vec::new())
            }
            LoopState::ArmedAt(a) => {
                warn!(a, b = at, "loop rejected: end is not after start");
                let error = EngineError::InvalidLoopRange { start: a, end: at };
                (
                    LoopState::None,
                    vec![MarkerEffect::Notify(Notification::from_error(&error))],
                )
            }
            LoopState::Looping(..) => (LoopState::None, Vec::new()),
        }
    }

    fn mark_record(&self, state: LoopState, at: f64) -> (LoopState, Vec<MarkerEffect>) {
        match state {
            LoopState::None => (
                LoopState::ArmedAt(at),
                vec![MarkerEffect::StartRecording { start: at }],
            ),
            LoopState::ArmedAt(_) => (LoopState::None, vec![MarkerEffect::StopRecording]),
            LoopState::Looping(..) => (LoopState::None, Vec::new()),
        }
    }

    fn sample(&self, state: LoopState, at: f64) -> (LoopState, Vec<MarkerEffect>) {
        match state {
            LoopState::Looping(a, b) if self.mode == MarkerMode::Loop && at >= b - self.epsilon => {
                (state, vec![MarkerEffect::Seek { to: a }])
            }
            _ => (state, Vec::new()),
        }
    }
}

/// Checks whether a mark can be placed on the current media.
pub(crate) fn ensure_markable(media_id: Option<&str>, duration: f64) -> Result<(), Notification> {
    let Some(media_id) = media_id else {
        return Err(Notification::from_error(&EngineError::MediaNotLoaded));
    };
    if duration.is_nan() || duration <= 0.0 {
        return Err(Notification::from_error(&EngineError::EmptyMedia {
            media_id: media_id.to_string(),
        }));
    }
    Ok(())
}
