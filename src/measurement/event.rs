use std::time::Duration;

use crate::models::{ActivityRecord, Position, TimelapseEntry};

use super::timers::TimerKey;

/// Already-debounced input from the face tracker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorEvent {
    /// `None` when the tracker lost the face.
    PositionUpdated(Option<Position>),
    BlinkEdge { closed: bool },
}

/// Everything the state machine reacts to, one at a time.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Appeared,
    CalibrationCompleted,
    PositionUpdated(Option<Position>),
    BlinkEdge { closed: bool },
    MainTick,
    SleepTick,
    CaptureCompleted(TimelapseEntry),
    CloseRequested,
}

impl From<SensorEvent> for SessionEvent {
    fn from(event: SensorEvent) -> Self {
        match event {
            SensorEvent::PositionUpdated(position) => SessionEvent::PositionUpdated(position),
            SensorEvent::BlinkEdge { closed } => SessionEvent::BlinkEdge { closed },
        }
    }
}

/// Side effects requested by a transition; the runtime executes them in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    SetIdleSleepDisabled(bool),
    StartCalibration(Duration),
    StartTimer(TimerKey),
    /// Cancel any live instance under the key, then start a fresh one.
    RestartTimer(TimerKey),
    CancelTimer(TimerKey),
    TriggerHaptic,
    CaptureSnapshot,
    Persist(ActivityRecord),
}
