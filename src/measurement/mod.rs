//! Measurement session: reducer, timers, capture pipeline and the loop that ties them together.

pub mod capture;
pub mod collaborators;
pub mod controller;
pub mod distance;
pub mod event;
pub mod machine;
pub mod sleep;
pub mod state;
pub mod timers;

pub use collaborators::{
    ActivityStore, Collaborators, HapticFeedback, IdleSleepToggle, ImageProcessor,
    SnapshotSource, ThumbnailEncoder,
};
pub use controller::{
    MeasurementController, SessionHandle, SessionOutcome, SessionSnapshot, SessionTask,
};
pub use event::{Effect, SensorEvent, SessionEvent};
pub use state::{SessionConfig, SessionPhase, SessionState};
pub use timers::TimerKey;
