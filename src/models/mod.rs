pub mod activity;
pub mod position;

pub use activity::{ActivityRecord, ActivitySummary, MeasurementMode, TimelapseEntry};
pub use position::Position;
