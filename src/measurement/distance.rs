//! Posture drift check against the calibrated head position.

use crate::error::SessionError;
use crate::models::Position;

/// Farther than this from the calibrated center counts as a warning.
pub const POSTURE_DEVIATION_THRESHOLD: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DistanceCheck {
    Correct(f32),
    Deviated(f32),
}

impl DistanceCheck {
    pub fn is_warning(&self) -> bool {
        matches!(self, DistanceCheck::Deviated(_))
    }

    pub fn distance(&self) -> f32 {
        match self {
            DistanceCheck::Correct(d) | DistanceCheck::Deviated(d) => *d,
        }
    }
}

pub fn check(
    initial: Option<&Position>,
    current: Option<&Position>,
) -> Result<DistanceCheck, SessionError> {
    let (Some(initial), Some(current)) = (initial, current) else {
        return Err(SessionError::SensorUnavailable);
    };

    let distance = initial.distance_to(current);
    if distance > POSTURE_DEVIATION_THRESHOLD {
        Ok(DistanceCheck::Deviated(distance))
    } else {
        Ok(DistanceCheck::Correct(distance))
    }
}
