//! Failure taxonomy for a measurement session.
//!
//! None of these abort the session loop; each one drops the unit of work it
//! occurred in and is logged where it happens.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no position sample available yet")]
    SensorUnavailable,

    #[error("snapshot unavailable")]
    CaptureUnavailable,

    #[error("thumbnail downsample failed: {0}")]
    DownsampleFailure(String),

    #[error("failed to persist activity: {0}")]
    PersistenceFailure(String),

    #[error("invalid session config: {0}")]
    InvalidConfig(String),

    #[error("session already ended")]
    SessionClosed,
}
