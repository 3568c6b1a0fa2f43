use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::SessionError;
use crate::models::{MeasurementMode, Position, TimelapseEntry};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    /// Constructed but the measurement view has not appeared yet.
    Idle,
    Calibrating,
    Running,
    Ended,
}

impl Default for SessionPhase {
    fn default() -> Self {
        SessionPhase::Idle
    }
}

/// Inputs fixed for the lifetime of one session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub title: String,
    pub mode: MeasurementMode,
    pub focus_minutes: u64,
    pub sleep_timer_secs: u64,
    pub timelapse_enabled: bool,
    pub calibration: Duration,
    pub thumbnail_size: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            title: String::new(),
            mode: MeasurementMode::Normal,
            focus_minutes: 25,
            sleep_timer_secs: 30,
            timelapse_enabled: true,
            calibration: Duration::from_secs(3),
            thumbnail_size: 100,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.mode == MeasurementMode::Focus {
            if self.focus_minutes == 0 {
                return Err(SessionError::InvalidConfig(
                    "focus_minutes must be greater than zero for focus mode".into(),
                ));
            }
            if self.sleep_timer_secs == 0 {
                return Err(SessionError::InvalidConfig(
                    "sleep_timer_secs must be greater than zero for focus mode".into(),
                ));
            }
        }
        if self.timelapse_enabled && self.thumbnail_size == 0 {
            return Err(SessionError::InvalidConfig(
                "thumbnail_size must be greater than zero when timelapse is enabled".into(),
            ));
        }
        Ok(())
    }

    /// Elapsed seconds at which a Focus session ends on its own.
    pub fn focus_target_secs(&self) -> Option<u64> {
        match self.mode {
            MeasurementMode::Focus => Some(self.focus_minutes.saturating_mul(60)),
            MeasurementMode::Normal => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub phase: SessionPhase,
    pub config: SessionConfig,
    pub elapsed_secs: u64,
    pub correct_pose_secs: u64,
    pub is_warning: bool,
    pub initial_center: Option<Position>,
    pub current_center: Option<Position>,
    pub blink_count: u64,
    pub sleep_remaining_secs: u64,
    pub is_sleep: bool,
    pub timelapse: Vec<TimelapseEntry>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl SessionState {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            phase: SessionPhase::Idle,
            sleep_remaining_secs: config.sleep_timer_secs,
            config,
            elapsed_secs: 0,
            correct_pose_secs: 0,
            is_warning: false,
            initial_center: None,
            current_center: None,
            blink_count: 0,
            is_sleep: false,
            timelapse: Vec::new(),
        }
    }

    pub fn mode(&self) -> MeasurementMode {
        self.config.mode
    }

    pub fn is_running(&self) -> bool {
        self.phase == SessionPhase::Running
    }

    pub fn is_ended(&self) -> bool {
        self.phase == SessionPhase::Ended
    }

    /// Sleep countdown applies only to a running Focus session.
    pub fn sleep_monitor_active(&self) -> bool {
        self.is_running() && self.config.mode == MeasurementMode::Focus
    }
}
