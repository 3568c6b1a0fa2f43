use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::error::SessionError;
use crate::measurement::SessionConfig;
use crate::models::MeasurementMode;

/// User-tunable knobs read once when a session starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MeasurementSettings {
    /// Length of a Focus session before it ends on its own.
    pub focus_minutes: u64,
    /// Seconds without a blink before a Focus session flags sleep.
    pub sleep_timer_secs: u64,
    pub timelapse_enabled: bool,
    /// Pre-roll countdown before the posture baseline is taken.
    pub calibration_secs: u64,
    /// Longest edge of a timelapse thumbnail, in pixels.
    pub thumbnail_size: u32,
}

impl Default for MeasurementSettings {
    fn default() -> Self {
        Self {
            focus_minutes: 25,
            sleep_timer_secs: 30,
            timelapse_enabled: true,
            calibration_secs: 3,
            thumbnail_size: 100,
        }
    }
}

impl MeasurementSettings {
    pub fn session_config(
        &self,
        title: impl Into<String>,
        mode: MeasurementMode,
    ) -> Result<SessionConfig, SessionError> {
        let config = SessionConfig {
            title: title.into(),
            mode,
            focus_minutes: self.focus_minutes,
            sleep_timer_secs: self.sleep_timer_secs,
            timelapse_enabled: self.timelapse_enabled,
            calibration: Duration::from_secs(self.calibration_secs),
            thumbnail_size: self.thumbnail_size,
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct UserSettings {
    #[serde(default)]
    measurement: MeasurementSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            match serde_json::from_str(&contents) {
                Ok(parsed) => parsed,
                Err(err) => {
                    log::warn!(
                        "Ignoring unreadable settings at {}: {err}",
                        path.display()
                    );
                    UserSettings::default()
                }
            }
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn measurement(&self) -> MeasurementSettings {
        self.read().measurement.clone()
    }

    pub fn update_measurement(&self, settings: MeasurementSettings) -> Result<()> {
        let mut guard = self.write();
        guard.measurement = settings;
        self.persist(&guard)
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)?;
        let data: UserSettings = serde_json::from_str(&contents)?;
        *self.write() = data;
        Ok(())
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, UserSettings> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, UserSettings> {
        self.data
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
