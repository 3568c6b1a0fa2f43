//! Finished measurement artifacts.
//!
//! An `ActivityRecord` is built once when a session finalizes and is handed to
//! the configured `ActivityStore`. Nothing mutates it afterwards.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum MeasurementMode {
    Normal,
    Focus,
}

impl Default for MeasurementMode {
    fn default() -> Self {
        MeasurementMode::Normal
    }
}

impl MeasurementMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeasurementMode::Normal => "Normal",
            MeasurementMode::Focus => "Focus",
        }
    }

    /// Human-facing label stored alongside the record.
    pub fn title(&self) -> &'static str {
        match self {
            MeasurementMode::Normal => "Normal mode",
            MeasurementMode::Focus => "Focus mode",
        }
    }
}

impl std::str::FromStr for MeasurementMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "normal" => Ok(MeasurementMode::Normal),
            "focus" => Ok(MeasurementMode::Focus),
            other => Err(anyhow::anyhow!("unknown measurement mode '{other}'")),
        }
    }
}

/// One downsampled snapshot taken during a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimelapseEntry {
    /// PNG-encoded thumbnail.
    pub thumbnail: Vec<u8>,
    /// Capture label shown next to the thumbnail.
    pub name: String,
    pub captured_at: DateTime<Utc>,
}

impl TimelapseEntry {
    pub fn new(thumbnail: Vec<u8>, captured_at: DateTime<Utc>) -> Self {
        Self {
            thumbnail,
            name: capture_label(captured_at),
            captured_at,
        }
    }
}

pub fn capture_label(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

pub fn date_string(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d").to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    pub id: String,
    pub title: String,
    pub mode: MeasurementMode,
    pub mode_title: String,
    pub duration_secs: u64,
    pub correct_pose_secs: u64,
    pub blink_count: u64,
    pub timelapse: Vec<TimelapseEntry>,
    pub created_at: DateTime<Utc>,
    /// Local calendar day of `created_at`, used for per-day lookups.
    pub date_string: String,
}

impl ActivityRecord {
    pub fn new(
        title: String,
        mode: MeasurementMode,
        duration_secs: u64,
        correct_pose_secs: u64,
        blink_count: u64,
        timelapse: Vec<TimelapseEntry>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title,
            mode,
            mode_title: mode.title().to_string(),
            duration_secs,
            correct_pose_secs,
            blink_count,
            timelapse,
            created_at,
            date_string: date_string(created_at),
        }
    }

    /// Share of the session spent within the posture threshold, 0.0..=1.0.
    pub fn correct_pose_ratio(&self) -> f64 {
        if self.duration_secs == 0 {
            return 0.0;
        }
        self.correct_pose_secs as f64 / self.duration_secs as f64
    }
}

/// Lightweight row for list views; omits thumbnail bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySummary {
    pub id: String,
    pub title: String,
    pub mode: MeasurementMode,
    pub duration_secs: u64,
    pub correct_pose_secs: u64,
    pub blink_count: u64,
    pub timelapse_count: u64,
    pub created_at: DateTime<Utc>,
    pub date_string: String,
}
