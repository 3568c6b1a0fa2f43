use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};

use crate::models::MeasurementMode;

pub fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

pub fn to_u64(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("{field} contains negative value {value}"))
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_mode(value: &str) -> Result<MeasurementMode> {
    match value {
        "Normal" => Ok(MeasurementMode::Normal),
        "Focus" => Ok(MeasurementMode::Focus),
        other => Err(anyhow!("unknown measurement mode {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_round_trips_through_its_column_value() {
        for mode in [MeasurementMode::Normal, MeasurementMode::Focus] {
            assert_eq!(parse_mode(mode.as_str()).unwrap(), mode);
        }
        assert!(parse_mode("Paused").is_err());
    }

    #[test]
    fn negative_counts_are_rejected() {
        assert!(to_u64(-1, "blink_count").is_err());
        assert_eq!(to_u64(7, "blink_count").unwrap(), 7);
        assert!(to_i64(u64::MAX).is_err());
    }
}
