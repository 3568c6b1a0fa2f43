use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::{
    helpers::{parse_datetime, parse_mode, to_i64, to_u64},
    Database,
};
use crate::models::{ActivityRecord, ActivitySummary, TimelapseEntry};

const SUMMARY_COLUMNS: &str = "a.id, a.title, a.mode, a.duration_secs, a.correct_pose_secs,
     a.blink_count, a.created_at, a.date_string,
     (SELECT COUNT(*) FROM timelapse_entries t WHERE t.activity_id = a.id) AS timelapse_count";

fn row_to_summary(row: &Row) -> Result<ActivitySummary> {
    let mode: String = row.get("mode")?;
    let created_at: String = row.get("created_at")?;

    Ok(ActivitySummary {
        id: row.get("id")?,
        title: row.get("title")?,
        mode: parse_mode(&mode)?,
        duration_secs: to_u64(row.get("duration_secs")?, "duration_secs")?,
        correct_pose_secs: to_u64(row.get("correct_pose_secs")?, "correct_pose_secs")?,
        blink_count: to_u64(row.get("blink_count")?, "blink_count")?,
        timelapse_count: to_u64(row.get("timelapse_count")?, "timelapse_count")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        date_string: row.get("date_string")?,
    })
}

fn load_timelapse(conn: &Connection, activity_id: &str) -> Result<Vec<TimelapseEntry>> {
    let mut stmt = conn.prepare(
        "SELECT name, captured_at, thumbnail
         FROM timelapse_entries
         WHERE activity_id = ?1
         ORDER BY position ASC",
    )?;

    let mut rows = stmt.query(params![activity_id])?;
    let mut entries = Vec::new();
    while let Some(row) = rows.next()? {
        let captured_at: String = row.get(1)?;
        entries.push(TimelapseEntry {
            name: row.get(0)?,
            captured_at: parse_datetime(&captured_at, "captured_at")?,
            thumbnail: row.get(2)?,
        });
    }
    Ok(entries)
}

impl Database {
    /// Records are written once; a second insert with the same id is refused.
    pub async fn insert_activity(&self, record: &ActivityRecord) -> Result<()> {
        let record = record.clone();
        self.execute(move |conn| {
            let tx = conn.transaction()?;

            let exists: Option<String> = tx
                .query_row(
                    "SELECT id FROM activities WHERE id = ?1",
                    params![record.id],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_some() {
                bail!("activity {} already stored", record.id);
            }

            tx.execute(
                "INSERT INTO activities (id, title, mode, mode_title, duration_secs, correct_pose_secs, blink_count, created_at, date_string)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.id,
                    record.title,
                    record.mode.as_str(),
                    record.mode_title,
                    to_i64(record.duration_secs)?,
                    to_i64(record.correct_pose_secs)?,
                    to_i64(record.blink_count)?,
                    record.created_at.to_rfc3339(),
                    record.date_string,
                ],
            )
            .context("failed to insert activity")?;

            for (position, entry) in record.timelapse.iter().enumerate() {
                tx.execute(
                    "INSERT INTO timelapse_entries (activity_id, position, name, captured_at, thumbnail)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        record.id,
                        to_i64(position as u64)?,
                        entry.name,
                        entry.captured_at.to_rfc3339(),
                        entry.thumbnail,
                    ],
                )
                .context("failed to insert timelapse entry")?;
            }

            tx.commit().context("failed to commit activity")?;
            Ok(())
        })
        .await
    }

    pub async fn get_activity(&self, activity_id: &str) -> Result<Option<ActivityRecord>> {
        let activity_id = activity_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, mode, mode_title, duration_secs, correct_pose_secs, blink_count, created_at, date_string
                 FROM activities
                 WHERE id = ?1",
            )?;

            let mut rows = stmt.query(params![activity_id])?;
            let Some(row) = rows.next()? else {
                return Ok(None);
            };

            let mode: String = row.get("mode")?;
            let created_at: String = row.get("created_at")?;
            let id: String = row.get("id")?;
            let timelapse = load_timelapse(conn, &id)?;

            Ok(Some(ActivityRecord {
                title: row.get("title")?,
                mode: parse_mode(&mode)?,
                mode_title: row.get("mode_title")?,
                duration_secs: to_u64(row.get("duration_secs")?, "duration_secs")?,
                correct_pose_secs: to_u64(row.get("correct_pose_secs")?, "correct_pose_secs")?,
                blink_count: to_u64(row.get("blink_count")?, "blink_count")?,
                timelapse,
                created_at: parse_datetime(&created_at, "created_at")?,
                date_string: row.get("date_string")?,
                id,
            }))
        })
        .await
    }

    /// Newest first.
    pub async fn list_activities(&self) -> Result<Vec<ActivitySummary>> {
        self.execute(|conn| {
            let sql = format!(
                "SELECT {SUMMARY_COLUMNS}
                 FROM activities a
                 ORDER BY a.created_at DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query([])?;
            let mut activities = Vec::new();
            while let Some(row) = rows.next()? {
                activities.push(row_to_summary(row)?);
            }
            Ok(activities)
        })
        .await
    }

    /// Activities recorded on one local calendar day (`YYYY-MM-DD`), oldest first.
    pub async fn list_activities_for_day(&self, date_string: &str) -> Result<Vec<ActivitySummary>> {
        let date_string = date_string.to_string();
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {SUMMARY_COLUMNS}
                 FROM activities a
                 WHERE a.date_string = ?1
                 ORDER BY a.created_at ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![date_string])?;
            let mut activities = Vec::new();
            while let Some(row) = rows.next()? {
                activities.push(row_to_summary(row)?);
            }
            Ok(activities)
        })
        .await
    }

    /// Returns false when no such activity existed.
    pub async fn delete_activity(&self, activity_id: &str) -> Result<bool> {
        let activity_id = activity_id.to_string();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM timelapse_entries WHERE activity_id = ?1",
                params![activity_id],
            )?;
            let deleted = tx.execute("DELETE FROM activities WHERE id = ?1", params![activity_id])?;
            tx.commit()?;
            Ok(deleted > 0)
        })
        .await
    }
}
