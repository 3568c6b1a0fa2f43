pub mod db;
pub mod error;
pub mod measurement;
pub mod models;
pub mod sensing;
pub mod settings;
pub mod utils;

use std::{env, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use log::{info, warn};

use db::Database;
use measurement::{
    Collaborators, MeasurementController, SessionOutcome, SessionPhase, ThumbnailEncoder,
};
use models::MeasurementMode;
use sensing::{
    LoggingHaptics, LoggingIdleSleep, SimulatedSensor, SimulationProfile, SyntheticSnapshots,
};
use settings::SettingsStore;

const DEFAULT_DATA_DIR: &str = "blinkwatch-data";
/// Main ticks a Normal-mode demo runs before it is closed.
const NORMAL_DEMO_TICKS: u32 = 30;

/// Knobs read from the environment for the headless demo.
#[derive(Debug, Clone)]
struct RunOptions {
    data_dir: PathBuf,
    mode: MeasurementMode,
    title: String,
    debug: bool,
}

impl RunOptions {
    fn from_env() -> Result<Self> {
        let data_dir = env::var_os("BLINKWATCH_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

        let mode = match env::var("BLINKWATCH_MODE") {
            Ok(value) => value
                .parse()
                .with_context(|| "BLINKWATCH_MODE must be 'normal' or 'focus'")?,
            Err(_) => MeasurementMode::default(),
        };

        let title = env::var("BLINKWATCH_TITLE").unwrap_or_else(|_| "Untitled".to_string());

        let debug = env::var("BLINKWATCH_DEBUG")
            .map(|value| matches!(value.as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            data_dir,
            mode,
            title,
            debug,
        })
    }
}

pub fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("Blinkwatch starting up...");

    let options = RunOptions::from_env()?;
    std::fs::create_dir_all(&options.data_dir).with_context(|| {
        format!("failed to create data directory {}", options.data_dir.display())
    })?;

    let settings = SettingsStore::new(options.data_dir.join("settings.json"))?;
    let database = Database::new(options.data_dir.join("blinkwatch.sqlite3"))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(run_session(options, settings, database))
}

async fn run_session(
    options: RunOptions,
    settings: SettingsStore,
    database: Database,
) -> Result<()> {
    let mut measurement = settings.measurement();
    let mut tick_interval = Duration::from_secs(1);
    if options.debug {
        // One "minute" of focus compressed into a few seconds.
        measurement.focus_minutes = 1;
        measurement.calibration_secs = 0;
        tick_interval = Duration::from_millis(100);
    }

    let config = measurement.session_config(options.title.clone(), options.mode)?;
    let calibration = config.calibration;
    let focus_target = config.focus_target_secs();

    let collaborators = Collaborators {
        snapshots: Arc::new(SyntheticSnapshots::default()),
        images: Arc::new(ThumbnailEncoder),
        store: Arc::new(database.clone()),
        haptics: Arc::new(LoggingHaptics::default()),
        idle_sleep: Arc::new(LoggingIdleSleep::default()),
    };

    let controller = MeasurementController::new(collaborators).with_tick_interval(tick_interval);
    let (session, task) = controller.start(config)?;

    let mut sensor = SimulatedSensor::new();
    let profile = SimulationProfile {
        sample_interval: tick_interval / 5,
        ..SimulationProfile::default()
    };
    sensor.start(session.clone(), profile)?;

    let mut updates = session.subscribe();
    let demo_length = match focus_target {
        // Focus sessions end themselves; leave slack for calibration and scheduling.
        Some(target) => calibration + tick_interval * (target as u32 + 5),
        None => calibration + tick_interval * NORMAL_DEMO_TICKS,
    };

    tokio::select! {
        _ = updates.wait_for(|snapshot| snapshot.phase == SessionPhase::Ended) => {
            info!("session ended on its own");
        }
        _ = tokio::time::sleep(demo_length) => {
            info!("demo time is up; closing session");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted; closing session");
        }
    }

    if let Err(err) = session.close().await {
        info!("session already closed: {err}");
    }
    sensor.stop().await?;
    drop(session);

    match task.outcome().await? {
        SessionOutcome::Aborted => info!("session aborted before calibration finished"),
        SessionOutcome::Saved(record) => {
            info!(
                "recorded '{}' ({}): {}s total, {:.0}% correct posture, {} blinks, {} frames",
                record.title,
                record.mode_title,
                record.duration_secs,
                record.correct_pose_ratio() * 100.0,
                record.blink_count,
                record.timelapse.len()
            );
            let today = database.list_activities_for_day(&record.date_string).await?;
            info!("{} activities recorded on {}", today.len(), record.date_string);
        }
        SessionOutcome::Unsaved { record, error } => {
            warn!("activity {} was not saved: {error}", record.id);
        }
    }

    Ok(())
}
