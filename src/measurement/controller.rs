use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::{
    mpsc::{self, error::TrySendError, WeakSender},
    watch,
};
use tokio::task::JoinHandle;

use crate::error::SessionError;
use crate::models::{ActivityRecord, MeasurementMode, Position, TimelapseEntry};

use super::capture::spawn_capture;
use super::collaborators::Collaborators;
use super::event::{Effect, SensorEvent, SessionEvent};
use super::machine::transition;
use super::state::{SessionConfig, SessionPhase, SessionState};
use super::timers::{TimerKey, TimerRegistry, TimerTick};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Read-only view of a live session for whoever renders it.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub mode: MeasurementMode,
    pub elapsed_secs: u64,
    pub correct_pose_secs: u64,
    pub is_warning: bool,
    pub blink_count: u64,
    pub sleep_remaining_secs: u64,
    pub is_sleep: bool,
    pub timelapse_count: usize,
    /// Seconds until a Focus session ends on its own.
    pub remaining_secs: Option<u64>,
}

impl From<&SessionState> for SessionSnapshot {
    fn from(state: &SessionState) -> Self {
        Self {
            phase: state.phase,
            mode: state.config.mode,
            elapsed_secs: state.elapsed_secs,
            correct_pose_secs: state.correct_pose_secs,
            is_warning: state.is_warning,
            blink_count: state.blink_count,
            sleep_remaining_secs: state.sleep_remaining_secs,
            is_sleep: state.is_sleep,
            timelapse_count: state.timelapse.len(),
            remaining_secs: state
                .config
                .focus_target_secs()
                .map(|target| target.saturating_sub(state.elapsed_secs)),
        }
    }
}

/// How a session left the loop.
#[derive(Debug)]
pub enum SessionOutcome {
    /// Closed before calibration finished; nothing was recorded.
    Aborted,
    Saved(ActivityRecord),
    /// The record was built but the store rejected it. No retry is attempted.
    Unsaved {
        record: ActivityRecord,
        error: SessionError,
    },
}

impl SessionOutcome {
    pub fn record(&self) -> Option<&ActivityRecord> {
        match self {
            SessionOutcome::Aborted => None,
            SessionOutcome::Saved(record) | SessionOutcome::Unsaved { record, .. } => Some(record),
        }
    }
}

#[derive(Debug)]
pub enum SessionMessage {
    Sensor(SensorEvent),
    Timer(TimerTick),
    Captured(TimelapseEntry),
    Close,
}

impl From<TimerTick> for SessionMessage {
    fn from(tick: TimerTick) -> Self {
        SessionMessage::Timer(tick)
    }
}

impl From<TimelapseEntry> for SessionMessage {
    fn from(entry: TimelapseEntry) -> Self {
        SessionMessage::Captured(entry)
    }
}

/// Sending side of a live session. Dropping every handle closes the session.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionMessage>,
    snapshots: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    pub async fn send_sensor(&self, event: SensorEvent) -> Result<(), SessionError> {
        self.tx
            .send(SessionMessage::Sensor(event))
            .await
            .map_err(|_| SessionError::SessionClosed)
    }

    /// For sensor callbacks that cannot await. A full queue drops the sample.
    pub fn try_send_sensor(&self, event: SensorEvent) -> Result<(), SessionError> {
        match self.tx.try_send(SessionMessage::Sensor(event)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                log_warn!("session queue full; dropping {:?}", event);
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(SessionError::SessionClosed),
        }
    }

    pub async fn position_updated(&self, position: Option<Position>) -> Result<(), SessionError> {
        self.send_sensor(SensorEvent::PositionUpdated(position)).await
    }

    pub async fn blink_edge(&self, closed: bool) -> Result<(), SessionError> {
        self.send_sensor(SensorEvent::BlinkEdge { closed }).await
    }

    pub async fn close(&self) -> Result<(), SessionError> {
        self.tx
            .send(SessionMessage::Close)
            .await
            .map_err(|_| SessionError::SessionClosed)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

pub struct SessionTask(JoinHandle<SessionOutcome>);

impl SessionTask {
    pub async fn outcome(self) -> Result<SessionOutcome> {
        self.0.await.context("session task failed to join")
    }
}

#[derive(Clone)]
pub struct MeasurementController {
    collaborators: Collaborators,
    tick_interval: Duration,
    channel_capacity: usize,
}

impl MeasurementController {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            collaborators,
            tick_interval: Duration::from_secs(1),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    /// Spawn the session loop onto the current tokio runtime.
    pub fn start(&self, config: SessionConfig) -> Result<(SessionHandle, SessionTask), SessionError> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let state = SessionState::new(config);
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::from(&state));

        let runtime = SessionRuntime {
            state,
            rx,
            sink: tx.downgrade(),
            timers: TimerRegistry::new(&tx),
            collaborators: self.collaborators.clone(),
            tick_interval: self.tick_interval,
            snapshot_tx,
            outcome: SessionOutcome::Aborted,
        };
        let task = tokio::spawn(runtime.run());

        Ok((
            SessionHandle {
                tx,
                snapshots: snapshot_rx,
            },
            SessionTask(task),
        ))
    }
}

/// Single writer for one session's state. Events are applied one at a time.
struct SessionRuntime {
    state: SessionState,
    rx: mpsc::Receiver<SessionMessage>,
    sink: WeakSender<SessionMessage>,
    timers: TimerRegistry<SessionMessage>,
    collaborators: Collaborators,
    tick_interval: Duration,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    outcome: SessionOutcome,
}

impl SessionRuntime {
    async fn run(mut self) -> SessionOutcome {
        log_info!(
            "measurement session '{}' starting in {} mode",
            self.state.config.title,
            self.state.config.mode.as_str()
        );

        self.dispatch(SessionEvent::Appeared).await;

        while !self.state.is_ended() {
            let Some(message) = self.rx.recv().await else {
                log_info!("all session handles dropped; closing session");
                self.dispatch(SessionEvent::CloseRequested).await;
                break;
            };

            if let Some(event) = self.accept(message) {
                self.dispatch(event).await;
            }
        }

        self.timers.cancel_all();
        self.outcome
    }

    /// Map a queued message to a state machine event, dropping stale ticks.
    fn accept(&mut self, message: SessionMessage) -> Option<SessionEvent> {
        match message {
            SessionMessage::Sensor(event) => Some(event.into()),
            SessionMessage::Captured(entry) => Some(SessionEvent::CaptureCompleted(entry)),
            SessionMessage::Close => Some(SessionEvent::CloseRequested),
            SessionMessage::Timer(tick) => {
                if !self.timers.is_current(&tick) {
                    log_debug!("dropping stale {:?} tick (generation {})", tick.key, tick.generation);
                    return None;
                }
                match tick.key {
                    TimerKey::Calibration => {
                        self.timers.complete(&tick);
                        Some(SessionEvent::CalibrationCompleted)
                    }
                    TimerKey::Main => Some(SessionEvent::MainTick),
                    TimerKey::Sleep => Some(SessionEvent::SleepTick),
                }
            }
        }
    }

    async fn dispatch(&mut self, event: SessionEvent) {
        let state = std::mem::take(&mut self.state);
        let (next, effects) = transition(state, event);
        self.state = next;

        for effect in effects {
            self.execute(effect).await;
        }

        self.snapshot_tx
            .send_replace(SessionSnapshot::from(&self.state));
    }

    async fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::SetIdleSleepDisabled(disabled) => {
                self.collaborators.idle_sleep.set_disabled(disabled);
            }
            Effect::StartCalibration(delay) => {
                self.timers.start_once(TimerKey::Calibration, delay);
            }
            Effect::StartTimer(key) | Effect::RestartTimer(key) => {
                self.timers.start_periodic(key, self.tick_interval);
            }
            Effect::CancelTimer(key) => {
                self.timers.cancel(key);
            }
            Effect::TriggerHaptic => {
                log_debug!(
                    "haptic alert (warning={}, sleep={})",
                    self.state.is_warning,
                    self.state.is_sleep
                );
                self.collaborators.haptics.trigger();
            }
            Effect::CaptureSnapshot => {
                log_debug!("timelapse capture at {}s", self.state.elapsed_secs);
                spawn_capture(
                    self.collaborators.snapshots.clone(),
                    self.collaborators.images.clone(),
                    self.state.config.thumbnail_size,
                    self.sink.clone(),
                );
            }
            Effect::Persist(record) => self.persist(record).await,
        }
    }

    async fn persist(&mut self, record: ActivityRecord) {
        match self.collaborators.store.save(record.clone()).await {
            Ok(()) => {
                log_info!(
                    "saved activity {} ({}s, {} blinks, {} correct-pose secs, {} frames)",
                    record.id,
                    record.duration_secs,
                    record.blink_count,
                    record.correct_pose_secs,
                    record.timelapse.len()
                );
                self.outcome = SessionOutcome::Saved(record);
            }
            Err(err) => {
                log_error!("failed to persist activity {}: {err:#}", record.id);
                self.outcome = SessionOutcome::Unsaved {
                    record,
                    error: SessionError::PersistenceFailure(format!("{err:#}")),
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::collaborators::{
        ActivityStore, BoxFuture, HapticFeedback, IdleSleepToggle, SnapshotSource,
        ThumbnailEncoder,
    };
    use anyhow::bail;
    use image::{DynamicImage, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::time::sleep;

    const HOME: Position = Position::new(0.0, 0.02, 0.35);

    #[derive(Default)]
    struct Host {
        saved: Mutex<Vec<ActivityRecord>>,
        haptics: AtomicUsize,
        idle_sleep: Mutex<Vec<bool>>,
        snapshots: AtomicUsize,
        reject_saves: bool,
    }

    impl Host {
        fn rejecting() -> Self {
            Self {
                reject_saves: true,
                ..Self::default()
            }
        }

        fn haptic_count(&self) -> usize {
            self.haptics.load(Ordering::SeqCst)
        }

        fn saved(&self) -> Vec<ActivityRecord> {
            self.saved.lock().unwrap().clone()
        }

        fn idle_toggles(&self) -> Vec<bool> {
            self.idle_sleep.lock().unwrap().clone()
        }
    }

    impl ActivityStore for Host {
        fn save(&self, record: ActivityRecord) -> BoxFuture<'_, anyhow::Result<()>> {
            Box::pin(async move {
                if self.reject_saves {
                    bail!("disk full");
                }
                self.saved.lock().unwrap().push(record);
                Ok(())
            })
        }
    }

    impl HapticFeedback for Host {
        fn trigger(&self) {
            self.haptics.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl IdleSleepToggle for Host {
        fn set_disabled(&self, disabled: bool) {
            self.idle_sleep.lock().unwrap().push(disabled);
        }
    }

    impl SnapshotSource for Host {
        fn capture_snapshot(&self) -> Option<DynamicImage> {
            self.snapshots.fetch_add(1, Ordering::SeqCst);
            Some(DynamicImage::ImageRgb8(RgbImage::new(160, 120)))
        }
    }

    fn controller(host: &Arc<Host>) -> MeasurementController {
        MeasurementController::new(Collaborators {
            snapshots: host.clone(),
            images: Arc::new(ThumbnailEncoder),
            store: host.clone(),
            haptics: host.clone(),
            idle_sleep: host.clone(),
        })
    }

    fn config(mode: MeasurementMode) -> SessionConfig {
        SessionConfig {
            title: "evening reading".into(),
            mode,
            focus_minutes: 1,
            sleep_timer_secs: 600,
            timelapse_enabled: false,
            calibration: Duration::from_secs(3),
            thumbnail_size: 64,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn normal_session_closed_after_ten_ticks() {
        let host = Arc::new(Host::default());
        let (handle, task) = controller(&host).start(config(MeasurementMode::Normal)).unwrap();

        handle.position_updated(Some(HOME)).await.unwrap();
        sleep(Duration::from_millis(3500)).await;
        assert_eq!(handle.snapshot().phase, SessionPhase::Running);

        handle.blink_edge(true).await.unwrap();
        handle.blink_edge(false).await.unwrap();
        handle.blink_edge(true).await.unwrap();
        handle.blink_edge(false).await.unwrap();

        sleep(Duration::from_secs(10)).await;
        handle.close().await.unwrap();

        let outcome = task.outcome().await.unwrap();
        let SessionOutcome::Saved(record) = outcome else {
            panic!("expected a saved record");
        };
        assert_eq!(record.duration_secs, 10);
        assert_eq!(record.blink_count, 2);
        assert_eq!(record.correct_pose_secs, 10);
        assert_eq!(record.mode, MeasurementMode::Normal);
        assert_eq!(host.saved().len(), 1);
        assert_eq!(host.idle_toggles(), vec![true, false]);
        assert_eq!(host.haptic_count(), 0);
        assert!(handle.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn focus_session_ends_itself_after_one_minute() {
        let host = Arc::new(Host::default());
        let (handle, task) = controller(&host).start(config(MeasurementMode::Focus)).unwrap();
        handle.position_updated(Some(HOME)).await.unwrap();

        let outcome = task.outcome().await.unwrap();
        let record = outcome.record().cloned().unwrap();
        assert!(matches!(outcome, SessionOutcome::Saved(_)));
        assert_eq!(record.duration_secs, 60);
        assert_eq!(record.correct_pose_secs, 60);
        assert_eq!(record.blink_count, 0);
        assert_eq!(host.haptic_count(), 0);
        assert_eq!(host.saved().len(), 1);

        let last = handle.snapshot();
        assert_eq!(last.phase, SessionPhase::Ended);
        assert!(!last.is_warning);
        assert_eq!(last.remaining_secs, Some(0));

        // Closing an ended session reports it as closed rather than saving again.
        assert!(handle.close().await.is_err());
        assert_eq!(host.saved().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn posture_drift_warns_at_the_next_tick() {
        let host = Arc::new(Host::default());
        let (handle, task) = controller(&host).start(config(MeasurementMode::Normal)).unwrap();
        handle.position_updated(Some(HOME)).await.unwrap();

        // Calibrated at 3s; ticks land at 4s, 5s, ...
        sleep(Duration::from_millis(7500)).await;
        assert_eq!(handle.snapshot().elapsed_secs, 4);
        handle
            .position_updated(Some(HOME.offset(0.0, 0.15, 0.0)))
            .await
            .unwrap();

        sleep(Duration::from_secs(1)).await;
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.elapsed_secs, 5);
        assert!(snapshot.is_warning);
        assert_eq!(snapshot.correct_pose_secs, 4);
        assert_eq!(host.haptic_count(), 1);

        sleep(Duration::from_secs(2)).await;
        assert_eq!(host.haptic_count(), 1);

        handle.close().await.unwrap();
        let record = task.outcome().await.unwrap().record().cloned().unwrap();
        assert_eq!(record.duration_secs, 7);
        assert_eq!(record.correct_pose_secs, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn focus_sleep_flags_once_and_blink_wakes() {
        let host = Arc::new(Host::default());
        let mut session_config = config(MeasurementMode::Focus);
        session_config.sleep_timer_secs = 5;
        let (handle, task) = controller(&host).start(session_config).unwrap();
        handle.position_updated(Some(HOME)).await.unwrap();

        // 3s calibration + 5 sleep ticks.
        sleep(Duration::from_millis(8500)).await;
        let snapshot = handle.snapshot();
        assert!(snapshot.is_sleep);
        assert_eq!(snapshot.sleep_remaining_secs, 0);
        assert_eq!(host.haptic_count(), 1);

        sleep(Duration::from_secs(4)).await;
        assert_eq!(host.haptic_count(), 1);

        handle.blink_edge(true).await.unwrap();
        sleep(Duration::from_millis(100)).await;
        let snapshot = handle.snapshot();
        assert!(!snapshot.is_sleep);
        assert_eq!(snapshot.sleep_remaining_secs, 5);

        sleep(Duration::from_millis(2500)).await;
        assert_eq!(handle.snapshot().sleep_remaining_secs, 3);

        handle.close().await.unwrap();
        let record = task.outcome().await.unwrap().record().cloned().unwrap();
        assert_eq!(record.blink_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn close_during_calibration_aborts() {
        let host = Arc::new(Host::default());
        let (handle, task) = controller(&host).start(config(MeasurementMode::Focus)).unwrap();

        sleep(Duration::from_secs(1)).await;
        handle.close().await.unwrap();

        let outcome = task.outcome().await.unwrap();
        assert!(matches!(outcome, SessionOutcome::Aborted));
        assert!(host.saved().is_empty());
        assert_eq!(host.idle_toggles(), vec![true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_save_is_reported() {
        let host = Arc::new(Host::rejecting());
        let (handle, task) = controller(&host).start(config(MeasurementMode::Normal)).unwrap();
        sleep(Duration::from_millis(5500)).await;
        handle.close().await.unwrap();

        match task.outcome().await.unwrap() {
            SessionOutcome::Unsaved { record, error } => {
                assert_eq!(record.duration_secs, 2);
                assert!(matches!(error, SessionError::PersistenceFailure(_)));
            }
            other => panic!("expected unsaved outcome, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_every_handle_closes_the_session() {
        let host = Arc::new(Host::default());
        let (handle, task) = controller(&host).start(config(MeasurementMode::Normal)).unwrap();
        sleep(Duration::from_millis(6500)).await;
        drop(handle);

        let record = task.outcome().await.unwrap().record().cloned().unwrap();
        assert_eq!(record.duration_secs, 3);
        assert_eq!(host.saved().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timelapse_frames_accumulate_into_the_record() {
        let host = Arc::new(Host::default());
        let mut session_config = config(MeasurementMode::Normal);
        session_config.timelapse_enabled = true;
        let (handle, task) = controller(&host).start(session_config).unwrap();

        // Encoding runs on the blocking pool, so wait on the frames themselves.
        let mut updates = handle.subscribe();
        updates
            .wait_for(|snapshot| snapshot.timelapse_count >= 2)
            .await
            .unwrap();
        handle.close().await.unwrap();

        let record = task.outcome().await.unwrap().record().cloned().unwrap();
        assert!(record.duration_secs >= 6);
        assert!(record.timelapse.len() >= 2);
        assert!(host.snapshots.load(Ordering::SeqCst) >= 2);
        assert!(record.timelapse.iter().all(|entry| !entry.thumbnail.is_empty()));
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_up_front() {
        let host = Arc::new(Host::default());
        let mut session_config = config(MeasurementMode::Focus);
        session_config.focus_minutes = 0;
        assert!(matches!(
            controller(&host).start(session_config),
            Err(SessionError::InvalidConfig(_))
        ));
    }
}
