//! Session reducer: `transition(state, event) -> (state, effects)`.
//!
//! Pure and synchronous. The runtime in `controller` executes the returned
//! effects and feeds their results back in as new events.

use chrono::Utc;

use crate::models::{ActivityRecord, MeasurementMode};

use super::distance::{self, DistanceCheck};
use super::event::{Effect, SessionEvent};
use super::sleep::{self, SleepTick};
use super::state::{SessionPhase, SessionState};
use super::timers::TimerKey;

/// Timelapse snapshots are taken on every multiple of this many elapsed seconds.
pub const TIMELAPSE_EVERY_SECS: u64 = 3;

pub fn transition(mut state: SessionState, event: SessionEvent) -> (SessionState, Vec<Effect>) {
    let mut effects = Vec::new();

    match (state.phase, event) {
        (SessionPhase::Ended, _) => {}

        (SessionPhase::Idle, SessionEvent::Appeared) => {
            state.phase = SessionPhase::Calibrating;
            effects.push(Effect::SetIdleSleepDisabled(true));
            effects.push(Effect::StartCalibration(state.config.calibration));
        }

        (_, SessionEvent::PositionUpdated(position)) => {
            state.current_center = position;
        }

        (SessionPhase::Calibrating, SessionEvent::CalibrationCompleted) => {
            state.initial_center = state.current_center;
            state.phase = SessionPhase::Running;
            effects.push(Effect::StartTimer(TimerKey::Main));
            if state.mode() == MeasurementMode::Focus {
                sleep::reset(
                    &mut state.sleep_remaining_secs,
                    &mut state.is_sleep,
                    state.config.sleep_timer_secs,
                );
                effects.push(Effect::StartTimer(TimerKey::Sleep));
            }
        }

        (SessionPhase::Idle | SessionPhase::Calibrating, SessionEvent::CloseRequested) => {
            let was_calibrating = state.phase == SessionPhase::Calibrating;
            state.phase = SessionPhase::Ended;
            if was_calibrating {
                effects.push(Effect::SetIdleSleepDisabled(false));
                effects.push(Effect::CancelTimer(TimerKey::Calibration));
            }
        }

        (SessionPhase::Running, SessionEvent::CloseRequested) => {
            finalize(&mut state, &mut effects);
        }

        (SessionPhase::Running, SessionEvent::BlinkEdge { closed: true }) => {
            state.blink_count += 1;
            sleep::reset(
                &mut state.sleep_remaining_secs,
                &mut state.is_sleep,
                state.config.sleep_timer_secs,
            );
            if state.mode() == MeasurementMode::Focus {
                effects.push(Effect::RestartTimer(TimerKey::Sleep));
            }
        }

        (SessionPhase::Running, SessionEvent::MainTick) => {
            on_main_tick(&mut state, &mut effects);
        }

        (SessionPhase::Running, SessionEvent::SleepTick) => {
            if state.sleep_monitor_active() {
                let outcome = sleep::tick(&mut state.sleep_remaining_secs, &mut state.is_sleep);
                if outcome == SleepTick::FellAsleep {
                    effects.push(Effect::TriggerHaptic);
                }
            }
        }

        (SessionPhase::Running, SessionEvent::CaptureCompleted(entry)) => {
            state.timelapse.push(entry);
        }

        // Open-eye edges, blinks and ticks outside Running, duplicate Appeared.
        _ => {}
    }

    (state, effects)
}

fn on_main_tick(state: &mut SessionState, effects: &mut Vec<Effect>) {
    state.elapsed_secs += 1;

    match distance::check(state.initial_center.as_ref(), state.current_center.as_ref()) {
        Ok(DistanceCheck::Deviated(_)) => {
            if !state.is_warning {
                effects.push(Effect::TriggerHaptic);
            }
            state.is_warning = true;
        }
        Ok(DistanceCheck::Correct(_)) => {
            state.is_warning = false;
            state.correct_pose_secs += 1;
        }
        // No baseline or no face: skip the check.
        Err(_) => {
            state.is_warning = false;
        }
    }

    if state.config.timelapse_enabled && state.elapsed_secs % TIMELAPSE_EVERY_SECS == 0 {
        effects.push(Effect::CaptureSnapshot);
    }

    if state.config.focus_target_secs() == Some(state.elapsed_secs) {
        finalize(state, effects);
    }
}

/// Only a running session produces a record; any other phase is a no-op.
fn finalize(state: &mut SessionState, effects: &mut Vec<Effect>) {
    if state.phase != SessionPhase::Running {
        return;
    }
    state.phase = SessionPhase::Ended;

    effects.push(Effect::SetIdleSleepDisabled(false));
    effects.push(Effect::CancelTimer(TimerKey::Main));
    effects.push(Effect::CancelTimer(TimerKey::Sleep));

    let record = ActivityRecord::new(
        state.config.title.clone(),
        state.config.mode,
        state.elapsed_secs,
        state.correct_pose_secs,
        state.blink_count,
        state.timelapse.clone(),
        Utc::now(),
    );
    effects.push(Effect::Persist(record));
}
