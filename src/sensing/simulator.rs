use anyhow::{bail, Context, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::SessionError;
use crate::measurement::{SensorEvent, SessionHandle};
use crate::models::Position;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Shape of the synthetic face-tracking stream.
#[derive(Debug, Clone)]
pub struct SimulationProfile {
    pub sample_interval: Duration,
    /// Head position the stream wobbles around.
    pub rest: Position,
    /// Per-axis noise amplitude. Keep well under the posture threshold.
    pub jitter: f32,
    /// Chance per sample of starting a slouch.
    pub slouch_chance: f64,
    pub slouch_samples: u32,
    /// Offset applied while slouching.
    pub slouch_offset: Position,
    /// Chance per sample that the face drops out of frame.
    pub dropout_chance: f64,
    pub blink_chance: f64,
}

impl Default for SimulationProfile {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_millis(200),
            rest: Position::new(0.0, 0.0, -0.5),
            jitter: 0.01,
            slouch_chance: 0.01,
            slouch_samples: 25,
            slouch_offset: Position::new(0.0, -0.15, 0.05),
            dropout_chance: 0.005,
            blink_chance: 0.06,
        }
    }
}

/// Stands in for a face tracker: pushes positions and blink edges into a session.
pub struct SimulatedSensor {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl SimulatedSensor {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn start(&mut self, session: SessionHandle, profile: SimulationProfile) -> Result<()> {
        if self.handle.is_some() {
            bail!("simulated sensor already running");
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(sensor_loop(session, profile, cancel_token.clone()));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("simulated sensor task failed to join")
        } else {
            Ok(())
        }
    }
}

impl Default for SimulatedSensor {
    fn default() -> Self {
        Self::new()
    }
}

async fn sensor_loop(
    session: SessionHandle,
    profile: SimulationProfile,
    cancel_token: CancellationToken,
) {
    let mut rng = StdRng::from_entropy();
    let mut ticker = tokio::time::interval(profile.sample_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut slouch_left = 0u32;
    let mut eyes_closed = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let mut events = Vec::with_capacity(2);

                if slouch_left == 0 && rng.gen_bool(profile.slouch_chance) {
                    log_debug!("simulated sensor: slouching for {} samples", profile.slouch_samples);
                    slouch_left = profile.slouch_samples;
                }

                let position = if rng.gen_bool(profile.dropout_chance) {
                    None
                } else {
                    let base = if slouch_left > 0 {
                        slouch_left -= 1;
                        slouched(&profile)
                    } else {
                        profile.rest
                    };
                    Some(jittered(&mut rng, base, profile.jitter))
                };
                events.push(SensorEvent::PositionUpdated(position));

                // A blink is a closed edge followed by an open edge on the next sample.
                if eyes_closed {
                    eyes_closed = false;
                    events.push(SensorEvent::BlinkEdge { closed: false });
                } else if rng.gen_bool(profile.blink_chance) {
                    eyes_closed = true;
                    events.push(SensorEvent::BlinkEdge { closed: true });
                }

                for event in events {
                    match session.try_send_sensor(event) {
                        Ok(()) => {}
                        Err(SessionError::SessionClosed) => {
                            log_info!("session closed; simulated sensor stopping");
                            return;
                        }
                        Err(err) => log_warn!("simulated sensor send failed: {err}"),
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("simulated sensor shutting down");
                break;
            }
        }
    }
}

fn jittered(rng: &mut StdRng, base: Position, jitter: f32) -> Position {
    if jitter <= 0.0 {
        return base;
    }
    base.offset(
        rng.gen_range(-jitter..=jitter),
        rng.gen_range(-jitter..=jitter),
        rng.gen_range(-jitter..=jitter),
    )
}

fn slouched(profile: &SimulationProfile) -> Position {
    let delta = profile.slouch_offset;
    profile.rest.offset(delta.x, delta.y, delta.z)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_within_amplitude() {
        let mut rng = StdRng::seed_from_u64(7);
        let base = Position::new(0.2, 0.1, -0.4);
        for _ in 0..200 {
            let sample = jittered(&mut rng, base, 0.01);
            assert!(sample.distance_to(&base) <= 0.01 * 3f32.sqrt() + 1e-6);
        }
    }

    #[test]
    fn zero_jitter_is_exact() {
        let mut rng = StdRng::seed_from_u64(1);
        let base = Position::new(1.0, 2.0, 3.0);
        assert_eq!(jittered(&mut rng, base, 0.0), base);
    }

    #[test]
    fn default_slouch_crosses_posture_threshold() {
        let profile = SimulationProfile::default();
        let pose = slouched(&profile);
        assert!(
            pose.distance_to(&profile.rest)
                > crate::measurement::distance::POSTURE_DEVIATION_THRESHOLD
        );
    }
}
