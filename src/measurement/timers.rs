//! Keyed, cancellable timer tasks.
//!
//! Each key owns at most one tokio task. Starting a key that is already live
//! cancels the old task before the new one is registered, and every tick is
//! stamped with the generation of the task that produced it so the session
//! loop can drop ticks that were already queued when the task was replaced.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{Sender, WeakSender};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const ENABLE_LOGS: bool = true;

use crate::log_debug;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum TimerKey {
    /// One-shot pre-roll before the posture baseline is captured.
    Calibration,
    Main,
    Sleep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerTick {
    pub key: TimerKey,
    pub generation: u64,
}

struct TimerTask {
    generation: u64,
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

impl TimerTask {
    fn stop(self) {
        self.cancel_token.cancel();
        self.handle.abort();
    }
}

/// Owned by the session loop; not shared.
pub struct TimerRegistry<M> {
    tasks: HashMap<TimerKey, TimerTask>,
    next_generation: u64,
    sink: WeakSender<M>,
}

impl<M> TimerRegistry<M>
where
    M: From<TimerTick> + Send + 'static,
{
    pub fn new(sink: &Sender<M>) -> Self {
        Self {
            tasks: HashMap::new(),
            next_generation: 0,
            sink: sink.downgrade(),
        }
    }

    /// Tick every `period`, first tick one period from now.
    pub fn start_periodic(&mut self, key: TimerKey, period: Duration) -> u64 {
        self.spawn(key, move |tick, sink, cancel_token| async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if !deliver(&sink, tick).await {
                            break;
                        }
                    }
                    _ = cancel_token.cancelled() => break,
                }
            }
        })
    }

    /// Tick once after `delay`.
    pub fn start_once(&mut self, key: TimerKey, delay: Duration) -> u64 {
        self.spawn(key, move |tick, sink, cancel_token| async move {
            tokio::select! {
                _ = time::sleep(delay) => {
                    deliver(&sink, tick).await;
                }
                _ = cancel_token.cancelled() => {}
            }
        })
    }

    /// Returns false when nothing was registered under `key`.
    pub fn cancel(&mut self, key: TimerKey) -> bool {
        match self.tasks.remove(&key) {
            Some(task) => {
                log_debug!("cancelled {:?} timer (generation {})", key, task.generation);
                task.stop();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.stop();
        }
    }

    pub fn is_active(&self, key: TimerKey) -> bool {
        self.tasks.contains_key(&key)
    }

    /// True only for ticks from the live task under the tick's key.
    pub fn is_current(&self, tick: &TimerTick) -> bool {
        self.tasks
            .get(&tick.key)
            .is_some_and(|task| task.generation == tick.generation)
    }

    /// Forget a one-shot timer after its tick was consumed.
    pub fn complete(&mut self, tick: &TimerTick) {
        if self.is_current(tick) {
            self.tasks.remove(&tick.key);
        }
    }

    fn spawn<F, Fut>(&mut self, key: TimerKey, body: F) -> u64
    where
        F: FnOnce(TimerTick, WeakSender<M>, CancellationToken) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.cancel(key);

        self.next_generation += 1;
        let generation = self.next_generation;
        let tick = TimerTick { key, generation };
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(body(tick, self.sink.clone(), cancel_token.clone()));

        log_debug!("started {:?} timer (generation {})", key, generation);
        self.tasks.insert(
            key,
            TimerTask {
                generation,
                cancel_token,
                handle,
            },
        );
        generation
    }
}

impl<M> Drop for TimerRegistry<M> {
    fn drop(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.stop();
        }
    }
}

/// False once the session loop is gone.
async fn deliver<M: From<TimerTick>>(sink: &WeakSender<M>, tick: TimerTick) -> bool {
    let Some(sender) = sink.upgrade() else {
        return false;
    };
    sender.send(M::from(tick)).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[derive(Debug, PartialEq)]
    struct Msg(TimerTick);

    impl From<TimerTick> for Msg {
        fn from(tick: TimerTick) -> Self {
            Msg(tick)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_timer_skips_immediate_tick() {
        let (tx, mut rx) = mpsc::channel::<Msg>(16);
        let mut registry = TimerRegistry::new(&tx);
        let generation = registry.start_periodic(TimerKey::Main, Duration::from_secs(1));

        time::sleep(Duration::from_millis(2500)).await;
        registry.cancel(TimerKey::Main);

        let mut received = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            received.push(msg);
        }
        assert_eq!(received.len(), 2);
        assert!(received
            .iter()
            .all(|Msg(tick)| tick.key == TimerKey::Main && tick.generation == generation));
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replaces_the_previous_instance() {
        let (tx, mut rx) = mpsc::channel::<Msg>(16);
        let mut registry = TimerRegistry::new(&tx);
        let first = registry.start_periodic(TimerKey::Sleep, Duration::from_secs(1));
        time::sleep(Duration::from_millis(1500)).await;

        let second = registry.start_periodic(TimerKey::Sleep, Duration::from_secs(1));
        assert_ne!(first, second);

        let Msg(stale) = rx.recv().await.unwrap();
        assert_eq!(stale.generation, first);
        assert!(!registry.is_current(&stale));

        time::sleep(Duration::from_millis(3200)).await;
        let mut fresh = 0;
        while let Ok(Msg(tick)) = rx.try_recv() {
            assert_eq!(tick.generation, second);
            assert!(registry.is_current(&tick));
            fresh += 1;
        }
        assert_eq!(fresh, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_independent() {
        let (tx, mut rx) = mpsc::channel::<Msg>(16);
        let mut registry = TimerRegistry::new(&tx);
        registry.start_periodic(TimerKey::Main, Duration::from_secs(1));
        registry.start_periodic(TimerKey::Sleep, Duration::from_secs(1));

        assert!(registry.cancel(TimerKey::Sleep));
        assert!(!registry.cancel(TimerKey::Sleep));
        assert!(registry.is_active(TimerKey::Main));

        time::sleep(Duration::from_millis(1500)).await;
        let Msg(tick) = rx.try_recv().unwrap();
        assert_eq!(tick.key, TimerKey::Main);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn one_shot_fires_once() {
        let (tx, mut rx) = mpsc::channel::<Msg>(16);
        let mut registry = TimerRegistry::new(&tx);
        registry.start_once(TimerKey::Calibration, Duration::from_secs(3));

        time::sleep(Duration::from_secs(10)).await;
        let Msg(tick) = rx.try_recv().unwrap();
        assert_eq!(tick.key, TimerKey::Calibration);
        assert!(rx.try_recv().is_err());

        registry.complete(&tick);
        assert!(!registry.is_active(TimerKey::Calibration));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_one_shot_never_fires() {
        let (tx, mut rx) = mpsc::channel::<Msg>(16);
        let mut registry = TimerRegistry::new(&tx);
        registry.start_once(TimerKey::Calibration, Duration::from_secs(3));
        registry.cancel_all();

        time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }
}
