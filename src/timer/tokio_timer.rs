//! [`TimerService`] backed by tokio tasks.

use super::{TimerFired, TimerInfo, TimerService, TimerSpec, now_epoch_millis};
use crate::error::{ReminderError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

type TimerTable = Arc<Mutex<HashMap<String, ActiveTimer>>>;

struct ActiveTimer {
    info: TimerInfo,
    generation: u64,
    task: JoinHandle<()>,
}

/// One sleeping task per named timer.
///
/// Periodic timers keep re-sleeping for their period; one-shot timers remove
/// themselves after firing. Fires go to the receiver returned by [`new`].
///
/// [`new`]: TokioTimerService::new
pub struct TokioTimerService {
    timers: TimerTable,
    fire_tx: mpsc::UnboundedSender<TimerFired>,
    next_generation: AtomicU64,
}

impl TokioTimerService {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerFired>) {
        let (fire_tx, fire_rx) = mpsc::unbounded_channel();
        (
            Self {
                timers: Arc::new(Mutex::new(HashMap::new())),
                fire_tx,
                next_generation: AtomicU64::new(1),
            },
            fire_rx,
        )
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, ActiveTimer>>> {
        self.timers
            .lock()
            .map_err(|_| ReminderError::TimerCreation("timer table lock poisoned".to_owned()))
    }
}

#[async_trait]
impl TimerService for TokioTimerService {
    async fn create(&self, name: &str, spec: TimerSpec) -> Result<()> {
        let now = now_epoch_millis();
        let first_fire = spec.first_fire_ms(now);
        let period_minutes = spec.period_minutes();
        if period_minutes == Some(0) {
            return Err(ReminderError::TimerCreation(format!(
                "timer `{name}` period must be at least one minute"
            )));
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let info = TimerInfo {
            name: name.to_owned(),
            scheduled_time: first_fire,
            period_in_minutes: period_minutes,
        };

        // Spawn under the lock so the task cannot observe the table before
        // its own entry is present.
        {
            let mut timers = self.lock()?;
            let task = tokio::spawn(run_timer(
                name.to_owned(),
                generation,
                Duration::from_millis(first_fire.saturating_sub(now)),
                period_minutes.map(|m| Duration::from_secs(u64::from(m) * 60)),
                Arc::clone(&self.timers),
                self.fire_tx.clone(),
            ));
            if let Some(previous) = timers.insert(
                name.to_owned(),
                ActiveTimer {
                    info,
                    generation,
                    task,
                },
            ) {
                previous.task.abort();
            }
        }

        debug!(
            timer = name,
            first_fire_ms = first_fire,
            period_minutes,
            "timer created"
        );
        Ok(())
    }

    async fn get(&self, name: &str) -> Option<TimerInfo> {
        self.lock().ok()?.get(name).map(|active| active.info.clone())
    }

    async fn clear(&self, name: &str) -> Result<bool> {
        let removed = self.lock()?.remove(name);
        Ok(match removed {
            Some(active) => {
                active.task.abort();
                debug!(timer = name, "timer cleared");
                true
            }
            None => false,
        })
    }
}

impl Drop for TokioTimerService {
    fn drop(&mut self) {
        if let Ok(mut timers) = self.timers.lock() {
            for (_, active) in timers.drain() {
                active.task.abort();
            }
        }
    }
}

async fn run_timer(
    name: String,
    generation: u64,
    first_delay: Duration,
    period: Option<Duration>,
    timers: TimerTable,
    fire_tx: mpsc::UnboundedSender<TimerFired>,
) {
    tokio::time::sleep(first_delay).await;
    loop {
        let fired_at_ms = now_epoch_millis();
        {
            let Ok(mut table) = timers.lock() else {
                return;
            };
            match table.get_mut(&name) {
                Some(active) if active.generation == generation => match period {
                    Some(period) => {
                        let period_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX);
                        active.info.scheduled_time = fired_at_ms.saturating_add(period_ms);
                    }
                    None => {
                        table.remove(&name);
                    }
                },
                // Replaced or cleared while we slept.
                _ => return,
            }
        }

        trace!(timer = %name, fired_at_ms, "timer fired");
        if fire_tx
            .send(TimerFired {
                name: name.clone(),
                fired_at_ms,
            })
            .is_err()
        {
            return;
        }

        let Some(period) = period else {
            return;
        };
        tokio::time::sleep(period).await;
    }
}
