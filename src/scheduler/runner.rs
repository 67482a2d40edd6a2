//! Scheduler background loop.
//!
//! A single tokio task owns the [`ReminderScheduler`] and feeds it every
//! event in arrival order: control commands, timer fires, notification
//! clicks, store changes and health-check ticks. Events are therefore
//! handled serially and no locking is needed around scheduler state.

use super::report::{LastAyahView, RepairReport, StatusView, TimerReport};
use super::{ReminderScheduler, SchedulerEvent};
use crate::error::{ReminderError, Result};
use crate::notify::NotificationClicks;
use crate::settings::Settings;
use crate::store::StoreChange;
use crate::timer::{TimerFired, now_epoch_millis};
use crate::verse::{Verse, VerseReference};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Pending control commands before senders wait.
const COMMAND_CAPACITY: usize = 32;

type Reply<T> = oneshot::Sender<Result<T>>;

enum SchedulerCommand {
    SendNow(Reply<Verse>),
    TestNotification(Reply<Verse>),
    ForceNew(Reply<Verse>),
    SendByReference(VerseReference, Reply<Verse>),
    GetSettings(Reply<Settings>),
    UpdateSettings(u32, Reply<()>),
    CheckWakeUp(Reply<bool>),
    CheckTimerExpired(Reply<bool>),
    Status(Reply<StatusView>),
    TimerReport(Reply<TimerReport>),
    RepairStorage(Reply<RepairReport>),
    LastAyah(Reply<LastAyahView>),
}

/// Cloneable front door to a running scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: mpsc::Sender<SchedulerCommand>,
    events: broadcast::Sender<SchedulerEvent>,
    cancel: CancellationToken,
}

impl SchedulerHandle {
    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> SchedulerCommand) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(make(reply_tx))
            .await
            .map_err(|_| ReminderError::Channel("scheduler is not running".to_owned()))?;
        reply_rx
            .await
            .map_err(|e| ReminderError::Channel(format!("scheduler reply dropped: {e}")))?
    }

    pub async fn send_now(&self) -> Result<Verse> {
        self.request(SchedulerCommand::SendNow).await
    }

    pub async fn test_notification(&self) -> Result<Verse> {
        self.request(SchedulerCommand::TestNotification).await
    }

    pub async fn force_new(&self) -> Result<Verse> {
        self.request(SchedulerCommand::ForceNew).await
    }

    pub async fn send_by_reference(&self, reference: VerseReference) -> Result<Verse> {
        self.request(|reply| SchedulerCommand::SendByReference(reference, reply))
            .await
    }

    pub async fn settings(&self) -> Result<Settings> {
        self.request(SchedulerCommand::GetSettings).await
    }

    pub async fn update_settings(&self, interval_minutes: u32) -> Result<()> {
        self.request(|reply| SchedulerCommand::UpdateSettings(interval_minutes, reply))
            .await
    }

    /// Returns whether a wake-up was detected.
    pub async fn check_wake_up(&self) -> Result<bool> {
        self.request(SchedulerCommand::CheckWakeUp).await
    }

    pub async fn check_timer_expired(&self) -> Result<bool> {
        self.request(SchedulerCommand::CheckTimerExpired).await
    }

    pub async fn status(&self) -> Result<StatusView> {
        self.request(SchedulerCommand::Status).await
    }

    pub async fn timer_report(&self) -> Result<TimerReport> {
        self.request(SchedulerCommand::TimerReport).await
    }

    pub async fn repair_storage(&self) -> Result<RepairReport> {
        self.request(SchedulerCommand::RepairStorage).await
    }

    pub async fn last_ayah(&self) -> Result<LastAyahView> {
        self.request(SchedulerCommand::LastAyah).await
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.events.subscribe()
    }

    /// Stop the loop after the event currently being handled.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Event sources the loop listens to besides commands.
pub struct SchedulerInputs {
    pub fires: mpsc::UnboundedReceiver<TimerFired>,
    /// `None` when the notification backend cannot report clicks.
    pub clicks: Option<NotificationClicks>,
    pub health_check_every: Duration,
}

/// Spawn the loop. It initialises the scheduler first and runs until
/// [`SchedulerHandle::shutdown`] or until every handle is dropped.
pub fn spawn_scheduler(
    scheduler: ReminderScheduler,
    store_changes: broadcast::Receiver<StoreChange>,
    inputs: SchedulerInputs,
) -> (SchedulerHandle, JoinHandle<()>) {
    let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
    let cancel = CancellationToken::new();
    let handle = SchedulerHandle {
        commands: command_tx,
        events: scheduler.event_sender(),
        cancel: cancel.clone(),
    };

    let task = tokio::spawn(run_loop(
        scheduler,
        command_rx,
        store_changes,
        inputs,
        cancel,
    ));
    (handle, task)
}

async fn next_click(clicks: &mut Option<NotificationClicks>) -> Option<String> {
    match clicks {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn run_loop(
    mut scheduler: ReminderScheduler,
    mut commands: mpsc::Receiver<SchedulerCommand>,
    mut store_changes: broadcast::Receiver<StoreChange>,
    inputs: SchedulerInputs,
    cancel: CancellationToken,
) {
    let SchedulerInputs {
        mut fires,
        mut clicks,
        health_check_every,
    } = inputs;
    let events = scheduler.event_sender();

    if let Err(e) = scheduler.initialize(now_epoch_millis()).await {
        error!("initialization failed, health check will retry: {e}");
    }

    let mut health = tokio::time::interval(health_check_every);
    health.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately; initialization just ran.
    health.tick().await;

    let mut fires_open = true;
    let mut store_open = true;
    info!(
        health_check_secs = health_check_every.as_secs(),
        "scheduler loop started"
    );

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                info!("scheduler loop cancelled");
                break;
            }
            command = commands.recv() => {
                let Some(command) = command else {
                    info!("all scheduler handles dropped, stopping loop");
                    break;
                };
                handle_command(&mut scheduler, command).await;
            }
            fired = fires.recv(), if fires_open => match fired {
                Some(fired) => scheduler.on_fire(&fired.name, now_epoch_millis()).await,
                None => {
                    warn!("timer service closed its fire channel");
                    fires_open = false;
                }
            },
            clicked = next_click(&mut clicks) => match clicked {
                Some(id) => {
                    scheduler.on_notification_clicked(&id).await;
                }
                None => {
                    debug!("notification click channel closed");
                    clicks = None;
                }
            },
            change = store_changes.recv(), if store_open => match change {
                Ok(change) => {
                    scheduler.on_store_change(&change, now_epoch_millis()).await;
                    let _ = events.send(SchedulerEvent::StorageChanged(change));
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(lagged = n, "store change events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("store change channel closed");
                    store_open = false;
                }
            },
            _ = health.tick() => {
                let now = now_epoch_millis();
                scheduler.check_wake_up(now).await;
                let report = scheduler.health_check(now).await;
                if report.is_quiet() {
                    debug!("health check completed, nothing to repair");
                } else {
                    info!(?report, "health check repaired scheduler state");
                }
            }
        }
    }
}

async fn handle_command(scheduler: &mut ReminderScheduler, command: SchedulerCommand) {
    let now = now_epoch_millis();
    match command {
        SchedulerCommand::SendNow(reply) => {
            let _ = reply.send(scheduler.send_now(now).await);
        }
        SchedulerCommand::TestNotification(reply) => {
            let _ = reply.send(scheduler.test_notification(now).await);
        }
        SchedulerCommand::ForceNew(reply) => {
            let _ = reply.send(scheduler.force_new(now).await);
        }
        SchedulerCommand::SendByReference(reference, reply) => {
            let _ = reply.send(scheduler.send_by_reference(reference, now).await);
        }
        SchedulerCommand::GetSettings(reply) => {
            let _ = reply.send(scheduler.settings().await);
        }
        SchedulerCommand::UpdateSettings(interval, reply) => {
            let _ = reply.send(scheduler.update_settings(interval, now).await);
        }
        SchedulerCommand::CheckWakeUp(reply) => {
            let _ = reply.send(Ok(scheduler.check_wake_up(now).await));
        }
        SchedulerCommand::CheckTimerExpired(reply) => {
            let _ = reply.send(scheduler.check_timer_expired(now).await);
        }
        SchedulerCommand::Status(reply) => {
            let _ = reply.send(Ok(scheduler.status(now)));
        }
        SchedulerCommand::TimerReport(reply) => {
            let _ = reply.send(Ok(scheduler.timer_report(now).await));
        }
        SchedulerCommand::RepairStorage(reply) => {
            let _ = reply.send(scheduler.repair_storage(now).await);
        }
        SchedulerCommand::LastAyah(reply) => {
            let _ = reply.send(scheduler.last_ayah_view(now).await);
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::config::ReminderConfig;
    use crate::scheduler::{Collaborators, SchedulerState};
    use crate::store::{MemoryStore, StateStore};
    use crate::testing::{
        FakeTimerService, ManualClock, RecordingLinkOpener, RecordingNotificationService,
        ScriptedVerseSource,
    };
    use std::sync::Arc;

    fn start() -> (
        SchedulerHandle,
        JoinHandle<()>,
        mpsc::UnboundedSender<TimerFired>,
        Arc<RecordingNotificationService>,
    ) {
        let store = Arc::new(MemoryStore::new());
        let notifications = Arc::new(RecordingNotificationService::new());
        let mut config = ReminderConfig::default();
        config.schedule.settle_ms = 0;
        let scheduler = ReminderScheduler::new(
            Collaborators {
                store: store.clone(),
                timers: Arc::new(FakeTimerService::new(ManualClock::new(now_epoch_millis()))),
                source: Arc::new(ScriptedVerseSource::new()),
                notifications: notifications.clone(),
                links: Arc::new(RecordingLinkOpener::new()),
            },
            &config,
        );
        let (fire_tx, fires) = mpsc::unbounded_channel();
        let (handle, task) = spawn_scheduler(
            scheduler,
            store.subscribe(),
            SchedulerInputs {
                fires,
                clicks: None,
                health_check_every: Duration::from_secs(3600),
            },
        );
        (handle, task, fire_tx, notifications)
    }

    #[tokio::test]
    async fn loop_initializes_and_answers_commands() {
        let (handle, task, _fires, notifications) = start();

        let status = handle.status().await.unwrap();
        assert!(status.initialized);
        assert_eq!(status.state, SchedulerState::Armed);
        assert_eq!(handle.settings().await.unwrap().interval_minutes, 10);

        handle.send_now().await.unwrap();
        assert_eq!(notifications.shown().len(), 1);

        handle.shutdown();
        task.await.unwrap();
        assert!(handle.status().await.is_err());
    }

    #[tokio::test]
    async fn settings_update_emits_storage_change() {
        let (handle, task, _fires, _notifications) = start();
        handle.status().await.unwrap();
        let mut events = handle.subscribe();

        handle.update_settings(25).await.unwrap();
        let event = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let SchedulerEvent::StorageChanged(change) = events.recv().await.unwrap() {
                    return change;
                }
            }
        })
        .await
        .expect("storage change forwarded");
        assert!(event.touches("interval"));

        assert!(handle.update_settings(0).await.is_err());
        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn unrelated_timer_fires_are_ignored() {
        let (handle, task, fires, notifications) = start();
        handle.status().await.unwrap();

        fires
            .send(TimerFired {
                name: "something-else".to_owned(),
                fired_at_ms: now_epoch_millis(),
            })
            .unwrap();
        let status = handle.status().await.unwrap();
        assert_eq!(status.state, SchedulerState::Armed);
        assert!(notifications.shown().is_empty());

        handle.shutdown();
        task.await.unwrap();
    }
}
