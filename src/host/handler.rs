//! Production control handler backed by the running scheduler loop.

use crate::error::Result;
use crate::host::channel::ControlHandler;
use crate::host::contract::EventEnvelope;
use crate::scheduler::{
    LastAyahView, RepairReport, SchedulerEvent, SchedulerHandle, StatusView, TimerReport,
};
use crate::settings::Settings;
use crate::verse::{Verse, VerseReference};
use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[async_trait]
impl ControlHandler for SchedulerHandle {
    async fn send_now(&self) -> Result<Verse> {
        SchedulerHandle::send_now(self).await
    }

    async fn test_notification(&self) -> Result<Verse> {
        SchedulerHandle::test_notification(self).await
    }

    async fn force_new(&self) -> Result<Verse> {
        SchedulerHandle::force_new(self).await
    }

    async fn send_by_reference(&self, reference: VerseReference) -> Result<Verse> {
        SchedulerHandle::send_by_reference(self, reference).await
    }

    async fn settings(&self) -> Result<Settings> {
        SchedulerHandle::settings(self).await
    }

    async fn update_settings(&self, interval_minutes: u32) -> Result<()> {
        SchedulerHandle::update_settings(self, interval_minutes).await
    }

    async fn check_wake_up(&self) -> Result<bool> {
        SchedulerHandle::check_wake_up(self).await
    }

    async fn status(&self) -> Result<StatusView> {
        SchedulerHandle::status(self).await
    }

    async fn check_timer_expired(&self) -> Result<bool> {
        SchedulerHandle::check_timer_expired(self).await
    }

    async fn timer_report(&self) -> Result<TimerReport> {
        SchedulerHandle::timer_report(self).await
    }

    async fn repair_storage(&self) -> Result<RepairReport> {
        SchedulerHandle::repair_storage(self).await
    }

    async fn last_ayah(&self) -> Result<LastAyahView> {
        SchedulerHandle::last_ayah(self).await
    }

    async fn shutdown(&self) -> Result<()> {
        info!("shutdown requested over control channel");
        SchedulerHandle::shutdown(self);
        Ok(())
    }
}

/// Convert a scheduler event into its wire envelope.
#[must_use]
pub fn scheduler_event_envelope(event: &SchedulerEvent) -> EventEnvelope {
    EventEnvelope::new(
        uuid::Uuid::new_v4().to_string(),
        event.name(),
        event.payload(),
    )
}

/// Forward scheduler events onto the control channel's event broadcast
/// until the scheduler side closes.
pub fn forward_scheduler_events(
    mut events: broadcast::Receiver<SchedulerEvent>,
    event_tx: broadcast::Sender<EventEnvelope>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    // No subscribers is fine; frontends may attach later.
                    let _ = event_tx.send(scheduler_event_envelope(&event));
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(lagged = n, "scheduler event forwarder lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
