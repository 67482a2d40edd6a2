//! Headless reminder host speaking the JSON control contract on stdin/stdout.
//!
//! Owns the scheduler loop, the on-disk state store, the timer service and
//! the notification backend. Frontends send `CommandEnvelope` lines on stdin
//! and receive `ResponseEnvelope` and `EventEnvelope` lines on stdout.
//!
//! All tracing/diagnostic output goes to stderr so that stdout remains a
//! clean JSON protocol channel.

use anyhow::Context;
use ayah_reminder::config::{NotificationBackend, ReminderConfig};
use ayah_reminder::host::handler::forward_scheduler_events;
use ayah_reminder::host::stdio::run_stdio_bridge;
use ayah_reminder::notify::{
    LogNotificationService, NotificationClicks, NotificationService, SystemLinkOpener,
};
use ayah_reminder::scheduler::{
    Collaborators, ReminderScheduler, SchedulerInputs, spawn_scheduler,
};
use ayah_reminder::store::{JsonFileStore, StateStore};
use ayah_reminder::timer::TokioTimerService;
use ayah_reminder::verse::source::AlQuranCloudSource;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Capacity of the outgoing event broadcast.
const EVENT_CAPACITY: usize = 128;

fn notification_backend(
    backend: NotificationBackend,
) -> (Arc<dyn NotificationService>, Option<NotificationClicks>) {
    match backend {
        #[cfg(feature = "desktop-notifications")]
        NotificationBackend::Desktop => {
            let (service, clicks) = ayah_reminder::notify::DesktopNotificationService::new();
            (Arc::new(service), Some(clicks))
        }
        #[cfg(not(feature = "desktop-notifications"))]
        NotificationBackend::Desktop => {
            tracing::warn!("built without desktop-notifications; using the log backend");
            (Arc::new(LogNotificationService), None)
        }
        NotificationBackend::Log => (Arc::new(LogNotificationService), None),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise tracing to stderr only (stdout is reserved for the JSON
    // protocol).
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("ayah_reminder=info")),
        )
        .init();

    let config_path = ReminderConfig::default_config_path();
    let config = ReminderConfig::load_or_default(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;
    let state_path = config.store.resolved_path();
    tracing::info!(
        config = %config_path.display(),
        state = %state_path.display(),
        "ayah-host starting"
    );

    let store = Arc::new(
        JsonFileStore::open(state_path.clone())
            .with_context(|| format!("opening state store {}", state_path.display()))?,
    );
    let store_changes = store.subscribe();
    let (timers, fires) = TokioTimerService::new();
    let source = AlQuranCloudSource::new(&config.verse_source).context("building verse source")?;
    let (notifications, clicks) = notification_backend(config.notification.backend);

    let scheduler = ReminderScheduler::new(
        Collaborators {
            store,
            timers: Arc::new(timers),
            source: Arc::new(source),
            notifications,
            links: Arc::new(SystemLinkOpener),
        },
        &config,
    );
    let (handle, scheduler_task) = spawn_scheduler(
        scheduler,
        store_changes,
        SchedulerInputs {
            fires,
            clicks,
            health_check_every: Duration::from_secs(config.schedule.health_check_secs),
        },
    );

    let (event_tx, _event_rx) = broadcast::channel(EVENT_CAPACITY);
    let forwarder = forward_scheduler_events(handle.subscribe(), event_tx.clone());

    let bridge_result = run_stdio_bridge(handle.clone(), event_tx).await;

    handle.shutdown();
    if let Err(e) = scheduler_task.await {
        tracing::warn!(error = %e, "scheduler task ended abnormally");
    }
    forwarder.abort();

    bridge_result.map_err(|e| {
        tracing::error!(error = %e, "ayah-host exited with error");
        anyhow::anyhow!("ayah-host failed: {e}")
    })?;

    tracing::info!("ayah-host shut down cleanly");
    Ok(())
}
