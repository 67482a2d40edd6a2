//! Native desktop notifications via `notify-rust`.
//!
//! `show()` talks to the platform notification daemon synchronously, so it
//! runs on the blocking pool. On XDG desktops the same blocking task then
//! waits for the user's action and reports clicks on the click channel.
//!
//! Re-showing an id passes the daemon id of the previous notification along,
//! so the daemon replaces it in place. Only one blocking waiter is parked per
//! id; it keeps serving the replacements because they share the daemon id.

use super::{NotificationClicks, NotificationContent, NotificationService};
use crate::error::{ReminderError, Result};
use async_trait::async_trait;
use notify_rust::{Notification, Timeout};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot};

const APP_NAME: &str = "Ayah Reminder";
const DEFAULT_ICON: &str = "accessories-dictionary";

/// What the daemon last told us about one of our notification ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Shown {
    daemon_id: u32,
    watched: bool,
}

#[derive(Debug, Default)]
struct ShownTable(Mutex<HashMap<String, Shown>>);

impl ShownTable {
    fn entries(&self) -> MutexGuard<'_, HashMap<String, Shown>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Daemon id to replace when showing `id` again.
    fn daemon_id(&self, id: &str) -> Option<u32> {
        self.entries().get(id).map(|shown| shown.daemon_id)
    }

    /// Record a shown notification. Returns `true` when the caller should
    /// start waiting for its actions, i.e. nobody is waiting yet.
    fn record(&self, id: &str, daemon_id: u32) -> bool {
        let mut entries = self.entries();
        let entry = entries.entry(id.to_owned()).or_insert(Shown {
            daemon_id,
            watched: false,
        });
        let start_watch = !entry.watched || entry.daemon_id != daemon_id;
        entry.daemon_id = daemon_id;
        entry.watched = true;
        start_watch
    }

    /// The waiter for `id` returned; the notification was clicked or closed.
    fn release(&self, id: &str, daemon_id: u32) {
        let mut entries = self.entries();
        if entries.get(id).is_some_and(|shown| shown.daemon_id == daemon_id) {
            entries.remove(id);
        }
    }
}

/// Shows notifications on the local desktop.
#[derive(Debug, Clone)]
pub struct DesktopNotificationService {
    click_tx: mpsc::UnboundedSender<String>,
    shown: Arc<ShownTable>,
}

impl DesktopNotificationService {
    /// Service plus the receiver on which clicked notification ids arrive.
    #[must_use]
    pub fn new() -> (Self, NotificationClicks) {
        let (click_tx, click_rx) = mpsc::unbounded_channel();
        let service = Self {
            click_tx,
            shown: Arc::new(ShownTable::default()),
        };
        (service, click_rx)
    }
}

fn build(content: &NotificationContent, replaces: Option<u32>) -> Notification {
    let mut notification = Notification::new();
    notification
        .summary(&content.title)
        .body(&format!("{}\n{}", content.body, content.metadata_line))
        .appname(APP_NAME)
        .icon(content.icon.as_deref().unwrap_or(DEFAULT_ICON))
        .timeout(Timeout::Default)
        .action("default", "Open");
    if let Some(daemon_id) = replaces {
        notification.id(daemon_id);
    }
    notification
}

#[async_trait]
impl NotificationService for DesktopNotificationService {
    async fn create(&self, id: &str, content: &NotificationContent) -> Result<()> {
        let notification = build(content, self.shown.daemon_id(id));
        let id = id.to_owned();
        let click_tx = self.click_tx.clone();
        let shown = Arc::clone(&self.shown);
        let (shown_tx, shown_rx) = oneshot::channel();

        tokio::task::spawn_blocking(move || {
            let handle = match notification.show() {
                Ok(handle) => {
                    let _ = shown_tx.send(Ok(()));
                    handle
                }
                Err(e) => {
                    let _ = shown_tx.send(Err(e.to_string()));
                    return;
                }
            };

            #[cfg(all(unix, not(target_os = "macos")))]
            {
                let daemon_id = handle.id();
                if !shown.record(&id, daemon_id) {
                    return;
                }
                let clicked = id.clone();
                handle.wait_for_action(move |action| {
                    if action == "default" {
                        let _ = click_tx.send(clicked);
                    }
                });
                shown.release(&id, daemon_id);
            }

            #[cfg(not(all(unix, not(target_os = "macos"))))]
            {
                let _ = (handle, click_tx, id, shown);
            }
        });

        match shown_rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ReminderError::Notification(format!(
                "desktop notification failed: {e}"
            ))),
            Err(_) => Err(ReminderError::Notification(
                "notification task ended before showing".to_owned(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content() -> NotificationContent {
        NotificationContent {
            title: "Quran Ayah".to_owned(),
            body: "text".to_owned(),
            icon: None,
            metadata_line: "Hud 88".to_owned(),
        }
    }

    #[test]
    fn body_carries_reference_line() {
        let notification = build(&content(), None);
        assert_eq!(notification.summary, "Quran Ayah");
        assert_eq!(notification.body, "text\nHud 88");
        assert_eq!(notification.icon, DEFAULT_ICON);
        assert_eq!(notification.id, None);
    }

    #[test]
    fn reshow_targets_previous_daemon_id() {
        let notification = build(&content(), Some(41));
        assert_eq!(notification.id, Some(41));
    }

    #[test]
    fn one_waiter_per_notification_id() {
        let table = ShownTable::default();
        assert_eq!(table.daemon_id("quran-ayah"), None);

        assert!(table.record("quran-ayah", 41));
        assert_eq!(table.daemon_id("quran-ayah"), Some(41));

        // Replaced in place: the daemon keeps the id and the waiter stays.
        assert!(!table.record("quran-ayah", 41));
        assert!(!table.record("quran-ayah", 41));

        // Closed by the user: the next show starts fresh.
        table.release("quran-ayah", 41);
        assert_eq!(table.daemon_id("quran-ayah"), None);
        assert!(table.record("quran-ayah", 42));
    }

    #[test]
    fn stale_waiter_does_not_drop_newer_notification() {
        let table = ShownTable::default();
        assert!(table.record("quran-ayah", 41));
        // Daemon handed out a new id (the old one had expired).
        assert!(table.record("quran-ayah", 42));
        table.release("quran-ayah", 41);
        assert_eq!(table.daemon_id("quran-ayah"), Some(42));
    }
}
