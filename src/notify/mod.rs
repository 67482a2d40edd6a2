//! Rendering verses into notifications and resolving clicks to deep links.

#[cfg(feature = "desktop-notifications")]
pub mod desktop;
pub mod log;

#[cfg(feature = "desktop-notifications")]
pub use desktop::DesktopNotificationService;
pub use log::LogNotificationService;

use crate::config::NotificationConfig;
use crate::error::{ReminderError, Result};
use crate::verse::Verse;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Identifier of the verse notification. Re-showing replaces the previous one.
pub const AYAH_NOTIFICATION_ID: &str = "quran-ayah";

/// Ids of clicked notifications, as reported by a notification service.
pub type NotificationClicks = mpsc::UnboundedReceiver<String>;

/// What a notification service is asked to display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
    pub icon: Option<String>,
    /// Secondary line, e.g. `Al-Baqarah 255`.
    pub metadata_line: String,
}

/// Platform notification facility.
#[async_trait]
pub trait NotificationService: Send + Sync {
    /// Show (or replace) the notification `id`.
    async fn create(&self, id: &str, content: &NotificationContent) -> Result<()>;
}

/// Opens deep links outside the process.
pub trait LinkOpener: Send + Sync {
    fn open(&self, url: &str) -> Result<()>;
}

/// Opens links with the desktop's default handler.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLinkOpener;

impl LinkOpener for SystemLinkOpener {
    fn open(&self, url: &str) -> Result<()> {
        open::that(url)
            .map_err(|e| ReminderError::Notification(format!("failed to open {url}: {e}")))
    }
}

/// Turns verses into notifications and remembers where each one links to.
pub struct Notifier {
    service: Arc<dyn NotificationService>,
    config: NotificationConfig,
    click_targets: HashMap<String, u32>,
}

impl Notifier {
    #[must_use]
    pub fn new(service: Arc<dyn NotificationService>, config: NotificationConfig) -> Self {
        Self {
            service,
            config,
            click_targets: HashMap::new(),
        }
    }

    /// Content for `verse`; test deliveries get the test title.
    #[must_use]
    pub fn render(&self, verse: &Verse, is_test: bool) -> NotificationContent {
        let title = if is_test {
            &self.config.test_title
        } else {
            &self.config.title
        };

        let mut body = verse.display_text.clone();
        match verse.translation.as_deref() {
            Some(translation) if self.config.show_translation => {
                body.push_str("\n\n");
                body.push_str(translation);
            }
            _ => {}
        }

        NotificationContent {
            title: title.clone(),
            body,
            icon: self.config.icon.clone(),
            metadata_line: verse.reference_line(),
        }
    }

    /// Display `verse` and record its click-through target.
    ///
    /// # Errors
    ///
    /// Returns the notification service's error; nothing is recorded then.
    pub async fn show(&mut self, verse: &Verse, is_test: bool) -> Result<()> {
        let content = self.render(verse, is_test);
        self.service.create(AYAH_NOTIFICATION_ID, &content).await?;
        self.click_targets
            .insert(AYAH_NOTIFICATION_ID.to_owned(), verse.global_number);
        info!(
            verse = %verse.id(),
            is_test,
            "notification shown: {}",
            content.metadata_line
        );
        Ok(())
    }

    /// `https://<host>/<globalNumber>`.
    #[must_use]
    pub fn deep_link(&self, global_number: u32) -> String {
        format!(
            "https://{}/{global_number}",
            self.config.deep_link_host.trim_end_matches('/')
        )
    }

    /// Deep link for a clicked notification, if it is one of ours.
    #[must_use]
    pub fn click_target(&self, notification_id: &str) -> Option<String> {
        let target = self
            .click_targets
            .get(notification_id)
            .map(|global| self.deep_link(*global));
        if target.is_none() {
            debug!(notification_id, "click on unknown notification ignored");
        }
        target
    }

    /// Whether clicks should open the browser.
    #[must_use]
    pub fn opens_links(&self) -> bool {
        self.config.open_links
    }
}
