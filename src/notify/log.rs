//! Notification service that only writes to the log.

use super::{NotificationContent, NotificationService};
use crate::error::Result;
use async_trait::async_trait;

/// For headless hosts: every notification becomes an `info` log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotificationService;

#[async_trait]
impl NotificationService for LogNotificationService {
    async fn create(&self, id: &str, content: &NotificationContent) -> Result<()> {
        tracing::info!(
            notification = id,
            title = %content.title,
            reference = %content.metadata_line,
            "{}",
            content.body
        );
        Ok(())
    }
}
