//! Configuration types for the reminder service.

use crate::error::{ReminderError, Result};
use crate::settings::{MAX_INTERVAL_MINUTES, MIN_INTERVAL_MINUTES};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration, loaded from `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
    /// Remote verse API settings.
    pub verse_source: VerseSourceConfig,
    /// Timer cadence and recovery tuning.
    pub schedule: ScheduleConfig,
    /// Notification rendering and click-through.
    pub notification: NotificationConfig,
    /// Persisted state location.
    pub store: StoreConfig,
}

/// Verse API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerseSourceConfig {
    /// Base URL of the AlQuran Cloud compatible API (no trailing slash).
    pub api_base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Optional translation edition (e.g. `en.asad`) fetched alongside the verse.
    pub translation_edition: Option<String>,
    /// Append `?t=<now>` to requests so intermediaries cannot serve a cached verse.
    pub cache_bust: bool,
}

impl Default for VerseSourceConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.alquran.cloud/v1".to_owned(),
            timeout_secs: 10,
            translation_edition: None,
            cache_bust: true,
        }
    }
}

/// Scheduler tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Interval written to the store on first run.
    pub default_interval_minutes: u32,
    /// Seconds between health checks while the process is alive.
    pub health_check_secs: u64,
    /// Gap since the last wake check that is treated as a system sleep.
    pub wake_threshold_secs: u64,
    /// Pause after creating a timer before verifying it exists.
    ///
    /// Half of this is also waited after clearing the previous timer.
    pub settle_ms: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            default_interval_minutes: 10,
            health_check_secs: 30,
            wake_threshold_secs: 5 * 60,
            settle_ms: 200,
        }
    }
}

/// Which notification service renders alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationBackend {
    /// Native desktop notifications.
    #[default]
    Desktop,
    /// Log-only, for headless hosts.
    Log,
}

/// Notification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub backend: NotificationBackend,
    /// Title of regular reminders.
    pub title: String,
    /// Title used for `testNotification`.
    pub test_title: String,
    /// Host of the click-through deep link, `https://<host>/<globalNumber>`.
    pub deep_link_host: String,
    /// Optional icon path or freedesktop icon name.
    pub icon: Option<String>,
    /// Append the translation (when present) to the notification body.
    pub show_translation: bool,
    /// Open the deep link in the default browser when a notification is clicked.
    pub open_links: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            backend: NotificationBackend::Desktop,
            title: "Quran Ayah".to_owned(),
            test_title: "Test: Quran Ayah".to_owned(),
            deep_link_host: "quran.com".to_owned(),
            icon: None,
            show_translation: true,
            open_links: true,
        }
    }
}

/// Persisted state configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Override for the state file (defaults to `config_dir()/state.json`).
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    /// Resolved state file path.
    #[must_use]
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(crate::app_dirs::state_file)
    }
}

impl ReminderConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| ReminderError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise return defaults.
    ///
    /// # Errors
    ///
    /// Returns an error only when an existing file is unreadable or invalid.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::debug!("no config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ReminderError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check cross-field constraints serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ReminderError::Config`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        let interval = self.schedule.default_interval_minutes;
        if !(MIN_INTERVAL_MINUTES..=MAX_INTERVAL_MINUTES).contains(&interval) {
            return Err(ReminderError::Config(format!(
                "schedule.default_interval_minutes must be within \
                 {MIN_INTERVAL_MINUTES}..={MAX_INTERVAL_MINUTES}, got {interval}"
            )));
        }
        if self.schedule.health_check_secs == 0 {
            return Err(ReminderError::Config(
                "schedule.health_check_secs must be greater than zero".to_owned(),
            ));
        }
        if self.verse_source.api_base_url.trim().is_empty() {
            return Err(ReminderError::Config(
                "verse_source.api_base_url cannot be empty".to_owned(),
            ));
        }
        if self.notification.deep_link_host.trim().is_empty() {
            return Err(ReminderError::Config(
                "notification.deep_link_host cannot be empty".to_owned(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> PathBuf {
        crate::app_dirs::config_file()
    }
}
