//! User settings and delivery bookkeeping kept in the persisted store.

use crate::error::{ReminderError, Result};
use crate::verse::Verse;
use serde::{Deserialize, Serialize};

/// Smallest accepted reminder interval.
pub const MIN_INTERVAL_MINUTES: u32 = 1;

/// Largest accepted reminder interval (one day).
pub const MAX_INTERVAL_MINUTES: u32 = 1440;

/// Interval used when nothing valid is stored.
pub const DEFAULT_INTERVAL_MINUTES: u32 = 10;

const MILLIS_PER_MINUTE: u64 = 60_000;

/// User-editable settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(rename = "interval")]
    pub interval_minutes: u32,
}

impl Settings {
    /// Build validated settings.
    ///
    /// # Errors
    ///
    /// Returns [`ReminderError::InvalidSettings`] when the interval is outside
    /// `[MIN_INTERVAL_MINUTES, MAX_INTERVAL_MINUTES]`.
    pub fn new(interval_minutes: u32) -> Result<Self> {
        validate_interval(interval_minutes)?;
        Ok(Self { interval_minutes })
    }

    /// Interval length in milliseconds.
    #[must_use]
    pub fn interval_ms(&self) -> u64 {
        u64::from(self.interval_minutes) * MILLIS_PER_MINUTE
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
        }
    }
}

/// Reject intervals outside the accepted range.
///
/// # Errors
///
/// Returns [`ReminderError::InvalidSettings`] for out-of-range values.
pub fn validate_interval(interval_minutes: u32) -> Result<()> {
    if (MIN_INTERVAL_MINUTES..=MAX_INTERVAL_MINUTES).contains(&interval_minutes) {
        Ok(())
    } else {
        Err(ReminderError::InvalidSettings(format!(
            "interval must be between {MIN_INTERVAL_MINUTES} and {MAX_INTERVAL_MINUTES} \
             minutes, got {interval_minutes}"
        )))
    }
}

/// What was delivered last and when.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryState {
    #[serde(rename = "lastAyah")]
    pub last_verse: Option<Verse>,
    /// Epoch millis of the last delivery.
    #[serde(rename = "lastAyahTime")]
    pub last_delivery_ms: Option<u64>,
}

impl DeliveryState {
    /// Milliseconds left in the current interval, `0` once due.
    ///
    /// `None` when nothing has been delivered yet.
    #[must_use]
    pub fn remaining_ms(&self, settings: &Settings, now_ms: u64) -> Option<u64> {
        let last = self.last_delivery_ms?;
        let elapsed = now_ms.saturating_sub(last);
        Some(settings.interval_ms().saturating_sub(elapsed))
    }
}
