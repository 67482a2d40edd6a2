//! Named timer service used to wake the reminder scheduler.
//!
//! Mirrors a browser alarm API: timers are identified by name, creating a
//! timer with an existing name replaces it, and fires are reported as
//! [`TimerFired`] events on a channel rather than through callbacks.

pub mod retry;
pub mod tokio_timer;

pub use retry::{AttemptOutcome, attempt};
pub use tokio_timer::TokioTimerService;

use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;

/// Current wall-clock time in epoch milliseconds.
#[must_use]
pub fn now_epoch_millis() -> u64 {
    match std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH) {
        Ok(duration) => u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        Err(_) => 0,
    }
}

/// Render epoch millis as RFC 3339 in local time, for logs and diagnostics.
#[must_use]
pub fn format_epoch_millis(ms: u64) -> String {
    i64::try_from(ms)
        .ok()
        .and_then(chrono::DateTime::from_timestamp_millis)
        .map(|utc| {
            utc.with_timezone(&chrono::Local)
                .to_rfc3339_opts(chrono::SecondsFormat::Secs, false)
        })
        .unwrap_or_else(|| ms.to_string())
}

/// When a timer first fires and whether it repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerSpec {
    /// Fire `delay_ms` from now.
    Delay {
        delay_ms: u64,
        period_minutes: Option<u32>,
    },
    /// Fire at an absolute epoch-millis instant.
    At {
        at_ms: u64,
        period_minutes: Option<u32>,
    },
}

impl TimerSpec {
    #[must_use]
    pub fn period_minutes(&self) -> Option<u32> {
        match self {
            Self::Delay { period_minutes, .. } | Self::At { period_minutes, .. } => *period_minutes,
        }
    }

    /// First fire time given the current time.
    #[must_use]
    pub fn first_fire_ms(&self, now_ms: u64) -> u64 {
        match self {
            Self::Delay { delay_ms, .. } => now_ms.saturating_add(*delay_ms),
            Self::At { at_ms, .. } => *at_ms,
        }
    }
}

/// A live timer as reported by [`TimerService::get`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerInfo {
    pub name: String,
    /// Next fire time in epoch millis.
    pub scheduled_time: u64,
    /// Repeat period, `None` for one-shot timers.
    pub period_in_minutes: Option<u32>,
}

/// Notification that a named timer fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerFired {
    pub name: String,
    pub fired_at_ms: u64,
}

/// Host timer facility.
///
/// Implementations need not be reliable: a created timer may be missing on
/// the next `get`, which is why callers verify after creating.
#[async_trait]
pub trait TimerService: Send + Sync {
    /// Create or replace the timer called `name`.
    async fn create(&self, name: &str, spec: TimerSpec) -> Result<()>;

    /// Look up a live timer.
    async fn get(&self, name: &str) -> Option<TimerInfo>;

    /// Cancel a timer, returning whether one existed.
    async fn clear(&self, name: &str) -> Result<bool>;
}
