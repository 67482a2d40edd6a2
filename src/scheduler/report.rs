//! Serializable views of scheduler state returned over the control channel.

use super::SchedulerState;
use crate::timer::{TimerInfo, format_epoch_millis};
use crate::verse::Verse;
use serde::Serialize;

/// Countdown label shown once a verse is due.
pub const READY_LABEL: &str = "Ready!";

/// `getStatus` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusView {
    pub initialized: bool,
    pub timestamp: u64,
    pub state: SchedulerState,
}

/// Timer as seen by `debugAlarms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerDetails {
    pub name: String,
    pub scheduled_time: u64,
    /// `scheduled_time` in local RFC 3339.
    pub scheduled_at: String,
    pub period_in_minutes: Option<u32>,
    pub in_future: bool,
}

impl TimerDetails {
    #[must_use]
    pub fn from_info(info: TimerInfo, now_ms: u64) -> Self {
        Self {
            scheduled_at: format_epoch_millis(info.scheduled_time),
            in_future: info.scheduled_time > now_ms,
            name: info.name,
            scheduled_time: info.scheduled_time,
            period_in_minutes: info.period_in_minutes,
        }
    }
}

/// `debugAlarms` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimerReport {
    pub success: bool,
    /// `None` when the reminder timer does not exist.
    pub timer: Option<TimerDetails>,
    pub state: SchedulerState,
    /// Interval currently stored, if valid.
    pub interval: Option<u32>,
}

/// `debugStorage` payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairReport {
    pub success: bool,
    pub repaired: bool,
    pub repaired_interval: bool,
    pub repaired_ayah: bool,
    pub interval: Option<u32>,
    pub last_ayah_time: Option<u64>,
}

/// `getLastAyah` payload: what the popup renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastAyahView {
    pub ayah: Option<Verse>,
    pub last_ayah_time: Option<u64>,
    pub interval: u32,
    /// Zero once due.
    pub remaining_ms: u64,
    /// `m:ss` countdown or [`READY_LABEL`].
    pub display: String,
}

/// What one health check found and did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthReport {
    pub timer_present: bool,
    pub rearmed: bool,
    pub delivered: bool,
    pub reinitialized: bool,
}

impl HealthReport {
    /// Nothing needed fixing.
    #[must_use]
    pub fn is_quiet(&self) -> bool {
        !self.rearmed && !self.delivered && !self.reinitialized
    }
}

/// Render a countdown as `m:ss` (minutes are not wrapped into hours).
#[must_use]
pub fn format_countdown(remaining_ms: u64) -> String {
    if remaining_ms == 0 {
        return READY_LABEL.to_owned();
    }
    let minutes = remaining_ms / 60_000;
    let seconds = (remaining_ms % 60_000) / 1_000;
    format!("{minutes}:{seconds:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn countdown_formats_minutes_and_padded_seconds() {
        assert_eq!(format_countdown(600_000), "10:00");
        assert_eq!(format_countdown(65_500), "1:05");
        assert_eq!(format_countdown(999), "0:00");
        assert_eq!(format_countdown(0), READY_LABEL);
        assert_eq!(format_countdown(1_440 * 60_000), "1440:00");
    }

    #[test]
    fn timer_details_flag_past_schedules() {
        let info = TimerInfo {
            name: "quran-ayah-reminder".to_owned(),
            scheduled_time: 1_000,
            period_in_minutes: Some(10),
        };
        assert!(!TimerDetails::from_info(info.clone(), 2_000).in_future);
        assert!(TimerDetails::from_info(info, 500).in_future);
    }

    #[test]
    fn quiet_report_did_nothing() {
        assert!(HealthReport::default().is_quiet());
        let report = HealthReport {
            rearmed: true,
            ..HealthReport::default()
        };
        assert!(!report.is_quiet());
    }
}
