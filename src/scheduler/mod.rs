//! Reminder scheduling.
//!
//! [`ReminderScheduler`] is the state machine deciding when a verse is due
//! and keeping the recurring timer alive. [`runner`] drives it from timer
//! fires, store changes, notification clicks, health-check ticks and
//! control commands on a single task.

pub mod reminder;
pub mod report;
pub mod runner;

pub use reminder::{
    ArmOutcome, ArmStrategy, Collaborators, DueReason, REMINDER_TIMER_NAME, ReminderScheduler,
};
pub use report::{HealthReport, LastAyahView, RepairReport, StatusView, TimerReport};
pub use runner::{SchedulerHandle, SchedulerInputs, spawn_scheduler};

use crate::store::StoreChange;
use crate::verse::Verse;
use serde::{Deserialize, Serialize};

/// Lifecycle of the reminder timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    /// Nothing armed yet in this process.
    Uninitialized,
    /// A verified recurring timer exists.
    Armed,
    /// Handling a timer fire; always followed by a re-arm.
    Firing,
    /// Only the unverified one-shot fallback timer is active.
    Degraded,
}

impl SchedulerState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Armed => "armed",
            Self::Firing => "firing",
            Self::Degraded => "degraded",
        }
    }
}

/// Something frontends may want to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    /// A verse notification was shown.
    Delivered {
        verse: Verse,
        is_test: bool,
        /// Whether the verse was newly selected rather than re-shown.
        fresh: bool,
        at_ms: u64,
    },
    StateChanged {
        from: SchedulerState,
        to: SchedulerState,
    },
    StorageChanged(StoreChange),
    NotificationClicked {
        notification_id: String,
        url: String,
    },
}

impl SchedulerEvent {
    /// Wire name of the event.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Delivered { .. } => "ayah.delivered",
            Self::StateChanged { .. } => "scheduler.state",
            Self::StorageChanged(_) => "storage.changed",
            Self::NotificationClicked { .. } => "notification.clicked",
        }
    }

    /// JSON payload of the event.
    #[must_use]
    pub fn payload(&self) -> serde_json::Value {
        match self {
            Self::Delivered {
                verse,
                is_test,
                fresh,
                at_ms,
            } => serde_json::json!({
                "ayah": verse,
                "isTest": is_test,
                "fresh": fresh,
                "timestamp": at_ms,
            }),
            Self::StateChanged { from, to } => serde_json::json!({
                "from": from.as_str(),
                "to": to.as_str(),
            }),
            Self::StorageChanged(change) => serde_json::json!({
                "changed": change.changed,
            }),
            Self::NotificationClicked {
                notification_id,
                url,
            } => serde_json::json!({
                "notificationId": notification_id,
                "url": url,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_serializes_as_snake_case() {
        let json = serde_json::to_value(SchedulerState::Degraded).unwrap_or_default();
        assert_eq!(json, "degraded");
        assert_eq!(SchedulerState::Armed.as_str(), "armed");
    }

    #[test]
    fn event_payloads_use_wire_names() {
        let event = SchedulerEvent::Delivered {
            verse: Verse::new("t", "Hud", 88, 1561),
            is_test: true,
            fresh: false,
            at_ms: 7,
        };
        assert_eq!(event.name(), "ayah.delivered");
        let payload = event.payload();
        assert_eq!(payload["ayah"]["number"], 1561);
        assert_eq!(payload["isTest"], true);

        let state = SchedulerEvent::StateChanged {
            from: SchedulerState::Armed,
            to: SchedulerState::Firing,
        };
        assert_eq!(state.name(), "scheduler.state");
        assert_eq!(state.payload()["to"], "firing");
    }
}
