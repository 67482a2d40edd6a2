//! Control command channel and router between frontends and the scheduler.

use crate::error::{ReminderError, Result};
use crate::host::contract::{CommandEnvelope, CommandName, EventEnvelope, ResponseEnvelope};
use crate::scheduler::{LastAyahView, RepairReport, StatusView, TimerReport};
use crate::settings::Settings;
use crate::verse::{Verse, VerseReference};
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, warn};

/// Operations the control channel can ask of the scheduler.
#[async_trait]
pub trait ControlHandler: Send + Sync + 'static {
    async fn send_now(&self) -> Result<Verse>;
    async fn test_notification(&self) -> Result<Verse>;
    async fn force_new(&self) -> Result<Verse>;
    async fn send_by_reference(&self, reference: VerseReference) -> Result<Verse>;
    async fn settings(&self) -> Result<Settings>;
    async fn update_settings(&self, interval_minutes: u32) -> Result<()>;
    /// Returns whether a wake-up was detected.
    async fn check_wake_up(&self) -> Result<bool>;
    async fn status(&self) -> Result<StatusView>;
    async fn check_timer_expired(&self) -> Result<bool>;
    async fn timer_report(&self) -> Result<TimerReport>;
    async fn repair_storage(&self) -> Result<RepairReport>;
    async fn last_ayah(&self) -> Result<LastAyahView>;
    /// Stop background work. Called after the `shutdown` reply is built.
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

struct HostCommandRequest {
    envelope: CommandEnvelope,
    response_tx: oneshot::Sender<Result<ResponseEnvelope>>,
}

#[derive(Clone)]
pub struct HostCommandClient {
    request_tx: mpsc::Sender<HostCommandRequest>,
    event_tx: broadcast::Sender<EventEnvelope>,
}

impl HostCommandClient {
    pub async fn send(&self, envelope: CommandEnvelope) -> Result<ResponseEnvelope> {
        envelope.validate().map_err(|e| {
            ReminderError::Contract(format!(
                "invalid control envelope {}: {}",
                envelope.request_id, e
            ))
        })?;

        let (response_tx, response_rx) = oneshot::channel();
        self.request_tx
            .send(HostCommandRequest {
                envelope,
                response_tx,
            })
            .await
            .map_err(|e| ReminderError::Channel(format!("failed to send control request: {e}")))?;

        response_rx
            .await
            .map_err(|e| ReminderError::Channel(format!("control response dropped: {e}")))?
    }

    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<EventEnvelope> {
        self.event_tx.subscribe()
    }
}

pub struct HostCommandServer<H: ControlHandler> {
    request_rx: mpsc::Receiver<HostCommandRequest>,
    event_tx: broadcast::Sender<EventEnvelope>,
    handler: H,
}

#[must_use]
pub fn command_channel<H: ControlHandler>(
    request_capacity: usize,
    event_capacity: usize,
    handler: H,
) -> (HostCommandClient, HostCommandServer<H>) {
    let (event_tx, _event_rx) = broadcast::channel(event_capacity.max(1));
    command_channel_with_events(request_capacity, event_tx, handler)
}

/// Create a command channel using an existing event broadcast sender.
///
/// Scheduler events forwarded onto `event_tx` reach subscribers of the
/// client alongside the events the router emits itself.
#[must_use]
pub fn command_channel_with_events<H: ControlHandler>(
    request_capacity: usize,
    event_tx: broadcast::Sender<EventEnvelope>,
    handler: H,
) -> (HostCommandClient, HostCommandServer<H>) {
    let (request_tx, request_rx) = mpsc::channel(request_capacity.max(1));

    (
        HostCommandClient {
            request_tx,
            event_tx: event_tx.clone(),
        },
        HostCommandServer {
            request_rx,
            event_tx,
            handler,
        },
    )
}

impl<H: ControlHandler> HostCommandServer<H> {
    pub async fn run(mut self) {
        while let Some(request) = self.request_rx.recv().await {
            let response = self.route(&request.envelope).await;
            let _ = request.response_tx.send(Ok(response));
        }
        debug!("control channel closed; router exiting");
    }

    /// Route a command envelope to the handler. Operation failures become
    /// `{success: false, error}` replies rather than channel errors.
    pub async fn route(&self, envelope: &CommandEnvelope) -> ResponseEnvelope {
        let request_id = envelope.request_id.clone();
        match self.dispatch(envelope).await {
            Ok(payload) => ResponseEnvelope::ok(request_id, payload),
            Err(e) => {
                warn!(
                    command = envelope.command.as_str(),
                    request_id = %envelope.request_id,
                    "control command failed: {e}"
                );
                ResponseEnvelope::failure(request_id, e.to_string())
            }
        }
    }

    async fn dispatch(&self, envelope: &CommandEnvelope) -> Result<serde_json::Value> {
        match envelope.command {
            CommandName::Ping => {
                let status = self.handler.status().await?;
                Ok(serde_json::json!({
                    "status": "active",
                    "initialized": status.initialized,
                }))
            }
            CommandName::SendAyahNow => delivered(self.handler.send_now().await?),
            CommandName::TestNotification => delivered(self.handler.test_notification().await?),
            CommandName::ForceNewAyah => delivered(self.handler.force_new().await?),
            CommandName::SendAyahByReference => {
                let reference = parse_reference(&envelope.payload)?;
                delivered(self.handler.send_by_reference(reference).await?)
            }
            CommandName::GetSettings => to_payload(&self.handler.settings().await?),
            CommandName::UpdateSettings => {
                let interval = parse_interval(&envelope.payload)?;
                self.handler.update_settings(interval).await?;
                self.emit_event(
                    "settings.updated",
                    serde_json::json!({
                        "request_id": envelope.request_id,
                        "interval": interval,
                    }),
                );
                Ok(serde_json::json!({"success": true}))
            }
            CommandName::CheckWakeUp => {
                let woke = self.handler.check_wake_up().await?;
                Ok(serde_json::json!({"success": true, "wokeUp": woke}))
            }
            CommandName::GetStatus => to_payload(&self.handler.status().await?),
            CommandName::CheckTimerExpired => match self.handler.check_timer_expired().await {
                Ok(expired) => Ok(serde_json::json!({"expired": expired})),
                Err(e) => Ok(serde_json::json!({"expired": false, "error": e.to_string()})),
            },
            CommandName::DebugAlarms => to_payload(&self.handler.timer_report().await?),
            CommandName::DebugStorage => to_payload(&self.handler.repair_storage().await?),
            CommandName::GetLastAyah => to_payload(&self.handler.last_ayah().await?),
            CommandName::Shutdown => {
                self.handler.shutdown().await?;
                self.emit_event(
                    "host.shutdown",
                    serde_json::json!({"request_id": envelope.request_id}),
                );
                Ok(serde_json::json!({"success": true}))
            }
        }
    }

    fn emit_event(&self, event: &str, payload: serde_json::Value) {
        let envelope =
            EventEnvelope::new(uuid::Uuid::new_v4().to_string(), event.to_owned(), payload);
        let _ = self.event_tx.send(envelope);
    }
}

fn delivered(verse: Verse) -> Result<serde_json::Value> {
    Ok(serde_json::json!({"success": true, "ayah": to_payload(&verse)?}))
}

fn to_payload<T: Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value)
        .map_err(|e| ReminderError::Contract(format!("failed to encode reply payload: {e}")))
}

fn parse_interval(payload: &serde_json::Value) -> Result<u32> {
    let Some(raw) = payload.get("interval") else {
        return Err(ReminderError::Contract(
            "updateSettings requires payload.interval".to_owned(),
        ));
    };
    // Views submit the number input's string value as often as a number.
    let parsed = match raw {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| {
            ReminderError::InvalidSettings(format!(
                "interval must be a whole number of minutes, got {raw}"
            ))
        })
}

fn parse_reference(payload: &serde_json::Value) -> Result<VerseReference> {
    match payload.get("reference") {
        Some(serde_json::Value::String(raw)) => VerseReference::parse(raw),
        Some(serde_json::Value::Number(n)) => VerseReference::parse(&n.to_string()),
        _ => Err(ReminderError::Contract(
            "sendAyahByReference requires payload.reference".to_owned(),
        )),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::scheduler::SchedulerState;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct TestHandler {
        interval: Mutex<u32>,
        references: Mutex<Vec<VerseReference>>,
        fail_expired_probe: AtomicBool,
        shut_down: AtomicBool,
    }

    fn verse() -> Verse {
        Verse::new("text", "Al-Baqara", 255, 262)
    }

    #[async_trait]
    impl ControlHandler for TestHandler {
        async fn send_now(&self) -> Result<Verse> {
            Ok(verse())
        }
        async fn test_notification(&self) -> Result<Verse> {
            Err(ReminderError::Notification("denied".to_owned()))
        }
        async fn force_new(&self) -> Result<Verse> {
            Ok(verse())
        }
        async fn send_by_reference(&self, reference: VerseReference) -> Result<Verse> {
            self.references.lock().unwrap().push(reference);
            Ok(verse())
        }
        async fn settings(&self) -> Result<Settings> {
            Settings::new(*self.interval.lock().unwrap())
        }
        async fn update_settings(&self, interval_minutes: u32) -> Result<()> {
            crate::settings::validate_interval(interval_minutes)?;
            *self.interval.lock().unwrap() = interval_minutes;
            Ok(())
        }
        async fn check_wake_up(&self) -> Result<bool> {
            Ok(false)
        }
        async fn status(&self) -> Result<StatusView> {
            Ok(StatusView {
                initialized: true,
                timestamp: 42,
                state: SchedulerState::Armed,
            })
        }
        async fn check_timer_expired(&self) -> Result<bool> {
            if self.fail_expired_probe.load(Ordering::SeqCst) {
                Err(ReminderError::Store("unreadable".to_owned()))
            } else {
                Ok(true)
            }
        }
        async fn timer_report(&self) -> Result<TimerReport> {
            Ok(TimerReport {
                success: true,
                timer: None,
                state: SchedulerState::Degraded,
                interval: Some(10),
            })
        }
        async fn repair_storage(&self) -> Result<RepairReport> {
            Ok(RepairReport {
                success: true,
                ..RepairReport::default()
            })
        }
        async fn last_ayah(&self) -> Result<LastAyahView> {
            Ok(LastAyahView {
                ayah: Some(verse()),
                last_ayah_time: Some(1),
                interval: 10,
                remaining_ms: 0,
                display: "Ready!".to_owned(),
            })
        }
        async fn shutdown(&self) -> Result<()> {
            self.shut_down.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn make_server() -> HostCommandServer<TestHandler> {
        let handler = TestHandler {
            interval: Mutex::new(10),
            ..TestHandler::default()
        };
        let (_client, server) = command_channel(8, 8, handler);
        server
    }

    fn make_envelope(command: CommandName, payload: serde_json::Value) -> CommandEnvelope {
        CommandEnvelope::new("test-req-1", command, payload)
    }

    #[tokio::test]
    async fn ping_reports_active_and_initialized() {
        let server = make_server();
        let resp = server
            .route(&make_envelope(CommandName::Ping, serde_json::Value::Null))
            .await;
        assert!(resp.ok);
        assert_eq!(resp.payload["status"], "active");
        assert_eq!(resp.payload["initialized"], true);
    }

    #[tokio::test]
    async fn send_now_returns_success_and_verse() {
        let server = make_server();
        let resp = server
            .route(&make_envelope(CommandName::SendAyahNow, serde_json::json!({})))
            .await;
        assert!(resp.ok);
        assert_eq!(resp.payload["success"], true);
        assert_eq!(resp.payload["ayah"]["number"], 262);
    }

    #[tokio::test]
    async fn failed_operation_replies_success_false() {
        let server = make_server();
        let resp = server
            .route(&make_envelope(
                CommandName::TestNotification,
                serde_json::json!({}),
            ))
            .await;
        assert!(!resp.ok);
        assert_eq!(resp.request_id, "test-req-1");
        assert_eq!(resp.payload["success"], false);
        assert!(
            resp.error
                .as_deref()
                .is_some_and(|e| e.contains("denied"))
        );
    }

    #[tokio::test]
    async fn update_settings_accepts_numeric_strings() {
        let server = make_server();
        let resp = server
            .route(&make_envelope(
                CommandName::UpdateSettings,
                serde_json::json!({"interval": "45"}),
            ))
            .await;
        assert!(resp.ok);
        assert_eq!(*server.handler.interval.lock().unwrap(), 45);

        let resp = server
            .route(&make_envelope(CommandName::GetSettings, serde_json::Value::Null))
            .await;
        assert_eq!(resp.payload["interval"], 45);
    }

    #[tokio::test]
    async fn update_settings_rejects_missing_and_out_of_range() {
        let server = make_server();
        for payload in [
            serde_json::json!({}),
            serde_json::json!({"interval": 0}),
            serde_json::json!({"interval": 1441}),
            serde_json::json!({"interval": -5}),
            serde_json::json!({"interval": "ten"}),
        ] {
            let resp = server
                .route(&make_envelope(CommandName::UpdateSettings, payload))
                .await;
            assert!(!resp.ok);
            assert_eq!(resp.payload["success"], false);
        }
        assert_eq!(*server.handler.interval.lock().unwrap(), 10);
    }

    #[tokio::test]
    async fn update_settings_emits_event() {
        let server = make_server();
        let mut events = server.event_tx.subscribe();
        server
            .route(&make_envelope(
                CommandName::UpdateSettings,
                serde_json::json!({"interval": 30}),
            ))
            .await;
        let event = events.try_recv().unwrap();
        assert_eq!(event.event, "settings.updated");
        assert_eq!(event.payload["interval"], 30);
    }

    #[tokio::test]
    async fn reference_accepts_strings_numbers_and_presets() {
        let server = make_server();
        for reference in [
            serde_json::json!("2:255"),
            serde_json::json!(262),
            serde_json::json!("kursi"),
        ] {
            let resp = server
                .route(&make_envelope(
                    CommandName::SendAyahByReference,
                    serde_json::json!({"reference": reference}),
                ))
                .await;
            assert!(resp.ok, "{resp:?}");
        }
        let seen = server.handler.references.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                VerseReference::InBook {
                    surah: 2,
                    ayah: 255
                },
                VerseReference::Global(262),
                VerseReference::InBook {
                    surah: 2,
                    ayah: 255
                },
            ]
        );

        let resp = server
            .route(&make_envelope(
                CommandName::SendAyahByReference,
                serde_json::json!({}),
            ))
            .await;
        assert!(!resp.ok);
    }

    #[tokio::test]
    async fn timer_expired_probe_reports_store_errors_inline() {
        let server = make_server();
        let resp = server
            .route(&make_envelope(
                CommandName::CheckTimerExpired,
                serde_json::Value::Null,
            ))
            .await;
        assert_eq!(resp.payload["expired"], true);

        server
            .handler
            .fail_expired_probe
            .store(true, Ordering::SeqCst);
        let resp = server
            .route(&make_envelope(
                CommandName::CheckTimerExpired,
                serde_json::Value::Null,
            ))
            .await;
        assert!(resp.ok);
        assert_eq!(resp.payload["expired"], false);
        assert!(resp.payload["error"].is_string());
    }

    #[tokio::test]
    async fn diagnostics_serialize_camel_case() {
        let server = make_server();
        let alarms = server
            .route(&make_envelope(CommandName::DebugAlarms, serde_json::Value::Null))
            .await;
        assert_eq!(alarms.payload["state"], "degraded");
        assert!(alarms.payload["timer"].is_null());

        let last = server
            .route(&make_envelope(CommandName::GetLastAyah, serde_json::Value::Null))
            .await;
        assert_eq!(last.payload["display"], "Ready!");
        assert_eq!(last.payload["lastAyahTime"], 1);
        assert_eq!(last.payload["remainingMs"], 0);
    }

    #[tokio::test]
    async fn shutdown_calls_handler() {
        let server = make_server();
        let resp = server
            .route(&make_envelope(CommandName::Shutdown, serde_json::Value::Null))
            .await;
        assert!(resp.ok);
        assert!(server.handler.shut_down.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn client_rejects_invalid_envelope_before_sending() {
        let (client, _server) = command_channel(4, 4, TestHandler::default());
        let mut envelope = make_envelope(CommandName::Ping, serde_json::Value::Null);
        envelope.v = 99;
        let err = client.send(envelope).await.unwrap_err();
        assert!(matches!(err, ReminderError::Contract(_)));
    }
}
