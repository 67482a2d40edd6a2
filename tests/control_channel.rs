//! Control channel end-to-end tests
//!
//! Drive a real scheduler loop (with in-memory collaborators) through the
//! newline-delimited JSON bridge, exactly as a frontend would.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use ayah_reminder::config::ReminderConfig;
use ayah_reminder::host::contract::{EventEnvelope, ResponseEnvelope};
use ayah_reminder::host::handler::forward_scheduler_events;
use ayah_reminder::host::stdio::run_json_bridge;
use ayah_reminder::scheduler::{
    Collaborators, REMINDER_TIMER_NAME, ReminderScheduler, SchedulerHandle, SchedulerInputs,
    spawn_scheduler,
};
use ayah_reminder::store::{KEY_INTERVAL, MemoryStore, StateStore};
use ayah_reminder::testing::{
    FakeTimerService, ManualClock, RecordingLinkOpener, RecordingNotificationService,
    ScriptedVerseSource,
};
use ayah_reminder::timer::{TimerService, now_epoch_millis};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

const IO_TIMEOUT: Duration = Duration::from_secs(5);

struct Host {
    input: DuplexStream,
    output: Lines<BufReader<DuplexStream>>,
    events: Vec<EventEnvelope>,
    handle: SchedulerHandle,
    bridge: JoinHandle<ayah_reminder::Result<()>>,
    store: Arc<MemoryStore>,
    timers: Arc<FakeTimerService>,
    notifications: Arc<RecordingNotificationService>,
}

impl Host {
    fn start() -> Self {
        let store = Arc::new(MemoryStore::new());
        let timers = Arc::new(FakeTimerService::new(ManualClock::new(now_epoch_millis())));
        let notifications = Arc::new(RecordingNotificationService::new());
        let mut config = ReminderConfig::default();
        config.schedule.settle_ms = 0;

        let scheduler = ReminderScheduler::new(
            Collaborators {
                store: store.clone(),
                timers: timers.clone(),
                source: Arc::new(ScriptedVerseSource::new()),
                notifications: notifications.clone(),
                links: Arc::new(RecordingLinkOpener::new()),
            },
            &config,
        );
        let (_fire_tx, fires) = tokio::sync::mpsc::unbounded_channel();
        let (handle, _task) = spawn_scheduler(
            scheduler,
            store.subscribe(),
            SchedulerInputs {
                fires,
                clicks: None,
                health_check_every: Duration::from_secs(3600),
            },
        );

        let (event_tx, _event_rx) = broadcast::channel(64);
        let _forwarder = forward_scheduler_events(handle.subscribe(), event_tx.clone());

        let (input, bridge_in) = tokio::io::duplex(16 * 1024);
        let (bridge_out, output) = tokio::io::duplex(16 * 1024);
        let bridge = tokio::spawn(run_json_bridge(
            bridge_in,
            bridge_out,
            handle.clone(),
            event_tx,
        ));

        Self {
            input,
            output: BufReader::new(output).lines(),
            events: Vec::new(),
            handle,
            bridge,
            store,
            timers,
            notifications,
        }
    }

    async fn send_raw(&mut self, line: &str) {
        self.input.write_all(line.as_bytes()).await.unwrap();
        self.input.write_all(b"\n").await.unwrap();
        self.input.flush().await.unwrap();
    }

    /// Next response line, collecting any event lines seen on the way.
    async fn next_response(&mut self) -> ResponseEnvelope {
        loop {
            let line = tokio::time::timeout(IO_TIMEOUT, self.output.next_line())
                .await
                .expect("bridge output timed out")
                .unwrap()
                .expect("bridge output closed");
            let value: serde_json::Value = serde_json::from_str(&line).unwrap();
            if value.get("event_id").is_some() {
                self.events.push(serde_json::from_value(value).unwrap());
            } else {
                return serde_json::from_value(value).unwrap();
            }
        }
    }

    async fn request(
        &mut self,
        id: &str,
        command: &str,
        payload: serde_json::Value,
    ) -> ResponseEnvelope {
        let line = json!({"v": 1, "request_id": id, "command": command, "payload": payload});
        self.send_raw(&line.to_string()).await;
        let response = self.next_response().await;
        assert_eq!(response.request_id, id);
        response
    }

    async fn wait_for_event(&mut self, name: &str) -> EventEnvelope {
        if let Some(found) = self.events.iter().find(|e| e.event == name) {
            return found.clone();
        }
        // Pull more lines via a cheap query until the event shows up.
        for attempt in 0..20 {
            self.request(&format!("poll-{attempt}"), "getStatus", json!({}))
                .await;
            if let Some(found) = self.events.iter().find(|e| e.event == name) {
                return found.clone();
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("event `{name}` never arrived; saw {:?}", self.events);
    }
}

#[tokio::test]
async fn ping_reports_initialized_scheduler() {
    let mut host = Host::start();
    let resp = host.request("r1", "ping", json!({})).await;
    assert!(resp.ok);
    assert_eq!(resp.payload["status"], "active");
    assert_eq!(resp.payload["initialized"], true);

    let status = host.request("r2", "getStatus", json!(null)).await;
    assert_eq!(status.payload["initialized"], true);
    assert_eq!(status.payload["state"], "armed");
    assert!(status.payload["timestamp"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn settings_round_trip_and_rearm() {
    let mut host = Host::start();
    let resp = host.request("r1", "getSettings", json!({})).await;
    assert_eq!(resp.payload["interval"], 10);

    let resp = host
        .request("r2", "updateSettings", json!({"interval": 25}))
        .await;
    assert!(resp.ok);
    assert_eq!(resp.payload["success"], true);

    let resp = host.request("r3", "getSettings", json!({})).await;
    assert_eq!(resp.payload["interval"], 25);
    let stored = host.store.get(&[KEY_INTERVAL]).await.unwrap();
    assert_eq!(stored[KEY_INTERVAL], 25);

    let timer = host.timers.get(REMINDER_TIMER_NAME).await.unwrap();
    assert_eq!(timer.period_in_minutes, Some(25));

    let changed = host.wait_for_event("storage.changed").await;
    assert!(changed.payload["changed"].is_object());
}

#[tokio::test]
async fn invalid_interval_is_rejected_with_success_false() {
    let mut host = Host::start();
    for (id, interval) in [("r1", json!(0)), ("r2", json!(1441)), ("r3", json!("abc"))] {
        let resp = host
            .request(id, "updateSettings", json!({"interval": interval}))
            .await;
        assert!(!resp.ok);
        assert_eq!(resp.payload["success"], false);
        assert!(resp.error.is_some());
    }
    let resp = host.request("r4", "getSettings", json!({})).await;
    assert_eq!(resp.payload["interval"], 10);
}

#[tokio::test]
async fn manual_sends_show_notifications() {
    let mut host = Host::start();

    let resp = host.request("r1", "sendAyahNow", json!({})).await;
    assert!(resp.ok);
    assert_eq!(resp.payload["success"], true);
    assert!(resp.payload["ayah"]["number"].as_u64().unwrap() > 0);

    let resp = host.request("r2", "testNotification", json!({})).await;
    assert!(resp.ok);

    let resp = host.request("r3", "forceNewAyah", json!({})).await;
    assert!(resp.ok);

    let resp = host
        .request("r4", "sendAyahByReference", json!({"reference": "ikhlas"}))
        .await;
    assert!(resp.ok);
    assert_eq!(resp.payload["ayah"]["text"], "verse 112:1");

    let shown = host.notifications.shown();
    assert_eq!(shown.len(), 4);
    assert!(shown[1].1.title.starts_with("Test"));

    let delivered = host.wait_for_event("ayah.delivered").await;
    assert!(delivered.payload["ayah"].is_object());
}

#[tokio::test]
async fn diagnostics_describe_timer_and_countdown() {
    let mut host = Host::start();

    let alarms = host.request("r1", "debugAlarms", json!({})).await;
    assert!(alarms.ok);
    assert_eq!(alarms.payload["timer"]["name"], REMINDER_TIMER_NAME);
    assert_eq!(alarms.payload["timer"]["periodInMinutes"], 10);
    assert_eq!(alarms.payload["timer"]["inFuture"], true);
    assert_eq!(alarms.payload["interval"], 10);

    let last = host.request("r2", "getLastAyah", json!({})).await;
    assert!(last.payload["ayah"].is_object());
    assert!(last.payload["remainingMs"].as_u64().unwrap() > 0);
    assert_ne!(last.payload["display"], "Ready!");

    let expired = host.request("r3", "checkTimerExpired", json!({})).await;
    assert_eq!(expired.payload["expired"], false);

    let repaired = host.request("r4", "debugStorage", json!({})).await;
    assert_eq!(repaired.payload["success"], true);
    assert_eq!(repaired.payload["repaired"], false);

    let wake = host.request("r5", "checkWakeUp", json!({})).await;
    assert_eq!(wake.payload["success"], true);
    assert_eq!(wake.payload["wokeUp"], false);
}

#[tokio::test]
async fn malformed_lines_get_parse_errors() {
    let mut host = Host::start();

    host.send_raw("not json").await;
    let resp = host.next_response().await;
    assert!(!resp.ok);
    assert_eq!(resp.request_id, "parse-error");

    host.send_raw(r#"{"v":1,"request_id":"x","command":"host.ping","payload":{}}"#)
        .await;
    let resp = host.next_response().await;
    assert_eq!(resp.request_id, "parse-error");

    host.send_raw(r#"{"v":7,"request_id":"old","command":"ping","payload":{}}"#)
        .await;
    let resp = host.next_response().await;
    assert!(!resp.ok);
    assert_eq!(resp.request_id, "old");
    assert!(resp.error.unwrap().contains("unsupported contract version"));

    // Still serving afterwards.
    let resp = host.request("r1", "ping", json!({})).await;
    assert!(resp.ok);
}

#[tokio::test]
async fn shutdown_stops_bridge_and_scheduler() {
    let mut host = Host::start();
    let resp = host.request("bye", "shutdown", json!({})).await;
    assert!(resp.ok);
    assert_eq!(resp.payload["success"], true);

    let result = tokio::time::timeout(IO_TIMEOUT, &mut host.bridge)
        .await
        .expect("bridge stops")
        .unwrap();
    assert!(result.is_ok());
    assert!(host.handle.is_shut_down());
}
