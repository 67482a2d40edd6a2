//! End-to-end reminder scenarios against in-memory collaborators.
//!
//! Time is driven explicitly: every scheduler call takes `now`, and the fake
//! timer service resolves delays against the same manual clock.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use ayah_reminder::config::ReminderConfig;
use ayah_reminder::scheduler::{
    ArmOutcome, Collaborators, DueReason, REMINDER_TIMER_NAME, ReminderScheduler, SchedulerState,
};
use ayah_reminder::store::{
    KEY_INTERVAL, MemoryStore, StateStore, StoreMap, load_delivery_state, save_delivery,
};
use ayah_reminder::testing::{
    FakeTimerService, FlakyStore, ManualClock, RecordingLinkOpener, RecordingNotificationService,
    ScriptedVerseSource,
};
use ayah_reminder::timer::{TimerService, TimerSpec};
use ayah_reminder::verse::{UsageTracker, Verse};
use std::sync::Arc;

const T0: u64 = 1_700_000_000_000;
const MINUTE: u64 = 60_000;

struct Harness<S> {
    scheduler: ReminderScheduler,
    clock: ManualClock,
    store: Arc<S>,
    timers: Arc<FakeTimerService>,
    source: Arc<ScriptedVerseSource>,
    notifications: Arc<RecordingNotificationService>,
}

fn harness_with<S: StateStore + 'static>(store: Arc<S>) -> Harness<S> {
    let clock = ManualClock::new(T0);
    let timers = Arc::new(FakeTimerService::new(clock.clone()));
    let source = Arc::new(ScriptedVerseSource::new());
    let notifications = Arc::new(RecordingNotificationService::new());
    let mut config = ReminderConfig::default();
    config.schedule.settle_ms = 0;
    let scheduler = ReminderScheduler::new(
        Collaborators {
            store: store.clone(),
            timers: timers.clone(),
            source: source.clone(),
            notifications: notifications.clone(),
            links: Arc::new(RecordingLinkOpener::new()),
        },
        &config,
    );
    Harness {
        scheduler,
        clock,
        store,
        timers,
        source,
        notifications,
    }
}

fn harness() -> Harness<MemoryStore> {
    harness_with(Arc::new(MemoryStore::new()))
}

fn kursi() -> Verse {
    Verse::new("ٱللَّهُ لَآ إِلَـٰهَ إِلَّا هُوَ", "Al-Baqarah", 255, 262)
}

fn ikhlas() -> Verse {
    Verse::new("قُلْ هُوَ ٱللَّهُ أَحَدٌ", "Al-Ikhlaas", 1, 6222)
}

async fn seed(store: &dyn StateStore, interval: u32, verse: &Verse, at_ms: u64) {
    let mut values = StoreMap::new();
    values.insert(KEY_INTERVAL.to_owned(), interval.into());
    store.set(values).await.unwrap();
    save_delivery(store, verse, at_ms).await.unwrap();
}

#[tokio::test]
async fn fresh_install_fetches_stores_and_arms_default_interval() {
    let mut h = harness();
    h.source.push_random(Ok(kursi()));

    assert_eq!(
        h.scheduler.due_reason(T0).await,
        Some(DueReason::NeverDelivered)
    );
    h.scheduler.initialize(T0).await.unwrap();

    let state = load_delivery_state(h.store.as_ref()).await.unwrap();
    assert_eq!(state.last_verse, Some(kursi()));
    assert_eq!(state.last_delivery_ms, Some(T0));
    assert_eq!(
        h.store.get(&[KEY_INTERVAL]).await.unwrap()[KEY_INTERVAL],
        10
    );

    let timer = h.timers.get(REMINDER_TIMER_NAME).await.unwrap();
    assert_eq!(timer.scheduled_time, T0 + 10 * MINUTE);
    assert_eq!(timer.period_in_minutes, Some(10));
    assert_eq!(h.timers.live_count(), 1);
    assert_eq!(h.scheduler.state(), SchedulerState::Armed);
    assert!(h.scheduler.is_initialized());
}

#[tokio::test]
async fn fresh_install_offline_uses_embedded_verse() {
    let mut h = harness();
    h.scheduler.initialize(T0).await.unwrap();

    let state = load_delivery_state(h.store.as_ref()).await.unwrap();
    let verse = state.last_verse.expect("fallback verse stored");
    assert!(!verse.display_text.is_empty());
    assert!(verse.global_number > 0);
    assert_eq!(h.scheduler.state(), SchedulerState::Armed);
}

#[tokio::test]
async fn elapsed_interval_fire_delivers_and_rearms() {
    let mut h = harness();
    let now = T0 + 11 * MINUTE;
    h.clock.set(now);
    seed(h.store.as_ref(), 10, &kursi(), T0).await;
    h.source.push_random(Ok(ikhlas()));

    assert!(h.scheduler.is_due(now).await);
    h.scheduler.on_fire(REMINDER_TIMER_NAME, now).await;

    let shown = h.notifications.shown();
    assert_eq!(shown.len(), 1);
    assert!(shown[0].1.body.contains("قُلْ هُوَ ٱللَّهُ أَحَدٌ"));

    let state = load_delivery_state(h.store.as_ref()).await.unwrap();
    assert_eq!(state.last_delivery_ms, Some(now));
    assert_eq!(state.last_verse, Some(ikhlas()));

    let timer = h.timers.get(REMINDER_TIMER_NAME).await.unwrap();
    assert_eq!(timer.scheduled_time, now + 10 * MINUTE);
    assert_eq!(timer.period_in_minutes, Some(10));
    assert!(!h.scheduler.is_due(now).await);
}

#[tokio::test]
async fn resume_after_sleep_delivers_immediately() {
    let mut h = harness();
    seed(h.store.as_ref(), 10, &kursi(), T0).await;
    h.scheduler.initialize(T0).await.unwrap();
    assert!(h.notifications.shown().is_empty());

    let woke = T0 + 20 * MINUTE;
    h.clock.set(woke);
    h.source.push_random(Ok(ikhlas()));
    assert!(h.scheduler.check_wake_up(woke).await);

    assert_eq!(h.notifications.shown().len(), 1);
    let state = load_delivery_state(h.store.as_ref()).await.unwrap();
    assert_eq!(state.last_delivery_ms, Some(woke));
    let timer = h.timers.get(REMINDER_TIMER_NAME).await.unwrap();
    assert_eq!(timer.scheduled_time, woke + 10 * MINUTE);
}

#[tokio::test]
async fn exhausted_strategies_degrade_to_one_minute_one_shot() {
    let mut h = harness();
    seed(h.store.as_ref(), 10, &kursi(), T0).await;
    h.timers.fail_next_creates(4);

    let outcome = h.scheduler.rearm_for_remaining(T0).await;
    assert_eq!(outcome, ArmOutcome::Degraded);
    assert_eq!(h.scheduler.state(), SchedulerState::Degraded);

    let created = h.timers.created();
    assert_eq!(created.len(), 1, "only the fallback reached the table");
    assert_eq!(
        created[0].1,
        TimerSpec::Delay {
            delay_ms: MINUTE,
            period_minutes: None
        }
    );
    let timer = h.timers.get(REMINDER_TIMER_NAME).await.unwrap();
    assert_eq!(timer.period_in_minutes, None);
    assert_eq!(timer.scheduled_time, T0 + MINUTE);
}

#[tokio::test]
async fn health_check_is_idempotent_when_healthy() {
    let mut h = harness();
    h.source.push_random(Ok(kursi()));
    h.scheduler.initialize(T0).await.unwrap();
    let creates_before = h.timers.created().len();
    let clears_before = h.timers.clear_count();
    let state_before = load_delivery_state(h.store.as_ref()).await.unwrap();

    for minutes in [1, 3, 9] {
        let now = T0 + minutes * MINUTE;
        h.clock.set(now);
        let report = h.scheduler.health_check(now).await;
        assert!(report.is_quiet(), "{report:?}");
        assert!(report.timer_present);
    }

    assert_eq!(h.timers.created().len(), creates_before);
    assert_eq!(h.timers.clear_count(), clears_before);
    assert_eq!(
        load_delivery_state(h.store.as_ref()).await.unwrap(),
        state_before
    );
    assert!(h.notifications.shown().is_empty());
}

#[tokio::test]
async fn health_check_recreates_lost_timer() {
    let mut h = harness();
    h.source.push_random(Ok(kursi()));
    h.scheduler.initialize(T0).await.unwrap();
    h.timers.forget(REMINDER_TIMER_NAME);

    let now = T0 + 4 * MINUTE;
    h.clock.set(now);
    let report = h.scheduler.health_check(now).await;
    assert!(report.rearmed);
    assert!(!report.delivered);

    let timer = h.timers.get(REMINDER_TIMER_NAME).await.unwrap();
    assert_eq!(timer.scheduled_time, T0 + 10 * MINUTE);
    assert_eq!(timer.period_in_minutes, Some(10));
}

#[tokio::test]
async fn unreadable_store_is_treated_as_due() {
    let store = Arc::new(FlakyStore::new());
    let h = harness_with(store.clone());
    seed(store.as_ref(), 10, &kursi(), T0).await;
    assert!(!h.scheduler.is_due(T0).await);

    store.set_fail_reads(true);
    assert_eq!(
        h.scheduler.due_reason(T0).await,
        Some(DueReason::StoreUnavailable)
    );
    assert!(h.scheduler.check_timer_expired(T0).await.is_err());
}

#[tokio::test]
async fn initialization_retried_by_health_check_after_store_failure() {
    let store = Arc::new(FlakyStore::new());
    let mut h = harness_with(store.clone());
    store.set_fail_reads(true);

    assert!(h.scheduler.initialize(T0).await.is_err());
    assert!(!h.scheduler.is_initialized());

    store.set_fail_reads(false);
    h.source.push_random(Ok(kursi()));
    let report = h.scheduler.health_check(T0 + MINUTE).await;
    assert!(report.reinitialized);
    assert!(report.timer_present);
    assert!(h.scheduler.is_initialized());
}

#[tokio::test]
async fn repeated_random_verse_is_not_delivered_twice() {
    let mut h = harness();
    let now = T0 + 10 * MINUTE;
    h.clock.set(now);
    seed(h.store.as_ref(), 10, &kursi(), T0).await;
    h.source.push_random(Ok(kursi()));
    h.source.push_random(Ok(ikhlas()));

    h.scheduler.on_fire(REMINDER_TIMER_NAME, now).await;

    assert_eq!(h.source.random_calls(), 2);
    let state = load_delivery_state(h.store.as_ref()).await.unwrap();
    assert_eq!(state.last_verse, Some(ikhlas()));
}

#[test]
fn usage_history_keeps_most_recent_twenty() {
    let mut tracker = UsageTracker::new();
    for n in 1..=25 {
        tracker.record(&Verse::new(format!("v{n}"), "Book", n, n));
    }
    assert_eq!(tracker.len(), 20);
    let ids: Vec<&str> = tracker.ids().map(|id| id.as_str()).collect();
    assert_eq!(ids.first().copied(), Some("Book-6"));
    assert_eq!(ids.last().copied(), Some("Book-25"));
    assert!(tracker.is_repeat(&Verse::new("again", "Book", 25, 25)));
    assert!(!tracker.is_repeat(&Verse::new("older", "Book", 24, 24)));
}
