//! In-memory fakes for the scheduler's collaborators.
//!
//! Used by unit tests and by the integration tests under `tests/`. Every
//! fake records what it was asked to do and can be told to fail.

use crate::error::{ReminderError, Result};
use crate::notify::{LinkOpener, NotificationContent, NotificationService};
use crate::store::{MemoryStore, StateStore, StoreChange, StoreMap};
use crate::timer::{TimerInfo, TimerService, TimerSpec};
use crate::verse::{Verse, VerseReference, VerseSource};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

/// Shared settable clock in epoch millis.
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Arc<AtomicU64>);

impl ManualClock {
    #[must_use]
    pub fn new(now_ms: u64) -> Self {
        Self(Arc::new(AtomicU64::new(now_ms)))
    }

    #[must_use]
    pub fn now(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, now_ms: u64) {
        self.0.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: u64) -> u64 {
        self.0.fetch_add(ms, Ordering::SeqCst) + ms
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Timer table that never fires on its own.
///
/// Delays are resolved against the shared [`ManualClock`]. Creates can be
/// made to error (`fail_next_creates`) or to succeed without leaving a timer
/// behind (`drop_next_creates`).
#[derive(Debug, Default)]
pub struct FakeTimerService {
    clock: ManualClock,
    timers: Mutex<HashMap<String, TimerInfo>>,
    created: Mutex<Vec<(String, TimerSpec)>>,
    clears: AtomicUsize,
    failing_creates: AtomicUsize,
    dropped_creates: AtomicUsize,
}

impl FakeTimerService {
    #[must_use]
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            ..Self::default()
        }
    }

    pub fn fail_next_creates(&self, count: usize) {
        self.failing_creates.store(count, Ordering::SeqCst);
    }

    pub fn drop_next_creates(&self, count: usize) {
        self.dropped_creates.store(count, Ordering::SeqCst);
    }

    /// Every create call that reached the table or was dropped, in order.
    #[must_use]
    pub fn created(&self) -> Vec<(String, TimerSpec)> {
        lock(&self.created).clone()
    }

    #[must_use]
    pub fn clear_count(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn live_count(&self) -> usize {
        lock(&self.timers).len()
    }

    /// Simulate the host losing a timer.
    pub fn forget(&self, name: &str) {
        lock(&self.timers).remove(name);
    }
}

#[async_trait]
impl TimerService for FakeTimerService {
    async fn create(&self, name: &str, spec: TimerSpec) -> Result<()> {
        if take_one(&self.failing_creates) {
            return Err(ReminderError::TimerCreation(format!(
                "simulated failure creating `{name}`"
            )));
        }
        lock(&self.created).push((name.to_owned(), spec));
        if take_one(&self.dropped_creates) {
            return Ok(());
        }
        lock(&self.timers).insert(
            name.to_owned(),
            TimerInfo {
                name: name.to_owned(),
                scheduled_time: spec.first_fire_ms(self.clock.now()),
                period_in_minutes: spec.period_minutes(),
            },
        );
        Ok(())
    }

    async fn get(&self, name: &str) -> Option<TimerInfo> {
        lock(&self.timers).get(name).cloned()
    }

    async fn clear(&self, name: &str) -> Result<bool> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.timers).remove(name).is_some())
    }
}

/// Records every notification; can fail on demand.
#[derive(Debug, Default)]
pub struct RecordingNotificationService {
    shown: Mutex<Vec<(String, NotificationContent)>>,
    failing: AtomicUsize,
}

impl RecordingNotificationService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, count: usize) {
        self.failing.store(count, Ordering::SeqCst);
    }

    #[must_use]
    pub fn shown(&self) -> Vec<(String, NotificationContent)> {
        lock(&self.shown).clone()
    }
}

#[async_trait]
impl NotificationService for RecordingNotificationService {
    async fn create(&self, id: &str, content: &NotificationContent) -> Result<()> {
        if take_one(&self.failing) {
            return Err(ReminderError::Notification(
                "simulated notification failure".to_owned(),
            ));
        }
        lock(&self.shown).push((id.to_owned(), content.clone()));
        Ok(())
    }
}

/// Verse source answering from a queue; an empty queue is a network error.
#[derive(Debug, Default)]
pub struct ScriptedVerseSource {
    random: Mutex<VecDeque<Result<Verse>>>,
    random_calls: AtomicUsize,
    references: Mutex<Vec<VerseReference>>,
    fail_references: AtomicBool,
}

impl ScriptedVerseSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_random(&self, outcome: Result<Verse>) {
        lock(&self.random).push_back(outcome);
    }

    pub fn fail_references(&self) {
        self.fail_references.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn random_calls(&self) -> usize {
        self.random_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn requested_references(&self) -> Vec<VerseReference> {
        lock(&self.references).clone()
    }
}

#[async_trait]
impl VerseSource for ScriptedVerseSource {
    async fn fetch_random(&self) -> Result<Verse> {
        self.random_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.random)
            .pop_front()
            .unwrap_or_else(|| Err(ReminderError::Network("no scripted verse".to_owned())))
    }

    async fn fetch_by_reference(&self, reference: VerseReference) -> Result<Verse> {
        lock(&self.references).push(reference);
        if self.fail_references.load(Ordering::SeqCst) {
            return Err(ReminderError::Network("simulated lookup failure".to_owned()));
        }
        let number = match reference {
            VerseReference::InBook { surah, ayah } => surah * 1_000 + ayah,
            VerseReference::Global(number) => number,
        };
        Ok(Verse::new(
            format!("verse {}", reference.to_path_segment()),
            "Requested",
            number,
            number,
        ))
    }
}

/// Remembers opened links instead of launching a browser.
#[derive(Debug, Default)]
pub struct RecordingLinkOpener {
    opened: Mutex<Vec<String>>,
}

impl RecordingLinkOpener {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn opened(&self) -> Vec<String> {
        lock(&self.opened).clone()
    }
}

impl LinkOpener for RecordingLinkOpener {
    fn open(&self, url: &str) -> Result<()> {
        lock(&self.opened).push(url.to_owned());
        Ok(())
    }
}

/// [`MemoryStore`] whose reads and writes can be switched to fail.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check(&self, flag: &AtomicBool, op: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            Err(ReminderError::Store(format!("simulated {op} failure")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StateStore for FlakyStore {
    async fn get(&self, keys: &[&str]) -> Result<StoreMap> {
        self.check(&self.fail_reads, "read")?;
        self.inner.get(keys).await
    }

    async fn get_all(&self) -> Result<StoreMap> {
        self.check(&self.fail_reads, "read")?;
        self.inner.get_all().await
    }

    async fn set(&self, values: StoreMap) -> Result<()> {
        self.check(&self.fail_writes, "write")?;
        self.inner.set(values).await
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.inner.subscribe()
    }
}
