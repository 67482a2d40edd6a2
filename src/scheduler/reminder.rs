//! Reminder state machine.
//!
//! Decides whether a verse is due from the stored delivery time and
//! interval, keeps exactly one named recurring timer alive, and recovers
//! from missed fires, suspensions and unreliable timer creation.
//!
//! Every operation takes `now` (epoch millis) explicitly.

use super::report::{
    HealthReport, LastAyahView, READY_LABEL, RepairReport, StatusView, TimerDetails, TimerReport,
    format_countdown,
};
use super::{SchedulerEvent, SchedulerState};
use crate::config::{ReminderConfig, ScheduleConfig};
use crate::error::Result;
use crate::notify::{AYAH_NOTIFICATION_ID, LinkOpener, NotificationService, Notifier};
use crate::settings::Settings;
use crate::store::{
    KEY_INTERVAL, StateStore, StoreChange, load_delivery_state, load_settings, read_interval,
    save_delivery, save_settings,
};
use crate::timer::{AttemptOutcome, TimerService, TimerSpec, attempt, format_epoch_millis};
use crate::verse::fallback::pick_fallback_excluding;
use crate::verse::{UsageTracker, Verse, VerseReference, VerseSource, pick_fallback};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Name of the single recurring timer.
pub const REMINDER_TIMER_NAME: &str = "quran-ayah-reminder";

/// First delay of the `Immediate` strategy and of the degraded one-shot.
const ONE_MINUTE_MS: u64 = 60_000;

/// Lower bound on the first delay when re-arming for the remaining time.
const MIN_REARM_DELAY_MS: u64 = 30_000;

const EVENT_CAPACITY: usize = 64;

/// Why a verse is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DueReason {
    /// No verse or no delivery time stored.
    NeverDelivered,
    /// At least one interval passed since the last delivery.
    IntervalElapsed,
    /// The stored delivery time lies in the future.
    ClockSkew,
    /// The store could not be read; over-delivering beats going silent.
    StoreUnavailable,
}

/// Ways of creating the recurring timer, tried in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmStrategy {
    /// Delay then period.
    Standard,
    /// One minute delay then period.
    Immediate,
    /// Absolute first-fire time then period.
    AbsoluteTime,
    /// Delay only; the next fire re-arms.
    DelayOnly,
}

impl ArmStrategy {
    pub const ALL: [Self; 4] = [
        Self::Standard,
        Self::Immediate,
        Self::AbsoluteTime,
        Self::DelayOnly,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Immediate => "immediate",
            Self::AbsoluteTime => "absolute-time",
            Self::DelayOnly => "delay-only",
        }
    }

    fn spec(self, interval_minutes: u32, first_delay_ms: u64, now_ms: u64) -> TimerSpec {
        match self {
            Self::Standard => TimerSpec::Delay {
                delay_ms: first_delay_ms,
                period_minutes: Some(interval_minutes),
            },
            Self::Immediate => TimerSpec::Delay {
                delay_ms: ONE_MINUTE_MS,
                period_minutes: Some(interval_minutes),
            },
            Self::AbsoluteTime => TimerSpec::At {
                at_ms: now_ms.saturating_add(first_delay_ms),
                period_minutes: Some(interval_minutes),
            },
            Self::DelayOnly => TimerSpec::Delay {
                delay_ms: first_delay_ms,
                period_minutes: None,
            },
        }
    }
}

/// Result of [`ReminderScheduler::arm`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmOutcome {
    Armed(ArmStrategy),
    Degraded,
}

/// External services the scheduler drives.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn StateStore>,
    pub timers: Arc<dyn TimerService>,
    pub source: Arc<dyn VerseSource>,
    pub notifications: Arc<dyn NotificationService>,
    pub links: Arc<dyn LinkOpener>,
}

/// One instance per process; durable state is re-derived from the store.
pub struct ReminderScheduler {
    store: Arc<dyn StateStore>,
    timers: Arc<dyn TimerService>,
    source: Arc<dyn VerseSource>,
    links: Arc<dyn LinkOpener>,
    notifier: Notifier,
    tracker: UsageTracker,
    schedule: ScheduleConfig,
    default_settings: Settings,
    state: SchedulerState,
    initialized: bool,
    last_wake_ms: u64,
    armed_interval: Option<u32>,
    events: broadcast::Sender<SchedulerEvent>,
}

impl ReminderScheduler {
    #[must_use]
    pub fn new(collaborators: Collaborators, config: &ReminderConfig) -> Self {
        let default_settings =
            Settings::new(config.schedule.default_interval_minutes).unwrap_or_default();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store: collaborators.store,
            timers: collaborators.timers,
            source: collaborators.source,
            links: collaborators.links,
            notifier: Notifier::new(collaborators.notifications, config.notification.clone()),
            tracker: UsageTracker::new(),
            schedule: config.schedule.clone(),
            default_settings,
            state: SchedulerState::Uninitialized,
            initialized: false,
            last_wake_ms: 0,
            armed_interval: None,
            events,
        }
    }

    #[must_use]
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Period of the last successfully armed timer.
    #[must_use]
    pub fn armed_interval(&self) -> Option<u32> {
        self.armed_interval
    }

    #[must_use]
    pub fn tracker(&self) -> &UsageTracker {
        &self.tracker
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.events.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<SchedulerEvent> {
        self.events.clone()
    }

    fn emit(&self, event: SchedulerEvent) {
        let _ = self.events.send(event);
    }

    fn set_state(&mut self, next: SchedulerState) {
        if self.state == next {
            return;
        }
        let from = self.state;
        self.state = next;
        info!(from = from.as_str(), to = next.as_str(), "scheduler state changed");
        self.emit(SchedulerEvent::StateChanged { from, to: next });
    }

    async fn current_settings(&self) -> Settings {
        match load_settings(self.store.as_ref(), self.default_settings).await {
            Ok(settings) => settings,
            Err(e) => {
                warn!("cannot read interval, using default: {e}");
                self.default_settings
            }
        }
    }

    async fn stored_verse(&self) -> Option<Verse> {
        match load_delivery_state(self.store.as_ref()).await {
            Ok(state) => state.last_verse,
            Err(e) => {
                warn!("cannot read last verse: {e}");
                None
            }
        }
    }

    // ── due decision ──────────────────────────────────────────────────

    /// Due decision that reports store failures instead of absorbing them.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub async fn evaluate_due(&self, now_ms: u64) -> Result<Option<DueReason>> {
        let settings = load_settings(self.store.as_ref(), self.default_settings).await?;
        let delivery = load_delivery_state(self.store.as_ref()).await?;

        let reason = match (delivery.last_verse.as_ref(), delivery.last_delivery_ms) {
            (None, _) | (_, None) => Some(DueReason::NeverDelivered),
            (Some(_), Some(last)) if last > now_ms => Some(DueReason::ClockSkew),
            (Some(_), Some(last)) if now_ms - last >= settings.interval_ms() => {
                Some(DueReason::IntervalElapsed)
            }
            _ => None,
        };
        Ok(reason)
    }

    /// Why a verse is due now, or `None` if it is not.
    pub async fn due_reason(&self, now_ms: u64) -> Option<DueReason> {
        match self.evaluate_due(now_ms).await {
            Ok(reason) => reason,
            Err(e) => {
                warn!("store unavailable during due check, treating as due: {e}");
                Some(DueReason::StoreUnavailable)
            }
        }
    }

    pub async fn is_due(&self, now_ms: u64) -> bool {
        self.due_reason(now_ms).await.is_some()
    }

    // ── timer arming ──────────────────────────────────────────────────

    /// Replace the reminder timer with one first firing `first_delay_ms` from
    /// `now_ms` and repeating every `interval_minutes`.
    ///
    /// Strategies are tried in [`ArmStrategy::ALL`] order, each verified by
    /// reading the timer back. If all fail, an unverified one-minute one-shot
    /// is created and the scheduler degrades; this never fails.
    pub async fn arm(
        &mut self,
        interval_minutes: u32,
        first_delay_ms: u64,
        now_ms: u64,
    ) -> ArmOutcome {
        match self.timers.clear(REMINDER_TIMER_NAME).await {
            Ok(existed) => debug!(existed, "previous reminder timer cleared"),
            Err(e) => warn!("cannot clear previous reminder timer: {e}"),
        }
        self.settle(self.schedule.settle_ms / 2).await;

        let this = &*self;
        let outcome = attempt(
            &ArmStrategy::ALL,
            move |strategy| async move {
                debug!(
                    strategy = strategy.name(),
                    interval_minutes, first_delay_ms, "creating reminder timer"
                );
                this.timers
                    .create(
                        REMINDER_TIMER_NAME,
                        strategy.spec(interval_minutes, first_delay_ms, now_ms),
                    )
                    .await
            },
            move |_| async move {
                this.settle(this.schedule.settle_ms).await;
                this.timers.get(REMINDER_TIMER_NAME).await.is_some()
            },
        )
        .await;

        match outcome {
            AttemptOutcome::Succeeded { strategy, attempts } => {
                if let Some(info) = self.timers.get(REMINDER_TIMER_NAME).await {
                    info!(
                        strategy = strategy.name(),
                        attempts,
                        interval_minutes,
                        "reminder timer armed, next fire at {}",
                        format_epoch_millis(info.scheduled_time)
                    );
                }
                self.armed_interval = Some(interval_minutes);
                self.set_state(SchedulerState::Armed);
                ArmOutcome::Armed(strategy)
            }
            AttemptOutcome::Exhausted {
                attempts,
                last_error,
            } => {
                error!(
                    attempts,
                    last_error = last_error.as_deref().unwrap_or("none"),
                    "all timer strategies exhausted, falling back to one-minute one-shot"
                );
                let fallback = TimerSpec::Delay {
                    delay_ms: ONE_MINUTE_MS,
                    period_minutes: None,
                };
                if let Err(e) = self.timers.create(REMINDER_TIMER_NAME, fallback).await {
                    error!("fallback timer also failed, next health check will retry: {e}");
                }
                self.armed_interval = None;
                self.set_state(SchedulerState::Degraded);
                ArmOutcome::Degraded
            }
        }
    }

    /// Re-arm so the next fire lands when the current interval ends.
    ///
    /// Right after a delivery this is a full interval; when already due the
    /// first fire is [`MIN_REARM_DELAY_MS`] away.
    pub async fn rearm_for_remaining(&mut self, now_ms: u64) -> ArmOutcome {
        let settings = self.current_settings().await;
        let remaining = match load_delivery_state(self.store.as_ref()).await {
            Ok(state) => match state.last_delivery_ms {
                Some(last) if last > now_ms => 0,
                _ => state
                    .remaining_ms(&settings, now_ms)
                    .unwrap_or_else(|| settings.interval_ms()),
            },
            Err(e) => {
                warn!("cannot read delivery time, arming for the full interval: {e}");
                settings.interval_ms()
            }
        };
        let first_delay = remaining.max(MIN_REARM_DELAY_MS);
        self.arm(settings.interval_minutes, first_delay, now_ms).await
    }

    async fn settle(&self, millis: u64) {
        if millis > 0 {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }

    // ── verse selection and delivery ──────────────────────────────────

    /// A new verse that does not repeat the previous one where avoidable.
    async fn select_new_verse(&self) -> Verse {
        let previous = self.stored_verse().await.map(|verse| verse.id());
        let repeats = |verse: &Verse| {
            self.tracker.is_repeat(verse) || previous.as_ref() == Some(&verse.id())
        };

        let candidate = match self.source.fetch_random().await {
            Ok(verse) => verse,
            Err(e) => {
                warn!("verse fetch failed, using embedded fallback: {e}");
                return match previous.as_ref() {
                    Some(id) => pick_fallback_excluding(id),
                    None => pick_fallback(),
                };
            }
        };

        if !repeats(&candidate) {
            return candidate;
        }

        info!(verse = %candidate.id(), "fetched verse repeats the previous one, refetching");
        match self.source.fetch_random().await {
            Ok(verse) if !repeats(&verse) => verse,
            Ok(_) => {
                warn!("refetch repeated again, using embedded fallback");
                pick_fallback_excluding(&candidate.id())
            }
            Err(e) => {
                warn!("refetch failed, using embedded fallback: {e}");
                pick_fallback_excluding(&candidate.id())
            }
        }
    }

    /// Select, persist and track a new verse. Never fails.
    async fn refresh_verse(&mut self, now_ms: u64) -> Verse {
        let verse = self.select_new_verse().await;
        if let Err(e) = save_delivery(self.store.as_ref(), &verse, now_ms).await {
            warn!(verse = %verse.id(), "cannot persist delivered verse: {e}");
        }
        self.tracker.record(&verse);
        info!(verse = %verse.id(), "new verse selected: {}", verse.reference_line());
        verse
    }

    /// New verse when due (or `force`), otherwise the stored one.
    async fn obtain_verse(&mut self, now_ms: u64, force: bool) -> (Verse, bool) {
        if !force && self.due_reason(now_ms).await.is_none() {
            if let Some(verse) = self.stored_verse().await {
                debug!(verse = %verse.id(), "interval not elapsed, reusing stored verse");
                return (verse, false);
            }
        }
        (self.refresh_verse(now_ms).await, true)
    }

    async fn present(
        &mut self,
        verse: &Verse,
        is_test: bool,
        fresh: bool,
        now_ms: u64,
    ) -> Result<()> {
        self.notifier.show(verse, is_test).await?;
        self.emit(SchedulerEvent::Delivered {
            verse: verse.clone(),
            is_test,
            fresh,
            at_ms: now_ms,
        });
        Ok(())
    }

    /// Timer-driven delivery: failures are logged, never propagated.
    async fn deliver_scheduled(&mut self, now_ms: u64) -> bool {
        let verse = self.refresh_verse(now_ms).await;
        match self.present(&verse, false, true, now_ms).await {
            Ok(()) => true,
            Err(e) => {
                error!(verse = %verse.id(), "scheduled notification failed: {e}");
                false
            }
        }
    }

    // ── lifecycle events ──────────────────────────────────────────────

    /// Seed defaults, fetch a first verse if none is stored, and arm.
    ///
    /// A no-op once initialised.
    ///
    /// # Errors
    ///
    /// Returns store failures; the scheduler stays uninitialised and the next
    /// health check retries.
    pub async fn initialize(&mut self, now_ms: u64) -> Result<()> {
        if self.initialized {
            debug!("scheduler already initialized");
            return Ok(());
        }
        info!("initializing reminder scheduler");
        self.last_wake_ms = now_ms;

        if read_interval(self.store.as_ref()).await?.is_none() {
            info!(
                interval = self.default_settings.interval_minutes,
                "no valid interval stored, writing default"
            );
            save_settings(self.store.as_ref(), self.default_settings).await?;
        }

        let delivery = load_delivery_state(self.store.as_ref()).await?;
        if delivery.last_verse.is_none() {
            info!("no verse stored yet, fetching the first one");
            self.refresh_verse(now_ms).await;
        }

        self.rearm_for_remaining(now_ms).await;
        self.initialized = true;
        info!(state = self.state.as_str(), "reminder scheduler initialized");
        Ok(())
    }

    /// Handle a timer fire. Delivers only if still due, then always re-arms.
    pub async fn on_fire(&mut self, name: &str, now_ms: u64) {
        if name != REMINDER_TIMER_NAME {
            debug!(timer = name, "ignoring fire of unrelated timer");
            return;
        }
        self.set_state(SchedulerState::Firing);

        match self.due_reason(now_ms).await {
            Some(reason) => {
                info!(?reason, "reminder timer fired, delivering verse");
                self.deliver_scheduled(now_ms).await;
            }
            None => debug!("reminder timer fired early, nothing due"),
        }

        self.rearm_for_remaining(now_ms).await;
    }

    /// Sleep heuristic: a gap above the wake threshold since the previous
    /// check counts as a resume. Returns whether one was detected.
    pub async fn check_wake_up(&mut self, now_ms: u64) -> bool {
        let gap = now_ms.saturating_sub(self.last_wake_ms);
        self.last_wake_ms = now_ms;
        let threshold_ms = self.schedule.wake_threshold_secs.saturating_mul(1_000);
        if gap <= threshold_ms {
            return false;
        }
        info!(gap_ms = gap, "wake-up detected");
        self.on_resume(now_ms).await;
        true
    }

    /// Deliver immediately if due, otherwise re-arm for the remaining time.
    pub async fn on_resume(&mut self, now_ms: u64) {
        if let Some(reason) = self.due_reason(now_ms).await {
            info!(?reason, "verse due after resume, delivering now");
            self.deliver_scheduled(now_ms).await;
        }
        self.rearm_for_remaining(now_ms).await;
    }

    /// Periodic self-repair.
    ///
    /// With a live future timer, an armed state and nothing due this changes
    /// nothing.
    pub async fn health_check(&mut self, now_ms: u64) -> HealthReport {
        let mut report = HealthReport::default();

        if !self.initialized {
            warn!("scheduler not initialized, retrying initialization");
            match self.initialize(now_ms).await {
                Ok(()) => report.reinitialized = true,
                Err(e) => error!("initialization retry failed: {e}"),
            }
            report.timer_present = self.timers.get(REMINDER_TIMER_NAME).await.is_some();
            return report;
        }

        let mut needs_rearm = match self.timers.get(REMINDER_TIMER_NAME).await {
            None => {
                warn!("reminder timer missing, recreating");
                true
            }
            Some(info) => {
                report.timer_present = true;
                if info.scheduled_time < now_ms {
                    warn!(
                        "reminder timer stale (scheduled {}), recreating",
                        format_epoch_millis(info.scheduled_time)
                    );
                    true
                } else if self.state != SchedulerState::Armed {
                    info!(state = self.state.as_str(), "retrying full timer arm");
                    true
                } else {
                    debug!(
                        minutes_left = (info.scheduled_time - now_ms) / 60_000,
                        "health check: reminder timer healthy"
                    );
                    false
                }
            }
        };

        if let Some(reason) = self.due_reason(now_ms).await {
            info!(?reason, "missed delivery found during health check");
            report.delivered = self.deliver_scheduled(now_ms).await;
            needs_rearm = true;
        }

        if needs_rearm {
            self.rearm_for_remaining(now_ms).await;
            report.rearmed = true;
        }
        report
    }

    /// React to store changes from any writer; re-arms on a new interval.
    pub async fn on_store_change(&mut self, change: &StoreChange, now_ms: u64) -> bool {
        if !change.touches(KEY_INTERVAL) {
            return false;
        }
        match read_interval(self.store.as_ref()).await {
            Ok(Some(interval)) if Some(interval) != self.armed_interval => {
                info!(interval, "interval changed in store, re-arming");
                self.rearm_for_remaining(now_ms).await;
                true
            }
            Ok(_) => false,
            Err(e) => {
                warn!("cannot read changed interval: {e}");
                false
            }
        }
    }

    /// Resolve a notification click to its deep link and open it.
    pub async fn on_notification_clicked(&mut self, notification_id: &str) -> Option<String> {
        let url = match self.notifier.click_target(notification_id) {
            Some(url) => url,
            // After a restart only the stored verse knows the target.
            None if notification_id == AYAH_NOTIFICATION_ID => {
                let verse = self.stored_verse().await?;
                self.notifier.deep_link(verse.global_number)
            }
            None => return None,
        };

        if self.notifier.opens_links() {
            if let Err(e) = self.links.open(&url) {
                warn!("cannot open verse link: {e}");
            }
        }
        info!(notification_id, url = %url, "notification clicked");
        self.emit(SchedulerEvent::NotificationClicked {
            notification_id: notification_id.to_owned(),
            url: url.clone(),
        });
        Some(url)
    }

    // ── control operations ────────────────────────────────────────────

    async fn show_now(&mut self, now_ms: u64, is_test: bool) -> Result<Verse> {
        let (verse, fresh) = self.obtain_verse(now_ms, false).await;
        self.present(&verse, is_test, fresh, now_ms).await?;
        if fresh {
            self.rearm_for_remaining(now_ms).await;
        }
        Ok(verse)
    }

    /// Show a verse now: a new one if due, otherwise the stored one again.
    ///
    /// # Errors
    ///
    /// Returns the notification failure.
    pub async fn send_now(&mut self, now_ms: u64) -> Result<Verse> {
        self.show_now(now_ms, false).await
    }

    /// Same as [`send_now`](Self::send_now) with the test title.
    ///
    /// # Errors
    ///
    /// Returns the notification failure.
    pub async fn test_notification(&mut self, now_ms: u64) -> Result<Verse> {
        self.show_now(now_ms, true).await
    }

    /// Fetch, store and show a new verse, restarting the interval.
    ///
    /// # Errors
    ///
    /// Returns the notification failure; the new verse is stored regardless.
    pub async fn force_new(&mut self, now_ms: u64) -> Result<Verse> {
        let verse = self.refresh_verse(now_ms).await;
        let shown = self.present(&verse, false, true, now_ms).await;
        self.rearm_for_remaining(now_ms).await;
        shown.map(|()| verse)
    }

    /// Fetch a specific verse (embedded fallback on failure), store and show it.
    ///
    /// # Errors
    ///
    /// Returns the notification failure.
    pub async fn send_by_reference(
        &mut self,
        reference: VerseReference,
        now_ms: u64,
    ) -> Result<Verse> {
        let verse = match self.source.fetch_by_reference(reference).await {
            Ok(verse) => verse,
            Err(e) => {
                warn!(
                    reference = %reference.to_path_segment(),
                    "verse lookup failed, using embedded fallback: {e}"
                );
                pick_fallback()
            }
        };
        if let Err(e) = save_delivery(self.store.as_ref(), &verse, now_ms).await {
            warn!(verse = %verse.id(), "cannot persist requested verse: {e}");
        }
        self.tracker.record(&verse);
        let shown = self.present(&verse, false, true, now_ms).await;
        self.rearm_for_remaining(now_ms).await;
        shown.map(|()| verse)
    }

    /// Stored settings (default when missing).
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub async fn settings(&self) -> Result<Settings> {
        load_settings(self.store.as_ref(), self.default_settings).await
    }

    /// Validate and persist a new interval, then re-arm.
    ///
    /// # Errors
    ///
    /// [`ReminderError::InvalidSettings`](crate::ReminderError::InvalidSettings)
    /// for out-of-range values; store write failures.
    pub async fn update_settings(&mut self, interval_minutes: u32, now_ms: u64) -> Result<()> {
        let settings = Settings::new(interval_minutes)?;
        save_settings(self.store.as_ref(), settings).await?;
        info!(interval = interval_minutes, "interval updated");
        self.rearm_for_remaining(now_ms).await;
        Ok(())
    }

    /// `isDue` for the UI; unlike the scheduling path, store failures are
    /// reported rather than treated as due.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub async fn check_timer_expired(&self, now_ms: u64) -> Result<bool> {
        Ok(self.evaluate_due(now_ms).await?.is_some())
    }

    #[must_use]
    pub fn status(&self, now_ms: u64) -> StatusView {
        StatusView {
            initialized: self.initialized,
            timestamp: now_ms,
            state: self.state,
        }
    }

    /// Timer diagnostics.
    pub async fn timer_report(&self, now_ms: u64) -> TimerReport {
        let timer = self
            .timers
            .get(REMINDER_TIMER_NAME)
            .await
            .map(|info| TimerDetails::from_info(info, now_ms));
        let interval = match read_interval(self.store.as_ref()).await {
            Ok(interval) => interval,
            Err(e) => {
                warn!("cannot read interval for diagnostics: {e}");
                None
            }
        };
        match &timer {
            Some(details) => info!(
                next_fire = %details.scheduled_at,
                period = ?details.period_in_minutes,
                in_future = details.in_future,
                "reminder timer present"
            ),
            None => warn!("reminder timer not found"),
        }
        TimerReport {
            success: true,
            timer,
            state: self.state,
            interval,
        }
    }

    /// Write missing defaults and fetch a verse when delivery data is missing.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn repair_storage(&mut self, now_ms: u64) -> Result<RepairReport> {
        let mut report = RepairReport {
            success: true,
            ..RepairReport::default()
        };

        if read_interval(self.store.as_ref()).await?.is_none() {
            info!("repairing missing interval");
            save_settings(self.store.as_ref(), self.default_settings).await?;
            report.repaired_interval = true;
        }

        let delivery = load_delivery_state(self.store.as_ref()).await?;
        if delivery.last_verse.is_none() || delivery.last_delivery_ms.is_none() {
            info!("repairing missing verse data");
            self.refresh_verse(now_ms).await;
            report.repaired_ayah = true;
        }

        report.repaired = report.repaired_interval || report.repaired_ayah;
        report.interval = read_interval(self.store.as_ref()).await?;
        report.last_ayah_time = load_delivery_state(self.store.as_ref())
            .await?
            .last_delivery_ms;
        if report.repaired {
            info!(?report, "storage repaired");
        } else {
            debug!("storage healthy, nothing repaired");
        }
        Ok(report)
    }

    /// Last verse plus the countdown to the next one.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub async fn last_ayah_view(&self, now_ms: u64) -> Result<LastAyahView> {
        let settings = self.settings().await?;
        let delivery = load_delivery_state(self.store.as_ref()).await?;

        let remaining_ms = match delivery.last_delivery_ms {
            // Future timestamps are implausible; show as due.
            Some(last) if last > now_ms => 0,
            _ => delivery.remaining_ms(&settings, now_ms).unwrap_or(0),
        };
        let display = if remaining_ms == 0 {
            READY_LABEL.to_owned()
        } else {
            format_countdown(remaining_ms)
        };

        Ok(LastAyahView {
            ayah: delivery.last_verse,
            last_ayah_time: delivery.last_delivery_ms,
            interval: settings.interval_minutes,
            remaining_ms,
            display,
        })
    }
}
