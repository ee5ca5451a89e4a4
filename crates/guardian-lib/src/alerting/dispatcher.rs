//! Alert dispatcher
//!
//! Owns every [`ActiveAlert`] and every [`ChannelState`]. Signals for a key are
//! applied under one lock, in the order they arrive:
//!
//! - new key: `Pending` until `alertDelay` expires (zero delay fires at once)
//! - repeated signal inside `suppressDuplicatesFor`: refresh, no notification
//! - inside a suppressing maintenance window: `Suppressed`, onset kept
//! - condition gone before the delay expires: resolved silently
//!
//! Outbound delivery runs on spawned tasks bounded by a semaphore, so a slow
//! channel never holds the lock.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};

use super::channel_state::{Admission, ChannelState, ChannelStatus};
use super::state::{ActiveAlert, AlertState, DeliveryOutcome, DeliveryRecord};
use super::{AlertKey, AlertSignal, AlertType, SignalSource};
use crate::channels::{
    AlertNotification, ChannelError, ChannelSpec, NotificationKind, Notifier, RateLimitSpec,
};
use crate::error::{GuardianError, StoreError};
use crate::models::{chrono_duration, JobRef};
use crate::observability::{GuardianMetrics, StructuredLogger};
use crate::registry::{MonitorPolicy, WatchRegistry};
use crate::store::{AlertFilter, ExecutionStore, Page, Pagination};

/// Delivery tuning
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub max_concurrent_deliveries: usize,
    /// Attempts per notification, including the first
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub attempt_timeout: Duration,
    /// Consecutive failed deliveries before a channel is marked not ready
    pub failure_threshold: u32,
    pub recovery_probe_interval: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent_deliveries: 8,
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            attempt_timeout: Duration::from_secs(10),
            failure_threshold: 3,
            recovery_probe_interval: Duration::from_secs(300),
        }
    }
}

/// Result of a manual channel test
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ChannelTestResult {
    pub success: bool,
    pub message: String,
}

#[derive(Default)]
struct DispatcherState {
    alerts: HashMap<AlertKey, ActiveAlert>,
    channels: HashMap<String, ChannelState>,
    timers: HashMap<AlertKey, JoinHandle<()>>,
}

impl DispatcherState {
    fn cancel_timer(&mut self, key: &AlertKey) {
        if let Some(handle) = self.timers.remove(key) {
            handle.abort();
        }
    }

    fn cancel_all_timers(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
    }
}

struct Inner {
    config: DispatcherConfig,
    registry: Arc<WatchRegistry>,
    store: Arc<dyn ExecutionStore>,
    state: AsyncMutex<DispatcherState>,
    deliveries: Mutex<JoinSet<()>>,
    semaphore: Arc<Semaphore>,
    metrics: GuardianMetrics,
    logger: StructuredLogger,
}

/// Cheap to clone; clones share state
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

struct Delivery {
    channel: String,
    notifier: Arc<dyn Notifier>,
    notification: AlertNotification,
    max_attempts: u32,
}

impl Dispatcher {
    pub fn new(
        config: DispatcherConfig,
        registry: Arc<WatchRegistry>,
        store: Arc<dyn ExecutionStore>,
        logger: StructuredLogger,
    ) -> Self {
        let permits = config.max_concurrent_deliveries.max(1);
        Self {
            inner: Arc::new(Inner {
                config,
                registry,
                store,
                state: AsyncMutex::new(DispatcherState::default()),
                deliveries: Mutex::new(JoinSet::new()),
                semaphore: Arc::new(Semaphore::new(permits)),
                metrics: GuardianMetrics::new(),
                logger,
            }),
        }
    }

    /// Replace the channel set from policy, keeping bucket and health of
    /// channels that survive. Channels that fail to build are reported.
    pub async fn set_channels(&self, specs: &[ChannelSpec], now: DateTime<Utc>) -> Vec<GuardianError> {
        let mut errors = Vec::new();
        let mut state = self.inner.state.lock().await;
        let mut next = HashMap::with_capacity(specs.len());

        for spec in specs {
            let notifier = match spec.build() {
                Ok(n) => n,
                Err(e) => {
                    warn!(channel = %spec.name, error = %e, "Skipping channel");
                    errors.push(GuardianError::Policy(format!("channel '{}': {}", spec.name, e)));
                    continue;
                }
            };
            let channel = match state.channels.remove(&spec.name) {
                Some(mut existing) => {
                    existing.kind = notifier.kind();
                    existing.notifier = notifier;
                    existing.bucket.reconfigure(spec.rate_limiting, now);
                    existing
                }
                None => ChannelState::new(&spec.name, notifier, spec.rate_limiting, now),
            };
            self.inner.metrics.set_channel_ready(&spec.name, channel.ready);
            next.insert(spec.name.clone(), channel);
        }

        state.channels = next;
        errors
    }

    /// Add or replace a single channel
    pub async fn register_channel(
        &self,
        name: &str,
        notifier: Arc<dyn Notifier>,
        limits: RateLimitSpec,
        now: DateTime<Utc>,
    ) {
        let mut state = self.inner.state.lock().await;
        state
            .channels
            .insert(name.to_string(), ChannelState::new(name, notifier, limits, now));
        self.inner.metrics.set_channel_ready(name, true);
    }

    pub async fn channel_names(&self) -> Vec<String> {
        let state = self.inner.state.lock().await;
        let mut names: Vec<String> = state.channels.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn channel_statuses(&self, now: DateTime<Utc>) -> Vec<ChannelStatus> {
        let mut state = self.inner.state.lock().await;
        let mut statuses: Vec<ChannelStatus> =
            state.channels.values_mut().map(|c| c.status(now)).collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    /// Apply one signal at its own timestamp
    pub async fn ingest(&self, signal: AlertSignal) {
        let now = signal.timestamp;
        let mut state = self.inner.state.lock().await;
        self.apply_signal(&mut state, signal, now).await;
        self.inner.metrics.set_active_alerts(state.alerts.len());
    }

    /// Apply the signals of one monitor tick, then resolve alerts of that
    /// source for jobs that were evaluated but not re-emitted.
    ///
    /// Jobs missing from `evaluated` (skipped, store errors) keep their alerts.
    pub async fn process_tick(
        &self,
        source: SignalSource,
        evaluated: &HashSet<JobRef>,
        signals: Vec<AlertSignal>,
        now: DateTime<Utc>,
    ) {
        let emitted: HashSet<AlertKey> = signals.iter().map(AlertSignal::key).collect();
        let mut state = self.inner.state.lock().await;

        for signal in signals {
            self.apply_signal(&mut state, signal, now).await;
        }

        let types = source.alert_types();
        let cleared: Vec<AlertKey> = state
            .alerts
            .keys()
            .filter(|k| types.contains(&k.alert_type))
            .filter(|k| evaluated.contains(&k.job) && !emitted.contains(k))
            .cloned()
            .collect();
        for key in cleared {
            self.resolve_key(&mut state, &key, now).await;
        }

        self.inner.metrics.set_active_alerts(state.alerts.len());
    }

    /// Resolve the given alert types for a job, e.g. after it succeeded
    pub async fn resolve_for_job(&self, job: &JobRef, types: &[AlertType], now: DateTime<Utc>) {
        let mut state = self.inner.state.lock().await;
        for alert_type in types {
            let key = AlertKey::new(job.clone(), *alert_type);
            self.resolve_key(&mut state, &key, now).await;
        }
        self.inner.metrics.set_active_alerts(state.alerts.len());
    }

    /// Fire pending alerts whose delay expired and release suppressed ones
    /// whose window closed
    pub async fn evaluate_due(&self, now: DateTime<Utc>) {
        let mut state = self.inner.state.lock().await;
        let due: Vec<AlertKey> = state
            .alerts
            .values()
            .filter(|a| match a.state {
                AlertState::Pending => a.fire_at <= now,
                AlertState::Suppressed => true,
                _ => false,
            })
            .map(ActiveAlert::key)
            .collect();

        for key in due {
            self.evaluate_key(&mut state, &key, now).await;
        }
    }

    /// Timer callback; acts only if the alert it was armed for is still pending
    async fn fire_pending(&self, key: AlertKey, alert_id: String) {
        let mut state = self.inner.state.lock().await;
        state.timers.remove(&key);

        let fire_at = match state.alerts.get(&key) {
            Some(alert) if alert.id == alert_id && alert.state == AlertState::Pending => alert.fire_at,
            _ => return,
        };
        let now = Utc::now().max(fire_at);
        self.evaluate_key(&mut state, &key, now).await;
    }

    async fn apply_signal(&self, state: &mut DispatcherState, signal: AlertSignal, now: DateTime<Utc>) {
        self.inner.metrics.inc_signals(signal.alert_type);

        let Some(policy) = self.inner.registry.monitor(&signal.monitor) else {
            debug!(monitor = %signal.monitor, job = %signal.job, "Dropping signal for unknown monitor");
            return;
        };
        let alerting = &policy.spec.alerting;
        if !alerting.enabled {
            return;
        }

        let key = signal.key();
        let severity = alerting
            .severity_overrides
            .get(&signal.alert_type)
            .copied()
            .unwrap_or(signal.severity);
        let window = policy.suppressing_window(now);

        let Some(alert) = state.alerts.get_mut(&key) else {
            let mut alert = ActiveAlert::from_signal(&signal, now + chrono_duration(alerting.alert_delay));
            alert.severity = severity;
            alert.since = now;
            alert.last_signal_at = now;
            let fire_at = alert.fire_at;
            let alert_id = alert.id.clone();
            state.alerts.insert(key.clone(), alert);

            if let Some(window) = window {
                self.suppress(state, &key, &window.name).await;
            } else if fire_at <= now {
                self.fire(state, &policy, &key, now).await;
            } else {
                self.inner
                    .logger
                    .log_alert_pending(&key, severity, alerting.alert_delay.as_secs());
                self.arm_timer(state, key.clone(), alert_id, fire_at, now);
                self.persist(state, &key).await;
            }
            return;
        };

        alert.last_signal_at = now;
        alert.severity = severity;
        alert.context = signal.context;

        let current = alert.state;
        match current {
            AlertState::Pending => {
                if let Some(window) = window {
                    self.suppress(state, &key, &window.name).await;
                }
            }
            AlertState::Suppressed => {
                if let Some(window) = window {
                    alert.suppressed_by = Some(window.name);
                } else {
                    self.evaluate_key(state, &key, now).await;
                }
            }
            AlertState::Firing => {
                let renotify = window.is_none()
                    && alert.last_notified.map_or(true, |at| {
                        now >= at + chrono_duration(alerting.suppress_duplicates_for)
                    });
                if renotify {
                    self.notify_firing(state, &policy, &key, now).await;
                } else {
                    debug!(alert = %key, "Duplicate signal");
                }
            }
            AlertState::Resolved => {}
        }
    }

    /// Re-check a pending or suppressed alert against its window and delay
    async fn evaluate_key(&self, state: &mut DispatcherState, key: &AlertKey, now: DateTime<Utc>) {
        let Some(alert) = state.alerts.get(key) else {
            return;
        };
        let (alert_state, fire_at, alert_id) = (alert.state, alert.fire_at, alert.id.clone());
        if !matches!(alert_state, AlertState::Pending | AlertState::Suppressed) {
            return;
        }
        let Some(policy) = self.inner.registry.monitor(&alert.monitor) else {
            return;
        };

        if let Some(window) = policy.suppressing_window(now) {
            if alert_state == AlertState::Pending {
                self.suppress(state, key, &window.name).await;
            }
            return;
        }

        if fire_at <= now {
            self.fire(state, &policy, key, now).await;
        } else if alert_state == AlertState::Suppressed {
            if let Some(alert) = state.alerts.get_mut(key) {
                alert.state = AlertState::Pending;
                alert.suppressed_by = None;
            }
            self.arm_timer(state, key.clone(), alert_id, fire_at, now);
            self.persist(state, key).await;
        }
    }

    async fn suppress(&self, state: &mut DispatcherState, key: &AlertKey, window: &str) {
        state.cancel_timer(key);
        if let Some(alert) = state.alerts.get_mut(key) {
            alert.state = AlertState::Suppressed;
            alert.suppressed_by = Some(window.to_string());
        }
        self.inner.metrics.inc_suppressed(key.alert_type);
        self.inner.logger.log_alert_suppressed(key, window);
        self.persist(state, key).await;
    }

    async fn fire(
        &self,
        state: &mut DispatcherState,
        policy: &MonitorPolicy,
        key: &AlertKey,
        now: DateTime<Utc>,
    ) {
        state.cancel_timer(key);
        if let Some(alert) = state.alerts.get_mut(key) {
            alert.state = AlertState::Firing;
            alert.suppressed_by = None;
            if alert.alert_type == AlertType::JobFailed {
                alert.suggestion = alert
                    .context
                    .failure
                    .as_ref()
                    .and_then(|ctx| policy.patterns.suggest(ctx));
            }
        }
        self.notify_firing(state, policy, key, now).await;
    }

    async fn notify_firing(
        &self,
        state: &mut DispatcherState,
        policy: &MonitorPolicy,
        key: &AlertKey,
        now: DateTime<Utc>,
    ) {
        let DispatcherState {
            alerts, channels, ..
        } = state;
        let Some(alert) = alerts.get_mut(key) else {
            return;
        };
        let deliveries = self.route(channels, policy, alert, NotificationKind::Firing, now);
        alert.last_notified = Some(now);
        self.inner
            .logger
            .log_alert_firing(key, alert.severity, deliveries.len());
        for delivery in deliveries {
            self.spawn_delivery(key.clone(), alert.id.clone(), delivery);
        }
        self.persist(state, key).await;
    }

    async fn resolve_key(&self, state: &mut DispatcherState, key: &AlertKey, now: DateTime<Utc>) {
        state.cancel_timer(key);
        let Some(mut alert) = state.alerts.remove(key) else {
            return;
        };
        let was_firing = alert.state == AlertState::Firing;
        alert.state = AlertState::Resolved;
        alert.resolved_at = Some(now);

        if was_firing {
            if let Some(policy) = self.inner.registry.monitor(&alert.monitor) {
                if policy.spec.alerting.notify_on_resolve {
                    let deliveries =
                        self.route(&mut state.channels, &policy, &mut alert, NotificationKind::Resolved, now);
                    for delivery in deliveries {
                        self.spawn_delivery(key.clone(), alert.id.clone(), delivery);
                    }
                }
            }
        }

        self.inner.logger.log_alert_resolved(key, was_firing);
        if let Err(e) = self.inner.store.archive_alert(&alert).await {
            self.store_failed("archive_alert", key, &e);
        }
    }

    /// Pick channels for an alert and take rate-limit tokens. Outcomes that
    /// never leave the process are logged on the alert right away.
    fn route(
        &self,
        channels: &mut HashMap<String, ChannelState>,
        policy: &MonitorPolicy,
        alert: &mut ActiveAlert,
        kind: NotificationKind,
        now: DateTime<Utc>,
    ) -> Vec<Delivery> {
        let mut deliveries = Vec::new();

        for channel_ref in &policy.spec.alerting.channel_refs {
            if !channel_ref.accepts(alert.severity) {
                continue;
            }
            let Some(channel) = channels.get_mut(&channel_ref.name) else {
                warn!(channel = %channel_ref.name, alert = %alert.key(), "Channel not configured");
                continue;
            };

            let admission = channel.admit(now, self.inner.config.recovery_probe_interval);
            if admission == Admission::NotReady {
                alert.record_delivery(DeliveryRecord {
                    channel: channel.name.clone(),
                    at: now,
                    kind,
                    outcome: DeliveryOutcome::ChannelNotReady,
                    attempts: 0,
                });
                continue;
            }

            if !channel.bucket.try_acquire(now) {
                if admission == Admission::Probe {
                    channel.release_probe();
                }
                self.inner.metrics.inc_rate_limited(&channel.name);
                debug!(channel = %channel.name, alert = %alert.key(), "Rate limited");
                alert.record_delivery(DeliveryRecord {
                    channel: channel.name.clone(),
                    at: now,
                    kind,
                    outcome: DeliveryOutcome::RateLimited,
                    attempts: 0,
                });
                continue;
            }

            let max_attempts = match admission {
                Admission::Probe => 1,
                _ => self.inner.config.max_attempts.max(1),
            };
            deliveries.push(Delivery {
                channel: channel.name.clone(),
                notifier: Arc::clone(&channel.notifier),
                notification: alert.notification(kind, now),
                max_attempts,
            });
        }

        deliveries
    }

    fn spawn_delivery(&self, key: AlertKey, alert_id: String, delivery: Delivery) {
        let dispatcher = self.clone();
        let semaphore = Arc::clone(&self.inner.semaphore);
        let config = self.inner.config.clone();

        let mut set = self
            .inner
            .deliveries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while set.try_join_next().is_some() {}
        set.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };
            let (result, attempts) = send_with_retry(
                delivery.notifier.as_ref(),
                &delivery.notification,
                delivery.max_attempts,
                config.initial_backoff,
                config.attempt_timeout,
            )
            .await;
            dispatcher
                .complete_delivery(&delivery.channel, &key, &alert_id, delivery.notification.kind, result, attempts)
                .await;
        });
    }

    async fn complete_delivery(
        &self,
        channel: &str,
        key: &AlertKey,
        alert_id: &str,
        kind: NotificationKind,
        result: Result<(), ChannelError>,
        attempts: u32,
    ) {
        let now = Utc::now();
        let error = result.as_ref().err().map(ToString::to_string);
        self.inner
            .logger
            .log_delivery(channel, key, error.is_none(), attempts, error.as_deref());

        let mut state = self.inner.state.lock().await;
        if let Some(ch) = state.channels.get_mut(channel) {
            match &error {
                None => {
                    self.inner.metrics.inc_sent(channel);
                    if ch.record_success() {
                        self.inner.metrics.set_channel_ready(channel, true);
                        self.inner.logger.log_channel_readiness(channel, true, 0);
                    }
                }
                Some(e) => {
                    self.inner.metrics.inc_failed(channel);
                    if ch.record_failure(e.clone(), now, self.inner.config.failure_threshold) {
                        self.inner.metrics.set_channel_ready(channel, false);
                        self.inner
                            .logger
                            .log_channel_readiness(channel, false, ch.consecutive_failures);
                    }
                }
            }
        }

        let Some(alert) = state.alerts.get_mut(key).filter(|a| a.id == alert_id) else {
            return;
        };
        alert.record_delivery(DeliveryRecord {
            channel: channel.to_string(),
            at: now,
            kind,
            outcome: match error {
                None => DeliveryOutcome::Delivered,
                Some(error) => DeliveryOutcome::Failed { error },
            },
            attempts,
        });
        self.persist(&mut state, key).await;
    }

    /// Wait for every in-flight delivery
    pub async fn flush(&self) {
        loop {
            let mut set = std::mem::take(
                &mut *self
                    .inner
                    .deliveries
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner),
            );
            if set.is_empty() {
                return;
            }
            while set.join_next().await.is_some() {}
        }
    }

    /// Send a test notification straight to a channel, bypassing dedup,
    /// delay and rate limiting. Success restores a not-ready channel.
    pub async fn test_channel(&self, name: &str, now: DateTime<Utc>) -> ChannelTestResult {
        let notifier = {
            let state = self.inner.state.lock().await;
            match state.channels.get(name) {
                Some(channel) => Arc::clone(&channel.notifier),
                None => {
                    return ChannelTestResult {
                        success: false,
                        message: GuardianError::NotFound {
                            kind: "channel",
                            name: name.to_string(),
                        }
                        .to_string(),
                    }
                }
            }
        };

        let notification = AlertNotification::test(name, now);
        let timeout = self.inner.config.attempt_timeout;
        let result = match tokio::time::timeout(timeout, notifier.send(&notification)).await {
            Ok(r) => r,
            Err(_) => Err(ChannelError::Timeout(timeout)),
        };

        let mut state = self.inner.state.lock().await;
        let channel = state.channels.get_mut(name);
        match result {
            Ok(()) => {
                if channel.map_or(false, |c| c.record_success()) {
                    self.inner.metrics.set_channel_ready(name, true);
                    self.inner.logger.log_channel_readiness(name, true, 0);
                }
                ChannelTestResult {
                    success: true,
                    message: format!("Test notification sent to '{}'", name),
                }
            }
            Err(e) => {
                if let Some(channel) = channel {
                    channel.last_error = Some(e.to_string());
                }
                ChannelTestResult {
                    success: false,
                    message: GuardianError::ChannelDeliveryFailed {
                        channel: name.to_string(),
                        reason: e.to_string(),
                    }
                    .to_string(),
                }
            }
        }
    }

    /// Rebuild in-memory alerts from the store after gaining leadership
    pub async fn restore_from_store(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let stored = self.inner.store.list_active_alerts().await?;
        let mut state = self.inner.state.lock().await;
        state.cancel_all_timers();
        state.alerts.clear();

        for alert in stored {
            if alert.state == AlertState::Resolved {
                continue;
            }
            let key = alert.key();
            if alert.state == AlertState::Pending {
                self.arm_timer(&mut state, key.clone(), alert.id.clone(), alert.fire_at, now);
            }
            state.alerts.insert(key, alert);
        }

        let restored = state.alerts.len();
        self.inner.metrics.set_active_alerts(restored);
        Ok(restored)
    }

    /// Drop all alert state, e.g. after losing leadership
    pub async fn clear(&self) {
        let mut state = self.inner.state.lock().await;
        state.cancel_all_timers();
        state.alerts.clear();
        self.inner.metrics.set_active_alerts(0);
    }

    pub async fn active_alert(&self, key: &AlertKey) -> Option<ActiveAlert> {
        self.inner.state.lock().await.alerts.get(key).cloned()
    }

    /// Live alerts matching `filter`, oldest onset first
    pub async fn list_active_alerts(&self, filter: &AlertFilter) -> Vec<ActiveAlert> {
        let state = self.inner.state.lock().await;
        let mut alerts: Vec<ActiveAlert> = state
            .alerts
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        alerts.sort_by(|a, b| a.since.cmp(&b.since).then_with(|| a.key().cmp(&b.key())));
        alerts
    }

    pub async fn get_alert_history(
        &self,
        filter: &AlertFilter,
        page: Pagination,
    ) -> Result<Page<ActiveAlert>, StoreError> {
        self.inner.store.list_alert_history(filter, page).await
    }

    fn arm_timer(
        &self,
        state: &mut DispatcherState,
        key: AlertKey,
        alert_id: String,
        fire_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) {
        let wait = (fire_at - now).to_std().unwrap_or(Duration::ZERO);
        let dispatcher = self.clone();
        let timer_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            dispatcher.fire_pending(timer_key, alert_id).await;
        });
        if let Some(previous) = state.timers.insert(key, handle) {
            previous.abort();
        }
    }

    async fn persist(&self, state: &mut DispatcherState, key: &AlertKey) {
        let Some(alert) = state.alerts.get(key) else {
            return;
        };
        if let Err(e) = self.inner.store.record_alert(alert).await {
            self.store_failed("record_alert", key, &e);
        }
    }

    fn store_failed(&self, operation: &str, key: &AlertKey, error: &StoreError) {
        self.inner.metrics.inc_store_errors();
        warn!(operation = operation, alert = %key, error = %error, "Alert store write failed");
    }
}

/// Send with bounded retries and exponential backoff; returns the last
/// result and how many attempts were made
async fn send_with_retry(
    notifier: &dyn Notifier,
    notification: &AlertNotification,
    max_attempts: u32,
    initial_backoff: Duration,
    attempt_timeout: Duration,
) -> (Result<(), ChannelError>, u32) {
    let mut backoff = initial_backoff;
    let mut attempt = 0;

    loop {
        attempt += 1;
        let result = match tokio::time::timeout(attempt_timeout, notifier.send(notification)).await {
            Ok(r) => r,
            Err(_) => Err(ChannelError::Timeout(attempt_timeout)),
        };

        match result {
            Ok(()) => return (Ok(()), attempt),
            Err(e) if attempt >= max_attempts => return (Err(e), attempt),
            Err(e) => {
                debug!(attempt = attempt, error = %e, backoff_ms = backoff.as_millis() as u64, "Retrying delivery");
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
        }
    }
}
