//! Monitoring engine
//!
//! Wires the registry, the monitors and the dispatcher together and runs the
//! tick loops. Ticks only run on the leader; a [`Leadership`] token obtained
//! from [`Engine::acquire_leadership`] is required to run one.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::alerting::{
    ActiveAlert, AlertKey, AlertSignal, AlertType, ChannelTestResult, Dispatcher, DispatcherConfig,
    SignalContext, SignalSource,
};
use crate::error::{GuardianError, StoreError};
use crate::health::{components, ComponentHealth, HealthRegistry};
use crate::leader::LeaderSignal;
use crate::matcher::{self, PatternTestResult};
use crate::models::{chrono_duration, ExecutionRecord, FailureContext, JobRef};
use crate::monitor::{DeadManSwitchMonitor, SlaAnalyzer, SlaSnapshot, TickOutcome};
use crate::observability::{GuardianMetrics, StructuredLogger};
use crate::policy::{PatternSpec, PolicyFile};
use crate::registry::WatchRegistry;
use crate::store::{AlertFilter, ExecutionStore, Page, Pagination};

/// Engine timing and delivery settings
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Name of this replica in logs
    pub identity: String,
    pub dead_man_interval: Duration,
    pub sla_interval: Duration,
    /// How far back a new leader reads executions to rebuild job state
    pub state_lookback: Duration,
    pub dispatcher: DispatcherConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            identity: "cronjob-guardian".to_string(),
            dead_man_interval: Duration::from_secs(60),
            sla_interval: Duration::from_secs(300),
            state_lookback: Duration::from_secs(30 * 24 * 3600),
            dispatcher: DispatcherConfig::default(),
        }
    }
}

/// Proof that this replica leads for the current tick
#[derive(Debug)]
pub struct Leadership {
    _private: (),
}

#[derive(Debug, Clone, Copy)]
enum TickKind {
    DeadMan,
    Sla,
}

pub struct Engine {
    config: EngineConfig,
    registry: Arc<WatchRegistry>,
    store: Arc<dyn ExecutionStore>,
    dispatcher: Dispatcher,
    dead_man: DeadManSwitchMonitor,
    sla: SlaAnalyzer,
    leader: Arc<dyn LeaderSignal>,
    /// Leadership as of the last transition; also serializes transitions
    leading: Mutex<bool>,
    health: HealthRegistry,
    metrics: GuardianMetrics,
    logger: StructuredLogger,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        registry: Arc<WatchRegistry>,
        store: Arc<dyn ExecutionStore>,
        leader: Arc<dyn LeaderSignal>,
        health: HealthRegistry,
    ) -> Self {
        let logger = StructuredLogger::new(&config.identity);
        let dispatcher = Dispatcher::new(
            config.dispatcher.clone(),
            Arc::clone(&registry),
            Arc::clone(&store),
            logger.clone(),
        );
        let dead_man = DeadManSwitchMonitor::new(Arc::clone(&registry), logger.clone());
        let sla = SlaAnalyzer::new(Arc::clone(&registry), Arc::clone(&store), logger.clone());

        Self {
            config,
            registry,
            store,
            dispatcher,
            dead_man,
            sla,
            leader,
            leading: Mutex::new(false),
            health,
            metrics: GuardianMetrics::new(),
            logger,
        }
    }

    pub fn registry(&self) -> &Arc<WatchRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    pub async fn register_components(&self) {
        for component in [
            components::DEAD_MAN_SWITCH,
            components::SLA_ANALYZER,
            components::DISPATCHER,
            components::STORE,
        ] {
            self.health.register(component).await;
        }
    }

    /// Load monitors, jobs and channels. Problems are returned and logged;
    /// everything that compiled is active.
    pub async fn load_policy(&self, policy: &PolicyFile, now: DateTime<Utc>) -> Vec<GuardianError> {
        let mut errors = self.registry.load_policy(policy, now);
        errors.extend(self.dispatcher.set_channels(&policy.channels, now).await);

        let invalid_patterns = errors
            .iter()
            .filter(|e| matches!(e, GuardianError::InvalidPattern { .. }))
            .count();
        if invalid_patterns > 0 {
            self.metrics.inc_invalid_patterns(invalid_patterns);
        }
        for error in &errors {
            if matches!(
                error,
                GuardianError::InvalidSchedule { .. } | GuardianError::InvalidTimezone(_)
            ) {
                self.metrics.inc_invalid_schedules();
            }
            warn!(error = %error, "Policy problem");
        }

        for name in self.dispatcher.channel_names().await {
            self.health.register(&components::channel(&name)).await;
        }
        errors
    }

    /// Apply the leader signal. On gaining leadership job and alert state is
    /// rebuilt from the store; on losing it alert state is dropped.
    pub async fn acquire_leadership(&self, now: DateTime<Utc>) -> Option<Leadership> {
        let is_leader = self.leader.is_leader();
        let mut leading = self.leading.lock().await;

        match (*leading, is_leader) {
            (false, true) => match self.take_over(now).await {
                Ok((restored, rederived)) => {
                    *leading = true;
                    self.logger.log_leadership(true, restored, rederived);
                    self.health.set_leader(true).await;
                    self.health.set_healthy(components::DISPATCHER).await;
                    self.health.set_healthy(components::STORE).await;
                }
                Err(e) => {
                    // Stay standby until state can be rebuilt
                    self.store_unavailable(&e).await;
                    self.health
                        .set_degraded(components::DISPATCHER, "waiting to rebuild state from the store")
                        .await;
                }
            },
            (true, false) => {
                *leading = false;
                self.dispatcher.clear().await;
                self.logger.log_leadership(false, 0, 0);
                self.health.set_leader(false).await;
            }
            _ => {}
        }

        (*leading).then_some(Leadership { _private: () })
    }

    pub async fn is_leading(&self) -> bool {
        *self.leading.lock().await
    }

    pub async fn run_dead_man_tick(&self, _leader: &Leadership, now: DateTime<Utc>) -> TickOutcome {
        let outcome = self.dead_man.tick(now);
        self.report(components::DEAD_MAN_SWITCH, &outcome).await;
        self.dispatcher
            .process_tick(
                SignalSource::DeadManSwitch,
                &outcome.evaluated,
                outcome.signals.clone(),
                now,
            )
            .await;
        self.dispatcher.evaluate_due(now).await;
        self.sync_channel_health(now).await;
        outcome
    }

    pub async fn run_sla_tick(&self, _leader: &Leadership, now: DateTime<Utc>) -> TickOutcome {
        let outcome = self.sla.tick(now).await;
        self.report(components::SLA_ANALYZER, &outcome).await;
        if outcome.store_errors > 0 {
            self.health
                .set_degraded(
                    components::STORE,
                    format!("{} execution queries failed", outcome.store_errors),
                )
                .await;
        } else {
            self.health.set_healthy(components::STORE).await;
        }
        self.dispatcher
            .process_tick(
                SignalSource::SlaAnalyzer,
                &outcome.evaluated,
                outcome.signals.clone(),
                now,
            )
            .await;
        self.dispatcher.evaluate_due(now).await;
        outcome
    }

    /// Fold a finished run into job state; failures raise `JobFailed`,
    /// successes resolve `JobFailed` and `DeadManTriggered`
    pub async fn observe_execution(&self, record: &ExecutionRecord) {
        if self.registry.record_execution(record).is_none() {
            debug!(job = %record.job, "Execution for unwatched job");
            return;
        }
        if !self.is_leading().await {
            return;
        }

        let finished = record.finished_at();
        if record.is_success() {
            self.dispatcher
                .resolve_for_job(
                    &record.job,
                    &[AlertType::JobFailed, AlertType::DeadManTriggered],
                    finished,
                )
                .await;
            return;
        }

        self.raise_job_failed(record).await;
    }

    async fn raise_job_failed(&self, record: &ExecutionRecord) -> bool {
        let Some(state) = self.registry.job(&record.job) else {
            return false;
        };
        let Some(policy) = self.registry.monitor(&state.monitor) else {
            return false;
        };
        let failure = record.failure_context();
        self.dispatcher
            .ingest(AlertSignal {
                alert_type: AlertType::JobFailed,
                severity: policy.spec.severity_for(AlertType::JobFailed),
                job: record.job.clone(),
                monitor: state.monitor,
                context: SignalContext {
                    message: failure_message(record, &failure),
                    failure: Some(failure),
                },
                timestamp: record.finished_at(),
            })
            .await;
        true
    }

    /// Rebuild job liveness from stored executions, then alerts, then raise
    /// `JobFailed` for jobs whose latest run failed without an open alert.
    /// Any store error aborts before a signal is emitted.
    async fn take_over(&self, now: DateTime<Utc>) -> Result<(usize, usize), StoreError> {
        let since = now - chrono_duration(self.config.state_lookback);
        let mut latest = Vec::new();
        for job in self.registry.jobs() {
            let runs = self.store.query_executions(&job.job, since, now).await?;
            for run in &runs {
                self.registry.record_execution(run);
            }
            if let Some(last) = runs.into_iter().max_by_key(|r| r.finished_at()) {
                latest.push(last);
            }
        }

        let restored = self.dispatcher.restore_from_store(now).await?;

        let mut rederived = 0;
        for record in latest.iter().filter(|r| !r.is_success()) {
            let failing = self
                .registry
                .job(&record.job)
                .is_some_and(|state| state.is_failing() && state.last_failure_time == Some(record.finished_at()));
            let key = AlertKey::new(record.job.clone(), AlertType::JobFailed);
            if !failing || self.dispatcher.active_alert(&key).await.is_some() {
                continue;
            }
            if self.raise_job_failed(record).await {
                rederived += 1;
            }
        }
        Ok((restored, rederived))
    }

    pub async fn list_active_alerts(&self, filter: &AlertFilter) -> Vec<ActiveAlert> {
        self.dispatcher.list_active_alerts(filter).await
    }

    pub async fn get_alert_history(
        &self,
        filter: &AlertFilter,
        page: Pagination,
    ) -> Result<Page<ActiveAlert>, StoreError> {
        self.dispatcher.get_alert_history(filter, page).await
    }

    pub fn get_sla_snapshot(&self, job: &JobRef) -> Option<SlaSnapshot> {
        self.sla.snapshot(job)
    }

    pub async fn test_channel(&self, name: &str) -> ChannelTestResult {
        let now = Utc::now();
        let result = self.dispatcher.test_channel(name, now).await;
        self.sync_channel_health(now).await;
        result
    }

    pub fn test_pattern(&self, pattern: &PatternSpec, sample: &FailureContext) -> PatternTestResult {
        matcher::test_pattern(pattern, sample)
    }

    /// Run both tick loops until `shutdown` fires
    pub async fn run(self: Arc<Self>, shutdown: broadcast::Sender<()>) {
        info!(
            dead_man_secs = self.config.dead_man_interval.as_secs(),
            sla_secs = self.config.sla_interval.as_secs(),
            "Starting monitor loops"
        );

        let dead_man = tokio::spawn(Arc::clone(&self).tick_loop(TickKind::DeadMan, shutdown.subscribe()));
        let sla = tokio::spawn(Arc::clone(&self).tick_loop(TickKind::Sla, shutdown.subscribe()));

        for (name, handle) in [("dead_man", dead_man), ("sla", sla)] {
            if let Err(e) = handle.await {
                warn!(tick_loop = name, error = %e, "Tick loop ended abnormally");
            }
        }
        self.dispatcher.flush().await;
    }

    async fn tick_loop(self: Arc<Self>, kind: TickKind, mut shutdown: broadcast::Receiver<()>) {
        let period = match kind {
            TickKind::DeadMan => self.config.dead_man_interval,
            TickKind::Sla => self.config.sla_interval,
        };
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = Utc::now();
                    let Some(leader) = self.acquire_leadership(now).await else {
                        continue;
                    };
                    let outcome = match kind {
                        TickKind::DeadMan => self.run_dead_man_tick(&leader, now).await,
                        TickKind::Sla => self.run_sla_tick(&leader, now).await,
                    };
                    debug!(
                        tick = ?kind,
                        evaluated = outcome.evaluated.len(),
                        signals = outcome.signals.len(),
                        skipped = outcome.skipped,
                        "Tick complete"
                    );
                }
                _ = shutdown.recv() => {
                    info!(tick = ?kind, "Stopping tick loop");
                    break;
                }
            }
        }
    }

    async fn report(&self, component: &str, outcome: &TickOutcome) {
        if outcome.skipped == 0 {
            self.health.set_healthy(component).await;
        } else {
            self.health
                .set_degraded(component, format!("{} jobs skipped", outcome.skipped))
                .await;
        }
    }

    async fn sync_channel_health(&self, now: DateTime<Utc>) {
        for status in self.dispatcher.channel_statuses(now).await {
            let health = if status.ready {
                ComponentHealth::healthy()
            } else {
                ComponentHealth::degraded(
                    status
                        .last_error
                        .unwrap_or_else(|| "channel not ready".to_string()),
                )
            };
            self.health
                .update(&components::channel(&status.name), health)
                .await;
        }
    }

    async fn store_unavailable(&self, error: &StoreError) {
        self.metrics.inc_store_errors();
        warn!(error = %error, "Could not restore alert state");
        self.health
            .set_degraded(components::STORE, error.to_string())
            .await;
    }
}

fn failure_message(record: &ExecutionRecord, failure: &FailureContext) -> String {
    let mut message = format!("{} run {} failed", record.job, record.job_run);
    if let Some(code) = failure.exit_code {
        message.push_str(&format!(" with exit code {}", code));
    }
    if let Some(reason) = &failure.reason {
        message.push_str(&format!(" ({})", reason));
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::{AlertState, Severity};
    use crate::channels::testing::RecordingNotifier;
    use crate::channels::RateLimitSpec;
    use crate::leader::LeaderFlag;
    use crate::models::{ExecutionStatus, JobObservation, MonitorRef};
    use crate::policy::{
        AlertingConfig, ChannelRef, DeadManSwitchConfig, MonitorSpec, PatternMatch, SlaConfig,
    };
    use crate::store::MemoryStore;
    use chrono::{Duration as ChronoDuration, TimeZone};

    struct Harness {
        engine: Arc<Engine>,
        store: Arc<MemoryStore>,
        flag: LeaderFlag,
        notifier: Arc<RecordingNotifier>,
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap()
    }

    fn etl() -> JobRef {
        JobRef::new("batch", "etl")
    }

    async fn harness(leader: bool) -> Harness {
        let registry = Arc::new(WatchRegistry::new());
        registry.upsert_monitor(MonitorSpec {
            namespace: "batch".to_string(),
            name: "m".to_string(),
            selector: Default::default(),
            dead_man_switch: Some(DeadManSwitchConfig {
                enabled: true,
                auto_from_schedule: None,
                max_time_since_last_success: Some(Duration::from_secs(3600)),
            }),
            sla: Some(SlaConfig::default()),
            alerting: AlertingConfig {
                channel_refs: vec![ChannelRef {
                    name: "ops".to_string(),
                    severities: vec![],
                }],
                ..Default::default()
            },
        });
        registry.observe_job(
            JobObservation {
                job: etl(),
                monitor: MonitorRef::new("batch", "m"),
                schedule: "0 * * * *".to_string(),
                timezone: None,
                suspended: false,
                last_schedule_time: None,
            },
            t0(),
        );

        let store = Arc::new(MemoryStore::new());
        let flag = LeaderFlag::new(leader);
        let engine = Arc::new(Engine::new(
            EngineConfig {
                identity: "test".to_string(),
                dead_man_interval: Duration::from_millis(10),
                sla_interval: Duration::from_millis(10),
                ..Default::default()
            },
            registry,
            store.clone(),
            Arc::new(flag.clone()),
            HealthRegistry::new(),
        ));
        engine.register_components().await;

        let notifier = Arc::new(RecordingNotifier::default());
        engine
            .dispatcher()
            .register_channel("ops", notifier.clone(), RateLimitSpec::default(), t0())
            .await;

        Harness {
            engine,
            store,
            flag,
            notifier,
        }
    }

    fn execution(status: ExecutionStatus, at: DateTime<Utc>) -> ExecutionRecord {
        ExecutionRecord {
            job: etl(),
            job_run: format!("etl-{}", at.timestamp()),
            status,
            start_time: at - ChronoDuration::minutes(1),
            completion_time: Some(at),
            duration_secs: None,
            exit_code: Some(if status == ExecutionStatus::Success { 0 } else { 137 }),
            reason: (status == ExecutionStatus::Failed).then(|| "OOMKilled".to_string()),
            logs: None,
            events: vec![],
        }
    }

    #[tokio::test]
    async fn test_standby_does_not_alert() {
        let h = harness(false).await;
        assert!(h.engine.acquire_leadership(t0()).await.is_none());

        h.engine
            .observe_execution(&execution(ExecutionStatus::Failed, t0()))
            .await;
        assert!(h.engine.list_active_alerts(&AlertFilter::default()).await.is_empty());
        // Job state is still tracked
        let state = h.engine.registry().job(&etl()).unwrap();
        assert_eq!(state.last_failure_time, Some(t0()));
    }

    #[tokio::test]
    async fn test_failure_then_success_resolves() {
        let h = harness(true).await;
        assert!(h.engine.acquire_leadership(t0()).await.is_some());

        h.engine
            .observe_execution(&execution(ExecutionStatus::Failed, t0()))
            .await;
        h.engine.dispatcher().flush().await;

        let alerts = h.engine.list_active_alerts(&AlertFilter::default()).await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::JobFailed);
        assert_eq!(alerts[0].severity, Severity::Critical);
        assert_eq!(alerts[0].suggestion.as_ref().map(|s| s.pattern.as_str()), Some("oom-killed"));
        assert!(alerts[0].context.message.contains("exit code 137 (OOMKilled)"));

        h.engine
            .observe_execution(&execution(ExecutionStatus::Success, t0() + ChronoDuration::minutes(30)))
            .await;
        h.engine.dispatcher().flush().await;

        assert!(h.engine.list_active_alerts(&AlertFilter::default()).await.is_empty());
        let history = h
            .engine
            .get_alert_history(&AlertFilter::default(), Pagination::default())
            .await
            .unwrap();
        assert_eq!(history.total, 1);
        let kinds: Vec<_> = h.notifier.sent().iter().map(|n| n.kind).collect();
        assert_eq!(
            kinds,
            vec![crate::channels::NotificationKind::Firing, crate::channels::NotificationKind::Resolved]
        );
    }

    #[tokio::test]
    async fn test_dead_man_tick_end_to_end() {
        let h = harness(true).await;
        let now = t0() + ChronoDuration::hours(2);
        let leader = h.engine.acquire_leadership(now).await.unwrap();

        let outcome = h.engine.run_dead_man_tick(&leader, now).await;
        assert_eq!(outcome.signals.len(), 1);
        h.engine.dispatcher().flush().await;

        let alerts = h.engine.list_active_alerts(&AlertFilter::default()).await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::DeadManTriggered);
        assert_eq!(alerts[0].state, AlertState::Firing);

        h.engine
            .observe_execution(&execution(ExecutionStatus::Success, now + ChronoDuration::minutes(1)))
            .await;
        assert!(h.engine.list_active_alerts(&AlertFilter::default()).await.is_empty());

        // Next tick sees a fresh success and stays quiet
        let outcome = h
            .engine
            .run_dead_man_tick(&leader, now + ChronoDuration::minutes(2))
            .await;
        assert!(outcome.signals.is_empty());
    }

    #[tokio::test]
    async fn test_failover_drops_and_restores_alerts() {
        let h = harness(true).await;
        h.engine.acquire_leadership(t0()).await.unwrap();
        h.engine
            .observe_execution(&execution(ExecutionStatus::Failed, t0()))
            .await;
        h.engine.dispatcher().flush().await;
        assert_eq!(h.engine.list_active_alerts(&AlertFilter::default()).await.len(), 1);

        h.flag.set(false);
        assert!(h.engine.acquire_leadership(t0()).await.is_none());
        assert!(h.engine.list_active_alerts(&AlertFilter::default()).await.is_empty());
        assert!(!h.engine.health().health().await.leader);

        h.flag.set(true);
        assert!(h.engine.acquire_leadership(t0()).await.is_some());
        assert_eq!(h.engine.list_active_alerts(&AlertFilter::default()).await.len(), 1);
    }

    #[tokio::test]
    async fn test_new_leader_measures_deadline_from_stored_success() {
        let h = harness(true).await;
        let last_success = t0() - ChronoDuration::hours(3);
        h.store
            .add_execution(execution(ExecutionStatus::Success, last_success))
            .await;

        let now = t0() + ChronoDuration::minutes(5);
        let leader = h.engine.acquire_leadership(now).await.unwrap();
        let state = h.engine.registry().job(&etl()).unwrap();
        assert_eq!(state.last_success_time, Some(last_success));

        let outcome = h.engine.run_dead_man_tick(&leader, now).await;
        assert_eq!(outcome.signals.len(), 1);
        assert_eq!(outcome.signals[0].alert_type, AlertType::DeadManTriggered);
    }

    #[tokio::test]
    async fn test_failure_seen_on_standby_alerts_after_takeover() {
        let h = harness(false).await;
        assert!(h.engine.acquire_leadership(t0()).await.is_none());

        let failed = execution(ExecutionStatus::Failed, t0());
        h.store.add_execution(failed.clone()).await;
        h.engine.observe_execution(&failed).await;
        assert!(h.engine.list_active_alerts(&AlertFilter::default()).await.is_empty());

        h.flag.set(true);
        let now = t0() + ChronoDuration::minutes(2);
        assert!(h.engine.acquire_leadership(now).await.is_some());
        h.engine.dispatcher().flush().await;

        let alerts = h.engine.list_active_alerts(&AlertFilter::default()).await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::JobFailed);
        assert!(alerts[0].context.message.contains("exit code 137 (OOMKilled)"));
    }

    #[tokio::test]
    async fn test_takeover_ignores_failures_followed_by_success() {
        let h = harness(true).await;
        h.store
            .add_execution(execution(ExecutionStatus::Failed, t0() - ChronoDuration::minutes(30)))
            .await;
        h.store
            .add_execution(execution(ExecutionStatus::Success, t0() - ChronoDuration::minutes(10)))
            .await;

        assert!(h.engine.acquire_leadership(t0()).await.is_some());
        h.engine.dispatcher().flush().await;
        assert!(h.engine.list_active_alerts(&AlertFilter::default()).await.is_empty());
    }

    #[tokio::test]
    async fn test_takeover_keeps_restored_job_failed_alert() {
        let h = harness(true).await;
        let failed = execution(ExecutionStatus::Failed, t0());
        h.store.add_execution(failed.clone()).await;
        h.engine.acquire_leadership(t0()).await.unwrap();
        h.engine.dispatcher().flush().await;
        let first = h.engine.list_active_alerts(&AlertFilter::default()).await;
        assert_eq!(first.len(), 1);

        h.flag.set(false);
        assert!(h.engine.acquire_leadership(t0()).await.is_none());
        h.flag.set(true);
        assert!(h.engine.acquire_leadership(t0() + ChronoDuration::minutes(1)).await.is_some());

        let alerts = h.engine.list_active_alerts(&AlertFilter::default()).await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].id, first[0].id);
    }

    #[tokio::test]
    async fn test_leadership_waits_for_store() {
        let h = harness(true).await;
        h.store.set_available(false);
        assert!(h.engine.acquire_leadership(t0()).await.is_none());

        h.store.set_available(true);
        assert!(h.engine.acquire_leadership(t0()).await.is_some());
    }

    #[tokio::test]
    async fn test_sla_snapshot_through_engine() {
        let h = harness(true).await;
        let now = t0() + ChronoDuration::days(1);
        for i in 0..10 {
            let at = now - ChronoDuration::hours(i + 1);
            let status = if i == 0 {
                ExecutionStatus::Failed
            } else {
                ExecutionStatus::Success
            };
            h.store.add_execution(execution(status, at)).await;
        }

        let leader = h.engine.acquire_leadership(now).await.unwrap();
        let outcome = h.engine.run_sla_tick(&leader, now).await;
        assert_eq!(outcome.signals.len(), 1);

        let snapshot = h.engine.get_sla_snapshot(&etl()).unwrap();
        assert_eq!(snapshot.total, 10);
        assert_eq!(snapshot.success_rate, Some(90.0));
        assert!(h.engine.get_sla_snapshot(&JobRef::new("batch", "other")).is_none());
    }

    #[tokio::test]
    async fn test_channel_and_pattern_tests() {
        let h = harness(true).await;
        assert!(h.engine.test_channel("ops").await.success);
        assert!(!h.engine.test_channel("missing").await.success);

        let result = h.engine.test_pattern(
            &PatternSpec {
                name: "exit-three".to_string(),
                matcher: PatternMatch {
                    exit_code: Some(3),
                    ..Default::default()
                },
                suggestion: "{{ job_name }} exited 3".to_string(),
                priority: 150,
            },
            &FailureContext {
                namespace: "batch".to_string(),
                job_name: "etl".to_string(),
                exit_code: Some(3),
                ..Default::default()
            },
        );
        assert!(result.matched);
        assert_eq!(result.rendered_suggestion.as_deref(), Some("etl exited 3"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let h = harness(true).await;
        let (shutdown, _) = broadcast::channel(1);
        let handle = tokio::spawn(Arc::clone(&h.engine).run(shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.engine.is_leading().await);

        shutdown.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
