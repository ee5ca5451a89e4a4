//! Rolling SLA analysis
//!
//! One store read per job covers the evaluation window and the baseline
//! window before it. Percentiles use nearest rank on the sorted durations.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use super::TickOutcome;
use crate::alerting::{AlertSignal, AlertType, SignalContext};
use crate::health::components;
use crate::models::{ExecutionRecord, FailureContext, JobRef, MonitorRef};
use crate::observability::{GuardianMetrics, StructuredLogger};
use crate::policy::{format_duration, MonitorSpec, SlaConfig};
use crate::registry::WatchRegistry;
use crate::store::ExecutionStore;

/// Success-rate gap, in percentage points, between the current and baseline
/// windows before the trend counts as improving or declining
pub const TREND_GAP_POINTS: f64 = 5.0;

/// Reason attached to a breach caused by a single slow run
pub const MAX_DURATION_EXCEEDED: &str = "MaxDurationExceeded";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
}

/// Latest SLA figures for a job; replaced on every tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaSnapshot {
    pub job: JobRef,
    pub monitor: MonitorRef,
    pub window_days: u32,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// None when the window holds no executions
    pub success_rate: Option<f64>,
    pub p50_secs: Option<f64>,
    pub p95_secs: Option<f64>,
    pub p99_secs: Option<f64>,
    pub last_duration_secs: Option<f64>,
    pub baseline_total: usize,
    pub baseline_success_rate: Option<f64>,
    pub baseline_p95_secs: Option<f64>,
    pub regression_pct: Option<f64>,
    pub trend: Trend,
    pub computed_at: DateTime<Utc>,
}

/// Nearest-rank percentile of an ascending slice
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    Some(sorted[rank.clamp(1, sorted.len()) - 1])
}

fn sorted_durations(runs: &[&ExecutionRecord]) -> Vec<f64> {
    let mut durations: Vec<f64> = runs.iter().filter_map(|r| r.duration()).collect();
    durations.sort_by(f64::total_cmp);
    durations
}

fn success_rate(runs: &[&ExecutionRecord]) -> Option<f64> {
    if runs.is_empty() {
        return None;
    }
    let succeeded = runs.iter().filter(|r| r.is_success()).count();
    Some(100.0 * succeeded as f64 / runs.len() as f64)
}

fn trend(current: Option<f64>, baseline: Option<f64>) -> Trend {
    match (current, baseline) {
        (Some(c), Some(b)) if c - b > TREND_GAP_POINTS => Trend::Improving,
        (Some(c), Some(b)) if b - c > TREND_GAP_POINTS => Trend::Declining,
        _ => Trend::Stable,
    }
}

/// Compute the snapshot and any signals for one job from its executions.
///
/// `runs` must cover `[now - baseline - window, now]`; anything outside is ignored.
/// `maxDuration` is checked against the most recent run.
pub fn evaluate(
    spec: &MonitorSpec,
    config: &SlaConfig,
    job: &JobRef,
    runs: &[ExecutionRecord],
    now: DateTime<Utc>,
) -> (SlaSnapshot, Vec<AlertSignal>) {
    evaluate_since(spec, config, job, runs, None, now)
}

/// Like [`evaluate`], but `maxDuration` is also checked against every run
/// that finished after `checked_since`, the previous evaluation.
pub fn evaluate_since(
    spec: &MonitorSpec,
    config: &SlaConfig,
    job: &JobRef,
    runs: &[ExecutionRecord],
    checked_since: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> (SlaSnapshot, Vec<AlertSignal>) {
    let window_start = now - ChronoDuration::days(i64::from(config.window_days));
    let baseline_start = window_start - ChronoDuration::days(i64::from(config.duration_baseline_window_days));

    let current: Vec<&ExecutionRecord> = runs
        .iter()
        .filter(|r| r.start_time >= window_start && r.start_time <= now)
        .collect();
    let baseline: Vec<&ExecutionRecord> = runs
        .iter()
        .filter(|r| r.start_time >= baseline_start && r.start_time < window_start)
        .collect();

    let durations = sorted_durations(&current);
    let baseline_durations = sorted_durations(&baseline);
    let succeeded = current.iter().filter(|r| r.is_success()).count();
    let rate = success_rate(&current);
    let baseline_rate = success_rate(&baseline);
    let p95 = percentile(&durations, 95.0);
    let baseline_p95 = percentile(&baseline_durations, 95.0);
    let latest = current.iter().max_by_key(|r| r.start_time).copied();

    let regression_pct = match (p95, baseline_p95) {
        (Some(cur), Some(base)) if base > 0.0 => Some(100.0 * (cur - base) / base),
        _ => None,
    };

    let snapshot = SlaSnapshot {
        job: job.clone(),
        monitor: spec.reference(),
        window_days: config.window_days,
        total: current.len(),
        succeeded,
        failed: current.len() - succeeded,
        success_rate: rate,
        p50_secs: percentile(&durations, 50.0),
        p95_secs: p95,
        p99_secs: percentile(&durations, 99.0),
        last_duration_secs: latest.and_then(ExecutionRecord::duration),
        baseline_total: baseline.len(),
        baseline_success_rate: baseline_rate,
        baseline_p95_secs: baseline_p95,
        regression_pct,
        trend: trend(rate, baseline_rate),
        computed_at: now,
    };

    let mut signals = Vec::new();
    let Some(rate) = rate else {
        return (snapshot, signals);
    };

    let mut breaches = Vec::new();
    let mut failure = None;
    if rate < config.min_success_rate {
        breaches.push(format!(
            "success rate {:.1}% below {:.1}% over {}d ({}/{} runs succeeded)",
            rate,
            config.min_success_rate,
            config.window_days,
            succeeded,
            current.len()
        ));
    }
    if let Some(max) = config.max_duration {
        let slowest = current
            .iter()
            .copied()
            .filter(|r| {
                latest.is_some_and(|l| std::ptr::eq(*r, l))
                    || checked_since.is_some_and(|since| r.finished_at() > since)
            })
            .filter_map(|r| r.duration().filter(|d| *d > max.as_secs_f64()).map(|d| (r, d)))
            .max_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((run, duration)) = slowest {
            breaches.push(format!(
                "run {} took {:.0}s, over the {} limit",
                run.job_run,
                duration,
                format_duration(max)
            ));
            failure = Some(FailureContext {
                reason: Some(MAX_DURATION_EXCEEDED.to_string()),
                ..run.failure_context()
            });
        }
    }
    if !breaches.is_empty() {
        signals.push(AlertSignal {
            alert_type: AlertType::SlaBreached,
            severity: spec.severity_for(AlertType::SlaBreached),
            job: job.clone(),
            monitor: spec.reference(),
            context: SignalContext {
                message: format!("{}: {}", job, breaches.join("; ")),
                failure,
            },
            timestamp: now,
        });
    }

    if let (Some(threshold), Some(pct)) = (config.duration_regression_threshold, regression_pct) {
        if pct >= threshold {
            signals.push(AlertSignal {
                alert_type: AlertType::DurationRegression,
                severity: spec.severity_for(AlertType::DurationRegression),
                job: job.clone(),
                monitor: spec.reference(),
                context: SignalContext::message(format!(
                    "{}: P95 duration {:.0}s is {:.1}% above the {}d baseline of {:.0}s",
                    job,
                    snapshot.p95_secs.unwrap_or_default(),
                    pct,
                    config.duration_baseline_window_days,
                    snapshot.baseline_p95_secs.unwrap_or_default()
                )),
                timestamp: now,
            });
        }
    }

    (snapshot, signals)
}

pub struct SlaAnalyzer {
    registry: Arc<WatchRegistry>,
    store: Arc<dyn ExecutionStore>,
    snapshots: DashMap<JobRef, SlaSnapshot>,
    metrics: GuardianMetrics,
    logger: StructuredLogger,
}

impl SlaAnalyzer {
    pub fn new(
        registry: Arc<WatchRegistry>,
        store: Arc<dyn ExecutionStore>,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            registry,
            store,
            snapshots: DashMap::new(),
            metrics: GuardianMetrics::new(),
            logger,
        }
    }

    pub async fn tick(&self, now: DateTime<Utc>) -> TickOutcome {
        let started = Instant::now();
        let mut outcome = TickOutcome::default();

        for job in self.registry.jobs() {
            let Some(policy) = self.registry.monitor(&job.monitor) else {
                outcome.skipped += 1;
                continue;
            };
            let Some(config) = policy.spec.sla_config() else {
                self.snapshots.remove(&job.job);
                outcome.evaluated.insert(job.job);
                continue;
            };

            let days = i64::from(config.window_days) + i64::from(config.duration_baseline_window_days);
            let runs = match self
                .store
                .query_executions(&job.job, now - ChronoDuration::days(days), now)
                .await
            {
                Ok(runs) => runs,
                Err(e) => {
                    self.metrics.inc_store_errors();
                    self.logger.log_skipped_job(&job.job, &e.to_string());
                    outcome.store_errors += 1;
                    outcome.skipped += 1;
                    continue;
                }
            };

            let checked_since = self.snapshots.get(&job.job).map(|s| s.computed_at);
            let (snapshot, signals) =
                evaluate_since(&policy.spec, config, &job.job, &runs, checked_since, now);
            self.snapshots.insert(job.job.clone(), snapshot);
            outcome.signals.extend(signals);
            outcome.evaluated.insert(job.job);
        }

        // Forget jobs that left the registry
        self.snapshots
            .retain(|job, _| self.registry.job(job).is_some());

        self.metrics
            .observe_tick(components::SLA_ANALYZER, started.elapsed().as_secs_f64());
        outcome
    }

    pub fn snapshot(&self, job: &JobRef) -> Option<SlaSnapshot> {
        self.snapshots.get(job).map(|s| s.clone())
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }
}
