//! Dead-man's switch
//!
//! A job is dead when no successful run happened within its expected
//! interval, measured from the last success (or from when the job was first
//! observed, if it never succeeded).

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::TickOutcome;
use crate::alerting::{AlertSignal, AlertType, SignalContext};
use crate::health::components;
use crate::models::{chrono_duration, WatchedJobState};
use crate::observability::{GuardianMetrics, StructuredLogger};
use crate::policy::{format_duration, DeadManMode};
use crate::registry::{MonitorPolicy, WatchRegistry};
use crate::schedule::{expected_interval, CronSchedule, IntervalEstimator};

/// Upper bound on firings counted when deriving consecutive misses
const MAX_COUNTED_MISSES: usize = 1000;

pub struct DeadManSwitchMonitor {
    registry: Arc<WatchRegistry>,
    estimator: IntervalEstimator,
    metrics: GuardianMetrics,
    logger: StructuredLogger,
}

enum Verdict {
    /// No verdict this tick
    Skip(String),
    Healthy,
    Dead(AlertSignal),
}

impl DeadManSwitchMonitor {
    pub fn new(registry: Arc<WatchRegistry>, logger: StructuredLogger) -> Self {
        Self {
            registry,
            estimator: IntervalEstimator::default(),
            metrics: GuardianMetrics::new(),
            logger,
        }
    }

    pub fn tick(&self, now: DateTime<Utc>) -> TickOutcome {
        let started = Instant::now();
        let mut outcome = TickOutcome::default();

        for job in self.registry.jobs() {
            let Some(policy) = self.registry.monitor(&job.monitor) else {
                outcome.skipped += 1;
                continue;
            };

            match self.check(&policy, &job, now) {
                Verdict::Skip(reason) => {
                    if !reason.is_empty() {
                        self.logger.log_skipped_job(&job.job, &reason);
                    }
                    outcome.skipped += 1;
                }
                Verdict::Healthy => {
                    outcome.evaluated.insert(job.job);
                }
                Verdict::Dead(signal) => {
                    outcome.evaluated.insert(job.job);
                    outcome.signals.push(signal);
                }
            }
        }

        self.metrics
            .observe_tick(components::DEAD_MAN_SWITCH, started.elapsed().as_secs_f64());
        outcome
    }

    fn check(&self, policy: &MonitorPolicy, job: &WatchedJobState, now: DateTime<Utc>) -> Verdict {
        let Some(mode) = policy.spec.dead_man_mode() else {
            return Verdict::Healthy;
        };
        if job.suspended {
            return Verdict::Healthy;
        }
        if policy.suppressing_window(now).is_some() {
            return Verdict::Skip(String::new());
        }

        let reference = job.last_success_time.unwrap_or(job.observed_since);
        let (interval, misses) = match mode {
            DeadManMode::Auto {
                missed_schedule_threshold,
                buffer,
            } => {
                let schedule = match CronSchedule::parse(&job.schedule, job.timezone.as_deref()) {
                    Ok(s) => s,
                    Err(e) => return self.invalid_schedule(e.to_string()),
                };
                let interval = match job.expected_interval {
                    Some(interval) => interval,
                    None => match self.estimator.period(&schedule, now) {
                        Ok(period) => {
                            let interval = expected_interval(period, missed_schedule_threshold, buffer);
                            self.registry
                                .update_job(&job.job, |s| s.expected_interval = Some(interval));
                            interval
                        }
                        Err(e) => return self.invalid_schedule(e.to_string()),
                    },
                };
                let misses = schedule
                    .upcoming(reference)
                    .take_while(|t| *t <= now)
                    .take(MAX_COUNTED_MISSES)
                    .count();
                (interval, misses as u32)
            }
            DeadManMode::Fixed(max) => (max, elapsed_periods(reference, now, max)),
        };

        if misses != job.consecutive_misses {
            self.registry
                .update_job(&job.job, |s| s.consecutive_misses = misses);
        }

        let deadline = reference + chrono_duration(interval);
        if now <= deadline {
            return Verdict::Healthy;
        }

        let since = match job.last_success_time {
            Some(at) => format!("last success at {}", at.to_rfc3339()),
            None => format!("no success since observed at {}", job.observed_since.to_rfc3339()),
        };
        Verdict::Dead(AlertSignal {
            alert_type: AlertType::DeadManTriggered,
            severity: policy.spec.severity_for(AlertType::DeadManTriggered),
            job: job.job.clone(),
            monitor: job.monitor.clone(),
            context: SignalContext::message(format!(
                "{} has not succeeded within {} ({}, {} missed runs)",
                job.job,
                format_duration(interval),
                since,
                misses
            )),
            timestamp: now,
        })
    }

    fn invalid_schedule(&self, reason: String) -> Verdict {
        self.metrics.inc_invalid_schedules();
        Verdict::Skip(reason)
    }
}

fn elapsed_periods(reference: DateTime<Utc>, now: DateTime<Utc>, period: Duration) -> u32 {
    let elapsed = (now - reference).to_std().unwrap_or(Duration::ZERO);
    if period.is_zero() {
        return 0;
    }
    u32::try_from(elapsed.as_secs() / period.as_secs().max(1)).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JobObservation, JobRef, MonitorRef};
    use crate::policy::{
        AlertingConfig, AutoFromSchedule, DeadManSwitchConfig, MaintenanceWindow, MonitorSpec,
    };
    use crate::alerting::Severity;
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn spec(dead_man: DeadManSwitchConfig) -> MonitorSpec {
        MonitorSpec {
            namespace: "batch".to_string(),
            name: "m".to_string(),
            selector: Default::default(),
            dead_man_switch: Some(dead_man),
            sla: None,
            alerting: AlertingConfig::default(),
        }
    }

    fn auto(threshold: u32, buffer: Duration) -> DeadManSwitchConfig {
        DeadManSwitchConfig {
            enabled: true,
            auto_from_schedule: Some(AutoFromSchedule {
                enabled: true,
                missed_schedule_threshold: threshold,
                buffer,
            }),
            max_time_since_last_success: None,
        }
    }

    fn fixed(max: Duration) -> DeadManSwitchConfig {
        DeadManSwitchConfig {
            enabled: true,
            auto_from_schedule: None,
            max_time_since_last_success: Some(max),
        }
    }

    fn setup(spec: MonitorSpec, schedule: &str, observed: DateTime<Utc>) -> (DeadManSwitchMonitor, Arc<WatchRegistry>) {
        let registry = Arc::new(WatchRegistry::new());
        registry.upsert_monitor(spec);
        registry.observe_job(
            JobObservation {
                job: JobRef::new("batch", "etl"),
                monitor: MonitorRef::new("batch", "m"),
                schedule: schedule.to_string(),
                timezone: None,
                suspended: false,
                last_schedule_time: None,
            },
            observed,
        );
        (
            DeadManSwitchMonitor::new(Arc::clone(&registry), StructuredLogger::new("test")),
            registry,
        )
    }

    fn etl() -> JobRef {
        JobRef::new("batch", "etl")
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_auto_deadline_from_last_success() {
        let (monitor, registry) = setup(spec(auto(2, Duration::from_secs(600))), "0 * * * *", t0());
        registry.update_job(&etl(), |s| s.last_success_time = Some(t0()));

        // Deadline is 2h10m after the last success
        let outcome = monitor.tick(t0() + ChronoDuration::minutes(130));
        assert!(outcome.evaluated.contains(&etl()));
        assert!(outcome.signals.is_empty());
        assert_eq!(
            registry.job(&etl()).unwrap().expected_interval,
            Some(Duration::from_secs(2 * 3600 + 600))
        );

        let outcome = monitor.tick(t0() + ChronoDuration::minutes(131));
        assert_eq!(outcome.signals.len(), 1);
        let signal = &outcome.signals[0];
        assert_eq!(signal.alert_type, AlertType::DeadManTriggered);
        assert_eq!(signal.severity, Severity::Critical);
        assert_eq!(registry.job(&etl()).unwrap().consecutive_misses, 2);
    }

    #[test]
    fn test_never_succeeded_uses_observed_since() {
        let (monitor, _) = setup(spec(fixed(Duration::from_secs(3600))), "0 * * * *", t0());

        assert!(monitor.tick(t0() + ChronoDuration::minutes(59)).signals.is_empty());
        let outcome = monitor.tick(t0() + ChronoDuration::minutes(61));
        assert_eq!(outcome.signals.len(), 1);
        assert!(outcome.signals[0].context.message.contains("no success since"));
    }

    #[test]
    fn test_invalid_schedule_skips_job() {
        let (monitor, _) = setup(spec(auto(1, Duration::ZERO)), "not a cron", t0());
        let outcome = monitor.tick(t0() + ChronoDuration::days(3));
        assert!(outcome.signals.is_empty());
        assert!(outcome.evaluated.is_empty());
        assert_eq!(outcome.skipped, 1);
    }

    #[test]
    fn test_suspended_and_disabled_jobs_are_healthy() {
        let (monitor, registry) = setup(spec(fixed(Duration::from_secs(60))), "* * * * *", t0());
        registry.update_job(&etl(), |s| s.suspended = true);
        let outcome = monitor.tick(t0() + ChronoDuration::hours(1));
        assert!(outcome.signals.is_empty());
        assert!(outcome.evaluated.contains(&etl()));

        let mut spec = spec(fixed(Duration::from_secs(60)));
        spec.dead_man_switch = Some(DeadManSwitchConfig {
            enabled: false,
            ..fixed(Duration::from_secs(60))
        });
        registry.upsert_monitor(spec);
        registry.update_job(&etl(), |s| s.suspended = false);
        assert!(monitor.tick(t0() + ChronoDuration::hours(1)).signals.is_empty());
    }

    #[test]
    fn test_maintenance_window_skips_evaluation() {
        let mut spec = spec(fixed(Duration::from_secs(600)));
        spec.alerting.maintenance_windows = vec![MaintenanceWindow {
            name: Some("patching".to_string()),
            schedule: "0 3 * * *".to_string(),
            duration: Duration::from_secs(3600),
            timezone: None,
            suppress_alerts: true,
        }];
        let (monitor, _) = setup(spec, "*/5 * * * *", t0());

        let inside = monitor.tick(t0() + ChronoDuration::minutes(200));
        assert!(inside.signals.is_empty());
        assert!(inside.evaluated.is_empty());

        let after = monitor.tick(t0() + ChronoDuration::minutes(250));
        assert_eq!(after.signals.len(), 1);
    }

    #[test]
    fn test_schedule_change_recomputes_interval() {
        let (monitor, registry) = setup(spec(auto(1, Duration::ZERO)), "0 * * * *", t0());
        monitor.tick(t0());
        assert_eq!(
            registry.job(&etl()).unwrap().expected_interval,
            Some(Duration::from_secs(3600))
        );

        registry.observe_job(
            JobObservation {
                job: etl(),
                monitor: MonitorRef::new("batch", "m"),
                schedule: "*/10 * * * *".to_string(),
                timezone: None,
                suspended: false,
                last_schedule_time: None,
            },
            t0(),
        );
        monitor.tick(t0());
        assert_eq!(
            registry.job(&etl()).unwrap().expected_interval,
            Some(Duration::from_secs(600))
        );
    }
}
