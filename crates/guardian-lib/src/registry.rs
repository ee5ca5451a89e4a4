//! Registry of monitors and the jobs they watch
//!
//! The reconciliation controllers (or a static policy file) feed monitors and
//! job observations in; the monitors and the dispatcher read from here.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::GuardianError;
use crate::matcher::PatternSet;
use crate::models::{ExecutionRecord, JobObservation, JobRef, MonitorRef, WatchedJobState};
use crate::policy::{MonitorSpec, PolicyFile};
use crate::schedule::{ActiveWindow, MaintenanceWindowGuard};

/// A monitor with its patterns and windows compiled once
#[derive(Debug, Clone)]
pub struct MonitorPolicy {
    pub spec: MonitorSpec,
    pub patterns: PatternSet,
    pub windows: MaintenanceWindowGuard,
}

impl MonitorPolicy {
    pub fn compile(spec: MonitorSpec) -> (Self, Vec<GuardianError>) {
        let (patterns, mut errors) = PatternSet::with_builtins(&spec.alerting.suggested_fix_patterns);
        let (windows, window_errors) = MaintenanceWindowGuard::compile(&spec.alerting.maintenance_windows);
        errors.extend(window_errors);
        (
            Self {
                spec,
                patterns,
                windows,
            },
            errors,
        )
    }

    pub fn reference(&self) -> MonitorRef {
        self.spec.reference()
    }

    pub fn suppressing_window(&self, now: DateTime<Utc>) -> Option<ActiveWindow> {
        self.windows.suppressing_window(now)
    }
}

#[derive(Default)]
pub struct WatchRegistry {
    monitors: DashMap<MonitorRef, Arc<MonitorPolicy>>,
    jobs: DashMap<JobRef, WatchedJobState>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a monitor; compile problems are returned, not fatal
    pub fn upsert_monitor(&self, spec: MonitorSpec) -> Vec<GuardianError> {
        let (policy, errors) = MonitorPolicy::compile(spec);
        let reference = policy.reference();
        debug!(monitor = %reference, patterns = policy.patterns.len(), "Registering monitor");
        // Dead-man thresholds may have changed
        self.jobs
            .iter_mut()
            .filter(|state| state.monitor == reference)
            .for_each(|mut state| state.expected_interval = None);
        self.monitors.insert(reference, Arc::new(policy));
        errors
    }

    /// Drop a monitor together with every job it selected
    pub fn remove_monitor(&self, reference: &MonitorRef) -> Option<Arc<MonitorPolicy>> {
        self.jobs.retain(|_, state| &state.monitor != reference);
        self.monitors.remove(reference).map(|(_, v)| v)
    }

    pub fn monitor(&self, reference: &MonitorRef) -> Option<Arc<MonitorPolicy>> {
        self.monitors.get(reference).map(|r| Arc::clone(r.value()))
    }

    pub fn monitors(&self) -> Vec<Arc<MonitorPolicy>> {
        self.monitors.iter().map(|r| Arc::clone(r.value())).collect()
    }

    /// Create state on first observation, refresh identity and schedule after
    pub fn observe_job(&self, observation: JobObservation, now: DateTime<Utc>) {
        match self.jobs.get_mut(&observation.job) {
            Some(mut state) => {
                if state.schedule != observation.schedule || state.timezone != observation.timezone {
                    state.expected_interval = None;
                }
                state.monitor = observation.monitor;
                state.schedule = observation.schedule;
                state.timezone = observation.timezone;
                state.suspended = observation.suspended;
                if observation.last_schedule_time.is_some() {
                    state.last_schedule_time = observation.last_schedule_time;
                }
            }
            None => {
                debug!(job = %observation.job, "Watching job");
                let job = observation.job.clone();
                self.jobs
                    .insert(job, WatchedJobState::from_observation(observation, now));
            }
        }
    }

    pub fn remove_job(&self, job: &JobRef) -> Option<WatchedJobState> {
        self.jobs.remove(job).map(|(_, v)| v)
    }

    pub fn job(&self, job: &JobRef) -> Option<WatchedJobState> {
        self.jobs.get(job).map(|r| r.clone())
    }

    pub fn jobs(&self) -> Vec<WatchedJobState> {
        self.jobs.iter().map(|r| r.value().clone()).collect()
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    pub fn update_job<F>(&self, job: &JobRef, f: F) -> bool
    where
        F: FnOnce(&mut WatchedJobState),
    {
        match self.jobs.get_mut(job) {
            Some(mut state) => {
                f(&mut state);
                true
            }
            None => false,
        }
    }

    /// Fold a finished run into the job's liveness state
    pub fn record_execution(&self, record: &ExecutionRecord) -> Option<WatchedJobState> {
        let mut state = self.jobs.get_mut(&record.job)?;
        let finished = record.finished_at();
        if record.is_success() {
            if state.last_success_time.map_or(true, |t| finished > t) {
                state.last_success_time = Some(finished);
            }
            state.consecutive_misses = 0;
        } else if state.last_failure_time.map_or(true, |t| finished > t) {
            state.last_failure_time = Some(finished);
        }
        Some(state.clone())
    }

    /// Load monitors and the static job inventory from a policy file
    pub fn load_policy(&self, policy: &PolicyFile, now: DateTime<Utc>) -> Vec<GuardianError> {
        let mut errors = Vec::new();
        for monitor in &policy.monitors {
            errors.extend(self.upsert_monitor(monitor.clone()));
        }
        for job in &policy.jobs {
            self.observe_job(job.clone(), now);
        }
        info!(
            monitors = self.monitors.len(),
            jobs = self.jobs.len(),
            "Loaded policy"
        );
        errors
    }
}
