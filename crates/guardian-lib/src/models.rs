//! Core data models for the guardian engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Namespaced reference to a cluster object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectRef {
    pub namespace: String,
    pub name: String,
}

/// Reference to a watched CronJob
pub type JobRef = ObjectRef;

/// Reference to the monitor that selected a job
pub type MonitorRef = ObjectRef;

impl ObjectRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parse `namespace/name`; a bare name lands in `default`
    pub fn parse(value: &str) -> Self {
        match value.split_once('/') {
            Some((namespace, name)) => Self::new(namespace, name),
            None => Self::new("default", value),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Outcome of a single job run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Failed,
}

/// A completed job run as written by the reconciliation controllers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub job: JobRef,
    /// Name of the generated Job object for this run
    pub job_run: String,
    pub status: ExecutionStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub completion_time: Option<DateTime<Utc>>,
    /// Explicit duration; derived from start/completion when absent
    #[serde(default)]
    pub duration_secs: Option<f64>,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub logs: Option<String>,
    #[serde(default)]
    pub events: Vec<String>,
}

impl ExecutionRecord {
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }

    /// Time the run finished, falling back to its start
    pub fn finished_at(&self) -> DateTime<Utc> {
        self.completion_time.unwrap_or(self.start_time)
    }

    /// Run duration in seconds, if known
    pub fn duration(&self) -> Option<f64> {
        self.duration_secs.or_else(|| {
            self.completion_time
                .map(|end| (end - self.start_time).num_milliseconds().max(0) as f64 / 1000.0)
        })
    }

    /// Context handed to the suggested-fix matcher
    pub fn failure_context(&self) -> FailureContext {
        FailureContext {
            namespace: self.job.namespace.clone(),
            job_name: self.job.name.clone(),
            job_run: Some(self.job_run.clone()),
            exit_code: self.exit_code,
            reason: self.reason.clone(),
            logs: self.logs.clone(),
            events: self.events.clone(),
        }
    }
}

/// Failure details used for pattern matching and template rendering
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureContext {
    pub namespace: String,
    pub job_name: String,
    #[serde(default)]
    pub job_run: Option<String>,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub logs: Option<String>,
    #[serde(default)]
    pub events: Vec<String>,
}

/// Job identity and schedule as reported by the reconciliation controllers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobObservation {
    pub job: JobRef,
    pub monitor: MonitorRef,
    pub schedule: String,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub suspended: bool,
    #[serde(default)]
    pub last_schedule_time: Option<DateTime<Utc>>,
}

/// Per-job liveness state maintained by the monitors
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchedJobState {
    pub job: JobRef,
    pub monitor: MonitorRef,
    pub schedule: String,
    pub timezone: Option<String>,
    pub suspended: bool,
    /// First time the job was observed; deadline reference until it succeeds
    pub observed_since: DateTime<Utc>,
    pub last_schedule_time: Option<DateTime<Utc>>,
    pub last_success_time: Option<DateTime<Utc>>,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub expected_interval: Option<Duration>,
    pub consecutive_misses: u32,
}

impl WatchedJobState {
    pub fn from_observation(observation: JobObservation, now: DateTime<Utc>) -> Self {
        Self {
            job: observation.job,
            monitor: observation.monitor,
            schedule: observation.schedule,
            timezone: observation.timezone,
            suspended: observation.suspended,
            observed_since: now,
            last_schedule_time: observation.last_schedule_time,
            last_success_time: None,
            last_failure_time: None,
            expected_interval: None,
            consecutive_misses: 0,
        }
    }

    /// True while the latest known run failed
    pub fn is_failing(&self) -> bool {
        match (self.last_failure_time, self.last_success_time) {
            (Some(failure), Some(success)) => failure > success,
            (Some(_), None) => true,
            _ => false,
        }
    }
}

/// Convert a config duration into a chrono offset, saturating at a century
pub(crate) fn chrono_duration(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(36_500))
}
