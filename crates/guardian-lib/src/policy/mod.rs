//! Monitor, channel and job-inventory policy
//!
//! Policy is authored as YAML with camelCase keys, mirroring the CronJobMonitor
//! resources the reconciliation controllers resolve. A [`MonitorSpec`] is
//! treated as immutable for the duration of a tick.

mod duration;

pub use duration::{format_duration, parse_duration, serde_duration, serde_opt_duration};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use crate::alerting::{AlertType, Severity};
use crate::channels::ChannelSpec;
use crate::error::{GuardianError, Result};
use crate::matcher::PatternSet;
use crate::models::{JobObservation, MonitorRef};
use crate::schedule::{CronSchedule, MaintenanceWindowGuard};

/// Everything a monitor declares about the jobs it selects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSpec {
    pub namespace: String,
    pub name: String,
    /// Label selector; resolved by the controllers, opaque here
    #[serde(default)]
    pub selector: BTreeMap<String, String>,
    #[serde(default)]
    pub dead_man_switch: Option<DeadManSwitchConfig>,
    #[serde(default)]
    pub sla: Option<SlaConfig>,
    #[serde(default)]
    pub alerting: AlertingConfig,
}

impl MonitorSpec {
    pub fn reference(&self) -> MonitorRef {
        MonitorRef::new(&self.namespace, &self.name)
    }

    /// Severity for a given alert type after applying overrides
    pub fn severity_for(&self, alert_type: AlertType) -> Severity {
        self.alerting
            .severity_overrides
            .get(&alert_type)
            .copied()
            .unwrap_or_else(|| alert_type.default_severity())
    }

    /// Dead-man's switch mode, if the switch is enabled at all
    pub fn dead_man_mode(&self) -> Option<DeadManMode> {
        let cfg = self.dead_man_switch.as_ref().filter(|c| c.enabled)?;
        match (&cfg.auto_from_schedule, cfg.max_time_since_last_success) {
            (Some(auto), _) if auto.enabled => Some(DeadManMode::Auto {
                missed_schedule_threshold: auto.missed_schedule_threshold.max(1),
                buffer: auto.buffer,
            }),
            (_, Some(max)) => Some(DeadManMode::Fixed(max)),
            _ => None,
        }
    }

    /// SLA config when SLA tracking is enabled
    pub fn sla_config(&self) -> Option<&SlaConfig> {
        self.sla.as_ref().filter(|s| s.enabled)
    }
}

/// Resolved dead-man's switch deadline rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadManMode {
    /// `period × threshold + buffer`, period derived from the schedule
    Auto {
        missed_schedule_threshold: u32,
        buffer: Duration,
    },
    /// Fixed maximum time since the last success
    Fixed(Duration),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadManSwitchConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub auto_from_schedule: Option<AutoFromSchedule>,
    #[serde(default, with = "serde_opt_duration")]
    pub max_time_since_last_success: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoFromSchedule {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_missed_threshold")]
    pub missed_schedule_threshold: u32,
    #[serde(default = "default_buffer", with = "serde_duration")]
    pub buffer: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_min_success_rate")]
    pub min_success_rate: f64,
    #[serde(default = "default_window_days")]
    pub window_days: u32,
    #[serde(default, with = "serde_opt_duration")]
    pub max_duration: Option<Duration>,
    /// Percent increase of P95 over the baseline that counts as a regression
    #[serde(default)]
    pub duration_regression_threshold: Option<f64>,
    #[serde(default = "default_baseline_days")]
    pub duration_baseline_window_days: u32,
}

impl Default for SlaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_success_rate: default_min_success_rate(),
            window_days: default_window_days(),
            max_duration: None,
            duration_regression_threshold: None,
            duration_baseline_window_days: default_baseline_days(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub channel_refs: Vec<ChannelRef>,
    #[serde(default, with = "serde_duration")]
    pub alert_delay: Duration,
    #[serde(default = "default_suppress_duplicates", with = "serde_duration")]
    pub suppress_duplicates_for: Duration,
    #[serde(default)]
    pub severity_overrides: BTreeMap<AlertType, Severity>,
    #[serde(default)]
    pub suggested_fix_patterns: Vec<PatternSpec>,
    #[serde(default)]
    pub maintenance_windows: Vec<MaintenanceWindow>,
    #[serde(default = "default_true")]
    pub notify_on_resolve: bool,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channel_refs: Vec::new(),
            alert_delay: Duration::ZERO,
            suppress_duplicates_for: default_suppress_duplicates(),
            severity_overrides: BTreeMap::new(),
            suggested_fix_patterns: Vec::new(),
            maintenance_windows: Vec::new(),
            notify_on_resolve: true,
        }
    }
}

/// Reference to a channel, optionally restricted to some severities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRef {
    pub name: String,
    /// Empty means every severity
    #[serde(default)]
    pub severities: Vec<Severity>,
}

impl ChannelRef {
    pub fn accepts(&self, severity: Severity) -> bool {
        self.severities.is_empty() || self.severities.contains(&severity)
    }
}

/// Suggested-fix pattern as written in policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternSpec {
    pub name: String,
    #[serde(rename = "match", default)]
    pub matcher: PatternMatch,
    pub suggestion: String,
    #[serde(default = "default_custom_priority")]
    pub priority: i32,
}

/// Predicates of a pattern; every one that is set must hold
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternMatch {
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub exit_code_range: Option<ExitCodeRange>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub reason_pattern: Option<String>,
    #[serde(default)]
    pub log_pattern: Option<String>,
    #[serde(default)]
    pub event_pattern: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitCodeRange {
    pub min: i32,
    pub max: i32,
}

/// Recurring span during which alerts for the monitor's jobs are held back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceWindow {
    #[serde(default)]
    pub name: Option<String>,
    pub schedule: String,
    #[serde(with = "serde_duration")]
    pub duration: Duration,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default = "default_true")]
    pub suppress_alerts: bool,
}

fn default_true() -> bool {
    true
}

fn default_missed_threshold() -> u32 {
    1
}

fn default_buffer() -> Duration {
    Duration::from_secs(3600)
}

fn default_min_success_rate() -> f64 {
    95.0
}

fn default_window_days() -> u32 {
    7
}

fn default_baseline_days() -> u32 {
    14
}

fn default_suppress_duplicates() -> Duration {
    Duration::from_secs(3600)
}

fn default_custom_priority() -> i32 {
    150
}

/// Contents of a policy file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyFile {
    #[serde(default)]
    pub monitors: Vec<MonitorSpec>,
    #[serde(default)]
    pub channels: Vec<ChannelSpec>,
    /// Static job inventory, used when no controller feeds the registry
    #[serde(default)]
    pub jobs: Vec<JobObservation>,
}

impl PolicyFile {
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| GuardianError::Policy(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GuardianError::Policy(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    pub fn monitor(&self, reference: &MonitorRef) -> Option<&MonitorSpec> {
        self.monitors.iter().find(|m| &m.reference() == reference)
    }

    pub fn channel(&self, name: &str) -> Option<&ChannelSpec> {
        self.channels.iter().find(|c| c.name == name)
    }

    /// Check schedules, windows, patterns and references without side effects
    pub fn validate(&self) -> Vec<GuardianError> {
        let mut issues = Vec::new();

        let mut channel_names = HashSet::new();
        for channel in &self.channels {
            if !channel_names.insert(channel.name.as_str()) {
                issues.push(GuardianError::Policy(format!(
                    "duplicate channel '{}'",
                    channel.name
                )));
            }
        }

        for monitor in &self.monitors {
            for channel_ref in &monitor.alerting.channel_refs {
                if !channel_names.contains(channel_ref.name.as_str()) {
                    issues.push(GuardianError::NotFound {
                        kind: "channel",
                        name: channel_ref.name.clone(),
                    });
                }
            }
            let (_, window_errors) =
                MaintenanceWindowGuard::compile(&monitor.alerting.maintenance_windows);
            issues.extend(window_errors);
            let (_, pattern_errors) =
                PatternSet::with_builtins(&monitor.alerting.suggested_fix_patterns);
            issues.extend(pattern_errors);
        }

        for job in &self.jobs {
            if self.monitor(&job.monitor).is_none() {
                issues.push(GuardianError::NotFound {
                    kind: "monitor",
                    name: job.monitor.to_string(),
                });
            }
            if let Err(e) = CronSchedule::parse(&job.schedule, job.timezone.as_deref()) {
                issues.push(e);
            }
        }

        issues
    }
}
