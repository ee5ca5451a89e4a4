//! Alert signals emitted by the monitors

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{FailureContext, JobRef, MonitorRef};

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertType {
    JobFailed,
    DeadManTriggered,
    #[serde(rename = "SLABreached")]
    SlaBreached,
    DurationRegression,
}

impl AlertType {
    pub const ALL: [AlertType; 4] = [
        AlertType::JobFailed,
        AlertType::DeadManTriggered,
        AlertType::SlaBreached,
        AlertType::DurationRegression,
    ];

    /// Severity used when the monitor has no override for this type
    pub fn default_severity(&self) -> Severity {
        match self {
            AlertType::JobFailed | AlertType::DeadManTriggered => Severity::Critical,
            AlertType::SlaBreached | AlertType::DurationRegression => Severity::Warning,
        }
    }

    /// Which evaluator emits this type of signal
    pub fn source(&self) -> SignalSource {
        match self {
            AlertType::JobFailed => SignalSource::Executions,
            AlertType::DeadManTriggered => SignalSource::DeadManSwitch,
            AlertType::SlaBreached | AlertType::DurationRegression => SignalSource::SlaAnalyzer,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::JobFailed => "JobFailed",
            AlertType::DeadManTriggered => "DeadManTriggered",
            AlertType::SlaBreached => "SLABreached",
            AlertType::DurationRegression => "DurationRegression",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The component that produced a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalSource {
    Executions,
    DeadManSwitch,
    SlaAnalyzer,
}

impl SignalSource {
    pub fn alert_types(&self) -> &'static [AlertType] {
        match self {
            SignalSource::Executions => &[AlertType::JobFailed],
            SignalSource::DeadManSwitch => &[AlertType::DeadManTriggered],
            SignalSource::SlaAnalyzer => &[AlertType::SlaBreached, AlertType::DurationRegression],
        }
    }
}

/// Dedup identity of an alert
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertKey {
    pub job: JobRef,
    pub alert_type: AlertType,
}

impl AlertKey {
    pub fn new(job: JobRef, alert_type: AlertType) -> Self {
        Self { job, alert_type }
    }
}

impl fmt::Display for AlertKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.job, self.alert_type)
    }
}

/// Details attached to a signal
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalContext {
    /// Human-readable description of the condition
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureContext>,
}

impl SignalContext {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            failure: None,
        }
    }
}

/// A condition observed by a monitor, consumed once by the dispatcher
#[derive(Debug, Clone, PartialEq)]
pub struct AlertSignal {
    pub alert_type: AlertType,
    pub severity: Severity,
    pub job: JobRef,
    pub monitor: MonitorRef,
    pub context: SignalContext,
    pub timestamp: DateTime<Utc>,
}

impl AlertSignal {
    pub fn key(&self) -> AlertKey {
        AlertKey::new(self.job.clone(), self.alert_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_type_serde_names() {
        assert_eq!(
            serde_json::to_string(&AlertType::SlaBreached).unwrap(),
            "\"SLABreached\""
        );
        let parsed: AlertType = serde_json::from_str("\"DeadManTriggered\"").unwrap();
        assert_eq!(parsed, AlertType::DeadManTriggered);
    }

    #[test]
    fn test_sources_cover_every_type() {
        for alert_type in AlertType::ALL {
            assert!(alert_type.source().alert_types().contains(&alert_type));
        }
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
    }
}
