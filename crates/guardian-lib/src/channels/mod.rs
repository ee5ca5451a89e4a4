//! Outbound notification channels
//!
//! Channel kinds form a closed set. [`ChannelSpec::build`] is the single place
//! that turns a policy entry into a [`Notifier`].

mod email;
mod pagerduty;
mod slack;
mod webhook;

pub use email::{EmailConfig, EmailNotifier};
pub use pagerduty::{PagerDutyConfig, PagerDutyNotifier, EVENTS_API_URL};
pub use slack::{SlackConfig, SlackNotifier};
pub use webhook::{resolve_env_vars, WebhookConfig, WebhookNotifier};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::alerting::{AlertKey, AlertType, Severity};
use crate::models::{FailureContext, JobRef, MonitorRef};

/// Errors raised while delivering to a channel
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("SMTP delivery failed: {0}")]
    Smtp(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("delivery timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Supported channel kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Slack,
    PagerDuty,
    Webhook,
    Email,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Slack => "slack",
            ChannelKind::PagerDuty => "pagerduty",
            ChannelKind::Webhook => "webhook",
            ChannelKind::Email => "email",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Firing,
    Resolved,
    Test,
}

/// A rendered alert handed to a channel
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertNotification {
    pub alert_id: String,
    pub kind: NotificationKind,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub job: JobRef,
    pub monitor: MonitorRef,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureContext>,
    pub since: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
}

impl AlertNotification {
    /// Synthetic notification used by channel tests
    pub fn test(channel: &str, now: DateTime<Utc>) -> Self {
        Self {
            alert_id: format!("test-{}", uuid::Uuid::new_v4()),
            kind: NotificationKind::Test,
            alert_type: AlertType::JobFailed,
            severity: Severity::Info,
            job: JobRef::new("cronjob-guardian", "channel-test"),
            monitor: MonitorRef::new("cronjob-guardian", "channel-test"),
            message: format!("Test notification for channel '{}'", channel),
            suggestion: None,
            failure: None,
            since: now,
            timestamp: now,
        }
    }

    pub fn key(&self) -> AlertKey {
        AlertKey::new(self.job.clone(), self.alert_type)
    }

    /// Stable key used by channels that deduplicate on their side
    pub fn dedup_key(&self) -> String {
        self.key().to_string()
    }

    pub fn title(&self) -> String {
        let prefix = match self.kind {
            NotificationKind::Firing => "FIRING",
            NotificationKind::Resolved => "RESOLVED",
            NotificationKind::Test => "TEST",
        };
        format!("[{}] {} {}", prefix, self.alert_type, self.job)
    }
}

/// A delivery endpoint
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &AlertNotification) -> Result<(), ChannelError>;

    fn kind(&self) -> ChannelKind;
}

/// Token bucket settings for a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitSpec {
    #[serde(default = "default_max_per_hour")]
    pub max_alerts_per_hour: u32,
    #[serde(default = "default_burst")]
    pub burst_limit: u32,
}

impl Default for RateLimitSpec {
    fn default() -> Self {
        Self {
            max_alerts_per_hour: default_max_per_hour(),
            burst_limit: default_burst(),
        }
    }
}

fn default_max_per_hour() -> u32 {
    100
}

fn default_burst() -> u32 {
    10
}

/// Kind-specific channel settings, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChannelConfig {
    Slack(SlackConfig),
    PagerDuty(PagerDutyConfig),
    Webhook(WebhookConfig),
    Email(EmailConfig),
}

impl ChannelConfig {
    pub fn kind(&self) -> ChannelKind {
        match self {
            ChannelConfig::Slack(_) => ChannelKind::Slack,
            ChannelConfig::PagerDuty(_) => ChannelKind::PagerDuty,
            ChannelConfig::Webhook(_) => ChannelKind::Webhook,
            ChannelConfig::Email(_) => ChannelKind::Email,
        }
    }
}

/// A named channel as declared in policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSpec {
    pub name: String,
    #[serde(flatten)]
    pub config: ChannelConfig,
    #[serde(default)]
    pub rate_limiting: RateLimitSpec,
}

impl ChannelSpec {
    pub fn kind(&self) -> ChannelKind {
        self.config.kind()
    }

    pub fn build(&self) -> Result<Arc<dyn Notifier>, ChannelError> {
        let notifier: Arc<dyn Notifier> = match &self.config {
            ChannelConfig::Slack(cfg) => Arc::new(SlackNotifier::new(cfg)?),
            ChannelConfig::PagerDuty(cfg) => Arc::new(PagerDutyNotifier::new(cfg)?),
            ChannelConfig::Webhook(cfg) => Arc::new(WebhookNotifier::new(cfg)?),
            ChannelConfig::Email(cfg) => Arc::new(EmailNotifier::new(cfg)?),
        };
        Ok(notifier)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_spec_yaml() {
        let specs: Vec<ChannelSpec> = serde_yaml::from_str(
            r#"
- name: ops
  type: slack
  webhookUrl: https://hooks.slack.com/services/x
  rateLimiting:
    maxAlertsPerHour: 30
    burstLimit: 3
- name: pager
  type: pagerduty
  routingKey: key
- name: hook
  type: webhook
  url: https://example.com/alerts
  headers:
    X-Token: abc
- name: mail
  type: email
  smtpHost: smtp.example.com
  from: guardian@example.com
  to: [ops@example.com]
  tls: false
"#,
        )
        .unwrap();

        assert_eq!(specs.len(), 4);
        assert_eq!(specs[0].kind(), ChannelKind::Slack);
        assert_eq!(specs[0].rate_limiting.burst_limit, 3);
        assert_eq!(specs[1].kind(), ChannelKind::PagerDuty);
        assert_eq!(specs[1].rate_limiting, RateLimitSpec::default());
        assert_eq!(specs[2].kind(), ChannelKind::Webhook);
        assert_eq!(specs[3].kind(), ChannelKind::Email);

        for spec in &specs {
            assert!(spec.build().is_ok(), "{}", spec.name);
        }
    }

    #[test]
    fn test_unknown_channel_type_rejected() {
        let parsed: Result<ChannelSpec, _> =
            serde_yaml::from_str("name: x\ntype: carrier-pigeon\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_notification_title_and_key() {
        let now = Utc::now();
        let mut n = AlertNotification::test("ops", now);
        assert!(n.title().starts_with("[TEST] JobFailed"));
        n.kind = NotificationKind::Resolved;
        assert_eq!(
            n.title(),
            "[RESOLVED] JobFailed cronjob-guardian/channel-test"
        );
        assert_eq!(n.dedup_key(), "cronjob-guardian/channel-test/JobFailed");
    }
}
