//! PagerDuty Events API v2 channel
//!
//! Firing alerts are sent as `trigger` events and resolutions as `resolve`
//! events, both keyed by the alert's dedup key so PagerDuty groups them into
//! one incident.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{
    resolve_env_vars, AlertNotification, ChannelError, ChannelKind, NotificationKind, Notifier,
};
use crate::alerting::Severity;

/// Events API v2 endpoint
pub const EVENTS_API_URL: &str = "https://events.pagerduty.com/v2/enqueue";

const SOURCE: &str = "cronjob-guardian";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagerDutyConfig {
    /// Integration key; `${VAR}` references are expanded
    pub routing_key: String,
    /// Override for the events endpoint
    #[serde(default)]
    pub events_url: Option<String>,
}

pub struct PagerDutyNotifier {
    routing_key: String,
    events_url: String,
    client: reqwest::Client,
}

impl PagerDutyNotifier {
    pub fn new(config: &PagerDutyConfig) -> Result<Self, ChannelError> {
        let routing_key = resolve_env_vars(&config.routing_key)?;
        if routing_key.is_empty() {
            return Err(ChannelError::Config("routingKey is empty".to_string()));
        }
        Ok(Self {
            routing_key,
            events_url: config
                .events_url
                .clone()
                .unwrap_or_else(|| EVENTS_API_URL.to_string()),
            client: reqwest::Client::new(),
        })
    }

    fn event<'a>(&'a self, notification: &'a AlertNotification) -> EventRequest<'a> {
        let action = match notification.kind {
            NotificationKind::Resolved => EventAction::Resolve,
            NotificationKind::Firing | NotificationKind::Test => EventAction::Trigger,
        };

        let payload = (action == EventAction::Trigger).then(|| EventPayload {
            summary: format!("{}: {}", notification.title(), notification.message),
            source: SOURCE,
            severity: match notification.severity {
                Severity::Info => "info",
                Severity::Warning => "warning",
                Severity::Critical => "critical",
            },
            timestamp: notification.timestamp.to_rfc3339(),
            component: &notification.job.name,
            group: &notification.job.namespace,
            class: notification.alert_type.as_str(),
            custom_details: serde_json::json!({
                "monitor": notification.monitor.to_string(),
                "since": notification.since.to_rfc3339(),
                "suggestion": notification.suggestion,
                "failure": notification.failure,
            }),
        });

        EventRequest {
            routing_key: &self.routing_key,
            event_action: action,
            dedup_key: notification.dedup_key(),
            payload,
        }
    }
}

#[async_trait]
impl Notifier for PagerDutyNotifier {
    async fn send(&self, notification: &AlertNotification) -> Result<(), ChannelError> {
        let event = self.event(notification);
        debug!(
            channel = "pagerduty",
            action = ?event.event_action,
            dedup_key = %event.dedup_key,
            "Sending PagerDuty event"
        );

        let response = self.client.post(&self.events_url).json(&event).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        warn!(channel = "pagerduty", %status, body = %body, "PagerDuty API request failed");
        Err(ChannelError::Status {
            status: status.as_u16(),
            body,
        })
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::PagerDuty
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum EventAction {
    Trigger,
    Resolve,
}

#[derive(Debug, Serialize)]
struct EventRequest<'a> {
    routing_key: &'a str,
    event_action: EventAction,
    dedup_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<EventPayload<'a>>,
}

#[derive(Debug, Serialize)]
struct EventPayload<'a> {
    summary: String,
    source: &'a str,
    severity: &'a str,
    timestamp: String,
    component: &'a str,
    group: &'a str,
    class: &'a str,
    custom_details: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mockito::Matcher;

    fn notifier(url: String) -> PagerDutyNotifier {
        PagerDutyNotifier::new(&PagerDutyConfig {
            routing_key: "rk-123".to_string(),
            events_url: Some(url),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_trigger_event() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v2/enqueue")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "routing_key": "rk-123",
                "event_action": "trigger",
                "dedup_key": "cronjob-guardian/channel-test/JobFailed",
                "payload": { "source": "cronjob-guardian", "severity": "info" }
            })))
            .with_status(202)
            .with_body(r#"{"status":"success","dedup_key":"x"}"#)
            .create_async()
            .await;

        notifier(format!("{}/v2/enqueue", server.url()))
            .send(&AlertNotification::test("pager", Utc::now()))
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_resolve_event_has_no_payload() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v2/enqueue")
            .match_body(Matcher::PartialJson(
                serde_json::json!({ "event_action": "resolve" }),
            ))
            .with_status(202)
            .create_async()
            .await;

        let mut notification = AlertNotification::test("pager", Utc::now());
        notification.kind = NotificationKind::Resolved;

        let pd = notifier(format!("{}/v2/enqueue", server.url()));
        assert!(pd.event(&notification).payload.is_none());
        pd.send(&notification).await.unwrap();
        mock.assert_async().await;
    }

    #[test]
    fn test_empty_routing_key_rejected() {
        let result = PagerDutyNotifier::new(&PagerDutyConfig {
            routing_key: String::new(),
            events_url: None,
        });
        assert!(matches!(result, Err(ChannelError::Config(_))));
    }
}
