//! Slack incoming-webhook channel

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{
    resolve_env_vars, AlertNotification, ChannelError, ChannelKind, NotificationKind, Notifier,
};
use crate::alerting::Severity;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlackConfig {
    /// Incoming webhook URL; `${VAR}` references are expanded
    pub webhook_url: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

pub struct SlackNotifier {
    webhook_url: String,
    channel: Option<String>,
    username: Option<String>,
    client: reqwest::Client,
}

impl SlackNotifier {
    pub fn new(config: &SlackConfig) -> Result<Self, ChannelError> {
        Ok(Self {
            webhook_url: resolve_env_vars(&config.webhook_url)?,
            channel: config.channel.clone(),
            username: config.username.clone(),
            client: reqwest::Client::new(),
        })
    }

    fn color(notification: &AlertNotification) -> &'static str {
        if notification.kind == NotificationKind::Resolved {
            return "#2eb886";
        }
        match notification.severity {
            Severity::Info => "#3498db",
            Severity::Warning => "#f39c12",
            Severity::Critical => "#e74c3c",
        }
    }

    fn payload(&self, notification: &AlertNotification) -> SlackPayload {
        let mut fields = vec![
            SlackField::short("Job", notification.job.to_string()),
            SlackField::short("Type", notification.alert_type.to_string()),
            SlackField::short("Severity", notification.severity.to_string()),
            SlackField::short(
                "Since",
                notification.since.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            ),
        ];

        if let Some(failure) = &notification.failure {
            if let Some(run) = &failure.job_run {
                fields.push(SlackField::short("Run", run.clone()));
            }
            if let Some(code) = failure.exit_code {
                fields.push(SlackField::short("Exit code", code.to_string()));
            }
            if let Some(reason) = &failure.reason {
                fields.push(SlackField::short("Reason", reason.clone()));
            }
        }

        if let Some(suggestion) = &notification.suggestion {
            fields.push(SlackField {
                title: "Suggested fix".to_string(),
                value: suggestion.clone(),
                short: false,
            });
        }

        SlackPayload {
            channel: self.channel.clone(),
            username: self.username.clone(),
            attachments: vec![SlackAttachment {
                fallback: notification.title(),
                color: Self::color(notification).to_string(),
                title: notification.title(),
                text: notification.message.clone(),
                fields,
                footer: format!("monitor {}", notification.monitor),
                ts: notification.timestamp.timestamp(),
            }],
        }
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn send(&self, notification: &AlertNotification) -> Result<(), ChannelError> {
        let payload = self.payload(notification);
        debug!(channel = "slack", alert = %notification.dedup_key(), "Sending notification");

        let response = self.client.post(&self.webhook_url).json(&payload).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        warn!(channel = "slack", %status, body = %body, "Slack webhook rejected notification");
        Err(ChannelError::Status {
            status: status.as_u16(),
            body,
        })
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::Slack
    }
}

#[derive(Debug, Serialize)]
struct SlackPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    attachments: Vec<SlackAttachment>,
}

#[derive(Debug, Serialize)]
struct SlackAttachment {
    fallback: String,
    color: String,
    title: String,
    text: String,
    fields: Vec<SlackField>,
    footer: String,
    ts: i64,
}

#[derive(Debug, Serialize)]
struct SlackField {
    title: String,
    value: String,
    short: bool,
}

impl SlackField {
    fn short(title: &str, value: String) -> Self {
        Self {
            title: title.to_string(),
            value,
            short: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mockito::Matcher;

    fn notifier(url: String) -> SlackNotifier {
        SlackNotifier::new(&SlackConfig {
            webhook_url: url,
            channel: Some("#alerts".to_string()),
            username: None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_posts_attachment() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .match_body(Matcher::AllOf(vec![
                Matcher::PartialJson(serde_json::json!({ "channel": "#alerts" })),
                Matcher::Regex("#3498db".to_string()),
            ]))
            .with_status(200)
            .with_body("ok")
            .create_async()
            .await;

        let notification = AlertNotification::test("ops", Utc::now());
        notifier(format!("{}/hook", server.url()))
            .send(&notification)
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/hook")
            .with_status(404)
            .with_body("no_service")
            .create_async()
            .await;

        let err = notifier(format!("{}/hook", server.url()))
            .send(&AlertNotification::test("ops", Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Status { status: 404, .. }));
    }

    #[test]
    fn test_resolved_uses_green() {
        let mut notification = AlertNotification::test("ops", Utc::now());
        notification.kind = NotificationKind::Resolved;
        assert_eq!(SlackNotifier::color(&notification), "#2eb886");
    }
}
