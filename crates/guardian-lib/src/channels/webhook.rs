//! Generic JSON webhook channel

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::{AlertNotification, ChannelError, ChannelKind, Notifier};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfig {
    pub url: String,
    /// HTTP method, `POST` when unset
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Posts the notification as JSON. `${VAR}` references in the URL and
/// header values are expanded once, when the channel is built.
#[derive(Debug)]
pub struct WebhookNotifier {
    url: String,
    method: reqwest::Method,
    headers: Vec<(String, String)>,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(config: &WebhookConfig) -> Result<Self, ChannelError> {
        let method = match &config.method {
            Some(m) => m
                .to_uppercase()
                .parse::<reqwest::Method>()
                .map_err(|_| ChannelError::Config(format!("invalid HTTP method: {}", m)))?,
            None => reqwest::Method::POST,
        };

        let headers = config
            .headers
            .iter()
            .map(|(k, v)| Ok((k.clone(), resolve_env_vars(v)?)))
            .collect::<Result<Vec<_>, ChannelError>>()?;

        Ok(Self {
            url: resolve_env_vars(&config.url)?,
            method,
            headers,
            client: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &AlertNotification) -> Result<(), ChannelError> {
        let mut request = self
            .client
            .request(self.method.clone(), &self.url)
            .json(notification);
        for (key, value) in &self.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            debug!(channel = "webhook", url = %self.url, %status, "Webhook notification delivered");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        warn!(channel = "webhook", url = %self.url, %status, body = %body, "Webhook returned non-2xx status");
        Err(ChannelError::Status {
            status: status.as_u16(),
            body,
        })
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::Webhook
    }
}

/// Expand `${VAR}` references from the process environment
pub fn resolve_env_vars(input: &str) -> Result<String, ChannelError> {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| ChannelError::Config(format!("unclosed env var reference in: {}", input)))?;
        let name = &after[..end];
        let value = std::env::var(name)
            .map_err(|_| ChannelError::Config(format!("env var not found: {}", name)))?;
        result.push_str(&value);
        rest = &after[end + 1..];
    }
    result.push_str(rest);

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mockito::Matcher;

    #[test]
    fn test_resolve_env_vars() {
        std::env::set_var("GUARDIAN_TEST_HOOK_HOST", "hooks.internal");
        assert_eq!(
            resolve_env_vars("https://${GUARDIAN_TEST_HOOK_HOST}/a").unwrap(),
            "https://hooks.internal/a"
        );
        assert_eq!(resolve_env_vars("plain").unwrap(), "plain");
        assert!(resolve_env_vars("${GUARDIAN_TEST_DEFINITELY_UNSET_9}").is_err());
        assert!(resolve_env_vars("https://${UNCLOSED/x").is_err());
    }

    #[test]
    fn test_invalid_method() {
        let result = WebhookNotifier::new(&WebhookConfig {
            url: "https://example.com".to_string(),
            method: Some("NOT A METHOD".to_string()),
            headers: BTreeMap::new(),
        });
        assert!(matches!(result, Err(ChannelError::Config(_))));
    }

    #[tokio::test]
    async fn test_sends_json_with_headers() {
        std::env::set_var("GUARDIAN_TEST_WEBHOOK_TOKEN", "s3cret");
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/alerts")
            .match_header("x-token", "s3cret")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "kind": "test",
                "alertType": "JobFailed",
                "job": { "namespace": "cronjob-guardian", "name": "channel-test" }
            })))
            .with_status(204)
            .create_async()
            .await;

        let mut headers = BTreeMap::new();
        headers.insert(
            "X-Token".to_string(),
            "${GUARDIAN_TEST_WEBHOOK_TOKEN}".to_string(),
        );
        let notifier = WebhookNotifier::new(&WebhookConfig {
            url: format!("{}/alerts", server.url()),
            method: Some("put".to_string()),
            headers,
        })
        .unwrap();

        notifier
            .send(&AlertNotification::test("hook", Utc::now()))
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/alerts")
            .with_status(500)
            .create_async()
            .await;

        let notifier = WebhookNotifier::new(&WebhookConfig {
            url: format!("{}/alerts", server.url()),
            method: None,
            headers: BTreeMap::new(),
        })
        .unwrap();
        let err = notifier
            .send(&AlertNotification::test("hook", Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Status { status: 500, .. }));
    }
}
