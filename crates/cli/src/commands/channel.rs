//! Channel connectivity tests

use anyhow::{Context, Result};
use chrono::Utc;
use guardian_lib::alerting::ChannelTestResult;
use guardian_lib::channels::{AlertNotification, Notifier};
use guardian_lib::policy::PolicyFile;

use crate::output::{print_error, print_json, print_success, OutputFormat};

/// Build a channel from policy and send it a test notification
pub async fn run_test(policy: &PolicyFile, name: &str) -> Result<ChannelTestResult> {
    let spec = policy
        .channel(name)
        .with_context(|| format!("Channel '{}' not found in policy", name))?;
    let notifier = match spec.build() {
        Ok(notifier) => notifier,
        Err(e) => {
            return Ok(ChannelTestResult {
                success: false,
                message: format!("channel configuration invalid: {}", e),
            })
        }
    };

    let notification = AlertNotification::test(name, Utc::now());
    Ok(match notifier.send(&notification).await {
        Ok(()) => ChannelTestResult {
            success: true,
            message: format!("test notification delivered via {}", spec.kind().as_str()),
        },
        Err(e) => ChannelTestResult {
            success: false,
            message: e.to_string(),
        },
    })
}

pub async fn test(policy: &PolicyFile, name: &str, format: OutputFormat) -> Result<()> {
    let result = run_test(policy, name).await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table if result.success => print_success(&result.message),
        OutputFormat::Table => print_error(&result.message),
    }

    if !result.success {
        anyhow::bail!("Channel '{}' test failed", name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(url: &str) -> PolicyFile {
        PolicyFile::from_yaml(&format!(
            r#"
channels:
  - name: hook
    type: webhook
    url: {url}/notify
  - name: pager
    type: pagerduty
    routingKey: ""
"#
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn test_webhook_delivery() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/notify")
            .with_status(200)
            .create_async()
            .await;

        let result = run_test(&policy(&server.url()), "hook").await.unwrap();
        assert!(result.success, "{}", result.message);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_delivery_and_bad_config() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/notify")
            .with_status(500)
            .create_async()
            .await;
        let policy = policy(&server.url());

        assert!(!run_test(&policy, "hook").await.unwrap().success);
        let pager = run_test(&policy, "pager").await.unwrap();
        assert!(!pager.success);
        assert!(pager.message.contains("invalid"));
        assert!(run_test(&policy, "missing").await.is_err());
    }
}
