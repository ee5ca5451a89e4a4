//! API client for a running guardian

use anyhow::{Context, Result};
use guardian_lib::{alerting::ActiveAlert, monitor::SlaSnapshot, store::Page};
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use url::Url;

/// API client for the guardian query API
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

/// Query parameters understood by the alert endpoints
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub alert_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned, Q: Serialize + ?Sized>(&self, path: &str, query: &Q) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }

    pub async fn active_alerts(&self, query: &AlertQuery) -> Result<Vec<ActiveAlert>> {
        self.get("api/v1/alerts", query).await
    }

    pub async fn alert_history(&self, query: &AlertQuery) -> Result<Page<ActiveAlert>> {
        self.get("api/v1/alerts/history", query).await
    }

    pub async fn sla_snapshot(&self, namespace: &str, name: &str) -> Result<SlaSnapshot> {
        let path = format!("api/v1/sla/{}/{}", namespace, name);
        self.get(&path, &[] as &[(&str, &str)]).await
    }
}
