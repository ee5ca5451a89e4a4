//! Alert queries against a running guardian

use anyhow::Result;
use guardian_lib::alerting::ActiveAlert;
use tabled::Tabled;

use crate::client::{AlertQuery, ApiClient};
use crate::output::{color_status, format_timestamp, print_json, print_table, OutputFormat};

#[derive(Tabled)]
struct AlertRow {
    #[tabled(rename = "Job")]
    job: String,
    #[tabled(rename = "Type")]
    alert_type: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Since")]
    since: String,
    #[tabled(rename = "Message")]
    message: String,
}

impl From<&ActiveAlert> for AlertRow {
    fn from(alert: &ActiveAlert) -> Self {
        Self {
            job: alert.job.to_string(),
            alert_type: alert.alert_type.to_string(),
            state: color_status(alert.state.as_str()),
            severity: color_status(alert.severity.as_str()),
            since: format_timestamp(&alert.since),
            message: alert.context.message.clone(),
        }
    }
}

pub async fn list(client: &ApiClient, query: &AlertQuery, format: OutputFormat) -> Result<()> {
    let alerts = client.active_alerts(query).await?;

    match format {
        OutputFormat::Json => print_json(&alerts)?,
        OutputFormat::Table => {
            print_table(alerts.iter().map(AlertRow::from).collect(), "No active alerts");
            let suggestions: Vec<_> = alerts
                .iter()
                .filter_map(|a| a.suggestion.as_ref().map(|s| (a, s)))
                .collect();
            if !suggestions.is_empty() {
                println!();
                for (alert, suggestion) in suggestions {
                    println!("{} ({}): {}", alert.job, suggestion.pattern, suggestion.text);
                }
            }
        }
    }

    Ok(())
}

pub async fn history(client: &ApiClient, query: &AlertQuery, format: OutputFormat) -> Result<()> {
    let page = client.alert_history(query).await?;

    match format {
        OutputFormat::Json => print_json(&page)?,
        OutputFormat::Table => {
            print_table(page.items.iter().map(AlertRow::from).collect(), "No resolved alerts");
            println!(
                "\nShowing {}-{} of {}",
                page.offset + 1.min(page.items.len()),
                page.offset + page.items.len(),
                page.total
            );
        }
    }

    Ok(())
}
