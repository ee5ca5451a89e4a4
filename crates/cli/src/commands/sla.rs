//! SLA snapshot display

use anyhow::Result;
use colored::Colorize;
use guardian_lib::models::JobRef;

use crate::client::ApiClient;
use crate::output::{format_percent, format_secs, format_timestamp, print_header, print_json, OutputFormat};

pub async fn show(client: &ApiClient, job: &str, format: OutputFormat) -> Result<()> {
    let job = JobRef::parse(job);
    let snapshot = client.sla_snapshot(&job.namespace, &job.name).await?;

    match format {
        OutputFormat::Json => print_json(&snapshot)?,
        OutputFormat::Table => {
            print_header("SLA Snapshot");
            println!("Job:           {}", snapshot.job.to_string().cyan());
            println!("Monitor:       {}", snapshot.monitor);
            println!("Computed:      {}", format_timestamp(&snapshot.computed_at));
            println!();
            println!("{} (last {} days)", "Window".bold(), snapshot.window_days);
            println!("{}", "-".repeat(50));
            println!(
                "Runs:          {} ({} succeeded, {} failed)",
                snapshot.total, snapshot.succeeded, snapshot.failed
            );
            println!("Success Rate:  {}", format_percent(snapshot.success_rate));
            println!(
                "Duration:      p50 {}  p95 {}  p99 {}",
                format_secs(snapshot.p50_secs),
                format_secs(snapshot.p95_secs),
                format_secs(snapshot.p99_secs)
            );
            println!("Last Run:      {}", format_secs(snapshot.last_duration_secs));
            println!();
            println!("{}", "Baseline".bold());
            println!("{}", "-".repeat(50));
            println!("Runs:          {}", snapshot.baseline_total);
            println!("Success Rate:  {}", format_percent(snapshot.baseline_success_rate));
            println!("p95:           {}", format_secs(snapshot.baseline_p95_secs));
            println!("Regression:    {}", format_percent(snapshot.regression_pct));
            println!("Trend:         {:?}", snapshot.trend);
        }
    }

    Ok(())
}
