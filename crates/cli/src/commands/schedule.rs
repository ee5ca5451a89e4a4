//! Cron schedule inspection

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use guardian_lib::policy::{format_duration, parse_duration};
use guardian_lib::schedule::{expected_interval, CronSchedule, IntervalEstimator};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{format_timestamp, print_header, print_json, print_table, OutputFormat};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalReport {
    pub schedule: String,
    pub timezone: String,
    pub period_secs: u64,
    pub missed_schedule_threshold: u32,
    pub buffer_secs: u64,
    /// Dead-man's switch deadline after a success
    pub expected_interval_secs: u64,
    pub next_runs: Vec<DateTime<Utc>>,
}

#[derive(Tabled)]
struct RunRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Scheduled At")]
    at: String,
}

pub fn build_report(
    schedule: &str,
    timezone: Option<&str>,
    threshold: u32,
    buffer: &str,
    next: usize,
    now: DateTime<Utc>,
) -> Result<IntervalReport> {
    let buffer = parse_duration(buffer).with_context(|| format!("Invalid buffer '{}'", buffer))?;
    let cron = CronSchedule::parse(schedule, timezone)?;
    let period = IntervalEstimator::default().period(&cron, now)?;
    let threshold = threshold.max(1);

    Ok(IntervalReport {
        schedule: schedule.to_string(),
        timezone: cron.timezone().to_string(),
        period_secs: period.as_secs(),
        missed_schedule_threshold: threshold,
        buffer_secs: buffer.as_secs(),
        expected_interval_secs: expected_interval(period, threshold, buffer).as_secs(),
        next_runs: cron.upcoming(now).take(next).collect(),
    })
}

/// Show the estimated period and dead-man deadline of a schedule
pub fn show_interval(
    schedule: &str,
    timezone: Option<&str>,
    threshold: u32,
    buffer: &str,
    next: usize,
    format: OutputFormat,
) -> Result<()> {
    let report = build_report(schedule, timezone, threshold, buffer, next, Utc::now())?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            let secs = std::time::Duration::from_secs;
            print_header("Schedule Interval");
            println!("Schedule:          {}", report.schedule.cyan());
            println!("Timezone:          {}", report.timezone);
            println!("Period:            {}", format_duration(secs(report.period_secs)));
            println!(
                "Deadline:          {} ({} missed runs + {} buffer)",
                format_duration(secs(report.expected_interval_secs)).bold(),
                report.missed_schedule_threshold,
                format_duration(secs(report.buffer_secs))
            );
            println!();
            let rows = report
                .next_runs
                .iter()
                .enumerate()
                .map(|(i, at)| RunRow {
                    index: i + 1,
                    at: format_timestamp(at),
                })
                .collect();
            print_table(rows, "No upcoming runs");
        }
    }

    Ok(())
}
