//! Maintenance window checks

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use guardian_lib::models::MonitorRef;
use guardian_lib::policy::{parse_duration, MaintenanceWindow, PolicyFile};
use guardian_lib::schedule::{ActiveWindow, MaintenanceWindowGuard};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{format_timestamp, print_json, print_success, print_table, print_warning, OutputFormat};

/// Where the windows under test come from
pub enum WindowSource<'a> {
    Monitor { policy: &'a PolicyFile, monitor: &'a str },
    AdHoc {
        schedule: &'a str,
        duration: &'a str,
        timezone: Option<&'a str>,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowReport {
    pub at: DateTime<Utc>,
    pub windows: usize,
    pub active: Vec<ActiveWindow>,
    /// Alerts raised at `at` would be held back
    pub suppressed: bool,
    pub errors: Vec<String>,
}

#[derive(Tabled)]
struct WindowRow {
    #[tabled(rename = "Window")]
    name: String,
    #[tabled(rename = "Started")]
    started_at: String,
    #[tabled(rename = "Ends")]
    ends_at: String,
    #[tabled(rename = "Suppresses")]
    suppress: String,
}

fn windows(source: &WindowSource<'_>) -> Result<Vec<MaintenanceWindow>> {
    match source {
        WindowSource::Monitor { policy, monitor } => {
            let reference = MonitorRef::parse(monitor);
            let spec = policy
                .monitor(&reference)
                .with_context(|| format!("Monitor '{}' not found in policy", reference))?;
            Ok(spec.alerting.maintenance_windows.clone())
        }
        WindowSource::AdHoc {
            schedule,
            duration,
            timezone,
        } => Ok(vec![MaintenanceWindow {
            name: Some("ad-hoc".to_string()),
            schedule: schedule.to_string(),
            duration: parse_duration(duration)
                .with_context(|| format!("Invalid duration '{}'", duration))?,
            timezone: timezone.map(str::to_string),
            suppress_alerts: true,
        }]),
    }
}

pub fn build_report(source: &WindowSource<'_>, at: DateTime<Utc>) -> Result<WindowReport> {
    let windows = windows(source)?;
    let (guard, errors) = MaintenanceWindowGuard::compile(&windows);
    let active = guard.active_windows(at);

    Ok(WindowReport {
        at,
        windows: windows.len(),
        suppressed: active.iter().any(|w| w.suppress_alerts),
        active,
        errors: errors.iter().map(ToString::to_string).collect(),
    })
}

/// Report which windows are open at an instant
pub fn check(source: &WindowSource<'_>, at: DateTime<Utc>, format: OutputFormat) -> Result<()> {
    let report = build_report(source, at)?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            for error in &report.errors {
                print_warning(error);
            }
            println!(
                "Checked {} window(s) at {}",
                report.windows,
                format_timestamp(&report.at).cyan()
            );
            let rows = report
                .active
                .iter()
                .map(|w| WindowRow {
                    name: w.name.clone(),
                    started_at: format_timestamp(&w.started_at),
                    ends_at: format_timestamp(&w.ends_at),
                    suppress: if w.suppress_alerts { "yes" } else { "no" }.to_string(),
                })
                .collect();
            print_table(rows, "No maintenance window is open");
            if report.suppressed {
                print_warning("Alerts are suppressed at this instant");
            } else {
                print_success("Alerts would be delivered at this instant");
            }
        }
    }

    Ok(())
}
