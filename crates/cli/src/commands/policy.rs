//! Offline policy validation

use anyhow::Result;
use guardian_lib::policy::PolicyFile;
use serde::Serialize;

use crate::output::{print_error, print_header, print_json, print_success, OutputFormat};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub valid: bool,
    pub monitors: usize,
    pub channels: usize,
    pub jobs: usize,
    pub issues: Vec<String>,
}

/// Everything the engine would complain about when loading this policy,
/// including channels that cannot be built
pub fn build_report(policy: &PolicyFile) -> ValidationReport {
    let mut issues: Vec<String> = policy.validate().iter().map(ToString::to_string).collect();
    for channel in &policy.channels {
        if let Err(e) = channel.build() {
            issues.push(format!("channel '{}': {}", channel.name, e));
        }
    }

    ValidationReport {
        valid: issues.is_empty(),
        monitors: policy.monitors.len(),
        channels: policy.channels.len(),
        jobs: policy.jobs.len(),
        issues,
    }
}

pub fn validate(policy: &PolicyFile, format: OutputFormat) -> Result<()> {
    let report = build_report(policy);

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            print_header("Policy");
            println!("Monitors: {}", report.monitors);
            println!("Channels: {}", report.channels);
            println!("Jobs:     {}", report.jobs);
            println!();
            if report.valid {
                print_success("Policy is valid");
            }
            for issue in &report.issues {
                print_error(issue);
            }
        }
    }

    if !report.valid {
        anyhow::bail!("Policy has {} problem(s)", report.issues.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_policy() {
        let policy = PolicyFile::from_yaml(
            r#"
monitors:
  - namespace: batch
    name: nightly
    alerting:
      channelRefs:
        - name: hook
channels:
  - name: hook
    type: webhook
    url: http://alerts.internal/hook
jobs:
  - job: { namespace: batch, name: report }
    monitor: { namespace: batch, name: nightly }
    schedule: "30 1 * * *"
"#,
        )
        .unwrap();

        let report = build_report(&policy);
        assert!(report.valid, "{:?}", report.issues);
        assert_eq!((report.monitors, report.channels, report.jobs), (1, 1, 1));
    }

    #[test]
    fn test_problems_are_collected() {
        let policy = PolicyFile::from_yaml(
            r#"
monitors:
  - namespace: batch
    name: nightly
    alerting:
      channelRefs:
        - name: missing
      suggestedFixPatterns:
        - name: bad
          match: { logPattern: "(" }
          suggestion: never
channels:
  - name: pager
    type: pagerduty
    routingKey: ""
jobs:
  - job: { namespace: batch, name: report }
    monitor: { namespace: batch, name: other }
    schedule: "61 * * * *"
"#,
        )
        .unwrap();

        let report = build_report(&policy);
        assert!(!report.valid);
        // missing channel, bad pattern, unknown monitor, bad schedule, bad channel
        assert_eq!(report.issues.len(), 5, "{:?}", report.issues);
        assert!(validate(&policy, OutputFormat::Json).is_err());
    }
}
