//! Suggested-fix pattern testing

use anyhow::{Context, Result};
use colored::Colorize;
use guardian_lib::matcher::{builtin_patterns, test_pattern, PatternSet, Suggestion};
use guardian_lib::models::{FailureContext, MonitorRef};
use guardian_lib::policy::{PatternSpec, PolicyFile};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{print_header, print_info, print_json, print_table, print_warning, OutputFormat};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternEvaluation {
    pub pattern: String,
    pub priority: i32,
    pub builtin: bool,
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rendered_suggestion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternReport {
    /// What the engine would attach to an alert for this failure
    pub suggestion: Option<Suggestion>,
    pub evaluations: Vec<PatternEvaluation>,
}

#[derive(Tabled)]
struct EvaluationRow {
    #[tabled(rename = "Pattern")]
    pattern: String,
    #[tabled(rename = "Priority")]
    priority: i32,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Matched")]
    matched: String,
}

/// Custom patterns of a monitor; empty when no monitor is named
pub fn custom_patterns(policy: Option<&PolicyFile>, monitor: Option<&str>) -> Result<Vec<PatternSpec>> {
    let Some(monitor) = monitor else {
        return Ok(Vec::new());
    };
    let policy = policy.context("--monitor needs a policy file")?;
    let reference = MonitorRef::parse(monitor);
    let spec = policy
        .monitor(&reference)
        .with_context(|| format!("Monitor '{}' not found in policy", reference))?;
    Ok(spec.alerting.suggested_fix_patterns.clone())
}

pub fn build_report(custom: &[PatternSpec], sample: &FailureContext) -> PatternReport {
    let (set, _) = PatternSet::with_builtins(custom);

    let mut evaluations: Vec<PatternEvaluation> = builtin_patterns()
        .iter()
        .map(|p| (p, true))
        .chain(custom.iter().map(|p| (p, false)))
        .map(|(spec, builtin)| {
            let result = test_pattern(spec, sample);
            PatternEvaluation {
                pattern: spec.name.clone(),
                priority: spec.priority,
                builtin,
                matched: result.matched,
                rendered_suggestion: result.rendered_suggestion,
                error: result.error,
            }
        })
        .collect();
    evaluations.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.pattern.cmp(&b.pattern)));

    PatternReport {
        suggestion: set.suggest(sample),
        evaluations,
    }
}

/// Run a failure sample through the built-in and custom patterns
pub fn test(custom: &[PatternSpec], sample: &FailureContext, format: OutputFormat) -> Result<()> {
    let report = build_report(custom, sample);

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            print_header("Suggested Fix");
            match &report.suggestion {
                Some(s) => {
                    println!("Pattern:    {}", s.pattern.cyan());
                    println!("Suggestion: {}", s.text);
                }
                None => print_info("No pattern matched this failure"),
            }
            println!();

            for e in report.evaluations.iter().filter(|e| e.error.is_some()) {
                print_warning(&format!(
                    "{}: {}",
                    e.pattern,
                    e.error.as_deref().unwrap_or_default()
                ));
            }
            let rows = report
                .evaluations
                .iter()
                .map(|e| EvaluationRow {
                    pattern: e.pattern.clone(),
                    priority: e.priority,
                    source: if e.builtin { "built-in" } else { "custom" }.to_string(),
                    matched: if e.matched {
                        "yes".green().to_string()
                    } else {
                        "no".to_string()
                    },
                })
                .collect();
            print_table(rows, "No patterns defined");
        }
    }

    Ok(())
}
