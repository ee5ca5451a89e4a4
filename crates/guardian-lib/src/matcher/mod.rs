//! Suggested-fix matching
//!
//! A [`PatternSet`] is an immutable, priority-sorted snapshot of the built-in
//! patterns merged with a monitor's custom ones. Matching walks the snapshot
//! and stops at the first pattern whose predicates all hold.

mod builtin;
mod pattern;

pub use builtin::builtin_patterns;
pub use pattern::{CompiledPattern, Predicate};

use minijinja::{context, Environment};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::error::GuardianError;
use crate::models::FailureContext;
use crate::policy::PatternSpec;

/// Suggestion chosen for a failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub pattern: String,
    pub priority: i32,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Arc<Vec<CompiledPattern>>,
}

impl PatternSet {
    /// Compile patterns, skipping and reporting those that fail
    pub fn compile(specs: &[PatternSpec]) -> (Self, Vec<GuardianError>) {
        let mut patterns = Vec::with_capacity(specs.len());
        let mut errors = Vec::new();

        for spec in specs {
            match CompiledPattern::compile(spec) {
                Ok(p) => patterns.push(p),
                Err(e) => {
                    warn!(pattern = %spec.name, error = %e, "Skipping invalid pattern");
                    errors.push(e);
                }
            }
        }

        patterns.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.name.cmp(&b.name)));

        (
            Self {
                patterns: Arc::new(patterns),
            },
            errors,
        )
    }

    /// Built-ins plus `custom`; a custom pattern replaces a built-in of the same name
    pub fn with_builtins(custom: &[PatternSpec]) -> (Self, Vec<GuardianError>) {
        let mut specs: Vec<PatternSpec> = builtin_patterns()
            .into_iter()
            .filter(|b| !custom.iter().any(|c| c.name == b.name))
            .collect();
        specs.extend_from_slice(custom);
        Self::compile(&specs)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Pattern names in evaluation order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|p| p.name.as_str())
    }

    /// First matching pattern, with its suggestion rendered
    pub fn suggest(&self, ctx: &FailureContext) -> Option<Suggestion> {
        let pattern = self.patterns.iter().find(|p| p.matches(ctx))?;
        Some(Suggestion {
            pattern: pattern.name.clone(),
            priority: pattern.priority,
            text: render_suggestion(&pattern.suggestion, ctx),
        })
    }
}

/// Substitute failure-context variables into a suggestion template.
///
/// Unknown variables render empty; a template that fails to render is
/// returned as written.
pub fn render_suggestion(template: &str, ctx: &FailureContext) -> String {
    let env = Environment::new();
    let vars = context! {
        namespace => &ctx.namespace,
        name => &ctx.job_name,
        job_name => &ctx.job_name,
        job_run => ctx.job_run.clone().unwrap_or_default(),
        exit_code => ctx.exit_code.map(|c| c.to_string()).unwrap_or_default(),
        reason => ctx.reason.clone().unwrap_or_default(),
    };

    match env.render_str(template, vars) {
        Ok(rendered) => rendered,
        Err(e) => {
            warn!(error = %e, "Failed to render suggestion template");
            template.to_string()
        }
    }
}

/// Outcome of evaluating a single pattern against a sample
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternTestResult {
    pub matched: bool,
    pub rendered_suggestion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Evaluate one pattern in isolation; compile errors are reported, not raised
pub fn test_pattern(spec: &PatternSpec, sample: &FailureContext) -> PatternTestResult {
    match CompiledPattern::compile(spec) {
        Ok(pattern) if pattern.matches(sample) => PatternTestResult {
            matched: true,
            rendered_suggestion: Some(render_suggestion(&pattern.suggestion, sample)),
            error: None,
        },
        Ok(_) => PatternTestResult {
            matched: false,
            rendered_suggestion: None,
            error: None,
        },
        Err(e) => PatternTestResult {
            matched: false,
            rendered_suggestion: None,
            error: Some(e.to_string()),
        },
    }
}
