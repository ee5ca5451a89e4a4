//! Compiled suggested-fix patterns

use regex::Regex;

use crate::error::{GuardianError, Result};
use crate::models::FailureContext;
use crate::policy::PatternSpec;

/// A single condition on the failure context
#[derive(Debug, Clone)]
pub enum Predicate {
    ExitCode(i32),
    ExitCodeRange { min: i32, max: i32 },
    Reason(String),
    ReasonRegex(Regex),
    LogRegex(Regex),
    EventRegex(Regex),
}

impl Predicate {
    pub fn evaluate(&self, ctx: &FailureContext) -> bool {
        match self {
            Predicate::ExitCode(code) => ctx.exit_code == Some(*code),
            Predicate::ExitCodeRange { min, max } => ctx
                .exit_code
                .map(|code| (*min..=*max).contains(&code))
                .unwrap_or(false),
            Predicate::Reason(reason) => ctx.reason.as_deref() == Some(reason.as_str()),
            Predicate::ReasonRegex(re) => ctx.reason.as_deref().is_some_and(|r| re.is_match(r)),
            Predicate::LogRegex(re) => ctx.logs.as_deref().is_some_and(|l| re.is_match(l)),
            Predicate::EventRegex(re) => ctx.events.iter().any(|e| re.is_match(e)),
        }
    }
}

/// A pattern whose regexes have been compiled
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub name: String,
    pub priority: i32,
    pub suggestion: String,
    predicates: Vec<Predicate>,
}

impl CompiledPattern {
    pub fn compile(spec: &PatternSpec) -> Result<Self> {
        let m = &spec.matcher;
        let mut predicates = Vec::new();

        if let Some(code) = m.exit_code {
            predicates.push(Predicate::ExitCode(code));
        }
        if let Some(range) = m.exit_code_range {
            if range.min > range.max {
                return Err(GuardianError::invalid_pattern(
                    &spec.name,
                    format!("exit code range {}..{} is empty", range.min, range.max),
                ));
            }
            predicates.push(Predicate::ExitCodeRange {
                min: range.min,
                max: range.max,
            });
        }
        if let Some(reason) = &m.reason {
            predicates.push(Predicate::Reason(reason.clone()));
        }
        if let Some(re) = &m.reason_pattern {
            predicates.push(Predicate::ReasonRegex(compile_regex(&spec.name, re)?));
        }
        if let Some(re) = &m.log_pattern {
            predicates.push(Predicate::LogRegex(compile_regex(&spec.name, re)?));
        }
        if let Some(re) = &m.event_pattern {
            predicates.push(Predicate::EventRegex(compile_regex(&spec.name, re)?));
        }

        Ok(Self {
            name: spec.name.clone(),
            priority: spec.priority,
            suggestion: spec.suggestion.clone(),
            predicates,
        })
    }

    /// All predicates hold; a pattern without predicates never matches
    pub fn matches(&self, ctx: &FailureContext) -> bool {
        !self.predicates.is_empty() && self.predicates.iter().all(|p| p.evaluate(ctx))
    }
}

fn compile_regex(pattern_name: &str, source: &str) -> Result<Regex> {
    Regex::new(source).map_err(|e| GuardianError::invalid_pattern(pattern_name, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{ExitCodeRange, PatternMatch};

    fn spec(matcher: PatternMatch) -> PatternSpec {
        PatternSpec {
            name: "p".to_string(),
            matcher,
            suggestion: "fix it".to_string(),
            priority: 150,
        }
    }

    fn ctx() -> FailureContext {
        FailureContext {
            namespace: "batch".to_string(),
            job_name: "etl".to_string(),
            job_run: Some("etl-123".to_string()),
            exit_code: Some(1),
            reason: Some("Error".to_string()),
            logs: Some("FATAL: connection refused by upstream".to_string()),
            events: vec!["Pulled image".to_string(), "Started container".to_string()],
        }
    }

    #[test]
    fn test_all_predicates_must_hold() {
        let both = CompiledPattern::compile(&spec(PatternMatch {
            exit_code: Some(1),
            log_pattern: Some("connection refused".to_string()),
            ..Default::default()
        }))
        .unwrap();
        assert!(both.matches(&ctx()));

        let mismatch = CompiledPattern::compile(&spec(PatternMatch {
            exit_code: Some(2),
            log_pattern: Some("connection refused".to_string()),
            ..Default::default()
        }))
        .unwrap();
        assert!(!mismatch.matches(&ctx()));
    }

    #[test]
    fn test_empty_pattern_never_matches() {
        let empty = CompiledPattern::compile(&spec(PatternMatch::default())).unwrap();
        assert!(!empty.matches(&ctx()));
    }

    #[test]
    fn test_range_reason_and_events() {
        let pattern = CompiledPattern::compile(&spec(PatternMatch {
            exit_code_range: Some(ExitCodeRange { min: 1, max: 5 }),
            reason: Some("Error".to_string()),
            event_pattern: Some("^Started".to_string()),
            ..Default::default()
        }))
        .unwrap();
        assert!(pattern.matches(&ctx()));

        let mut no_exit = ctx();
        no_exit.exit_code = None;
        assert!(!pattern.matches(&no_exit));
    }

    #[test]
    fn test_invalid_regex_and_range() {
        let err = CompiledPattern::compile(&spec(PatternMatch {
            reason_pattern: Some("[".to_string()),
            ..Default::default()
        }))
        .unwrap_err();
        assert!(matches!(err, GuardianError::InvalidPattern { .. }));

        let err = CompiledPattern::compile(&spec(PatternMatch {
            exit_code_range: Some(ExitCodeRange { min: 5, max: 1 }),
            ..Default::default()
        }))
        .unwrap_err();
        assert!(matches!(err, GuardianError::InvalidPattern { .. }));
    }
}
