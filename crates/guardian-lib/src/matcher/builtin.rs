//! Built-in suggested-fix patterns
//!
//! Priorities stay within 1..=100 so custom patterns (150 by default) win.

use crate::policy::{ExitCodeRange, PatternMatch, PatternSpec};

fn pattern(name: &str, priority: i32, matcher: PatternMatch, suggestion: &str) -> PatternSpec {
    PatternSpec {
        name: name.to_string(),
        matcher,
        suggestion: suggestion.to_string(),
        priority,
    }
}

fn reason(value: &str) -> PatternMatch {
    PatternMatch {
        reason: Some(value.to_string()),
        ..Default::default()
    }
}

fn exit_code(code: i32) -> PatternMatch {
    PatternMatch {
        exit_code: Some(code),
        ..Default::default()
    }
}

fn logs(re: &str) -> PatternMatch {
    PatternMatch {
        log_pattern: Some(re.to_string()),
        ..Default::default()
    }
}

fn events(re: &str) -> PatternMatch {
    PatternMatch {
        event_pattern: Some(re.to_string()),
        ..Default::default()
    }
}

pub fn builtin_patterns() -> Vec<PatternSpec> {
    vec![
        pattern(
            "oom-killed",
            100,
            reason("OOMKilled"),
            "Container ran out of memory. Raise the memory limit of {{ namespace }}/{{ job_name }} \
             or reduce its working set.",
        ),
        pattern(
            "sigkill",
            95,
            exit_code(137),
            "Process was killed with SIGKILL (exit 137), usually by the OOM killer or a \
             liveness probe. Check memory usage of run {{ job_run }}.",
        ),
        pattern(
            "deadline-exceeded",
            90,
            reason("DeadlineExceeded"),
            "Run {{ job_run }} exceeded activeDeadlineSeconds. Increase the deadline or speed up \
             the job.",
        ),
        pattern(
            "backoff-limit-exceeded",
            85,
            reason("BackoffLimitExceeded"),
            "Job reached its backoffLimit. Inspect logs of the failed pods: \
             kubectl logs -n {{ namespace }} job/{{ job_run }}",
        ),
        pattern(
            "image-pull-failure",
            80,
            events("(?i)(ErrImagePull|ImagePullBackOff|Failed to pull image)"),
            "Image could not be pulled. Verify the image reference and imagePullSecrets in \
             namespace {{ namespace }}.",
        ),
        pattern(
            "container-config-error",
            75,
            events("(?i)CreateContainerConfigError"),
            "Container configuration is invalid. Check referenced ConfigMaps and Secrets exist \
             in {{ namespace }}.",
        ),
        pattern(
            "sigterm",
            70,
            exit_code(143),
            "Process received SIGTERM (exit 143). The pod was likely evicted or preempted.",
        ),
        pattern(
            "sigsegv",
            65,
            exit_code(139),
            "Process crashed with a segmentation fault (exit 139).",
        ),
        pattern(
            "permission-denied",
            50,
            logs("(?i)permission denied"),
            "Permission denied. Check securityContext, volume ownership and the RBAC of the \
             job's service account.",
        ),
        pattern(
            "connection-refused",
            45,
            logs("(?i)connection refused"),
            "A dependency refused the connection. Verify the target service is up and reachable \
             from {{ namespace }}.",
        ),
        pattern(
            "dns-failure",
            40,
            logs("(?i)(no such host|name or service not known|temporary failure in name resolution)"),
            "DNS lookup failed. Check the service name and cluster DNS.",
        ),
        pattern(
            "generic-failure",
            1,
            PatternMatch {
                exit_code_range: Some(ExitCodeRange { min: 1, max: 255 }),
                ..Default::default()
            },
            "{{ job_name }} exited with code {{ exit_code }}. Check the logs of run {{ job_run }}.",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::CompiledPattern;
    use std::collections::HashSet;

    #[test]
    fn test_builtins_compile_with_unique_names() {
        let patterns = builtin_patterns();
        let mut names = HashSet::new();
        for spec in &patterns {
            assert!(CompiledPattern::compile(spec).is_ok(), "{}", spec.name);
            assert!((1..=100).contains(&spec.priority));
            assert!(names.insert(spec.name.clone()));
        }
    }
}
