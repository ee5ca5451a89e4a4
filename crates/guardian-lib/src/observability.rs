//! Observability infrastructure for the guardian engine
//!
//! Provides:
//! - Prometheus metrics (signals, deliveries, suppression, tick latency, channel readiness)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::alerting::{AlertKey, AlertType, Severity};
use crate::models::JobRef;

/// Histogram buckets for tick latency (in seconds)
const TICK_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<GuardianMetricsInner> = OnceLock::new();

struct GuardianMetricsInner {
    signals_received: IntCounterVec,
    notifications_sent: IntCounterVec,
    notifications_failed: IntCounterVec,
    notifications_rate_limited: IntCounterVec,
    alerts_suppressed: IntCounterVec,
    active_alerts: IntGauge,
    channel_ready: IntGaugeVec,
    tick_duration_seconds: HistogramVec,
    store_errors: IntCounter,
    invalid_schedules: IntCounter,
    invalid_patterns: IntCounter,
}

impl GuardianMetricsInner {
    fn new() -> Self {
        Self {
            signals_received: register_int_counter_vec!(
                "cronjob_guardian_signals_received_total",
                "Alert signals received by the dispatcher",
                &["alert_type"]
            )
            .expect("Failed to register signals_received"),

            notifications_sent: register_int_counter_vec!(
                "cronjob_guardian_notifications_sent_total",
                "Notifications delivered successfully",
                &["channel"]
            )
            .expect("Failed to register notifications_sent"),

            notifications_failed: register_int_counter_vec!(
                "cronjob_guardian_notifications_failed_total",
                "Notifications that failed after all retries",
                &["channel"]
            )
            .expect("Failed to register notifications_failed"),

            notifications_rate_limited: register_int_counter_vec!(
                "cronjob_guardian_notifications_rate_limited_total",
                "Notifications dropped by the channel token bucket",
                &["channel"]
            )
            .expect("Failed to register notifications_rate_limited"),

            alerts_suppressed: register_int_counter_vec!(
                "cronjob_guardian_alerts_suppressed_total",
                "Signals held back by a maintenance window",
                &["alert_type"]
            )
            .expect("Failed to register alerts_suppressed"),

            active_alerts: register_int_gauge!(
                "cronjob_guardian_active_alerts",
                "Alerts currently tracked by the dispatcher"
            )
            .expect("Failed to register active_alerts"),

            channel_ready: register_int_gauge_vec!(
                "cronjob_guardian_channel_ready",
                "1 when the channel accepts deliveries",
                &["channel"]
            )
            .expect("Failed to register channel_ready"),

            tick_duration_seconds: register_histogram_vec!(
                "cronjob_guardian_tick_duration_seconds",
                "Time spent in a monitor tick",
                &["monitor"],
                TICK_BUCKETS.to_vec()
            )
            .expect("Failed to register tick_duration_seconds"),

            store_errors: register_int_counter!(
                "cronjob_guardian_store_errors_total",
                "Failed execution/alert store operations"
            )
            .expect("Failed to register store_errors"),

            invalid_schedules: register_int_counter!(
                "cronjob_guardian_invalid_schedules_total",
                "Schedules that could not be parsed"
            )
            .expect("Failed to register invalid_schedules"),

            invalid_patterns: register_int_counter!(
                "cronjob_guardian_invalid_patterns_total",
                "Suggested-fix patterns skipped because they failed to compile"
            )
            .expect("Failed to register invalid_patterns"),
        }
    }
}

/// Handle to the global guardian metrics; clones share the same metrics
#[derive(Clone)]
pub struct GuardianMetrics {
    _private: (),
}

impl Default for GuardianMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl GuardianMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(GuardianMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &GuardianMetricsInner {
        GLOBAL_METRICS.get_or_init(GuardianMetricsInner::new)
    }

    pub fn inc_signals(&self, alert_type: AlertType) {
        self.inner()
            .signals_received
            .with_label_values(&[alert_type.as_str()])
            .inc();
    }

    pub fn inc_sent(&self, channel: &str) {
        self.inner().notifications_sent.with_label_values(&[channel]).inc();
    }

    pub fn inc_failed(&self, channel: &str) {
        self.inner().notifications_failed.with_label_values(&[channel]).inc();
    }

    pub fn inc_rate_limited(&self, channel: &str) {
        self.inner()
            .notifications_rate_limited
            .with_label_values(&[channel])
            .inc();
    }

    pub fn inc_suppressed(&self, alert_type: AlertType) {
        self.inner()
            .alerts_suppressed
            .with_label_values(&[alert_type.as_str()])
            .inc();
    }

    pub fn set_active_alerts(&self, count: usize) {
        self.inner().active_alerts.set(count as i64);
    }

    pub fn set_channel_ready(&self, channel: &str, ready: bool) {
        self.inner()
            .channel_ready
            .with_label_values(&[channel])
            .set(i64::from(ready));
    }

    pub fn observe_tick(&self, monitor: &str, duration_secs: f64) {
        self.inner()
            .tick_duration_seconds
            .with_label_values(&[monitor])
            .observe(duration_secs);
    }

    pub fn inc_store_errors(&self) {
        self.inner().store_errors.inc();
    }

    pub fn inc_invalid_schedules(&self) {
        self.inner().invalid_schedules.inc();
    }

    pub fn inc_invalid_patterns(&self, count: usize) {
        self.inner().invalid_patterns.inc_by(count as u64);
    }
}

/// Structured logger for alert lifecycle events
#[derive(Clone)]
pub struct StructuredLogger {
    identity: String,
}

impl StructuredLogger {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
        }
    }

    pub fn log_alert_pending(&self, key: &AlertKey, severity: Severity, delay_secs: u64) {
        info!(
            event = "alert_pending",
            instance = %self.identity,
            job = %key.job,
            alert_type = %key.alert_type,
            severity = %severity,
            delay_secs = delay_secs,
            "Alert pending"
        );
    }

    pub fn log_alert_firing(&self, key: &AlertKey, severity: Severity, channels: usize) {
        warn!(
            event = "alert_firing",
            instance = %self.identity,
            job = %key.job,
            alert_type = %key.alert_type,
            severity = %severity,
            channels = channels,
            "Alert firing"
        );
    }

    pub fn log_alert_suppressed(&self, key: &AlertKey, window: &str) {
        info!(
            event = "alert_suppressed",
            instance = %self.identity,
            job = %key.job,
            alert_type = %key.alert_type,
            window = %window,
            "Alert suppressed by maintenance window"
        );
    }

    pub fn log_alert_resolved(&self, key: &AlertKey, was_firing: bool) {
        info!(
            event = "alert_resolved",
            instance = %self.identity,
            job = %key.job,
            alert_type = %key.alert_type,
            was_firing = was_firing,
            "Alert resolved"
        );
    }

    pub fn log_delivery(
        &self,
        channel: &str,
        key: &AlertKey,
        success: bool,
        attempts: u32,
        error: Option<&str>,
    ) {
        if success {
            info!(
                event = "notification_delivered",
                instance = %self.identity,
                channel = %channel,
                alert = %key,
                attempts = attempts,
                "Notification delivered"
            );
        } else {
            warn!(
                event = "notification_failed",
                instance = %self.identity,
                channel = %channel,
                alert = %key,
                attempts = attempts,
                error = error.unwrap_or("unknown"),
                "Notification delivery failed"
            );
        }
    }

    pub fn log_channel_readiness(&self, channel: &str, ready: bool, consecutive_failures: u32) {
        if ready {
            info!(
                event = "channel_recovered",
                instance = %self.identity,
                channel = %channel,
                "Channel ready again"
            );
        } else {
            warn!(
                event = "channel_not_ready",
                instance = %self.identity,
                channel = %channel,
                consecutive_failures = consecutive_failures,
                "Channel marked not ready"
            );
        }
    }

    pub fn log_skipped_job(&self, job: &JobRef, reason: &str) {
        warn!(
            event = "job_skipped",
            instance = %self.identity,
            job = %job,
            reason = %reason,
            "Skipping job evaluation"
        );
    }

    pub fn log_leadership(&self, leader: bool, restored_alerts: usize, rederived_failures: usize) {
        info!(
            event = "leadership_changed",
            instance = %self.identity,
            leader = leader,
            restored_alerts = restored_alerts,
            rederived_failures = rederived_failures,
            "Leadership changed"
        );
    }

    pub fn log_startup(&self, version: &str, monitors: usize, channels: usize) {
        info!(
            event = "guardian_started",
            instance = %self.identity,
            version = %version,
            monitors = monitors,
            channels = channels,
            "CronJob guardian started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "guardian_shutdown",
            instance = %self.identity,
            reason = %reason,
            "CronJob guardian shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_handles_share_registry() {
        let metrics = GuardianMetrics::new();
        metrics.inc_signals(AlertType::JobFailed);
        metrics.inc_sent("ops");
        metrics.inc_rate_limited("ops");
        metrics.set_channel_ready("ops", false);
        metrics.observe_tick("dead_man_switch", 0.01);

        let other = GuardianMetrics::new();
        other.inc_signals(AlertType::JobFailed);

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "cronjob_guardian_signals_received_total"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("guardian-0");
        assert_eq!(logger.identity, "guardian-0");
    }
}
