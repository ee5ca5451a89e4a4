//! Per-channel delivery health and rate limiting

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use super::rate_limit::TokenBucket;
use crate::channels::{ChannelKind, Notifier, RateLimitSpec};
use crate::models::chrono_duration;

/// Whether a channel may receive a delivery right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Ready,
    /// Not ready, but the recovery interval elapsed: one attempt allowed
    Probe,
    NotReady,
}

pub struct ChannelState {
    pub name: String,
    pub kind: ChannelKind,
    pub notifier: Arc<dyn Notifier>,
    pub bucket: TokenBucket,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub ready: bool,
    probe_in_flight: bool,
}

impl ChannelState {
    pub fn new(
        name: impl Into<String>,
        notifier: Arc<dyn Notifier>,
        limits: RateLimitSpec,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: notifier.kind(),
            notifier,
            bucket: TokenBucket::new(limits, now),
            consecutive_failures: 0,
            last_error: None,
            last_failure_at: None,
            ready: true,
            probe_in_flight: false,
        }
    }

    pub fn admit(&mut self, now: DateTime<Utc>, probe_interval: Duration) -> Admission {
        if self.ready {
            return Admission::Ready;
        }
        if self.probe_in_flight {
            return Admission::NotReady;
        }
        let due = self
            .last_failure_at
            .map_or(true, |at| now >= at + chrono_duration(probe_interval));
        if due {
            self.probe_in_flight = true;
            Admission::Probe
        } else {
            Admission::NotReady
        }
    }

    /// A reserved probe did not go out (e.g. rate limited)
    pub fn release_probe(&mut self) {
        self.probe_in_flight = false;
    }

    /// Returns true when readiness flipped back on
    pub fn record_success(&mut self) -> bool {
        let recovered = !self.ready;
        self.ready = true;
        self.consecutive_failures = 0;
        self.probe_in_flight = false;
        recovered
    }

    /// Returns true when readiness flipped off
    pub fn record_failure(&mut self, error: String, now: DateTime<Utc>, threshold: u32) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_error = Some(error);
        self.last_failure_at = Some(now);
        self.probe_in_flight = false;
        if self.ready && self.consecutive_failures >= threshold.max(1) {
            self.ready = false;
            return true;
        }
        false
    }

    pub fn status(&mut self, now: DateTime<Utc>) -> ChannelStatus {
        ChannelStatus {
            name: self.name.clone(),
            kind: self.kind,
            ready: self.ready,
            consecutive_failures: self.consecutive_failures,
            last_error: self.last_error.clone(),
            last_failure_at: self.last_failure_at,
            tokens_available: self.bucket.available(now),
        }
    }
}

/// Read-only view of a channel
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStatus {
    pub name: String,
    pub kind: ChannelKind,
    pub ready: bool,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub tokens_available: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::testing::RecordingNotifier;
    use chrono::Duration as ChronoDuration;

    fn channel(now: DateTime<Utc>) -> ChannelState {
        ChannelState::new(
            "ops",
            Arc::new(RecordingNotifier::default()),
            RateLimitSpec::default(),
            now,
        )
    }

    #[test]
    fn test_threshold_then_probe() {
        let now = Utc::now();
        let probe = Duration::from_secs(300);
        let mut state = channel(now);

        assert!(!state.record_failure("e1".into(), now, 3));
        assert!(!state.record_failure("e2".into(), now, 3));
        assert!(state.record_failure("e3".into(), now, 3));
        assert!(!state.ready);
        assert_eq!(state.admit(now + ChronoDuration::seconds(10), probe), Admission::NotReady);

        // One probe after the interval, then blocked while it is in flight
        let later = now + ChronoDuration::seconds(301);
        assert_eq!(state.admit(later, probe), Admission::Probe);
        assert_eq!(state.admit(later, probe), Admission::NotReady);

        // Failed probe restarts the interval
        assert!(!state.record_failure("e4".into(), later, 3));
        assert_eq!(state.admit(later + ChronoDuration::seconds(1), probe), Admission::NotReady);

        assert!(state.record_success());
        assert_eq!(state.admit(later, probe), Admission::Ready);
        assert_eq!(state.consecutive_failures, 0);
    }
}
