//! Per-channel token bucket

use chrono::{DateTime, Utc};

use crate::channels::RateLimitSpec;

/// Holds up to `burstLimit` tokens and refills at `maxAlertsPerHour / 3600`
/// tokens per second. Time is passed in so decisions are reproducible.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: DateTime<Utc>,
}

impl TokenBucket {
    pub fn new(spec: RateLimitSpec, now: DateTime<Utc>) -> Self {
        let capacity = f64::from(spec.burst_limit.max(1));
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec: f64::from(spec.max_alerts_per_hour) / 3600.0,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: DateTime<Utc>) {
        let elapsed = (now - self.last_refill).num_milliseconds();
        if elapsed <= 0 {
            return;
        }
        self.tokens = (self.tokens + elapsed as f64 / 1000.0 * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    /// Take one token if available
    pub fn try_acquire(&mut self, now: DateTime<Utc>) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    pub fn available(&mut self, now: DateTime<Utc>) -> f64 {
        self.refill(now);
        self.tokens
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Apply new limits, keeping the current fill level within the new capacity
    pub fn reconfigure(&mut self, spec: RateLimitSpec, now: DateTime<Utc>) {
        self.refill(now);
        self.capacity = f64::from(spec.burst_limit.max(1));
        self.refill_per_sec = f64::from(spec.max_alerts_per_hour) / 3600.0;
        self.tokens = self.tokens.min(self.capacity);
    }
}
