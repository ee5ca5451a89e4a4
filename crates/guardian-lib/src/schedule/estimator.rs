//! Expected run interval derived from a schedule

use chrono::{DateTime, Utc};
use std::time::Duration;

use super::CronSchedule;
use crate::error::{GuardianError, Result};

/// Number of upcoming firings inspected when estimating the period
pub const DEFAULT_LOOKAHEAD: usize = 10;

/// Estimates the nominal period of a schedule as the smallest gap between
/// consecutive firings in a bounded lookahead.
///
/// Schedules with uneven gaps (month ends, weekday-only jobs) resolve to
/// their shortest gap, so a missed run is reported early rather than late.
#[derive(Debug, Clone, Copy)]
pub struct IntervalEstimator {
    lookahead: usize,
}

impl Default for IntervalEstimator {
    fn default() -> Self {
        Self {
            lookahead: DEFAULT_LOOKAHEAD,
        }
    }
}

impl IntervalEstimator {
    pub fn new(lookahead: usize) -> Self {
        Self {
            lookahead: lookahead.max(2),
        }
    }

    /// Smallest gap between the next `lookahead` firings after `from`
    pub fn period(&self, schedule: &CronSchedule, from: DateTime<Utc>) -> Result<Duration> {
        let firings: Vec<DateTime<Utc>> = schedule.upcoming(from).take(self.lookahead).collect();
        if firings.len() < 2 {
            return Err(GuardianError::invalid_schedule(
                schedule.expression(),
                "fewer than two upcoming firings",
            ));
        }

        firings
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .min()
            .and_then(|gap| gap.to_std().ok())
            .filter(|gap| !gap.is_zero())
            .ok_or_else(|| {
                GuardianError::invalid_schedule(schedule.expression(), "non-increasing firings")
            })
    }

    /// Parse and estimate in one step
    pub fn period_of(
        &self,
        expression: &str,
        timezone: Option<&str>,
        from: DateTime<Utc>,
    ) -> Result<Duration> {
        let schedule = CronSchedule::parse(expression, timezone)?;
        self.period(&schedule, from)
    }
}

/// `period × missed_schedule_threshold + buffer`
pub fn expected_interval(period: Duration, missed_schedule_threshold: u32, buffer: Duration) -> Duration {
    period.saturating_mul(missed_schedule_threshold.max(1)) + buffer
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_regular_schedules() {
        let estimator = IntervalEstimator::default();
        let from = at(2024, 1, 1);
        assert_eq!(
            estimator.period_of("*/15 * * * *", None, from).unwrap(),
            Duration::from_secs(900)
        );
        assert_eq!(
            estimator.period_of("0 3 * * *", None, from).unwrap(),
            Duration::from_secs(86_400)
        );
        assert_eq!(
            estimator.period_of("@hourly", None, from).unwrap(),
            Duration::from_secs(3600)
        );
    }

    #[test]
    fn test_irregular_schedule_uses_smallest_gap() {
        let estimator = IntervalEstimator::default();
        // Weekdays only: the weekend gap is 3 days, the smallest is 1 day
        assert_eq!(
            estimator.period_of("0 9 * * 1-5", None, at(2024, 1, 5)).unwrap(),
            Duration::from_secs(86_400)
        );
        // Monthly from January: February is the shortest month
        assert_eq!(
            estimator.period_of("0 0 1 * *", None, at(2024, 1, 15)).unwrap(),
            Duration::from_secs(29 * 86_400)
        );
    }

    #[test]
    fn test_schedule_without_future_firings() {
        let estimator = IntervalEstimator::default();
        let err = estimator
            .period_of("0 0 0 1 1 * 2020", None, at(2024, 1, 1))
            .unwrap_err();
        assert!(matches!(err, GuardianError::InvalidSchedule { .. }));
    }

    #[test]
    fn test_invalid_expression() {
        let estimator = IntervalEstimator::default();
        assert!(matches!(
            estimator.period_of("every day", None, at(2024, 1, 1)),
            Err(GuardianError::InvalidSchedule { .. })
        ));
    }

    #[test]
    fn test_expected_interval() {
        assert_eq!(
            expected_interval(Duration::from_secs(3600), 3, Duration::from_secs(600)),
            Duration::from_secs(3 * 3600 + 600)
        );
        // A zero threshold still waits one full period
        assert_eq!(
            expected_interval(Duration::from_secs(3600), 0, Duration::ZERO),
            Duration::from_secs(3600)
        );
    }
}
