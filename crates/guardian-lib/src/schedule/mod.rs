//! Schedule handling
//!
//! - Cron parsing with CronJob dialect and timezones
//! - Expected-interval estimation for the dead-man's switch
//! - Maintenance window evaluation

mod expression;
mod estimator;
mod window;

pub use expression::{parse_timezone, CronSchedule};
pub use estimator::{expected_interval, IntervalEstimator, DEFAULT_LOOKAHEAD};
pub use window::{ActiveWindow, MaintenanceWindowGuard};
