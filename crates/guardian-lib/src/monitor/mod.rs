//! Periodic evaluators that turn job state and execution history into signals
//!
//! - Dead-man's switch: did the job succeed recently enough
//! - SLA analyzer: success rate, duration percentiles and regressions

mod dead_man;
mod sla;

pub use dead_man::DeadManSwitchMonitor;
pub use sla::{percentile, SlaAnalyzer, SlaSnapshot, Trend, TREND_GAP_POINTS};

use std::collections::HashSet;

use crate::alerting::AlertSignal;
use crate::models::JobRef;

/// Result of one monitor tick.
///
/// `evaluated` holds every job the monitor reached a verdict on; jobs that
/// were skipped keep whatever alerts they already have.
#[derive(Debug, Default)]
pub struct TickOutcome {
    pub evaluated: HashSet<JobRef>,
    pub signals: Vec<AlertSignal>,
    pub skipped: usize,
    pub store_errors: usize,
}
