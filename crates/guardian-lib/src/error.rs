//! Error taxonomy for the monitoring engine
//!
//! None of these errors are fatal to the process: schedule and pattern errors
//! skip the offending job or pattern, delivery errors degrade a channel, and
//! store errors skip the affected job until the next tick.

use thiserror::Error;

/// Errors raised by the engine core
#[derive(Debug, Error)]
pub enum GuardianError {
    /// A cron expression could not be parsed or never fires
    #[error("invalid schedule '{expression}': {reason}")]
    InvalidSchedule { expression: String, reason: String },

    /// A timezone name is not a known IANA zone
    #[error("invalid timezone '{0}'")]
    InvalidTimezone(String),

    /// A suggested-fix pattern regex failed to compile
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Delivery to a channel failed after all retries
    #[error("delivery to channel '{channel}' failed: {reason}")]
    ChannelDeliveryFailed { channel: String, reason: String },

    /// The execution/alert store could not be reached
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A referenced channel or monitor does not exist
    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    /// Policy file or monitor configuration is malformed
    #[error("policy error: {0}")]
    Policy(String),
}

impl GuardianError {
    pub fn invalid_schedule(expression: impl Into<String>, reason: impl Into<String>) -> Self {
        GuardianError::InvalidSchedule {
            expression: expression.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_pattern(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        GuardianError::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }
}

/// Errors surfaced by an [`ExecutionStore`](crate::store::ExecutionStore) backend
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("alert '{0}' not found")]
    AlertNotFound(String),
}

pub type Result<T, E = GuardianError> = std::result::Result<T, E>;
