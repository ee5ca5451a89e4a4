//! CronJob monitoring and alerting engine
//!
//! This crate provides the core functionality for:
//! - Cron schedule interval estimation and maintenance windows
//! - Dead-man's switch and SLA evaluation
//! - Suggested fixes for failed runs
//! - Alert dispatch with dedup, delay, rate limits and multi-channel delivery
//! - Health checks and observability

pub mod alerting;
pub mod channels;
pub mod engine;
pub mod error;
pub mod health;
pub mod leader;
pub mod matcher;
pub mod models;
pub mod monitor;
pub mod observability;
pub mod policy;
pub mod registry;
pub mod schedule;
pub mod store;

pub use alerting::{ActiveAlert, AlertKey, AlertSignal, AlertState, AlertType, Dispatcher, Severity};
pub use engine::{Engine, EngineConfig, Leadership};
pub use error::{GuardianError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{GuardianMetrics, StructuredLogger};
pub use policy::PolicyFile;
pub use registry::WatchRegistry;
