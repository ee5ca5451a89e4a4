//! Process settings

use anyhow::Result;
use guardian_lib::alerting::DispatcherConfig;
use guardian_lib::engine::EngineConfig;
use guardian_lib::leader::{AlwaysLeader, FileLeader, LeaderSignal};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// How this replica learns whether it leads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaderMode {
    Always,
    /// Leader while `leader_file` exists
    File,
}

/// Settings read from `GUARDIAN_*` environment variables and an optional
/// file named by `GUARDIAN_CONFIG`
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Replica name, defaults to the pod name
    #[serde(default = "default_identity")]
    pub identity: String,

    /// Port for health, metrics and the query API
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default = "default_dead_man_interval")]
    pub dead_man_interval_secs: u64,

    #[serde(default = "default_sla_interval")]
    pub sla_interval_secs: u64,

    /// Days of executions a new leader reads to rebuild job state
    #[serde(default = "default_state_lookback_days")]
    pub state_lookback_days: u64,

    #[serde(default = "default_max_concurrent_deliveries")]
    pub max_concurrent_deliveries: usize,

    #[serde(default = "default_delivery_attempts")]
    pub delivery_attempts: u32,

    #[serde(default = "default_delivery_backoff_ms")]
    pub delivery_backoff_ms: u64,

    #[serde(default = "default_delivery_timeout")]
    pub delivery_timeout_secs: u64,

    /// Consecutive failed deliveries before a channel is marked not ready
    #[serde(default = "default_failure_threshold")]
    pub channel_failure_threshold: u32,

    #[serde(default = "default_probe_interval")]
    pub channel_probe_interval_secs: u64,

    #[serde(default = "default_leader_mode")]
    pub leader_mode: LeaderMode,

    #[serde(default = "default_leader_file")]
    pub leader_file: String,

    /// YAML policy with monitors, channels and the job inventory
    #[serde(default)]
    pub policy_path: Option<String>,
}

fn default_identity() -> String {
    std::env::var("POD_NAME").unwrap_or_else(|_| "cronjob-guardian".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_dead_man_interval() -> u64 {
    60
}

fn default_sla_interval() -> u64 {
    300
}

fn default_state_lookback_days() -> u64 {
    30
}

fn default_max_concurrent_deliveries() -> usize {
    8
}

fn default_delivery_attempts() -> u32 {
    3
}

fn default_delivery_backoff_ms() -> u64 {
    500
}

fn default_delivery_timeout() -> u64 {
    10
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_probe_interval() -> u64 {
    300
}

fn default_leader_mode() -> LeaderMode {
    LeaderMode::Always
}

fn default_leader_file() -> String {
    "/var/run/cronjob-guardian/leader".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            identity: default_identity(),
            api_port: default_api_port(),
            dead_man_interval_secs: default_dead_man_interval(),
            sla_interval_secs: default_sla_interval(),
            state_lookback_days: default_state_lookback_days(),
            max_concurrent_deliveries: default_max_concurrent_deliveries(),
            delivery_attempts: default_delivery_attempts(),
            delivery_backoff_ms: default_delivery_backoff_ms(),
            delivery_timeout_secs: default_delivery_timeout(),
            channel_failure_threshold: default_failure_threshold(),
            channel_probe_interval_secs: default_probe_interval(),
            leader_mode: default_leader_mode(),
            leader_file: default_leader_file(),
            policy_path: None,
        }
    }
}

impl Settings {
    /// Load settings from environment and config file
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Ok(path) = std::env::var("GUARDIAN_CONFIG") {
            builder = builder.add_source(config::File::with_name(&path).required(false));
        }
        let config = builder
            .add_source(config::Environment::with_prefix("GUARDIAN").try_parsing(true))
            .build()?;

        Ok(config.try_deserialize().unwrap_or_else(|e| {
            warn!(error = %e, "Invalid settings, using defaults");
            Settings::default()
        }))
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            identity: self.identity.clone(),
            dead_man_interval: Duration::from_secs(self.dead_man_interval_secs.max(1)),
            sla_interval: Duration::from_secs(self.sla_interval_secs.max(1)),
            state_lookback: Duration::from_secs(self.state_lookback_days.max(1) * 24 * 3600),
            dispatcher: DispatcherConfig {
                max_concurrent_deliveries: self.max_concurrent_deliveries.max(1),
                max_attempts: self.delivery_attempts.max(1),
                initial_backoff: Duration::from_millis(self.delivery_backoff_ms),
                attempt_timeout: Duration::from_secs(self.delivery_timeout_secs.max(1)),
                failure_threshold: self.channel_failure_threshold.max(1),
                recovery_probe_interval: Duration::from_secs(self.channel_probe_interval_secs),
            },
        }
    }

    pub fn leader_signal(&self) -> Arc<dyn LeaderSignal> {
        match self.leader_mode {
            LeaderMode::Always => Arc::new(AlwaysLeader),
            LeaderMode::File => Arc::new(FileLeader::new(&self.leader_file)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_map_to_engine_config() {
        let settings = Settings::default();
        let engine = settings.engine_config();
        assert_eq!(engine.dead_man_interval, Duration::from_secs(60));
        assert_eq!(engine.sla_interval, Duration::from_secs(300));
        assert_eq!(engine.state_lookback, Duration::from_secs(30 * 24 * 3600));
        assert_eq!(engine.dispatcher.max_attempts, 3);
        assert_eq!(engine.dispatcher.initial_backoff, Duration::from_millis(500));
        assert!(settings.leader_signal().is_leader());
    }

    #[test]
    fn test_file_leader_mode() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("leader");
        let settings = Settings {
            leader_mode: LeaderMode::File,
            leader_file: marker.to_string_lossy().into_owned(),
            ..Settings::default()
        };

        let signal = settings.leader_signal();
        assert!(!signal.is_leader());
        std::fs::write(&marker, b"").unwrap();
        assert!(signal.is_leader());
    }

    #[test]
    fn test_settings_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guardian.yaml");
        std::fs::write(&path, "api_port: 9191\nleader_mode: file\nsla_interval_secs: 30\n").unwrap();

        let settings: Settings = config::Config::builder()
            .add_source(config::File::from(path.as_path()))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(settings.api_port, 9191);
        assert_eq!(settings.leader_mode, LeaderMode::File);
        assert_eq!(settings.sla_interval_secs, 30);
        assert_eq!(settings.dead_man_interval_secs, 60);
    }
}
