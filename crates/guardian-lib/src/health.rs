//! Liveness and readiness state of the guardian
//!
//! Core components (the two monitors, the dispatcher and the store) and one
//! entry per notification channel, keyed `channel:<name>`. A broken channel
//! shows up in `/healthz` but never takes the replica out of rotation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

const CHANNEL_PREFIX: &str = "channel:";

/// Ordered from best to worst so the overall status is the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl ComponentStatus {
    pub fn is_operational(&self) -> bool {
        *self != ComponentStatus::Unhealthy
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            checked_at: Utc::now(),
        }
    }

    pub fn healthy() -> Self {
        Self::new(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::new(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::new(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub leader: bool,
    pub components: BTreeMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub mod components {
    use super::CHANNEL_PREFIX;

    pub const DEAD_MAN_SWITCH: &str = "dead_man_switch";
    pub const SLA_ANALYZER: &str = "sla_analyzer";
    pub const DISPATCHER: &str = "dispatcher";
    pub const STORE: &str = "store";

    pub fn channel(name: &str) -> String {
        format!("{CHANNEL_PREFIX}{name}")
    }

    pub fn is_channel(component: &str) -> bool {
        component.starts_with(CHANNEL_PREFIX)
    }
}

#[derive(Debug, Default)]
struct State {
    components: BTreeMap<String, ComponentHealth>,
    initialized: bool,
    leader: bool,
}

/// Shared between the engine and the HTTP probes
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    state: Arc<RwLock<State>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a component as healthy; an existing entry is reset.
    pub async fn register(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn update(&self, name: &str, health: ComponentHealth) {
        self.state
            .write()
            .await
            .components
            .insert(name.to_string(), health);
    }

    pub async fn set_healthy(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::degraded(message)).await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::unhealthy(message)).await;
    }

    pub async fn set_ready(&self, ready: bool) {
        self.state.write().await.initialized = ready;
    }

    pub async fn set_leader(&self, leader: bool) {
        self.state.write().await.leader = leader;
    }

    pub async fn health(&self) -> HealthResponse {
        let state = self.state.read().await;
        let status = state
            .components
            .values()
            .map(|c| c.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy);

        HealthResponse {
            status,
            leader: state.leader,
            components: state.components.clone(),
        }
    }

    /// Standby replicas are ready as long as their core components work.
    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;
        let broken = state
            .components
            .iter()
            .find(|(name, c)| !components::is_channel(name) && !c.status.is_operational())
            .map(|(name, _)| name.clone());

        let reason = match (state.initialized, broken) {
            (false, _) => Some("guardian is still starting".to_string()),
            (true, Some(name)) => Some(format!("{name} is unhealthy")),
            (true, None) => None,
        };

        ReadinessResponse {
            ready: reason.is_none(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_registry_is_healthy_but_not_ready() {
        let registry = HealthRegistry::new();
        let health = registry.health().await;

        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components.is_empty());
        assert!(!health.leader);
        assert!(!registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn worst_component_sets_overall_status() {
        let registry = HealthRegistry::new();
        registry.register(components::DEAD_MAN_SWITCH).await;
        registry.register(components::STORE).await;

        registry.set_degraded(components::STORE, "query timeout").await;
        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert!(health.status.is_operational());
        assert_eq!(
            health.components[components::STORE].message.as_deref(),
            Some("query timeout")
        );

        registry.set_unhealthy(components::DEAD_MAN_SWITCH, "stuck").await;
        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);
    }

    #[tokio::test]
    async fn unhealthy_core_component_blocks_readiness() {
        let registry = HealthRegistry::new();
        registry.register(components::DISPATCHER).await;
        registry.set_ready(true).await;
        assert!(registry.readiness().await.ready);

        registry
            .set_unhealthy(components::DISPATCHER, "state lost")
            .await;
        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("dispatcher is unhealthy"));
    }

    #[tokio::test]
    async fn unhealthy_channel_does_not_block_readiness() {
        let registry = HealthRegistry::new();
        registry.set_ready(true).await;
        registry
            .set_unhealthy(&components::channel("ops-slack"), "5 consecutive failures")
            .await;

        assert!(registry.readiness().await.ready);
        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);
    }
}
