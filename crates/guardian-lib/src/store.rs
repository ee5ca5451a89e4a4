//! Execution and alert persistence
//!
//! [`ExecutionStore`] is the seam to whatever backend the deployment uses.
//! [`MemoryStore`] keeps everything in process and can be switched
//! unavailable to exercise outage handling.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::alerting::{ActiveAlert, AlertType, Severity};
use crate::error::StoreError;
use crate::models::{ExecutionRecord, JobRef};

/// Criteria for listing alerts; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertFilter {
    #[serde(default)]
    pub job: Option<JobRef>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub alert_type: Option<AlertType>,
    #[serde(default)]
    pub severity: Option<Severity>,
    /// Only alerts whose onset is at or after this instant
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
}

impl AlertFilter {
    pub fn matches(&self, alert: &ActiveAlert) -> bool {
        self.job.as_ref().map_or(true, |j| &alert.job == j)
            && self
                .namespace
                .as_ref()
                .map_or(true, |ns| &alert.job.namespace == ns)
            && self.alert_type.map_or(true, |t| alert.alert_type == t)
            && self.severity.map_or(true, |s| alert.severity == s)
            && self.since.map_or(true, |since| alert.since >= since)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub offset: usize,
    pub limit: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Executions of `job` that started in `[since, until]`, oldest first
    async fn query_executions(
        &self,
        job: &JobRef,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ExecutionRecord>, StoreError>;

    /// Insert or replace the live record for an alert
    async fn record_alert(&self, alert: &ActiveAlert) -> Result<(), StoreError>;

    /// Move an alert from the live set into history
    async fn archive_alert(&self, alert: &ActiveAlert) -> Result<(), StoreError>;

    async fn list_active_alerts(&self) -> Result<Vec<ActiveAlert>, StoreError>;

    /// Archived alerts, most recently resolved first
    async fn list_alert_history(
        &self,
        filter: &AlertFilter,
        page: Pagination,
    ) -> Result<Page<ActiveAlert>, StoreError>;
}

#[derive(Default)]
struct MemoryState {
    executions: HashMap<JobRef, Vec<ExecutionRecord>>,
    active: HashMap<String, ActiveAlert>,
    history: Vec<ActiveAlert>,
}

/// In-process store
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    available: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            available: AtomicBool::new(true),
        }
    }

    /// Toggle availability; while unavailable every operation fails
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store switched off".to_string()))
        }
    }

    /// Write an execution, as the reconciliation controllers would
    pub async fn add_execution(&self, record: ExecutionRecord) {
        let mut state = self.state.write().await;
        let runs = state.executions.entry(record.job.clone()).or_default();
        let pos = runs.partition_point(|r| r.start_time <= record.start_time);
        runs.insert(pos, record);
    }

    pub async fn history_len(&self) -> usize {
        self.state.read().await.history.len()
    }
}

#[async_trait]
impl ExecutionStore for MemoryStore {
    async fn query_executions(
        &self,
        job: &JobRef,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ExecutionRecord>, StoreError> {
        self.check()?;
        let state = self.state.read().await;
        Ok(state
            .executions
            .get(job)
            .map(|runs| {
                runs.iter()
                    .filter(|r| r.start_time >= since && r.start_time <= until)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn record_alert(&self, alert: &ActiveAlert) -> Result<(), StoreError> {
        self.check()?;
        let mut state = self.state.write().await;
        state.active.insert(alert.id.clone(), alert.clone());
        Ok(())
    }

    async fn archive_alert(&self, alert: &ActiveAlert) -> Result<(), StoreError> {
        self.check()?;
        let mut state = self.state.write().await;
        state.active.remove(&alert.id);
        state.history.push(alert.clone());
        Ok(())
    }

    async fn list_active_alerts(&self) -> Result<Vec<ActiveAlert>, StoreError> {
        self.check()?;
        let state = self.state.read().await;
        Ok(state.active.values().cloned().collect())
    }

    async fn list_alert_history(
        &self,
        filter: &AlertFilter,
        page: Pagination,
    ) -> Result<Page<ActiveAlert>, StoreError> {
        self.check()?;
        let state = self.state.read().await;
        let matching: Vec<&ActiveAlert> = state
            .history
            .iter()
            .rev()
            .filter(|a| filter.matches(a))
            .collect();

        Ok(Page {
            total: matching.len(),
            items: matching
                .into_iter()
                .skip(page.offset)
                .take(page.limit)
                .cloned()
                .collect(),
            offset: page.offset,
            limit: page.limit,
        })
    }
}
