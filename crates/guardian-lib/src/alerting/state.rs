//! Alert records owned by the dispatcher

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{AlertKey, AlertSignal, AlertType, Severity, SignalContext};
use crate::channels::{AlertNotification, NotificationKind};
use crate::matcher::Suggestion;
use crate::models::{JobRef, MonitorRef};

/// Delivery records kept per alert; older ones are dropped first
pub const MAX_DELIVERY_RECORDS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    /// Waiting for `alertDelay` to elapse
    Pending,
    Firing,
    /// Held back by a maintenance window
    Suppressed,
    Resolved,
}

impl AlertState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertState::Pending => "pending",
            AlertState::Firing => "firing",
            AlertState::Suppressed => "suppressed",
            AlertState::Resolved => "resolved",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum DeliveryOutcome {
    Delivered,
    RateLimited,
    ChannelNotReady,
    Failed { error: String },
}

/// One delivery attempt of one notification to one channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRecord {
    pub channel: String,
    pub at: DateTime<Utc>,
    pub kind: NotificationKind,
    #[serde(flatten)]
    pub outcome: DeliveryOutcome,
    #[serde(default)]
    pub attempts: u32,
}

/// The single live alert for a `(job, alert type)` key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveAlert {
    pub id: String,
    pub job: JobRef,
    pub alert_type: AlertType,
    pub monitor: MonitorRef,
    pub state: AlertState,
    pub severity: Severity,
    pub context: SignalContext,
    /// Onset of the condition
    pub since: DateTime<Utc>,
    pub last_signal_at: DateTime<Utc>,
    #[serde(default)]
    pub last_notified: Option<DateTime<Utc>>,
    /// When the pending delay expires
    pub fire_at: DateTime<Utc>,
    #[serde(default)]
    pub suggestion: Option<Suggestion>,
    #[serde(default)]
    pub suppressed_by: Option<String>,
    #[serde(default)]
    pub channels_notified: BTreeSet<String>,
    /// Most recent deliveries, at most [`MAX_DELIVERY_RECORDS`]
    #[serde(default)]
    pub deliveries: Vec<DeliveryRecord>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ActiveAlert {
    pub fn from_signal(signal: &AlertSignal, fire_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            job: signal.job.clone(),
            alert_type: signal.alert_type,
            monitor: signal.monitor.clone(),
            state: AlertState::Pending,
            severity: signal.severity,
            context: signal.context.clone(),
            since: signal.timestamp,
            last_signal_at: signal.timestamp,
            last_notified: None,
            fire_at,
            suggestion: None,
            suppressed_by: None,
            channels_notified: BTreeSet::new(),
            deliveries: Vec::new(),
            resolved_at: None,
        }
    }

    pub fn key(&self) -> AlertKey {
        AlertKey::new(self.job.clone(), self.alert_type)
    }

    pub fn notification(&self, kind: NotificationKind, now: DateTime<Utc>) -> AlertNotification {
        AlertNotification {
            alert_id: self.id.clone(),
            kind,
            alert_type: self.alert_type,
            severity: self.severity,
            job: self.job.clone(),
            monitor: self.monitor.clone(),
            message: self.context.message.clone(),
            suggestion: self.suggestion.as_ref().map(|s| s.text.clone()),
            failure: self.context.failure.clone(),
            since: self.since,
            timestamp: now,
        }
    }

    pub fn record_delivery(&mut self, record: DeliveryRecord) {
        if record.outcome == DeliveryOutcome::Delivered {
            self.channels_notified.insert(record.channel.clone());
        }
        self.deliveries.push(record);
        if self.deliveries.len() > MAX_DELIVERY_RECORDS {
            let excess = self.deliveries.len() - MAX_DELIVERY_RECORDS;
            self.deliveries.drain(..excess);
        }
    }
}
