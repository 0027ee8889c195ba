use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::monitor::models::{OperatorId, ProbeOutcome, ProbeStatus, Target, TargetId};

pub mod broadcaster;
pub mod dispatcher;
pub mod senders;

pub use broadcaster::EventBroadcaster;
pub use dispatcher::NotificationDispatcher;

/// Structured events emitted by the registry and the polling tasks.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEvent {
    TargetAdded {
        target: Target,
        replaced: bool,
    },
    TargetRemoved {
        id: TargetId,
        address: String,
        owner: OperatorId,
    },
    ProbeResult {
        id: TargetId,
        address: String,
        status: ProbeStatus,
        metadata: BTreeMap<String, String>,
        latency_ms: Option<u64>,
        timestamp: DateTime<Utc>,
    },
}

impl MonitorEvent {
    pub fn probe_result(id: TargetId, address: String, outcome: &ProbeOutcome) -> Self {
        MonitorEvent::ProbeResult {
            id,
            address,
            status: outcome.status,
            metadata: outcome.metadata.clone(),
            latency_ms: outcome.latency.map(|d| d.as_millis() as u64),
            timestamp: outcome.checked_at,
        }
    }

    pub fn target_id(&self) -> &TargetId {
        match self {
            MonitorEvent::TargetAdded { target, .. } => &target.id,
            MonitorEvent::TargetRemoved { id, .. } | MonitorEvent::ProbeResult { id, .. } => id,
        }
    }
}

/// Sink for [`MonitorEvent`]s. Implementations must return promptly; the
/// polling tasks call this inline.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: MonitorEvent);
}
