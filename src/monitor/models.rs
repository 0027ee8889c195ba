use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Identity of an operator (a chat user id, a config-file owner name, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct OperatorId(String);

impl OperatorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OperatorId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for OperatorId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Registry key of a target: the owner and the address together, so the same
/// operator adding the same address again replaces the running check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
    pub fn for_target(owner: &OperatorId, address: &str) -> Self {
        Self(format!("{owner}@{address}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TargetId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Up,
    Down,
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeStatus::Up => f.write_str("up"),
            ProbeStatus::Down => f.write_str("down"),
        }
    }
}

/// Result of one completed check, as recorded on the target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeOutcome {
    pub status: ProbeStatus,
    pub metadata: BTreeMap<String, String>,
    #[serde(rename = "latency_ms", serialize_with = "serialize_opt_millis")]
    pub latency: Option<Duration>,
    pub checked_at: DateTime<Utc>,
}

impl ProbeOutcome {
    /// A `Down` outcome carrying `note` under the `error` metadata key.
    pub fn down_with_error(note: impl Into<String>) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("error".to_string(), note.into());
        Self {
            status: ProbeStatus::Down,
            metadata,
            latency: None,
            checked_at: Utc::now(),
        }
    }

    pub fn is_up(&self) -> bool {
        self.status == ProbeStatus::Up
    }
}

/// Lifecycle of the polling task owned by a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Scheduled,
    Running,
    Stopping,
    Stopped,
}

impl TaskState {
    pub fn is_live(self) -> bool {
        matches!(self, TaskState::Scheduled | TaskState::Running)
    }
}

/// Request to start monitoring an address.
#[derive(Debug, Clone)]
pub struct AddTarget {
    pub address: String,
    pub interval: Duration,
    pub owner: OperatorId,
}

impl AddTarget {
    pub fn new(
        address: impl Into<String>,
        interval: Duration,
        owner: impl Into<OperatorId>,
    ) -> Self {
        Self {
            address: address.into(),
            interval,
            owner: owner.into(),
        }
    }

    /// Builds a request from operator-supplied seconds. Zero and negative
    /// values are rejected here because a `Duration` cannot carry them.
    pub fn from_secs(
        address: impl Into<String>,
        interval_secs: i64,
        owner: impl Into<OperatorId>,
    ) -> Result<Self, crate::error::MonitorError> {
        if interval_secs <= 0 {
            return Err(crate::error::MonitorError::Validation(format!(
                "interval must be a positive number of seconds, got {interval_secs}"
            )));
        }
        Ok(Self::new(
            address,
            Duration::from_secs(interval_secs as u64),
            owner,
        ))
    }

    pub fn id(&self) -> TargetId {
        TargetId::for_target(&self.owner, self.address.trim())
    }
}

/// Point-in-time view of a monitored target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Target {
    pub id: TargetId,
    pub address: String,
    #[serde(rename = "interval_secs", serialize_with = "serialize_secs")]
    pub interval: Duration,
    pub owner: OperatorId,
    pub created_at: DateTime<Utc>,
    pub last_result: Option<ProbeOutcome>,
    pub state: TaskState,
}

fn serialize_secs<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_secs())
}

fn serialize_opt_millis<S: Serializer>(
    value: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
        None => serializer.serialize_none(),
    }
}
