use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::RwLock;
use reqwest::Url;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::models::{AddTarget, OperatorId, ProbeOutcome, Target, TargetId};
use super::task::{MonitorTask, TaskContext};
use crate::error::MonitorError;
use crate::notifications::{MonitorEvent, Notifier};
use crate::probes::Probe;

#[derive(Debug, Clone, PartialEq)]
pub struct RegistryConfig {
    /// Smallest accepted polling interval.
    pub min_interval: Duration,
    /// Upper bound for a single probe.
    pub probe_timeout: Duration,
    /// How long a stopping task may keep driving an in-flight probe.
    pub stop_grace_period: Duration,
}

impl RegistryConfig {
    pub fn new(min_interval: Duration, probe_timeout: Duration) -> Self {
        Self {
            min_interval,
            probe_timeout,
            stop_grace_period: probe_timeout,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(10))
    }
}

struct TargetRecord {
    id: TargetId,
    address: String,
    interval: Duration,
    owner: OperatorId,
    created_at: DateTime<Utc>,
    last_result: Arc<RwLock<Option<ProbeOutcome>>>,
}

struct Entry {
    seq: u64,
    record: TargetRecord,
    task: MonitorTask,
}

impl Entry {
    fn snapshot(&self) -> Target {
        Target {
            id: self.record.id.clone(),
            address: self.record.address.clone(),
            interval: self.record.interval,
            owner: self.record.owner.clone(),
            created_at: self.record.created_at,
            last_result: self.record.last_result.read().clone(),
            state: self.task.state(),
        }
    }
}

#[derive(Default)]
struct Entries {
    by_id: HashMap<TargetId, Entry>,
    next_seq: u64,
}

/// Owns every monitored target and its polling task.
///
/// Mutations (`add`, `remove*`) are serialized by an async lock that stays
/// held while an old task is being stopped, so a replacement never overlaps
/// with its predecessor. The map itself sits behind a short-lived read/write
/// lock: `list` and `get` only ever wait for a snapshot copy.
///
/// Dropping the registry closes every task's shutdown channel, so the tasks
/// wind down on their own (an in-flight probe still gets the grace period).
/// Call [`remove_all`](Self::remove_all) to wait for them and emit
/// `TargetRemoved` events.
pub struct TargetRegistry {
    config: RegistryConfig,
    probe: Arc<dyn Probe>,
    notifier: Arc<dyn Notifier>,
    entries: RwLock<Entries>,
    mutation_lock: tokio::sync::Mutex<()>,
}

impl TargetRegistry {
    pub fn new(config: RegistryConfig, probe: Arc<dyn Probe>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            config,
            probe,
            notifier,
            entries: RwLock::new(Entries::default()),
            mutation_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub(crate) fn probe(&self) -> &dyn Probe {
        self.probe.as_ref()
    }

    fn validate(&self, request: &AddTarget) -> Result<String, MonitorError> {
        if request.interval.is_zero() {
            return Err(MonitorError::Validation(
                "interval must be greater than zero".to_string(),
            ));
        }
        if request.interval < self.config.min_interval {
            return Err(MonitorError::Validation(format!(
                "interval of {} ms is below the minimum of {} ms",
                request.interval.as_millis(),
                self.config.min_interval.as_millis()
            )));
        }

        let address = request.address.trim();
        if address.is_empty() {
            return Err(MonitorError::Validation("address is empty".to_string()));
        }
        let url = Url::parse(address)
            .map_err(|e| MonitorError::Validation(format!("invalid address {address}: {e}")))?;
        if url.host_str().is_none() {
            return Err(MonitorError::Validation(format!(
                "address {address} has no host"
            )));
        }
        if !self.probe.supports(&url) {
            return Err(MonitorError::Validation(format!(
                "address {address} is not supported by any probe"
            )));
        }
        Ok(address.to_string())
    }

    /// Registers a target and starts its polling task. An existing target
    /// with the same id is stopped first and replaced.
    pub async fn add(&self, request: AddTarget) -> Result<Target, MonitorError> {
        let address = self.validate(&request)?;
        let id = request.id();
        let _guard = self.mutation_lock.lock().await;

        let previous = self.entries.read().by_id.get(&id).map(|entry| entry.task.clone());
        let replaced = previous.is_some();
        if let Some(task) = previous {
            info!(target_id = %id, "Replacing existing monitor task.");
            task.stop().await;
        }

        let last_result = Arc::new(RwLock::new(None));
        let task = MonitorTask::spawn(TaskContext {
            id: id.clone(),
            address: address.clone(),
            interval: request.interval,
            probe_timeout: self.config.probe_timeout,
            stop_grace_period: self.config.stop_grace_period,
            probe: self.probe.clone(),
            notifier: self.notifier.clone(),
            last_result: last_result.clone(),
        });
        let record = TargetRecord {
            id: id.clone(),
            address,
            interval: request.interval,
            owner: request.owner,
            created_at: Utc::now(),
            last_result,
        };

        let target = {
            let mut entries = self.entries.write();
            let seq = entries.next_seq;
            entries.next_seq += 1;
            let entry = Entry { seq, record, task };
            let target = entry.snapshot();
            entries.by_id.insert(id, entry);
            target
        };

        info!(
            target_id = %target.id,
            address = %target.address,
            interval_secs = target.interval.as_secs(),
            owner = %target.owner,
            replaced,
            "Monitoring started."
        );
        self.notifier.notify(MonitorEvent::TargetAdded {
            target: target.clone(),
            replaced,
        });
        Ok(target)
    }

    /// Stops and deletes one target.
    pub async fn remove(&self, id: &TargetId) -> Result<Target, MonitorError> {
        self.remove_if(id, |_| Ok(())).await
    }

    /// Like [`remove`](Self::remove), but `check` sees the target first and
    /// can veto the removal. Lookup, check and removal happen under the
    /// mutation lock.
    pub async fn remove_if<F>(&self, id: &TargetId, check: F) -> Result<Target, MonitorError>
    where
        F: FnOnce(&Target) -> Result<(), MonitorError>,
    {
        let _guard = self.mutation_lock.lock().await;

        let (task, snapshot) = {
            let entries = self.entries.read();
            let entry = entries
                .by_id
                .get(id)
                .ok_or_else(|| MonitorError::NotFound(id.clone()))?;
            (entry.task.clone(), entry.snapshot())
        };
        check(&snapshot)?;

        task.stop().await;
        let removed = self.entries.write().by_id.remove(id);
        let target = match removed {
            Some(entry) => entry.snapshot(),
            None => snapshot,
        };

        info!(target_id = %target.id, "Monitoring stopped.");
        self.notifier.notify(MonitorEvent::TargetRemoved {
            id: target.id.clone(),
            address: target.address.clone(),
            owner: target.owner.clone(),
        });
        Ok(target)
    }

    /// Stops every task and clears the registry.
    pub async fn remove_all(&self) -> Vec<Target> {
        self.remove_matching(|_| true).await
    }

    /// Stops and deletes every target created by `owner`.
    pub async fn remove_owned_by(&self, owner: &OperatorId) -> Vec<Target> {
        self.remove_matching(|record| &record.owner == owner).await
    }

    async fn remove_matching<P>(&self, predicate: P) -> Vec<Target>
    where
        P: Fn(&TargetRecord) -> bool,
    {
        let _guard = self.mutation_lock.lock().await;

        let tasks: Vec<(TargetId, MonitorTask)> = self
            .entries
            .read()
            .by_id
            .values()
            .filter(|entry| predicate(&entry.record))
            .map(|entry| (entry.record.id.clone(), entry.task.clone()))
            .collect();

        join_all(tasks.iter().map(|(_, task)| task.stop())).await;

        let mut removed: Vec<Entry> = {
            let mut entries = self.entries.write();
            tasks
                .iter()
                .filter_map(|(id, _)| entries.by_id.remove(id))
                .collect()
        };
        removed.sort_by_key(|entry| entry.seq);

        let targets: Vec<Target> = removed.iter().map(Entry::snapshot).collect();
        for target in &targets {
            self.notifier.notify(MonitorEvent::TargetRemoved {
                id: target.id.clone(),
                address: target.address.clone(),
                owner: target.owner.clone(),
            });
        }
        info!(count = targets.len(), "Stopped monitoring targets.");
        targets
    }

    /// Snapshot of all targets in insertion order.
    pub fn list(&self) -> Vec<Target> {
        let entries = self.entries.read();
        let mut ordered: Vec<&Entry> = entries.by_id.values().collect();
        ordered.sort_by_key(|entry| entry.seq);
        ordered.into_iter().map(Entry::snapshot).collect()
    }

    pub fn get(&self, id: &TargetId) -> Result<Target, MonitorError> {
        self.entries
            .read()
            .by_id
            .get(id)
            .map(Entry::snapshot)
            .ok_or_else(|| MonitorError::NotFound(id.clone()))
    }

    pub fn len(&self) -> usize {
        self.entries.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
