use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::MonitorEvent;
use super::senders::NotificationSender;
use crate::monitor::models::{ProbeStatus, TargetId};

/// Forwards broadcast events to the configured senders.
///
/// Runs on its own task so slow senders (webhooks) only ever delay this
/// subscription, never the polling tasks.
pub struct NotificationDispatcher {
    senders: Vec<Arc<dyn NotificationSender>>,
    only_status_changes: bool,
    last_status: HashMap<TargetId, ProbeStatus>,
}

impl NotificationDispatcher {
    pub fn new(senders: Vec<Arc<dyn NotificationSender>>, only_status_changes: bool) -> Self {
        Self {
            senders,
            only_status_changes,
            last_status: HashMap::new(),
        }
    }

    pub fn spawn(self, events_rx: broadcast::Receiver<MonitorEvent>) -> JoinHandle<()> {
        tokio::spawn(self.run(events_rx))
    }

    /// Consumes events until every sending half of the channel is gone.
    pub async fn run(mut self, mut events_rx: broadcast::Receiver<MonitorEvent>) {
        loop {
            match events_rx.recv().await {
                Ok(event) => {
                    if self.should_forward(&event) {
                        self.dispatch(&event).await;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Notification dispatcher fell behind, events were dropped.");
                    // Dropped events may include removals; start change tracking over.
                    self.last_status.clear();
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        info!("Notification dispatcher shut down.");
    }

    fn should_forward(&mut self, event: &MonitorEvent) -> bool {
        match event {
            MonitorEvent::ProbeResult { id, status, .. } => {
                let previous = self.last_status.insert(id.clone(), *status);
                !self.only_status_changes || previous != Some(*status)
            }
            MonitorEvent::TargetRemoved { id, .. } => {
                self.last_status.remove(id);
                true
            }
            MonitorEvent::TargetAdded { target, replaced } => {
                if *replaced {
                    self.last_status.remove(&target.id);
                }
                true
            }
        }
    }

    async fn dispatch(&self, event: &MonitorEvent) {
        let (message, context) = render(event);
        for sender in &self.senders {
            match sender.send(&message, &context).await {
                Ok(()) => debug!(sender = sender.name(), "Notification delivered."),
                Err(e) => {
                    warn!(sender = sender.name(), error = %e, "Failed to deliver notification.")
                }
            }
        }
    }
}

/// One-line message plus the flat key/value context senders may template with.
pub fn render(event: &MonitorEvent) -> (String, HashMap<String, String>) {
    let mut context = HashMap::new();
    context.insert("target_id".to_string(), event.target_id().to_string());

    let message = match event {
        MonitorEvent::TargetAdded { target, replaced } => {
            context.insert("event".to_string(), "target_added".to_string());
            context.insert("address".to_string(), target.address.clone());
            context.insert("owner".to_string(), target.owner.to_string());
            context.insert("interval_secs".to_string(), target.interval.as_secs().to_string());
            context.insert("replaced".to_string(), replaced.to_string());
            format!(
                "🔵 Monitoring started for {} every {} seconds by {}",
                target.address,
                target.interval.as_secs(),
                target.owner
            )
        }
        MonitorEvent::TargetRemoved { address, owner, .. } => {
            context.insert("event".to_string(), "target_removed".to_string());
            context.insert("address".to_string(), address.clone());
            context.insert("owner".to_string(), owner.to_string());
            format!("🛑 Monitoring stopped for {address}")
        }
        MonitorEvent::ProbeResult {
            address,
            status,
            metadata,
            latency_ms,
            timestamp,
            ..
        } => {
            context.insert("event".to_string(), "probe_result".to_string());
            context.insert("address".to_string(), address.clone());
            context.insert("status".to_string(), status.to_string());
            context.insert("timestamp".to_string(), timestamp.to_rfc3339());
            if let Some(ms) = latency_ms {
                context.insert("latency_ms".to_string(), ms.to_string());
            }
            for (key, value) in metadata {
                context.insert(key.clone(), value.clone());
            }
            match status {
                ProbeStatus::Up => match metadata.get("players_online") {
                    Some(players) => format!("🟢 {address} online — Players: {players}"),
                    None => format!("🟢 {address} is up"),
                },
                ProbeStatus::Down => match metadata.get("error") {
                    Some(error) => format!("🔴 {address} is down: {error}"),
                    None => format!("🔴 {address} is down"),
                },
            }
        }
    };
    (message, context)
}
