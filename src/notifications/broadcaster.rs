use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::{MonitorEvent, Notifier};

/// Fans events out to any number of subscribers without ever blocking the
/// sender. A subscriber that falls more than `capacity` events behind loses
/// the oldest ones.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    events_tx: broadcast::Sender<MonitorEvent>,
}

impl EventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (events_tx, _) = broadcast::channel(capacity.max(1));
        Self { events_tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events_tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.events_tx.receiver_count()
    }
}

impl Notifier for EventBroadcaster {
    fn notify(&self, event: MonitorEvent) {
        let receiver_count = self.events_tx.receiver_count();
        if receiver_count == 0 {
            debug!(target_id = %event.target_id(), "No active subscribers, dropping event.");
            return;
        }
        if let Err(e) = self.events_tx.send(event) {
            warn!(error = %e, "Failed to broadcast monitor event.");
        }
    }
}
