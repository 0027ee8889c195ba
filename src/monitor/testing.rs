//! Test doubles shared by the monitor unit tests.
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::models::ProbeStatus;
use crate::notifications::{MonitorEvent, Notifier};
use crate::probes::{Probe, ProbeError, ProbeReport};

#[derive(Debug, Clone, Copy)]
enum Behavior {
    Up,
    Fail,
    Panic,
}

/// Scriptable probe that counts calls and the peak number of concurrent calls.
#[derive(Debug)]
pub(crate) struct MockProbe {
    behavior: Behavior,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockProbe {
    fn with_behavior(behavior: Behavior) -> Self {
        Self {
            behavior,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn up() -> Self {
        Self::with_behavior(Behavior::Up)
    }

    pub fn failing() -> Self {
        Self::with_behavior(Behavior::Fail)
    }

    pub fn panicking() -> Self {
        Self::with_behavior(Behavior::Panic)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Probe for MockProbe {
    async fn probe(&self, _address: &str) -> Result<ProbeReport, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.behavior {
            Behavior::Up => Ok(ProbeReport::up().with_meta("players_online", 3)),
            Behavior::Fail => Err(ProbeError::Protocol("connection reset".to_string())),
            Behavior::Panic => panic!("probe blew up"),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct RecordingNotifier {
    events: Mutex<Vec<MonitorEvent>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<MonitorEvent> {
        self.events.lock().clone()
    }

    pub fn probe_results(&self) -> Vec<(ProbeStatus, BTreeMap<String, String>)> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                MonitorEvent::ProbeResult {
                    status, metadata, ..
                } => Some((*status, metadata.clone())),
                _ => None,
            })
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: MonitorEvent) {
        self.events.lock().push(event);
    }
}
