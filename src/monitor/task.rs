//! The polling task owned by each target.
use chrono::Utc;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::models::{ProbeOutcome, TargetId, TaskState};
use crate::notifications::{MonitorEvent, Notifier};
use crate::probes::Probe;

/// Everything a polling task needs; moved into the task on spawn.
pub(crate) struct TaskContext {
    pub id: TargetId,
    pub address: String,
    pub interval: Duration,
    pub probe_timeout: Duration,
    pub stop_grace_period: Duration,
    pub probe: Arc<dyn Probe>,
    pub notifier: Arc<dyn Notifier>,
    pub last_result: Arc<RwLock<Option<ProbeOutcome>>>,
}

struct TaskControl {
    handle: JoinHandle<()>,
    shutdown_tx: oneshot::Sender<()>,
}

struct TaskShared {
    id: TargetId,
    state_tx: Arc<watch::Sender<TaskState>>,
    control: Mutex<Option<TaskControl>>,
    stop_grace_period: Duration,
}

/// Handle to a running polling task. Cloning shares the same task.
#[derive(Clone)]
pub struct MonitorTask {
    shared: Arc<TaskShared>,
}

impl MonitorTask {
    /// Starts the wait-then-probe loop. Must be called inside a tokio runtime.
    pub(crate) fn spawn(ctx: TaskContext) -> Self {
        let (state_tx, _) = watch::channel(TaskState::Scheduled);
        let state_tx = Arc::new(state_tx);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let id = ctx.id.clone();
        let stop_grace_period = ctx.stop_grace_period;
        let handle = tokio::spawn(run_checks(ctx, shutdown_rx, state_tx.clone()));

        Self {
            shared: Arc::new(TaskShared {
                id,
                state_tx,
                control: Mutex::new(Some(TaskControl {
                    handle,
                    shutdown_tx,
                })),
                stop_grace_period,
            }),
        }
    }

    pub fn state(&self) -> TaskState {
        *self.shared.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<TaskState> {
        self.shared.state_tx.subscribe()
    }

    /// Stops the task and returns once it is `Stopped`.
    ///
    /// A task waiting for its next tick exits immediately. A task mid-probe
    /// gets `stop_grace_period` to finish; after that it is aborted. Either way
    /// the in-flight result is discarded. Later or concurrent callers wait for
    /// the first caller's stop to complete.
    pub async fn stop(&self) {
        let control = self.shared.control.lock().take();
        let Some(TaskControl {
            mut handle,
            shutdown_tx,
        }) = control
        else {
            let mut state_rx = self.shared.state_tx.subscribe();
            let _ = state_rx.wait_for(|state| *state == TaskState::Stopped).await;
            return;
        };

        self.shared.state_tx.send_if_modified(|state| {
            if *state == TaskState::Stopped {
                return false;
            }
            *state = TaskState::Stopping;
            true
        });
        if shutdown_tx.send(()).is_err() {
            debug!(target_id = %self.shared.id, "Monitor task already finished before stop.");
        }

        if tokio::time::timeout(self.shared.stop_grace_period, &mut handle)
            .await
            .is_err()
        {
            warn!(
                target_id = %self.shared.id,
                grace_ms = self.shared.stop_grace_period.as_millis() as u64,
                "Monitor task did not stop within the grace period; aborting."
            );
            handle.abort();
            let _ = handle.await;
        }
        self.shared.state_tx.send_replace(TaskState::Stopped);
        info!(target_id = %self.shared.id, "Monitor task stopped.");
    }
}

/// Runs one probe through the caller-side adapter: timeouts, errors and panics
/// all come back as `Down` outcomes.
pub(crate) async fn probe_once(
    probe: &dyn Probe,
    address: &str,
    timeout: Duration,
) -> ProbeOutcome {
    let start_time = Instant::now();
    let attempt = AssertUnwindSafe(probe.probe(address)).catch_unwind();

    match tokio::time::timeout(timeout, attempt).await {
        Ok(Ok(Ok(report))) => ProbeOutcome {
            status: report.status,
            metadata: report.metadata,
            latency: Some(report.latency.unwrap_or_else(|| start_time.elapsed())),
            checked_at: Utc::now(),
        },
        Ok(Ok(Err(e))) => ProbeOutcome::down_with_error(e.to_string()),
        Ok(Err(_panic)) => ProbeOutcome::down_with_error("probe panicked"),
        Err(_) => ProbeOutcome::down_with_error(format!(
            "probe timed out after {} ms",
            timeout.as_millis()
        )),
    }
}

/// Moves between `Scheduled` and `Running` unless a stop is already underway.
fn advance(state_tx: &watch::Sender<TaskState>, next: TaskState) {
    state_tx.send_if_modified(|state| {
        if !state.is_live() || *state == next {
            return false;
        }
        *state = next;
        true
    });
}

async fn run_checks(
    ctx: TaskContext,
    mut shutdown_rx: oneshot::Receiver<()>,
    state_tx: Arc<watch::Sender<TaskState>>,
) {
    info!(target_id = %ctx.id, interval_secs = ctx.interval.as_secs(), "Started monitor task.");
    let start = tokio::time::Instant::now() + ctx.interval;
    let mut ticker = tokio::time::interval_at(start, ctx.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        advance(&state_tx, TaskState::Scheduled);
        tokio::select! {
            biased;
            _ = &mut shutdown_rx => {
                debug!(target_id = %ctx.id, "Monitor task received shutdown while scheduled.");
                break;
            }
            _ = ticker.tick() => {}
        }

        advance(&state_tx, TaskState::Running);
        let probe = probe_once(ctx.probe.as_ref(), &ctx.address, ctx.probe_timeout);
        tokio::pin!(probe);

        let outcome = tokio::select! {
            biased;
            _ = &mut shutdown_rx => {
                state_tx.send_replace(TaskState::Stopping);
                if tokio::time::timeout(ctx.stop_grace_period, &mut probe).await.is_err() {
                    warn!(
                        target_id = %ctx.id,
                        "Abandoning in-flight probe after the stop grace period."
                    );
                } else {
                    debug!(
                        target_id = %ctx.id,
                        "In-flight probe finished during stop; result discarded."
                    );
                }
                break;
            }
            outcome = &mut probe => outcome,
        };

        debug!(target_id = %ctx.id, status = %outcome.status, "Probe completed.");
        *ctx.last_result.write() = Some(outcome.clone());
        ctx.notifier
            .notify(MonitorEvent::probe_result(ctx.id.clone(), ctx.address.clone(), &outcome));
    }

    state_tx.send_replace(TaskState::Stopped);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::testing::{MockProbe, RecordingNotifier};
    use crate::monitor::models::ProbeStatus;

    fn context(probe: Arc<MockProbe>, notifier: Arc<RecordingNotifier>) -> TaskContext {
        TaskContext {
            id: "alice@http://x".into(),
            address: "http://x".to_string(),
            interval: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(2),
            stop_grace_period: Duration::from_secs(2),
            probe,
            notifier,
            last_result: Arc::new(RwLock::new(None)),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_one_interval_before_first_probe() {
        let probe = Arc::new(MockProbe::up());
        let notifier = Arc::new(RecordingNotifier::default());
        let ctx = context(probe.clone(), notifier.clone());
        let last_result = ctx.last_result.clone();
        let task = MonitorTask::spawn(ctx);

        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert_eq!(probe.calls(), 0);
        assert!(last_result.read().is_none());
        assert_eq!(task.state(), TaskState::Scheduled);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(probe.calls(), 1);
        assert_eq!(notifier.probe_results().len(), 1);
        assert_eq!(last_result.read().as_ref().map(|o| o.status), Some(ProbeStatus::Up));

        task.stop().await;
        assert_eq!(task.state(), TaskState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_wakes_sleeping_task_immediately() {
        let probe = Arc::new(MockProbe::up());
        let notifier = Arc::new(RecordingNotifier::default());
        let mut ctx = context(probe.clone(), notifier);
        ctx.interval = Duration::from_secs(3_600);
        let task = MonitorTask::spawn(ctx);
        tokio::task::yield_now().await;

        let started = tokio::time::Instant::now();
        task.stop().await;
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(task.state(), TaskState::Stopped);
        assert_eq!(probe.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_stops_are_idempotent() {
        let probe = Arc::new(MockProbe::up().with_delay(Duration::from_secs(10)));
        let notifier = Arc::new(RecordingNotifier::default());
        let task = MonitorTask::spawn(context(probe, notifier.clone()));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(task.state(), TaskState::Running);

        let (first, second) = (task.clone(), task.clone());
        tokio::join!(first.stop(), second.stop());
        assert_eq!(task.state(), TaskState::Stopped);

        // A third stop after the fact returns straight away.
        task.stop().await;
        assert!(notifier.probe_results().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_probe_becomes_down_result() {
        let probe = Arc::new(MockProbe::panicking());
        let notifier = Arc::new(RecordingNotifier::default());
        let task = MonitorTask::spawn(context(probe.clone(), notifier.clone()));

        tokio::time::sleep(Duration::from_secs(11)).await;
        let results = notifier.probe_results();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(status, _)| *status == ProbeStatus::Down));
        assert_eq!(results[0].1.get("error").map(String::as_str), Some("probe panicked"));
        assert_eq!(task.state(), TaskState::Scheduled);

        task.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cuts_slow_check_off_at_grace_period() {
        let probe = Arc::new(MockProbe::up().with_delay(Duration::from_secs(60)));
        let notifier = Arc::new(RecordingNotifier::default());
        let mut ctx = context(probe.clone(), notifier.clone());
        ctx.probe_timeout = Duration::from_secs(30);
        ctx.stop_grace_period = Duration::from_secs(1);
        let last_result = ctx.last_result.clone();
        let task = MonitorTask::spawn(ctx);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(task.state(), TaskState::Running);

        let started = tokio::time::Instant::now();
        task.stop().await;
        assert_eq!(started.elapsed(), Duration::from_secs(1));
        assert_eq!(task.state(), TaskState::Stopped);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(notifier.probe_results().is_empty());
        assert!(last_result.read().is_none());
        assert_eq!(probe.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_once_maps_timeout_to_down() {
        let probe = MockProbe::up().with_delay(Duration::from_secs(30));
        let outcome = probe_once(&probe, "http://x", Duration::from_secs(1)).await;
        assert_eq!(outcome.status, ProbeStatus::Down);
        assert_eq!(
            outcome.metadata.get("error").map(String::as_str),
            Some("probe timed out after 1000 ms")
        );
    }
}
