use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

use pulsewatch::error::MonitorError;
use pulsewatch::monitor::{
    AccessGuard, AddTarget, AdminSet, OperatorId, ProbeStatus, RegistryConfig, TargetId,
    TargetRegistry, TaskState,
};
use pulsewatch::notifications::{EventBroadcaster, MonitorEvent};
use pulsewatch::probes::{Probe, ProbeError, ProbeReport};

struct StubProbe {
    delay: Duration,
    fail: bool,
}

#[async_trait]
impl Probe for StubProbe {
    async fn probe(&self, _address: &str) -> Result<ProbeReport, ProbeError> {
        tokio::time::sleep(self.delay).await;
        if self.fail {
            Err(ProbeError::Protocol("server offline".to_string()))
        } else {
            Ok(ProbeReport::up())
        }
    }
}

fn setup(
    probe: StubProbe,
    config: RegistryConfig,
) -> (TargetRegistry, broadcast::Receiver<MonitorEvent>) {
    let broadcaster = Arc::new(EventBroadcaster::new(64));
    let events = broadcaster.subscribe();
    (TargetRegistry::new(config, Arc::new(probe), broadcaster), events)
}

fn config(probe_timeout: Duration) -> RegistryConfig {
    RegistryConfig::new(Duration::from_secs(1), probe_timeout)
}

async fn next_probe_result(
    events: &mut broadcast::Receiver<MonitorEvent>,
) -> (TargetId, ProbeStatus) {
    loop {
        if let MonitorEvent::ProbeResult { id, status, .. } = events.recv().await.unwrap() {
            return (id, status);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_first_results_follow_each_targets_own_interval() {
    let (registry, mut events) = setup(
        StubProbe { delay: Duration::ZERO, fail: false },
        config(Duration::from_secs(2)),
    );
    let start = Instant::now();

    let a = registry
        .add(AddTarget::new("http://x", Duration::from_secs(5), "alice"))
        .await
        .unwrap();
    let b = registry
        .add(AddTarget::new("http://y", Duration::from_secs(10), "alice"))
        .await
        .unwrap();

    let (id, status) = next_probe_result(&mut events).await;
    assert_eq!(id, a.id);
    assert_eq!(status, ProbeStatus::Up);
    assert_eq!(start.elapsed(), Duration::from_secs(5));

    let mut first_b = None;
    for _ in 0..2 {
        let (id, _) = next_probe_result(&mut events).await;
        if id == b.id {
            first_b = Some(start.elapsed());
        }
    }
    assert_eq!(first_b, Some(Duration::from_secs(10)));

    registry.remove_all().await;
}

#[tokio::test(start_paused = true)]
async fn test_failing_probe_yields_one_down_result_per_cycle() {
    let (registry, mut events) = setup(
        StubProbe { delay: Duration::ZERO, fail: true },
        config(Duration::from_secs(2)),
    );
    let start = Instant::now();
    let target = registry
        .add(AddTarget::new("minecraft://play.example.net", Duration::from_secs(5), "alice"))
        .await
        .unwrap();

    for cycle in 1..=3u64 {
        let (id, status) = next_probe_result(&mut events).await;
        assert_eq!(id, target.id);
        assert_eq!(status, ProbeStatus::Down);
        assert_eq!(start.elapsed(), Duration::from_secs(5 * cycle));
    }
    assert_eq!(registry.get(&target.id).unwrap().state, TaskState::Scheduled);

    registry.remove_all().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_abandons_slow_probe_within_grace_period() {
    let probe_timeout = Duration::from_secs(2);
    let (registry, mut events) = setup(
        StubProbe { delay: probe_timeout * 2, fail: false },
        config(probe_timeout),
    );
    let target = registry
        .add(AddTarget::new("http://x", Duration::from_secs(5), "alice"))
        .await
        .unwrap();

    // The probe starts at 5s and would take until 9s.
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(registry.get(&target.id).unwrap().state, TaskState::Running);

    let stop_started = Instant::now();
    let removed = registry.remove(&target.id).await.unwrap();
    assert!(stop_started.elapsed() <= registry.config().stop_grace_period);
    assert_eq!(removed.state, TaskState::Stopped);
    assert!(removed.last_result.is_none());

    tokio::time::sleep(Duration::from_secs(30)).await;
    while let Ok(event) = events.try_recv() {
        assert!(
            !matches!(event, MonitorEvent::ProbeResult { .. }),
            "abandoned probe delivered {event:?}"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_remove_all_stops_every_task() {
    let (registry, _events) = setup(
        StubProbe { delay: Duration::from_secs(1), fail: false },
        config(Duration::from_secs(2)),
    );
    for (i, secs) in [3u64, 5, 7].into_iter().enumerate() {
        registry
            .add(AddTarget::new(format!("http://host-{i}"), Duration::from_secs(secs), "alice"))
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(5_500)).await;

    let start = Instant::now();
    let removed = registry.remove_all().await;
    assert!(start.elapsed() <= registry.config().stop_grace_period);
    assert_eq!(removed.len(), 3);
    assert!(removed.iter().all(|t| t.state == TaskState::Stopped));
    assert!(registry.list().is_empty());
    assert!(matches!(
        registry.remove(&removed[0].id).await,
        Err(MonitorError::NotFound(_))
    ));
}

#[test]
fn test_admin_grant_and_revoke() {
    let server_admin = OperatorId::new("server-admin");
    let native = {
        let server_admin = server_admin.clone();
        move |caller: &OperatorId| *caller == server_admin
    };
    let guard = AccessGuard::new(AdminSet::new(), Arc::new(native));
    let user = OperatorId::new("u");

    assert!(!guard.is_authorized(&user));
    guard.add_admin(&server_admin, user.clone()).unwrap();
    assert!(guard.is_authorized(&user));
    guard.remove_admin(&server_admin, &user).unwrap();
    assert!(!guard.is_authorized(&user));
}
