use async_trait::async_trait;
use postsync_sync::{spawn_probe, ConnectivityMonitor, ConnectivityProbe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn initial_value_is_reported() {
    assert!(ConnectivityMonitor::new(true).is_online());
    assert!(!ConnectivityMonitor::new(false).is_online());
}

#[test]
fn setting_same_value_is_not_a_transition() {
    let monitor = ConnectivityMonitor::new(true);
    assert!(!monitor.set_online(true));
    assert!(monitor.set_online(false));
    assert!(!monitor.set_online(false));
    assert!(!monitor.is_online());
}

#[test]
fn clones_share_state() {
    let monitor = ConnectivityMonitor::new(false);
    let other = monitor.clone();
    other.set_online(true);
    assert!(monitor.is_online());
}

#[tokio::test]
async fn subscribers_see_each_transition() {
    let monitor = ConnectivityMonitor::new(false);
    let mut subscription = monitor.subscribe();
    assert!(!subscription.current());

    monitor.set_online(true);
    assert_eq!(subscription.changed().await, Some(true));

    monitor.set_online(true);
    monitor.set_online(false);
    assert_eq!(subscription.changed().await, Some(false));
}

#[tokio::test]
async fn redundant_updates_do_not_wake_subscribers() {
    let monitor = ConnectivityMonitor::new(true);
    let mut subscription = monitor.subscribe();
    monitor.set_online(true);

    let woke = tokio::time::timeout(Duration::from_millis(50), subscription.changed()).await;
    assert!(woke.is_err());
}

#[tokio::test]
async fn subscription_ends_when_monitor_is_gone() {
    let monitor = ConnectivityMonitor::new(true);
    let mut subscription = monitor.subscribe();
    drop(monitor);
    assert_eq!(subscription.changed().await, None);
}

#[tokio::test]
async fn dropping_a_subscription_does_not_affect_others() {
    let monitor = ConnectivityMonitor::new(false);
    let first = monitor.subscribe();
    let mut second = monitor.subscribe();
    drop(first);

    monitor.set_online(true);
    assert_eq!(second.changed().await, Some(true));
}

// ── Probe ───────────────────────────────────────────────────────

struct ScriptedProbe {
    online: AtomicBool,
    calls: AtomicUsize,
}

#[async_trait]
impl ConnectivityProbe for ScriptedProbe {
    async fn probe(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.online.load(Ordering::SeqCst)
    }
}

#[tokio::test]
async fn probe_drives_monitor() {
    let monitor = ConnectivityMonitor::new(true);
    let mut subscription = monitor.subscribe();
    let probe = Arc::new(ScriptedProbe {
        online: AtomicBool::new(false),
        calls: AtomicUsize::new(0),
    });

    let task = spawn_probe(
        monitor.clone(),
        Arc::clone(&probe) as Arc<dyn ConnectivityProbe>,
        Duration::from_millis(10),
    );

    let changed = tokio::time::timeout(Duration::from_secs(5), subscription.changed())
        .await
        .unwrap();
    assert_eq!(changed, Some(false));

    probe.online.store(true, Ordering::SeqCst);
    let changed = tokio::time::timeout(Duration::from_secs(5), subscription.changed())
        .await
        .unwrap();
    assert_eq!(changed, Some(true));
    assert!(probe.calls.load(Ordering::SeqCst) >= 2);

    task.abort();
}
