//! Export scheduler: per-sink isolation, cancellation and event delivery.

use crate::integration::test_utils::{wait_until, FakeStore};
use async_trait::async_trait;
use clusterscope::event::{EventKind, IndexEvent};
use clusterscope::{
    CollectionError, Event, ExportScheduler, MonitorConfig, MonitorError, SchedulerState, Sink,
    SinkError, StatsCollector, StatsDocument, StatsSnapshot,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const INTERVAL: Duration = Duration::from_millis(20);

struct CountingCollector {
    calls: AtomicUsize,
    /// Every n-th call fails when non-zero.
    fail_every: usize,
}

impl CountingCollector {
    fn new(fail_every: usize) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail_every,
        })
    }
}

#[async_trait]
impl StatsCollector for CountingCollector {
    async fn collect(&self) -> Result<StatsSnapshot, CollectionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_every != 0 && call % self.fail_every == 0 {
            return Err(CollectionError::Unavailable("node stats not ready".into()));
        }
        Ok(StatsSnapshot::now(vec![StatsDocument::new(
            "node_stats",
            json!({ "call": call }),
        )]))
    }
}

#[derive(Default)]
struct CountingSink {
    snapshots: AtomicUsize,
    events: AtomicUsize,
}

#[async_trait]
impl Sink for CountingSink {
    fn name(&self) -> &str {
        "counting"
    }

    async fn export_snapshot(&self, _snapshot: &StatsSnapshot) -> Result<(), SinkError> {
        self.snapshots.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn export_event(&self, _event: &Event) -> Result<(), SinkError> {
        self.events.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FailingSink;

#[async_trait]
impl Sink for FailingSink {
    fn name(&self) -> &str {
        "failing"
    }

    async fn export_snapshot(&self, _snapshot: &StatsSnapshot) -> Result<(), SinkError> {
        Err(SinkError::Transport("http://admin:hunter2@es:9200 refused".into()))
    }

    async fn export_event(&self, _event: &Event) -> Result<(), SinkError> {
        Err(SinkError::Transport("refused".into()))
    }
}

struct PanickingSink;

#[async_trait]
impl Sink for PanickingSink {
    fn name(&self) -> &str {
        "panicking"
    }

    fn stop(&self) {
        panic!("stop exploded");
    }

    async fn export_snapshot(&self, _snapshot: &StatsSnapshot) -> Result<(), SinkError> {
        panic!("export exploded");
    }

    async fn export_event(&self, _event: &Event) -> Result<(), SinkError> {
        panic!("export exploded");
    }
}

fn index_event(name: &str) -> Event {
    Event::now(
        "test",
        EventKind::Index {
            source: "test".into(),
            event: IndexEvent::IndexCreateDelete {
                index: name.into(),
                created: true,
            },
        },
    )
}

#[tokio::test]
async fn failing_sinks_do_not_affect_siblings() {
    let counting = Arc::new(CountingSink::default());
    let sinks: Vec<Arc<dyn Sink>> = vec![
        Arc::new(FailingSink),
        Arc::new(PanickingSink),
        counting.clone(),
    ];
    let scheduler = ExportScheduler::new(CountingCollector::new(0), sinks, INTERVAL, 16);

    scheduler.start().unwrap();
    assert!(wait_until(Duration::from_secs(5), || counting.snapshots.load(Ordering::SeqCst) >= 3).await);
    scheduler.stop().await.unwrap();

    // A tick interrupted by stop() may end before reaching the last sink.
    let stats = scheduler.stats();
    let delivered = counting.snapshots.load(Ordering::SeqCst) as u64;
    assert_eq!(stats.snapshots_exported, delivered);
    assert!(stats.ticks - delivered <= 1);
    assert!(stats.sink_failures >= delivered * 2);
    assert_eq!(stats.tick_failures, 0);
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
}

#[tokio::test]
async fn no_export_after_stop_returns() {
    let counting = Arc::new(CountingSink::default());
    let sinks: Vec<Arc<dyn Sink>> = vec![counting.clone()];
    let scheduler = ExportScheduler::new(CountingCollector::new(0), sinks, INTERVAL, 16);
    let publisher = scheduler.event_publisher();

    scheduler.start().unwrap();
    assert!(wait_until(Duration::from_secs(5), || counting.snapshots.load(Ordering::SeqCst) >= 2).await);
    scheduler.stop().await.unwrap();

    let snapshots = counting.snapshots.load(Ordering::SeqCst);
    let events = counting.events.load(Ordering::SeqCst);
    assert!(!publisher.publish(index_event("late")));
    tokio::time::sleep(INTERVAL * 5).await;
    assert_eq!(counting.snapshots.load(Ordering::SeqCst), snapshots);
    assert_eq!(counting.events.load(Ordering::SeqCst), events);
}

#[tokio::test]
async fn collection_failures_skip_the_tick_only() {
    let counting = Arc::new(CountingSink::default());
    let collector = CountingCollector::new(2);
    let sinks: Vec<Arc<dyn Sink>> = vec![counting.clone()];
    let scheduler = ExportScheduler::new(collector.clone(), sinks, INTERVAL, 16);

    scheduler.start().unwrap();
    assert!(wait_until(Duration::from_secs(5), || collector.calls.load(Ordering::SeqCst) >= 6).await);
    scheduler.stop().await.unwrap();

    let stats = scheduler.stats();
    assert!(stats.collection_failures >= 3);
    let delivered = counting.snapshots.load(Ordering::SeqCst) as u64;
    assert!(stats.ticks - stats.collection_failures - delivered <= 1);
    assert!(delivered >= 2);
}

#[tokio::test]
async fn queued_events_reach_every_sink() {
    let first = Arc::new(CountingSink::default());
    let second = Arc::new(CountingSink::default());
    let sinks: Vec<Arc<dyn Sink>> = vec![first.clone(), Arc::new(FailingSink), second.clone()];
    let scheduler = ExportScheduler::new(CountingCollector::new(0), sinks, INTERVAL, 16);
    let publisher = scheduler.event_publisher();

    for name in ["a", "b", "c"] {
        assert!(publisher.publish(index_event(name)));
    }
    scheduler.start().unwrap();
    assert!(wait_until(Duration::from_secs(5), || second.events.load(Ordering::SeqCst) == 3).await);
    assert_eq!(first.events.load(Ordering::SeqCst), 3);

    scheduler.close().await.unwrap();
    assert_eq!(scheduler.state(), SchedulerState::Closed);
}

#[tokio::test]
async fn from_config_ships_snapshots_to_the_store() {
    let store = FakeStore::spawn().await;
    let mut config = MonitorConfig::default();
    config.interval_ms = 20;
    config.cluster_name = "prod".into();
    config.http.hosts = vec![store.host()];

    let scheduler = ExportScheduler::from_config(&config, CountingCollector::new(0)).unwrap();
    assert_eq!(scheduler.sinks().len(), 1);
    assert!(scheduler.event_publisher().publish(index_event("logs")));

    scheduler.start().unwrap();
    let state = Arc::clone(&store.state);
    assert!(wait_until(Duration::from_secs(5), || state.document_count() >= 3).await);
    scheduler.close().await.unwrap();

    let docs = store.state.documents();
    assert!(docs.iter().any(|d| d.path.ends_with("/index_event")));
    assert!(docs.iter().any(|d| d.path.ends_with("/node_stats")));
}

#[tokio::test]
async fn from_config_rejects_invalid_settings() {
    let mut config = MonitorConfig::default();
    config.http.hosts = vec!["localhost:notaport".into()];
    let result = ExportScheduler::from_config(&config, CountingCollector::new(0));
    assert!(matches!(result, Err(MonitorError::Configuration(_))));

    let mut config = MonitorConfig::default();
    config.event_queue_capacity = 0;
    let result = ExportScheduler::from_config(&config, CountingCollector::new(0));
    assert!(matches!(result, Err(MonitorError::Configuration(_))));
}

#[tokio::test]
async fn disabled_monitoring_has_no_sinks() {
    let mut config = MonitorConfig::default();
    config.enabled = false;
    let scheduler = ExportScheduler::from_config(&config, CountingCollector::new(0)).unwrap();
    assert!(scheduler.sinks().is_empty());
    scheduler.close().await.unwrap();
}
