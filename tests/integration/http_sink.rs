//! HTTP sink against an in-process fake document store.

use crate::integration::test_utils::{dead_host, FakeStore, StoreState};
use clusterscope::event::{DiscoveryNode, EventKind, NodeEvent};
use clusterscope::sink::{HttpSink, Sink};
use clusterscope::{Event, HttpSinkConfig, RenderParams, SinkError, StatsDocument, StatsSnapshot};
use serde_json::json;
use std::sync::atomic::Ordering;

const TS: u64 = 1_393_675_200_000; // 2014-03-01T12:00:00Z

fn sink_for(hosts: Vec<String>) -> HttpSink {
    sink_with_params(hosts, RenderParams::default())
}

fn sink_with_params(hosts: Vec<String>, render: RenderParams) -> HttpSink {
    let config = HttpSinkConfig {
        hosts,
        connect_timeout_ms: 1_000,
        read_timeout_ms: 5_000,
        ..HttpSinkConfig::default()
    };
    HttpSink::new(&config, render).unwrap()
}

fn snapshot() -> StatsSnapshot {
    StatsSnapshot::new(
        TS,
        vec![
            StatsDocument::new("node_stats", json!({"jvm": {"heap_used": 42}})),
            StatsDocument::new("indices_stats", json!({"docs": 7})),
        ],
    )
}

fn joined_event() -> Event {
    let node = DiscoveryNode::new("n1", "alpha", "inet[/10.0.0.1:9300]")
        .with_address("10.0.0.1:9300".parse().unwrap());
    Event::new(
        TS,
        "prod",
        EventKind::Node {
            source: "zen-disco-receive".into(),
            event: NodeEvent::NodeJoinLeave { node, joined: true },
        },
    )
}

#[tokio::test]
async fn uploads_missing_template_then_posts_documents() {
    let store = FakeStore::spawn().await;
    let sink = sink_for(vec![store.host()]);

    sink.export_snapshot(&snapshot()).await.unwrap();

    assert_eq!(store.state.template_gets.load(Ordering::SeqCst), 1);
    assert_eq!(store.state.template_puts.load(Ordering::SeqCst), 1);
    assert!(sink.template_checked());

    let docs = store.state.documents();
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].path, "/.monitoring-2014.03.01/node_stats");
    assert_eq!(docs[0].body, json!({"jvm": {"heap_used": 42}}));
    assert_eq!(docs[1].path, "/.monitoring-2014.03.01/indices_stats");
    assert!(docs[0].authorization.is_none());

    // Template check is cached after success.
    sink.export_snapshot(&snapshot()).await.unwrap();
    assert_eq!(store.state.template_gets.load(Ordering::SeqCst), 1);
    assert_eq!(sink.stats().documents_sent, 4);
}

#[tokio::test]
async fn outdated_template_is_replaced() {
    for template in [
        r#"{"template":".monitoring-*","settings":{"monitoring.index_format":1}}"#,
        r#"{"template":".monitoring-*","settings":{"monitoring.index_format":0}}"#,
    ] {
        let store = FakeStore::spawn_with(StoreState::with_template(template)).await;
        let sink = sink_for(vec![store.host()]);

        sink.export_snapshot(&snapshot()).await.unwrap();
        assert_eq!(store.state.template_puts.load(Ordering::SeqCst), 1);
        let installed = store.state.template.lock().clone().unwrap();
        assert_eq!(installed, clusterscope::sink::template::BUNDLED_TEMPLATE.to_vec());
    }
}

#[tokio::test]
async fn newer_or_unversioned_template_is_kept() {
    for template in [
        r#"{"settings":{"monitoring.index_format":"99"}}"#,
        r#"{"settings":{}}"#,
    ] {
        let store = FakeStore::spawn_with(StoreState::with_template(template)).await;
        let sink = sink_for(vec![store.host()]);

        sink.export_snapshot(&snapshot()).await.unwrap();
        assert_eq!(store.state.template_puts.load(Ordering::SeqCst), 0);
        assert_eq!(store.state.document_count(), 2);
    }
}

#[tokio::test]
async fn failed_template_upload_fails_the_export() {
    let store = FakeStore::spawn().await;
    store.state.reject_template.store(true, Ordering::SeqCst);
    let sink = sink_for(vec![store.host()]);

    let err = sink.export_snapshot(&snapshot()).await.unwrap_err();
    assert!(matches!(err, SinkError::Template(_)));
    assert!(!err.to_string().contains("t0psecret"));
    assert_eq!(store.state.document_count(), 0);
    assert!(!sink.template_checked());

    // Next attempt retries the check.
    store.state.reject_template.store(false, Ordering::SeqCst);
    sink.export_snapshot(&snapshot()).await.unwrap();
    assert_eq!(store.state.template_puts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn credentials_travel_as_basic_auth_under_base_path() {
    let store = FakeStore::spawn().await;
    let sink = sink_for(vec![format!("http://admin:s3cret@{}/base", store.host())]);

    sink.export_snapshot(&snapshot()).await.unwrap();

    let docs = store.state.documents();
    assert_eq!(docs[0].path, "/base/.monitoring-2014.03.01/node_stats");
    assert_eq!(
        docs[0].authorization.as_deref(),
        Some("Basic YWRtaW46czNjcmV0")
    );
    assert!(!sink.hosts()[0].to_string().contains("s3cret"));
}

#[tokio::test]
async fn rejected_documents_are_counted_and_reported() {
    let store = FakeStore::spawn().await;
    store.state.reject_documents.store(true, Ordering::SeqCst);
    let sink = sink_for(vec![store.host()]);

    let err = sink.export_snapshot(&snapshot()).await.unwrap_err();
    assert!(matches!(err, SinkError::Rejected { failed: 2, total: 2 }));
    assert_eq!(sink.stats().documents_failed, 2);
    assert_eq!(sink.stats().documents_sent, 0);
}

#[tokio::test]
async fn fails_over_to_next_host_and_prefers_it() {
    let store = FakeStore::spawn().await;
    let dead = dead_host().await;
    let sink = sink_for(vec![dead.clone(), store.host()]);

    sink.export_snapshot(&snapshot()).await.unwrap();
    assert_eq!(store.state.document_count(), 2);

    let hosts = sink.hosts();
    assert_eq!(hosts[0].port, store.addr.port());
    assert_eq!(format!("127.0.0.1:{}", hosts[1].port), dead);
}

#[tokio::test]
async fn no_reachable_host_is_an_export_error() {
    let sink = sink_for(vec![dead_host().await, dead_host().await]);

    let err = sink.export_snapshot(&snapshot()).await.unwrap_err();
    assert!(matches!(err, SinkError::NoAvailableHost(_)));
    assert!(!sink.template_checked());
}

#[tokio::test]
async fn events_are_posted_under_their_type() {
    let store = FakeStore::spawn().await;
    let sink = sink_for(vec![store.host()]);

    sink.export_event(&joined_event()).await.unwrap();

    let docs = store.state.documents();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].path, "/.monitoring-2014.03.01/node_event");
    assert_eq!(docs[0].body["event"], "node_joined");
    assert_eq!(docs[0].body["cluster_name"], "prod");
    assert_eq!(docs[0].body["@timestamp"], "2014-03-01T12:00:00.000Z");
}

#[tokio::test]
async fn cluster_name_can_be_left_out_of_event_documents() {
    let store = FakeStore::spawn().await;
    let sink = sink_with_params(
        vec![store.host()],
        RenderParams {
            output_cluster_name: false,
        },
    );

    sink.export_event(&joined_event()).await.unwrap();
    let docs = store.state.documents();
    assert!(docs[0].body.get("cluster_name").is_none());
    assert_eq!(docs[0].body["message"], "[alpha][10.0.0.1:9300] joined");
}

#[tokio::test]
async fn document_type_with_url_delimiters_is_dropped() {
    let store = FakeStore::spawn().await;
    let sink = sink_for(vec![store.host()]);
    let snapshot = StatsSnapshot::new(
        TS,
        vec![
            StatsDocument::new("node_stats?refresh=true", json!({"docs": 1})),
            StatsDocument::new("node_stats", json!({"docs": 2})),
        ],
    );

    let err = sink.export_snapshot(&snapshot).await.unwrap_err();
    assert!(matches!(err, SinkError::Rejected { failed: 1, total: 2 }));

    let docs = store.state.documents();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].path, "/.monitoring-2014.03.01/node_stats");
    assert_eq!(sink.stats().documents_failed, 1);
}
