//! Interleaving of leave with join, publish and subscribe.
//!
//! The recording sink blocks its emitting thread on a chosen event, which
//! holds one operation between two of its awaits while another runs on a
//! second worker. After every interleaving no participant without a session
//! may keep an open timing metric.

use portal_service::errors::PortalError;
use portal_test_utils::{TestPortal, TestToken};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const HOLD: Duration = Duration::from_millis(300);
const STAGGER: Duration = Duration::from_millis(50);

async fn assert_no_orphaned_metrics(portal: &TestPortal) {
    for scope in portal.aggregator.in_flight().await.keys() {
        assert!(
            portal.directory.contains(scope).await,
            "open metrics for {scope} without a session"
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_publish_during_leave_flush_is_not_joined() {
    let portal = Arc::new(TestPortal::new().with_room("r1", "conference-a"));
    portal.join("alice", "r1").await;
    portal.sink.delay_on("conference_duration", HOLD);

    let leaving = Arc::clone(&portal);
    let leave = tokio::spawn(async move { leaving.router.leave("alice").await });
    tokio::time::sleep(STAGGER).await;

    let published = portal.router.publish("alice", "s1", &json!({})).await;
    leave.await.unwrap().unwrap();

    assert!(matches!(published, Err(PortalError::NotJoined(_))));
    assert!(portal.controllers.calls_to("publish").is_empty());
    assert!(!portal.directory.contains("alice").await);
    assert_eq!(portal.aggregator.group_count().await, 0);
    assert_no_orphaned_metrics(&portal).await;

    let publish = portal.sink.durations("publish_duration");
    assert_eq!(publish.len(), 1);
    assert_eq!(
        publish.first().unwrap().get("err_msg").unwrap(),
        "participant has not joined"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_subscribe_during_leave_flush_is_not_joined() {
    let portal = Arc::new(TestPortal::new().with_room("r1", "conference-a"));
    portal.join("alice", "r1").await;
    portal.sink.delay_on("conference_duration", HOLD);

    let leaving = Arc::clone(&portal);
    let leave = tokio::spawn(async move { leaving.router.leave("alice").await });
    tokio::time::sleep(STAGGER).await;

    let desc = json!({ "media": { "audio": { "from": "bob-stream" } } });
    let subscribed = portal.router.subscribe("alice", "sub1", &desc).await;
    leave.await.unwrap().unwrap();

    assert!(matches!(subscribed, Err(PortalError::NotJoined(_))));
    assert!(portal.controllers.calls_to("subscribe").is_empty());
    assert_eq!(portal.aggregator.group_count().await, 0);
    assert_eq!(portal.sink.durations("subscribe_duration").len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_leave_during_join_closes_conference_metric() {
    let portal = Arc::new(TestPortal::new().with_room("r1", "conference-a"));
    // Holds join after the directory insert, before its metric opens
    portal.sink.delay_on("join", HOLD);
    let token = portal.issue(&TestToken::new("tok1").room("r1"));

    let joining = Arc::clone(&portal);
    let join = tokio::spawn(async move { joining.router.join("alice", &token).await });
    tokio::time::sleep(STAGGER).await;

    portal.router.leave("alice").await.unwrap();
    join.await.unwrap().unwrap();

    assert!(!portal.directory.contains("alice").await);
    assert_eq!(portal.aggregator.group_count().await, 0);
    assert_no_orphaned_metrics(&portal).await;

    let conference = portal.sink.durations("conference_duration");
    assert_eq!(conference.len(), 1);
    assert_eq!(conference.first().unwrap().get("room_id").unwrap(), "r1");
    assert_eq!(portal.controllers.calls_to("leave").len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_operations_racing_leave_never_orphan_metrics() {
    let portal = Arc::new(
        TestPortal::new()
            .with_room("r1", "conference-a")
            .with_room("r2", "conference-b"),
    );
    portal.join("alice", "r1").await;
    portal.join("bob", "r2").await;

    let mut handles = Vec::new();
    for i in 0..16 {
        let p = Arc::clone(&portal);
        handles.push(tokio::spawn(async move {
            let stream_id = format!("s{i}");
            let _ = p.router.publish("alice", &stream_id, &json!({})).await;
            let subscription_id = format!("sub{i}");
            let _ = p
                .router
                .subscribe("alice", &subscription_id, &json!({ "media": {} }))
                .await;
        }));
    }
    let leaving = Arc::clone(&portal);
    handles.push(tokio::spawn(async move {
        leaving.router.leave("alice").await.unwrap();
    }));
    for handle in handles {
        handle.await.unwrap();
    }

    assert!(!portal.directory.contains("alice").await);
    assert_no_orphaned_metrics(&portal).await;

    // bob is untouched
    let in_flight = portal.aggregator.in_flight().await;
    assert_eq!(in_flight.len(), 1);
    assert!(in_flight.contains_key("bob"));
}
