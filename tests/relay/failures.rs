use super::*;
use serde_json::json;
use topic_relay::{default_registry, PassthroughHandler};

#[tokio::test]
async fn test_failed_handler_leaves_record_uncommitted() {
    let broker = MemoryBroker::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = HandlerRegistry::new();
    registry
        .register("orders", flaky(usize::MAX, Arc::clone(&calls)))
        .unwrap();
    let manager = manager(&broker, settings(&[("orders", "grp1")], &[]), registry);
    manager.start().await.unwrap();

    broker.push_json("orders", 0, None, &json!({"unique_id": "u1"}));

    assert!(
        broker
            .wait_until(WAIT, |_| calls.load(Ordering::SeqCst) == 1)
            .await
    );
    // The loop keeps running after a per-record failure
    assert_eq!(manager.running_consumers().await, 1);
    manager.shutdown().await;
    assert_eq!(broker.committed_offset("grp1", "orders", 0), None);
}

#[tokio::test]
async fn test_failure_holds_back_later_commits_until_redelivered() {
    let broker = MemoryBroker::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = HandlerRegistry::new();
    registry
        .register("orders", flaky(1, Arc::clone(&calls)))
        .unwrap();
    let manager = manager(&broker, settings(&[("orders", "grp1")], &[]), registry);
    manager.start().await.unwrap();

    broker.push_json("orders", 0, None, &json!({"n": 0}));
    broker.push_json("orders", 0, None, &json!({"n": 1}));
    assert!(
        broker
            .wait_until(WAIT, |_| calls.load(Ordering::SeqCst) == 2)
            .await
    );
    assert_eq!(broker.committed_offset("grp1", "orders", 0), None);

    // Offset 0 succeeds on redelivery, releasing the partition
    broker.redeliver("orders", 0, 0);
    assert!(
        broker
            .wait_until(WAIT, |b| b.committed_offset("grp1", "orders", 0) == Some(1))
            .await
    );
    broker.redeliver("orders", 0, 1);
    assert!(
        broker
            .wait_until(WAIT, |b| b.committed_offset("grp1", "orders", 0) == Some(2))
            .await
    );
    manager.shutdown().await;
}

#[tokio::test]
async fn test_failed_forward_is_not_committed() {
    let broker = MemoryBroker::new();
    broker.fail_publishes(true);
    let settings = settings(&[("orders", "grp1")], &[("orders", "orders-exchange")]);
    let registry = default_registry(&settings).unwrap();
    let manager = manager(&broker, settings, registry);
    manager.start().await.unwrap();

    broker.push_json("orders", 0, None, &json!({"unique_id": "u1"}));
    broker.push_json("orders", 0, None, &json!({"unique_id": "u2"}));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(broker.committed_offset("grp1", "orders", 0), None);

    broker.fail_publishes(false);
    broker.redeliver("orders", 0, 0);
    assert!(
        broker
            .wait_until(WAIT, |b| b.committed_offset("grp1", "orders", 0) == Some(1))
            .await
    );
    assert_eq!(broker.published().len(), 1);
    manager.shutdown().await;
}

#[tokio::test]
async fn test_undecodable_record_is_skipped_without_commit() {
    let broker = MemoryBroker::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = HandlerRegistry::new();
    registry
        .register("orders", flaky(0, Arc::clone(&calls)))
        .unwrap();
    let manager = manager(&broker, settings(&[("orders", "grp1")], &[]), registry);
    manager.start().await.unwrap();

    broker.push("orders", 0, None, "not json");
    broker.push("orders", 1, None, r#"{"unique_id":"u1"}"#);

    assert!(
        broker
            .wait_until(WAIT, |b| b.committed_offset("grp1", "orders", 1) == Some(1))
            .await
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(broker.committed_offset("grp1", "orders", 0), None);
    manager.shutdown().await;
}

#[tokio::test]
async fn test_broken_topic_does_not_stop_others() {
    let broker = MemoryBroker::new();
    let settings = settings(
        &[("orders", "grp1"), ("payments", "grp2")],
        &[("orders", "orders-exchange")],
    );
    let registry = default_registry(&settings).unwrap();
    let manager = manager(&broker, settings, registry);
    manager.start().await.unwrap();

    broker.disconnect("payments", "connection reset");
    broker.push_json("orders", 0, None, &json!({"unique_id": "u1"}));

    assert!(
        broker
            .wait_until(WAIT, |b| b.committed_offset("grp1", "orders", 0) == Some(1))
            .await
    );
    assert!(broker.wait_until(WAIT, |b| b.open_streams() == 1).await);
    assert_eq!(manager.running_consumers().await, 1);

    let report = manager.shutdown().await;
    assert_eq!(report.stopped, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].binding.topic, "payments");
}

#[tokio::test]
async fn test_forward_to_unrouted_destination_stops_only_that_consumer() {
    let broker = MemoryBroker::new();
    let mut registry = HandlerRegistry::new();
    registry
        .register("orders", PassthroughHandler::new("somewhere-else"))
        .unwrap()
        .register("payments", flaky(0, Arc::new(AtomicUsize::new(0))))
        .unwrap();
    let manager = manager(
        &broker,
        settings(
            &[("orders", "grp1"), ("payments", "grp2")],
            &[("orders", "orders-exchange")],
        ),
        registry,
    );
    manager.start().await.unwrap();

    broker.push_json("orders", 0, None, &json!({"unique_id": "u1"}));
    broker.push_json("payments", 0, None, &json!({"unique_id": "p1"}));

    assert!(
        broker
            .wait_until(WAIT, |b| b.committed_offset("grp2", "payments", 0) == Some(1))
            .await
    );
    assert!(broker.wait_until(WAIT, |b| b.open_streams() == 1).await);
    assert!(broker.published().is_empty());
    assert_eq!(broker.committed_offset("grp1", "orders", 0), None);

    let report = manager.shutdown().await;
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].binding.topic, "orders");
}

#[tokio::test]
async fn test_failing_handler_does_not_block_other_topics() {
    let broker = MemoryBroker::new();
    let a_calls = Arc::new(AtomicUsize::new(0));
    let mut registry = HandlerRegistry::new();
    registry
        .register("a", flaky(usize::MAX, Arc::clone(&a_calls)))
        .unwrap()
        .register("b", flaky(0, Arc::new(AtomicUsize::new(0))))
        .unwrap();
    let manager = manager(
        &broker,
        settings(&[("a", "grp-a"), ("b", "grp-b")], &[]),
        registry,
    );
    manager.start().await.unwrap();

    for n in 0..3 {
        broker.push_json("a", 0, None, &json!({"unique_id": format!("a{n}")}));
        broker.push_json("b", 0, None, &json!({"unique_id": format!("b{n}")}));
    }

    assert!(
        broker
            .wait_until(WAIT, |b| b.committed_offset("grp-b", "b", 0) == Some(3))
            .await
    );
    assert!(
        broker
            .wait_until(WAIT, |_| a_calls.load(Ordering::SeqCst) == 3)
            .await
    );
    assert_eq!(broker.committed_offset("grp-a", "a", 0), None);
    assert_eq!(manager.running_consumers().await, 2);

    let report = manager.shutdown().await;
    assert_eq!(report.stopped, 2);
    assert!(report.is_clean());
}
