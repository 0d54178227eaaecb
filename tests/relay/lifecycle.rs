use super::*;
use serde_json::json;
use topic_relay::default_registry;

fn forwarding_manager(broker: &MemoryBroker) -> Manager {
    let settings = settings(&[("orders", "grp1")], &[("orders", "orders-exchange")]);
    let registry = default_registry(&settings).unwrap();
    manager(broker, settings, registry)
}

#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let broker = MemoryBroker::new();
    let manager = forwarding_manager(&broker);
    manager.start().await.unwrap();
    assert!(broker.wait_until(WAIT, |b| b.open_streams() == 1).await);

    let first = manager.shutdown().await;
    assert_eq!(first.stopped, 1);
    assert!(first.is_clean());
    assert_eq!(broker.open_streams(), 0);
    assert!(!manager.producer().is_started().await);

    let second = manager.shutdown().await;
    assert_eq!(second.stopped, 0);
    assert!(second.is_clean());
}

#[tokio::test]
async fn test_shutdown_without_start() {
    let broker = MemoryBroker::new();
    let manager = forwarding_manager(&broker);
    assert!(manager.shutdown().await.is_clean());
    assert_eq!(broker.publisher_connections(), 0);
}

#[tokio::test]
async fn test_restart_resumes_consumption() {
    let broker = MemoryBroker::new();
    let manager = forwarding_manager(&broker);

    manager.start().await.unwrap();
    broker.push_json("orders", 0, None, &json!({"unique_id": "u1"}));
    assert!(
        broker
            .wait_until(WAIT, |b| b.committed_offset("grp1", "orders", 0) == Some(1))
            .await
    );
    manager.shutdown().await;

    broker.push_json("orders", 0, None, &json!({"unique_id": "u2"}));
    manager.start().await.unwrap();
    assert!(
        broker
            .wait_until(WAIT, |b| b.committed_offset("grp1", "orders", 0) == Some(2))
            .await
    );
    assert_eq!(broker.published().len(), 2);
    manager.shutdown().await;
}

#[tokio::test]
async fn test_consumers_without_producer_do_not_commit_forwards() {
    let broker = MemoryBroker::new();
    let manager = forwarding_manager(&broker);
    manager.start_consumers().await;

    broker.push_json("orders", 0, None, &json!({"unique_id": "u1"}));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(broker.committed_offset("grp1", "orders", 0), None);

    manager.start_producer().await.unwrap();
    broker.redeliver("orders", 0, 0);
    assert!(
        broker
            .wait_until(WAIT, |b| b.committed_offset("grp1", "orders", 0) == Some(1))
            .await
    );
    manager.shutdown().await;
}

#[tokio::test]
async fn test_unstartable_producer_fails_start() {
    let broker = MemoryBroker::new();
    broker.refuse_producer(true);
    let manager = forwarding_manager(&broker);

    assert!(manager.start().await.is_err());
    assert!(!manager.is_running().await);
}
