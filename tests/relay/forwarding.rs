use super::*;
use serde_json::json;
use topic_relay::{default_registry, PassthroughHandler};

#[tokio::test]
async fn test_order_is_forwarded_once_and_committed() {
    let broker = MemoryBroker::new();
    let settings = settings(&[("orders", "grp1")], &[("orders", "orders-exchange")]);
    let registry = default_registry(&settings).unwrap();
    let manager = manager(&broker, settings, registry);
    manager.start().await.unwrap();

    broker.push_json("orders", 0, None, &json!({"unique_id": "u1", "amount": 100}));

    assert!(
        broker
            .wait_until(WAIT, |b| b.committed_offset("grp1", "orders", 0) == Some(1))
            .await
    );
    let published = broker.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].topic, "orders-exchange");
    assert_eq!(published[0].key.as_deref(), Some("u1"));
    assert_eq!(
        serde_json::Value::Object(published[0].payload().unwrap()),
        json!({"unique_id": "u1", "amount": 100})
    );

    assert!(manager.shutdown().await.is_clean());
}

#[tokio::test]
async fn test_acknowledged_messages_commit_without_publishing() {
    let broker = MemoryBroker::new();
    let settings = settings(&[("payments", "grp2")], &[]);
    let registry = default_registry(&settings).unwrap();
    let manager = manager(&broker, settings, registry);
    manager.start().await.unwrap();

    for amount in [10, 20, 30] {
        broker.push_json("payments", 0, None, &json!({"unique_id": "p", "amount": amount}));
    }

    assert!(
        broker
            .wait_until(WAIT, |b| b.committed_offset("grp2", "payments", 0) == Some(3))
            .await
    );
    assert!(broker.published().is_empty());
    manager.shutdown().await;
}

#[tokio::test]
async fn test_commits_follow_each_partition() {
    let broker = MemoryBroker::new();
    let mut registry = HandlerRegistry::new();
    registry
        .register("orders", PassthroughHandler::new("orders-exchange"))
        .unwrap();
    let manager = manager(
        &broker,
        settings(&[("orders", "grp1")], &[("orders", "orders-exchange")]),
        registry,
    );
    manager.start().await.unwrap();

    broker.push_json("orders", 0, None, &json!({"unique_id": "a"}));
    broker.push_json("orders", 1, None, &json!({"unique_id": "b"}));
    broker.push_json("orders", 1, None, &json!({"unique_id": "c"}));

    assert!(
        broker
            .wait_until(WAIT, |b| {
                b.committed_offset("grp1", "orders", 0) == Some(1)
                    && b.committed_offset("grp1", "orders", 1) == Some(2)
            })
            .await
    );
    let keys: Vec<_> = broker
        .published()
        .into_iter()
        .filter_map(|m| m.key)
        .collect();
    assert_eq!(keys, vec!["a", "b", "c"]);
    manager.shutdown().await;
}

#[tokio::test]
async fn test_empty_forward_is_treated_as_acknowledgement() {
    let broker = MemoryBroker::new();
    let mut registry = HandlerRegistry::new();
    registry
        .register(
            "orders",
            handler_fn(|_: DecodedMessage| async {
                Ok(Some(ForwardInstruction::new(
                    "orders-exchange",
                    None,
                    DecodedMessage::new(),
                )))
            }),
        )
        .unwrap();
    let manager = manager(
        &broker,
        settings(&[("orders", "grp1")], &[("orders", "orders-exchange")]),
        registry,
    );
    manager.start().await.unwrap();

    broker.push_json("orders", 0, None, &json!({"unique_id": "u1"}));

    assert!(
        broker
            .wait_until(WAIT, |b| b.committed_offset("grp1", "orders", 0) == Some(1))
            .await
    );
    assert!(broker.published().is_empty());
    manager.shutdown().await;
}
