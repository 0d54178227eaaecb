//! Kafka end-to-end tests
//!
//! These need a broker at `kafka:9092` (or `KAFKA_BROKERS`) and are ignored
//! by default. Run them with `cargo test --test kafka -- --ignored`.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use relay_kafka::{Config, KafkaClient, Manager};
use relay_producer::{collect_json, JsonTestProducer};
use serde_json::json;
use topic_relay::default_registry;

fn broker() -> String {
    std::env::var("KAFKA_BROKERS").unwrap_or_else(|_| "kafka:9092".to_string())
}

/// Topic names unique to one test run.
fn unique(name: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{name}-{nanos}")
}

fn config(broker: &str, bindings: &[String], forwards: &[String]) -> Config {
    Config {
        brokers: vec![broker.to_string()],
        bindings: bindings.iter().map(|b| b.parse().unwrap()).collect(),
        forwards: forwards.iter().map(|f| f.parse().unwrap()).collect(),
        config_file: None,
        auto_offset_reset: "earliest".to_string(),
        session_timeout_ms: "6000".to_string(),
        message_timeout_ms: 5000,
        shutdown_timeout: Duration::from_secs(10),
        poll_error_backoff_ms: 500,
    }
}

#[tokio::test]
#[ignore = "requires a Kafka broker"]
async fn test_kafka_forwards_orders_to_exchange() -> anyhow::Result<()> {
    let broker = broker();
    let orders = unique("orders");
    let exchange = unique("orders-exchange");

    let producer = JsonTestProducer::new(&broker).await?;
    producer.create_topic_if_not_exists(&orders, 1).await?;
    producer.create_topic_if_not_exists(&exchange, 1).await?;

    let settings = config(
        &broker,
        &[format!("{orders}=grp1")],
        &[format!("{orders}={exchange}")],
    )
    .resolve()?;
    let registry = default_registry(&settings)?;
    let client = KafkaClient::new(settings.consumer.clone(), settings.producer.clone());
    let manager = Manager::new(settings, Arc::new(client), registry)?;
    manager.start().await?;

    for (id, amount) in [("u1", 100), ("u2", 250)] {
        producer
            .publish_json(&orders, Some(id), &json!({"unique_id": id, "amount": amount}))
            .await?;
    }

    let forwarded = collect_json(
        &broker,
        &exchange,
        &unique("verify"),
        2,
        Duration::from_secs(30),
    )
    .await?;

    let report = manager.shutdown().await;
    assert!(report.is_clean(), "{report:?}");

    assert_eq!(forwarded.len(), 2);
    assert_eq!(forwarded[0].key.as_deref(), Some("u1"));
    assert_eq!(forwarded[0].value, json!({"unique_id": "u1", "amount": 100}));
    assert_eq!(forwarded[1].key.as_deref(), Some("u2"));
    Ok(())
}

#[tokio::test]
#[ignore = "requires a Kafka broker"]
async fn test_kafka_restart_does_not_reprocess_committed_records() -> anyhow::Result<()> {
    let broker = broker();
    let orders = unique("orders");
    let exchange = unique("orders-exchange");

    let producer = JsonTestProducer::new(&broker).await?;
    producer.create_topic_if_not_exists(&orders, 1).await?;
    producer.create_topic_if_not_exists(&exchange, 1).await?;

    let settings = config(
        &broker,
        &[format!("{orders}=grp1")],
        &[format!("{orders}={exchange}")],
    )
    .resolve()?;
    let registry = default_registry(&settings)?;
    let client = KafkaClient::new(settings.consumer.clone(), settings.producer.clone());
    let manager = Manager::new(settings, Arc::new(client), registry)?;

    manager.start().await?;
    producer
        .publish_json(&orders, Some("u1"), &json!({"unique_id": "u1"}))
        .await?;
    let first = collect_json(&broker, &exchange, &unique("verify"), 1, Duration::from_secs(30))
        .await?;
    assert_eq!(first.len(), 1);
    // Give the source commit time to land after the forward is visible
    tokio::time::sleep(Duration::from_secs(2)).await;
    manager.shutdown().await;

    manager.start().await?;
    producer
        .publish_json(&orders, Some("u2"), &json!({"unique_id": "u2"}))
        .await?;
    let all = collect_json(&broker, &exchange, &unique("verify"), 3, Duration::from_secs(15))
        .await?;
    manager.shutdown().await;

    let keys: Vec<_> = all.iter().filter_map(|m| m.key.as_deref()).collect();
    assert_eq!(keys, vec!["u1", "u2"]);
    Ok(())
}
