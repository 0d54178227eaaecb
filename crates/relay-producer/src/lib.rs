//! JSON test publisher for topic-relay
//!
//! Publishes JSON objects to Kafka topics the way upstream services would,
//! and reads them back from destination topics, so the relay can be tested
//! end to end against a real broker.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use relay_producer::JsonTestProducer;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let producer = JsonTestProducer::new("localhost:9092").await?;
//!
//!     // Create topic
//!     producer.create_topic_if_not_exists("orders", 3).await?;
//!
//!     // Publish an order keyed by its unique id
//!     producer
//!         .publish_json("orders", Some("u1"), &json!({"unique_id": "u1", "amount": 100}))
//!         .await?;
//!     Ok(())
//! }
//! ```

use anyhow::{Context, Result};
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use serde_json::Value;
use std::io::BufRead;
use std::time::Duration;

/// A JSON message read back from a topic
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedJson {
    pub key: Option<String>,
    pub value: Value,
}

/// Kafka producer wrapper for testing
pub struct JsonTestProducer {
    producer: FutureProducer,
    broker: String,
}

impl JsonTestProducer {
    /// Create a new JSON test producer
    pub async fn new(broker: &str) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", broker)
            .set("message.timeout.ms", "5000")
            .create()
            .context("Failed to create Kafka producer")?;

        Ok(Self {
            producer,
            broker: broker.to_string(),
        })
    }

    /// Create Kafka topic if it doesn't exist
    pub async fn create_topic_if_not_exists(&self, topic: &str, partitions: i32) -> Result<()> {
        let admin_client: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", &self.broker)
            .create()
            .context("Failed to create admin client")?;

        let new_topic = NewTopic::new(topic, partitions, TopicReplication::Fixed(1));
        let opts = AdminOptions::new().operation_timeout(Some(Duration::from_secs(5)));

        let results = admin_client
            .create_topics(&[new_topic], &opts)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create topics: {e}"))?;

        for result in results {
            match result {
                Ok(topic_name) => tracing::info!("Topic '{topic_name}' created successfully"),
                Err((topic_name, err)) if err.to_string().contains("already exists") => {
                    tracing::info!("Topic '{topic_name}' already exists")
                }
                Err((_, err)) => return Err(anyhow::anyhow!("Failed to create topic: {err}")),
            }
        }

        Ok(())
    }

    /// Publish a JSON value, returning the partition and offset it was written to
    pub async fn publish_json(
        &self,
        topic: &str,
        key: Option<&str>,
        value: &Value,
    ) -> Result<(i32, i64)> {
        let payload = serde_json::to_vec(value).context("Failed to encode JSON message")?;

        let mut record: FutureRecord<str, Vec<u8>> = FutureRecord::to(topic).payload(&payload);
        if let Some(key) = key {
            record = record.key(key);
        }

        let delivered = self
            .producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(err, _)| err)
            .context("Failed to send JSON message to Kafka")?;

        tracing::debug!("Published message to {topic} with key {key:?}");
        Ok(delivered)
    }

    /// Publish every non-empty line of `reader` as one JSON message
    ///
    /// Each message is keyed by the string value of `key_field`, when present.
    pub async fn publish_lines<R: BufRead>(
        &self,
        topic: &str,
        reader: R,
        key_field: &str,
    ) -> Result<usize> {
        let mut count = 0;
        for (index, line) in reader.lines().enumerate() {
            let line = line.context("Failed to read input")?;
            let Some((key, value)) = parse_line(&line, key_field)
                .with_context(|| format!("Invalid JSON on line {}", index + 1))?
            else {
                continue;
            };
            self.publish_json(topic, key.as_deref(), &value).await?;
            count += 1;
        }
        Ok(count)
    }
}

/// Parse one input line into an optional key and a JSON object
///
/// Blank lines yield `None`.
pub fn parse_line(line: &str, key_field: &str) -> Result<Option<(Option<String>, Value)>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let message = relay_types::decode(line.as_bytes())?;
    let key = message
        .get(key_field)
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok(Some((key, Value::Object(message))))
}

/// Read up to `count` JSON messages from `topic` with a fresh consumer group
///
/// Stops early when `timeout` elapses.
pub async fn collect_json(
    broker: &str,
    topic: &str,
    group_id: &str,
    count: usize,
    timeout: Duration,
) -> Result<Vec<ReceivedJson>> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", broker)
        .set("group.id", group_id)
        .set("auto.offset.reset", "earliest")
        .set("enable.partition.eof", "false")
        .create()
        .context("Failed to create consumer")?;
    consumer
        .subscribe(&[topic])
        .context("Failed to subscribe to topic")?;

    let mut received = Vec::new();
    let deadline = tokio::time::Instant::now() + timeout;
    while received.len() < count {
        let msg = match tokio::time::timeout_at(deadline, consumer.recv()).await {
            Ok(msg) => msg.context("Error receiving message")?,
            Err(_) => break,
        };
        let value = serde_json::from_slice(msg.payload().unwrap_or_default())
            .context("Received a non-JSON message")?;
        let key = msg
            .key()
            .map(|k| String::from_utf8_lossy(k).into_owned());
        received.push(ReceivedJson { key, value });
    }

    Ok(received)
}
