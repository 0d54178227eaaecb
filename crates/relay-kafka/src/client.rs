use crate::broker::{Broker, Publisher, RecordStream};
use crate::config::{ConsumerConfig, ProducerConfig};
use crate::error::{Error, Result};
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{
    CommitMode, Consumer as RdkafkaConsumer, StreamConsumer as RdkafkaStreamConsumer,
};
use rdkafka::message::{BorrowedMessage as RdkafkaBorrowedMessage, Message as RdkafkaMessage};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer as RdkafkaProducer};
use rdkafka::{Offset, TopicPartitionList};
use relay_types::{CommitMarker, RawRecord, TopicBinding};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Kafka client that opens one consumer per binding and a shared producer
#[derive(Debug, Clone)]
pub struct KafkaClient {
    consumer: ConsumerConfig,
    producer: ProducerConfig,
}

impl KafkaClient {
    pub fn new(consumer: ConsumerConfig, producer: ProducerConfig) -> Self {
        Self { consumer, producer }
    }

    /// Build the rdkafka consumer configuration for a binding
    fn consumer_client_config(&self, binding: &TopicBinding) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.consumer.brokers)
            .set("group.id", &binding.group)
            .set(
                "enable.auto.commit",
                self.consumer.enable_auto_commit.to_string(),
            )
            .set("auto.offset.reset", &self.consumer.auto_offset_reset)
            .set("session.timeout.ms", &self.consumer.session_timeout_ms)
            .set("enable.partition.eof", "false");
        config
    }
}

#[async_trait]
impl Broker for KafkaClient {
    async fn subscribe(&self, binding: &TopicBinding) -> Result<Box<dyn RecordStream>> {
        let consumer: RdkafkaStreamConsumer = self
            .consumer_client_config(binding)
            .create()
            .map_err(|e| Error::Consumer(format!("Failed to create consumer: {e}")))?;

        consumer
            .subscribe(&[&binding.topic])
            .map_err(|e| Error::Consumer(format!("Failed to subscribe to topic: {e}")))?;

        info!(
            topic = %binding.topic,
            group = %binding.group,
            "Started consuming topic"
        );

        Ok(Box::new(KafkaRecordStream {
            consumer: Arc::new(consumer),
            binding: binding.clone(),
        }))
    }

    async fn connect_publisher(&self) -> Result<Arc<dyn Publisher>> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &self.producer.brokers)
            .set(
                "message.timeout.ms",
                self.producer.message_timeout_ms.to_string(),
            )
            .create()
            .map_err(|e| Error::ProducerStart(format!("Failed to create Kafka producer: {e}")))?;

        Ok(Arc::new(KafkaPublisher {
            producer,
            timeout: Duration::from_millis(self.producer.message_timeout_ms),
        }))
    }
}

/// A subscribed rdkafka stream consumer with manual commits
///
/// Unsubscribes when dropped; the underlying connection closes with the last
/// reference to the consumer.
pub struct KafkaRecordStream {
    consumer: Arc<RdkafkaStreamConsumer>,
    binding: TopicBinding,
}

#[async_trait]
impl RecordStream for KafkaRecordStream {
    async fn next_record(&mut self) -> Result<RawRecord> {
        let msg = self.consumer.recv().await?;
        Ok(to_raw_record(&msg))
    }

    async fn commit(&mut self, marker: &CommitMarker) -> Result<()> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(
            &marker.topic,
            marker.partition,
            Offset::Offset(marker.next_offset),
        )
        .map_err(|e| Error::Commit(format!("Failed to add partition offset: {e}")))?;

        // Sync commits block on the broker round trip
        let consumer = Arc::clone(&self.consumer);
        tokio::task::spawn_blocking(move || consumer.commit(&tpl, CommitMode::Sync))
            .await
            .map_err(|e| Error::Commit(format!("Commit task failed: {e}")))?
            .map_err(|e| Error::Commit(format!("Failed to commit offset: {e}")))
    }
}

impl Drop for KafkaRecordStream {
    fn drop(&mut self) {
        self.consumer.unsubscribe();
        info!(
            topic = %self.binding.topic,
            group = %self.binding.group,
            "Stopped consumer"
        );
    }
}

fn to_raw_record(msg: &RdkafkaBorrowedMessage) -> RawRecord {
    RawRecord {
        topic: msg.topic().to_string(),
        partition: msg.partition(),
        offset: msg.offset(),
        key: msg.key().map(|k| k.to_vec()),
        value: msg.payload().map(|p| p.to_vec()).unwrap_or_default(),
        timestamp: msg.timestamp().to_millis(),
    }
}

/// rdkafka future producer waiting for delivery reports
pub struct KafkaPublisher {
    producer: FutureProducer,
    timeout: Duration,
}

#[async_trait]
impl Publisher for KafkaPublisher {
    async fn publish(&self, topic: &str, key: Option<&str>, value: &[u8]) -> Result<()> {
        let mut record: FutureRecord<str, [u8]> = FutureRecord::to(topic).payload(value);
        if let Some(key) = key {
            record = record.key(key);
        }

        let (partition, offset) = self
            .producer
            .send(record, self.timeout)
            .await
            .map_err(|(err, _)| Error::Publish {
                topic: topic.to_string(),
                reason: err.to_string(),
            })?;

        debug!(topic, partition, offset, "Delivered message");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let producer = self.producer.clone();
        let timeout = self.timeout;
        tokio::task::spawn_blocking(move || producer.flush(timeout))
            .await
            .map_err(|e| Error::ProducerStart(format!("Flush task failed: {e}")))??;
        Ok(())
    }
}
