//! The seam between the relay and a broker client.
//!
//! The relay only needs three things from a broker: a way to pull records for
//! a topic/group with manual offset commits, and a publishing connection that
//! waits for acknowledgment. [`KafkaClient`](crate::client::KafkaClient)
//! implements these over rdkafka; [`MemoryBroker`](crate::testing::MemoryBroker)
//! implements them in memory for tests.

use std::sync::Arc;

use async_trait::async_trait;
use relay_types::{CommitMarker, RawRecord, TopicBinding};

use crate::error::Result;

/// Factory for consumer and producer connections.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Open a consumer connection for one binding.
    ///
    /// The connection is released when the returned stream is dropped.
    async fn subscribe(&self, binding: &TopicBinding) -> Result<Box<dyn RecordStream>>;

    /// Open the publishing connection.
    async fn connect_publisher(&self) -> Result<Arc<dyn Publisher>>;
}

/// A subscribed consumer with manual offset commits.
#[async_trait]
pub trait RecordStream: Send {
    /// Wait for the next record.
    ///
    /// Must be cancel-safe: dropping the future before it completes must not
    /// lose a record.
    async fn next_record(&mut self) -> Result<RawRecord>;

    /// Acknowledge everything before `marker.next_offset` on the marker's partition.
    async fn commit(&mut self, marker: &CommitMarker) -> Result<()>;
}

/// A publishing connection shared by every consumption loop.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish one value and wait for the broker to acknowledge it.
    async fn publish(&self, topic: &str, key: Option<&str>, value: &[u8]) -> Result<()>;

    /// Flush outstanding deliveries before the connection is dropped.
    async fn close(&self) -> Result<()>;
}
