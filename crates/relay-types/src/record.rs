//! Records, commit markers and forward instructions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A decoded record value: a JSON object keyed by field name.
pub type DecodedMessage = Map<String, Value>;

/// Payload field used as the partition key when a handler does not pick one.
pub const DEFAULT_KEY_FIELD: &str = "unique_id";

/// A record as pulled from the broker, before decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// Topic the record was read from
    pub topic: String,
    /// Partition within the topic
    pub partition: i32,
    /// Offset within the partition
    pub offset: i64,
    /// Record key (if any)
    pub key: Option<Vec<u8>>,
    /// Record value; an absent broker payload is represented as empty
    pub value: Vec<u8>,
    /// Timestamp in milliseconds since epoch (if the broker supplied one)
    pub timestamp: Option<i64>,
}

impl RawRecord {
    /// The marker to commit once this record has been fully dispatched.
    pub fn commit_marker(&self) -> CommitMarker {
        CommitMarker::after(&self.topic, self.partition, self.offset)
    }

    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        self.timestamp.and_then(DateTime::from_timestamp_millis)
    }
}

/// The next offset to read for a partition.
///
/// Only ever built from a record that has been handled (and forwarded, when
/// the handler asked for it).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommitMarker {
    pub topic: String,
    pub partition: i32,
    /// Offset of the next record to read, i.e. the processed offset plus one
    pub next_offset: i64,
}

impl CommitMarker {
    /// Marker that acknowledges everything up to and including `offset`.
    pub fn after(topic: &str, partition: i32, offset: i64) -> Self {
        Self {
            topic: topic.to_string(),
            partition,
            next_offset: offset + 1,
        }
    }
}

/// A message a handler wants published to another topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardInstruction {
    pub destination_topic: String,
    pub partition_key: Option<String>,
    pub payload: DecodedMessage,
}

impl ForwardInstruction {
    pub fn new(
        destination_topic: impl Into<String>,
        partition_key: Option<String>,
        payload: DecodedMessage,
    ) -> Self {
        Self {
            destination_topic: destination_topic.into(),
            partition_key,
            payload,
        }
    }

    /// Builds an instruction whose key is taken from a string field of the payload.
    ///
    /// Missing or non-string fields yield an unkeyed instruction.
    pub fn keyed_by(
        destination_topic: impl Into<String>,
        payload: DecodedMessage,
        key_field: &str,
    ) -> Self {
        let partition_key = payload
            .get(key_field)
            .and_then(Value::as_str)
            .map(str::to_string);
        Self::new(destination_topic, partition_key, payload)
    }

    /// True when there is nothing to publish.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
