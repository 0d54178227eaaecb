//! Kafka consumer pool and dispatcher for topic-relay.
//!
//! Each configured topic is consumed by its own loop in its own consumer
//! group. Records are decoded from JSON, handed to the topic's handler and,
//! when the handler asks for it, forwarded to another topic through a single
//! shared producer. Offsets are committed manually, and only after a record
//! has been fully dispatched, which gives at-least-once delivery.
//!
//! Features:
//!
//! - Consumer Pool: one independent task per topic/group binding
//! - Manual Commits: a failed record is never acknowledged and holds back its partition
//! - Forwarding: forwards are acknowledged before the source record is committed
//! - Lifecycle: idempotent start/stop of consumers and producer, with bounded shutdown

/// Broker seam implemented by the rdkafka client and the in-memory test broker
pub mod broker;

/// rdkafka-backed consumers and producer
pub mod client;
pub mod config;

/// The per-binding consumption loop
pub mod consumer;
pub mod dispatcher;
pub mod error;

/// High-level API for starting and stopping the relay
pub mod manager;
pub mod offsets;
pub mod producer;
pub mod registry;
pub mod testing;

// Re-export main types for easy access
pub use broker::{Broker, Publisher, RecordStream};
pub use client::KafkaClient;
pub use config::{
    parse_duration, Config, ConsumerConfig, ForwardRoutes, ProducerConfig, RelaySettings,
};
pub use consumer::{ConsumerLoop, RecordOutcome};
pub use dispatcher::{DispatchError, Dispatched, Dispatcher};
pub use error::{Error, Result};
pub use manager::{Manager, ShutdownReport, TaskFailure};
pub use producer::Producer;
pub use registry::{handler_fn, Handler, HandlerFn, HandlerRegistry};
