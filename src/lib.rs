//! topic-relay
//!
//! Consumes JSON messages from Kafka topics, hands each one to the handler
//! registered for its topic and, when the handler asks for it, forwards a
//! message to another topic. Offsets are committed only after a message has
//! been fully handled, so delivery is at-least-once.
//!
//! # Crates
//!
//! - `relay_types` - records, commit markers, forward instructions and the JSON codec
//! - `relay_kafka` - consumer loops, dispatcher, handler registry, producer and manager
//!
//! # CLI Usage
//!
//! ```bash
//! # Forward every order to the exchange topic, acknowledge payments
//! topic-relay run --brokers localhost:9092 \
//!   --bind orders=grp1 --bind payments=grp2 \
//!   --forward orders=orders-exchange
//! ```

pub mod handlers;

pub use handlers::{default_registry, AcknowledgeHandler, PassthroughHandler};

pub use relay_kafka::{
    handler_fn, Broker, Config, Dispatcher, Handler, HandlerRegistry, KafkaClient, Manager,
    RelaySettings, ShutdownReport,
};
pub use relay_types::{DecodedMessage, ForwardInstruction, TopicBinding, DEFAULT_KEY_FIELD};
