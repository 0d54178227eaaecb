use relay_types::CodecError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Consumer error: {0}")]
    Consumer(String),

    #[error("Commit error: {0}")]
    Commit(String),

    #[error("Publish to '{topic}' failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("Producer not started. Call start_producer first")]
    ProducerNotStarted,

    #[error("Failed to start producer: {0}")]
    ProducerStart(String),

    #[error("No handler registered for topic: {0}")]
    MissingHandler(String),

    #[error("A handler is already registered for topic: {0}")]
    DuplicateHandler(String),

    #[error("Topic '{0}' is bound more than once")]
    DuplicateBinding(String),

    #[error("Broker connection closed: {0}")]
    BrokerClosed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Whether a receive error should end the consumption loop rather than be retried.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::BrokerClosed(_) => true,
            Error::Kafka(e) => matches!(
                e.rdkafka_error_code(),
                Some(rdkafka::types::RDKafkaErrorCode::Fatal)
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
