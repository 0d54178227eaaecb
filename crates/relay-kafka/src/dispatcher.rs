//! Routes decoded messages to handlers and relays forwards to the producer.

use std::sync::Arc;

use relay_types::{DecodedMessage, ForwardInstruction};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::ForwardRoutes;
use crate::error::Error;
use crate::producer::Producer;
use crate::registry::HandlerRegistry;

/// Why a message could not be dispatched.
///
/// Configuration errors are fatal for the topic's consumption loop; the
/// others only affect the current record.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("No handler registered for topic: {0}")]
    MissingHandler(String),

    #[error("Handler for '{topic}' forwarded to '{destination}' without a forward route")]
    UnroutedForward { topic: String, destination: String },

    #[error("Handler for '{topic}' forwarded to '{destination}', but its route is '{expected}'")]
    ForbiddenDestination {
        topic: String,
        destination: String,
        expected: String,
    },

    #[error("Handler failed: {0:#}")]
    Handler(#[source] anyhow::Error),

    #[error("Forward failed: {0}")]
    Forward(#[source] Error),
}

impl DispatchError {
    /// True for wiring mistakes that retrying the record cannot fix.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DispatchError::MissingHandler(_)
                | DispatchError::UnroutedForward { .. }
                | DispatchError::ForbiddenDestination { .. }
        )
    }
}

/// What a successful dispatch did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    /// The handler succeeded and asked for nothing to be forwarded
    Handled,
    /// The handler succeeded and its message was acknowledged by the broker
    Forwarded { destination: String },
}

pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    routes: ForwardRoutes,
    producer: Arc<Producer>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        routes: ForwardRoutes,
        producer: Arc<Producer>,
    ) -> Self {
        Self {
            registry,
            routes,
            producer,
        }
    }

    /// Run the topic's handler and forward its result.
    ///
    /// A forward that the broker does not acknowledge fails the whole
    /// dispatch, so the record is retried in full on redelivery.
    pub async fn dispatch(
        &self,
        topic: &str,
        message: &DecodedMessage,
    ) -> Result<Dispatched, DispatchError> {
        debug!(topic, "Dispatching event");

        let handler = self
            .registry
            .get(topic)
            .ok_or_else(|| DispatchError::MissingHandler(topic.to_string()))?;

        let instruction = handler
            .handle(message)
            .await
            .map_err(DispatchError::Handler)?;

        match instruction {
            Some(instruction) if !instruction.is_empty() => self.forward(topic, instruction).await,
            Some(_) => {
                debug!(topic, "Handler returned an empty message, nothing to forward");
                Ok(Dispatched::Handled)
            }
            None => Ok(Dispatched::Handled),
        }
    }

    async fn forward(
        &self,
        topic: &str,
        instruction: ForwardInstruction,
    ) -> Result<Dispatched, DispatchError> {
        let expected = self
            .routes
            .destination(topic)
            .ok_or_else(|| DispatchError::UnroutedForward {
                topic: topic.to_string(),
                destination: instruction.destination_topic.clone(),
            })?;
        if expected != instruction.destination_topic {
            return Err(DispatchError::ForbiddenDestination {
                topic: topic.to_string(),
                destination: instruction.destination_topic,
                expected: expected.to_string(),
            });
        }

        self.producer
            .send(
                &instruction.destination_topic,
                instruction.partition_key.as_deref(),
                &instruction.payload,
            )
            .await
            .map_err(DispatchError::Forward)?;

        info!(
            topic,
            destination = %instruction.destination_topic,
            "Event handled and forwarded"
        );
        Ok(Dispatched::Forwarded {
            destination: instruction.destination_topic,
        })
    }
}
