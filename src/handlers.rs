//! Built-in handlers used by the `run` command.

use async_trait::async_trait;
use relay_kafka::{Handler, HandlerRegistry, RelaySettings};
use relay_types::{DecodedMessage, ForwardInstruction, DEFAULT_KEY_FIELD};
use tracing::debug;

/// Forwards every message unchanged to a fixed destination.
///
/// The forwarded message is keyed by the payload's key field so that
/// messages for the same entity land on the same partition.
#[derive(Debug, Clone)]
pub struct PassthroughHandler {
    destination: String,
    key_field: String,
}

impl PassthroughHandler {
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            key_field: DEFAULT_KEY_FIELD.to_string(),
        }
    }

    pub fn with_key_field(mut self, key_field: impl Into<String>) -> Self {
        self.key_field = key_field.into();
        self
    }
}

#[async_trait]
impl Handler for PassthroughHandler {
    async fn handle(&self, message: &DecodedMessage) -> anyhow::Result<Option<ForwardInstruction>> {
        Ok(Some(ForwardInstruction::keyed_by(
            self.destination.clone(),
            message.clone(),
            &self.key_field,
        )))
    }
}

/// Logs the message and lets its offset be committed.
#[derive(Debug, Clone, Default)]
pub struct AcknowledgeHandler;

#[async_trait]
impl Handler for AcknowledgeHandler {
    async fn handle(&self, message: &DecodedMessage) -> anyhow::Result<Option<ForwardInstruction>> {
        debug!(
            unique_id = message.get(DEFAULT_KEY_FIELD).and_then(|v| v.as_str()),
            fields = message.len(),
            "Acknowledged message"
        );
        Ok(None)
    }
}

/// Registry for the CLI: passthrough for every bound topic with a forward
/// route, acknowledge for the rest.
pub fn default_registry(settings: &RelaySettings) -> anyhow::Result<HandlerRegistry> {
    let mut registry = HandlerRegistry::new();
    for binding in &settings.bindings {
        match settings.routes.destination(&binding.topic) {
            Some(destination) => {
                registry.register(&binding.topic, PassthroughHandler::new(destination))?
            }
            None => registry.register(&binding.topic, AcknowledgeHandler)?,
        };
    }
    Ok(registry)
}
