//! Handlers and the topic -> handler registry.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use relay_types::{DecodedMessage, ForwardInstruction};

use crate::error::{Error, Result};

/// Business logic for one topic.
///
/// Returning `Ok(Some(..))` asks the dispatcher to forward a message,
/// `Ok(None)` acknowledges the record without forwarding, and `Err(..)`
/// leaves the record uncommitted so it is redelivered. Records can be seen
/// more than once, so handlers must be idempotent.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, message: &DecodedMessage) -> anyhow::Result<Option<ForwardInstruction>>;
}

/// Adapter that lets an async closure act as a [`Handler`].
pub struct HandlerFn<F>(F);

/// Wrap an async closure as a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(DecodedMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Option<ForwardInstruction>>> + Send + 'static,
{
    HandlerFn(f)
}

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(DecodedMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Option<ForwardInstruction>>> + Send + 'static,
{
    async fn handle(&self, message: &DecodedMessage) -> anyhow::Result<Option<ForwardInstruction>> {
        (self.0)(message.clone()).await
    }
}

/// Maps each topic to exactly one handler.
///
/// Built once at startup and shared read-only with the dispatcher.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for a topic. A second handler for the same topic is rejected.
    pub fn register<H>(&mut self, topic: impl Into<String>, handler: H) -> Result<&mut Self>
    where
        H: Handler + 'static,
    {
        self.register_arc(topic, Arc::new(handler))
    }

    pub fn register_arc(
        &mut self,
        topic: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> Result<&mut Self> {
        let topic = topic.into();
        if self.handlers.contains_key(&topic) {
            return Err(Error::DuplicateHandler(topic));
        }
        self.handlers.insert(topic, handler);
        Ok(self)
    }

    pub fn get(&self, topic: &str) -> Option<&Arc<dyn Handler>> {
        self.handlers.get(topic)
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.handlers.contains_key(topic)
    }

    /// Registered topics, sorted.
    pub fn topics(&self) -> Vec<&str> {
        let mut topics: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        topics.sort_unstable();
        topics
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("topics", &self.topics())
            .finish()
    }
}
