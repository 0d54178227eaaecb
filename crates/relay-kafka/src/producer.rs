//! The shared forwarding producer.

use std::sync::Arc;

use relay_types::DecodedMessage;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::broker::{Broker, Publisher};
use crate::error::{Error, Result};

/// Single publishing connection shared by every consumption loop.
///
/// Started and stopped independently of the consumers. While stopped, every
/// [`send`](Producer::send) fails immediately with [`Error::ProducerNotStarted`].
pub struct Producer {
    broker: Arc<dyn Broker>,
    publisher: RwLock<Option<Arc<dyn Publisher>>>,
}

impl Producer {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self {
            broker,
            publisher: RwLock::new(None),
        }
    }

    /// Open the publishing connection. No-op when already started.
    pub async fn start(&self) -> Result<()> {
        let mut publisher = self.publisher.write().await;
        if publisher.is_some() {
            info!("Producer already running");
            return Ok(());
        }
        *publisher = Some(self.broker.connect_publisher().await?);
        info!("Kafka producer started");
        Ok(())
    }

    /// Flush and drop the publishing connection. No-op when not started.
    ///
    /// The producer counts as stopped even if the flush fails.
    pub async fn stop(&self) -> Result<()> {
        let publisher = self.publisher.write().await.take();
        match publisher {
            Some(publisher) => {
                publisher.close().await?;
                info!("Kafka producer stopped");
            }
            None => debug!("Producer not running, nothing to stop"),
        }
        Ok(())
    }

    pub async fn is_started(&self) -> bool {
        self.publisher.read().await.is_some()
    }

    /// Encode `payload` as JSON and publish it, waiting for the broker's acknowledgment.
    pub async fn send(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: &DecodedMessage,
    ) -> Result<()> {
        // Clone the handle so the lock is not held across the delivery wait
        let publisher = self
            .publisher
            .read()
            .await
            .clone()
            .ok_or(Error::ProducerNotStarted)?;

        let value = relay_types::encode(payload)?;
        publisher.publish(topic, key, &value).await?;
        info!(topic, key, "Message sent");
        Ok(())
    }
}
