//! In-memory broker for exercising the relay without Kafka.
//!
//! [`MemoryBroker`] implements [`Broker`] with one unbounded queue per topic.
//! It records every commit and publication so tests can assert on them, and
//! exposes switches to make publishing, committing or producer startup fail.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use relay_types::{CodecError, CommitMarker, DecodedMessage, RawRecord, TopicBinding};
use tokio::sync::mpsc;

use crate::broker::{Broker, Publisher, RecordStream};
use crate::error::{Error, Result};

enum Delivery {
    Record(RawRecord),
    Disconnect(String),
}

struct TopicQueue {
    sender: mpsc::UnboundedSender<Delivery>,
    /// Taken by the stream currently subscribed to the topic
    receiver: Option<mpsc::UnboundedReceiver<Delivery>>,
    next_offsets: HashMap<i32, i64>,
    log: Vec<RawRecord>,
}

impl TopicQueue {
    fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Some(receiver),
            next_offsets: HashMap::new(),
            log: Vec::new(),
        }
    }
}

/// A commit acknowledged by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedOffset {
    pub group: String,
    pub marker: CommitMarker,
}

/// A message acknowledged by the broker's publishing side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub key: Option<String>,
    pub value: Vec<u8>,
}

impl PublishedMessage {
    pub fn payload(&self) -> std::result::Result<DecodedMessage, CodecError> {
        relay_types::decode(&self.value)
    }
}

#[derive(Default)]
struct Inner {
    topics: Mutex<HashMap<String, TopicQueue>>,
    commits: Mutex<Vec<CommittedOffset>>,
    published: Mutex<Vec<PublishedMessage>>,
    fail_publish: AtomicBool,
    fail_commit: AtomicBool,
    refuse_producer: AtomicBool,
    open_streams: AtomicUsize,
    publisher_connections: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record to a topic partition and return its offset.
    pub fn push(
        &self,
        topic: &str,
        partition: i32,
        key: Option<&str>,
        value: impl Into<Vec<u8>>,
    ) -> i64 {
        let mut topics = lock(&self.inner.topics);
        let queue = topics
            .entry(topic.to_string())
            .or_insert_with(TopicQueue::new);
        let next = queue.next_offsets.entry(partition).or_insert(0);
        let offset = *next;
        *next += 1;

        let record = RawRecord {
            topic: topic.to_string(),
            partition,
            offset,
            key: key.map(|k| k.as_bytes().to_vec()),
            value: value.into(),
            timestamp: Some(offset),
        };
        queue.log.push(record.clone());
        // The queue owns a receiver for its whole lifetime, so sending cannot fail
        let _ = queue.sender.send(Delivery::Record(record));
        offset
    }

    /// Deliver an already appended record again, as Kafka does after a
    /// rebalance or restart. Returns false when no such record exists.
    pub fn redeliver(&self, topic: &str, partition: i32, offset: i64) -> bool {
        let topics = lock(&self.inner.topics);
        let Some(queue) = topics.get(topic) else {
            return false;
        };
        match queue
            .log
            .iter()
            .find(|r| r.partition == partition && r.offset == offset)
        {
            Some(record) => {
                let _ = queue.sender.send(Delivery::Record(record.clone()));
                true
            }
            None => false,
        }
    }

    /// Append a JSON value to a topic partition and return its offset.
    pub fn push_json(
        &self,
        topic: &str,
        partition: i32,
        key: Option<&str>,
        value: &serde_json::Value,
    ) -> i64 {
        self.push(topic, partition, key, value.to_string())
    }

    /// Make the consumer of `topic` fail with a connection-loss error on its next pull.
    pub fn disconnect(&self, topic: &str, reason: &str) {
        let mut topics = lock(&self.inner.topics);
        let queue = topics
            .entry(topic.to_string())
            .or_insert_with(TopicQueue::new);
        let _ = queue.sender.send(Delivery::Disconnect(reason.to_string()));
    }

    pub fn fail_publishes(&self, fail: bool) {
        self.inner.fail_publish.store(fail, Ordering::SeqCst);
    }

    pub fn fail_commits(&self, fail: bool) {
        self.inner.fail_commit.store(fail, Ordering::SeqCst);
    }

    pub fn refuse_producer(&self, refuse: bool) {
        self.inner.refuse_producer.store(refuse, Ordering::SeqCst);
    }

    /// The most recent committed next-offset for a group's partition.
    pub fn committed_offset(&self, group: &str, topic: &str, partition: i32) -> Option<i64> {
        lock(&self.inner.commits)
            .iter()
            .rev()
            .find(|c| {
                c.group == group && c.marker.topic == topic && c.marker.partition == partition
            })
            .map(|c| c.marker.next_offset)
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        lock(&self.inner.published).clone()
    }

    /// Number of consumer connections currently held.
    pub fn open_streams(&self) -> usize {
        self.inner.open_streams.load(Ordering::SeqCst)
    }

    /// Number of publishing connections ever opened.
    pub fn publisher_connections(&self) -> usize {
        self.inner.publisher_connections.load(Ordering::SeqCst)
    }

    /// Poll `condition` until it holds or `timeout` elapses.
    pub async fn wait_until<F>(&self, timeout: Duration, condition: F) -> bool
    where
        F: Fn(&MemoryBroker) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if condition(self) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn subscribe(&self, binding: &TopicBinding) -> Result<Box<dyn RecordStream>> {
        let receiver = {
            let mut topics = lock(&self.inner.topics);
            topics
                .entry(binding.topic.clone())
                .or_insert_with(TopicQueue::new)
                .receiver
                .take()
        };
        let receiver = receiver.ok_or_else(|| {
            Error::Consumer(format!("Topic '{}' already has a consumer", binding.topic))
        })?;

        self.inner.open_streams.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryStream {
            inner: Arc::clone(&self.inner),
            binding: binding.clone(),
            receiver: Some(receiver),
        }))
    }

    async fn connect_publisher(&self) -> Result<Arc<dyn Publisher>> {
        if self.inner.refuse_producer.load(Ordering::SeqCst) {
            return Err(Error::ProducerStart("broker refused connection".to_string()));
        }
        self.inner
            .publisher_connections
            .fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemoryPublisher {
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct MemoryStream {
    inner: Arc<Inner>,
    binding: TopicBinding,
    receiver: Option<mpsc::UnboundedReceiver<Delivery>>,
}

#[async_trait]
impl RecordStream for MemoryStream {
    async fn next_record(&mut self) -> Result<RawRecord> {
        let receiver = self
            .receiver
            .as_mut()
            .ok_or_else(|| Error::BrokerClosed("stream already released".to_string()))?;
        match receiver.recv().await {
            Some(Delivery::Record(record)) => Ok(record),
            Some(Delivery::Disconnect(reason)) => Err(Error::BrokerClosed(reason)),
            None => Err(Error::BrokerClosed("topic queue closed".to_string())),
        }
    }

    async fn commit(&mut self, marker: &CommitMarker) -> Result<()> {
        if self.inner.fail_commit.load(Ordering::SeqCst) {
            return Err(Error::Commit("broker unavailable".to_string()));
        }
        lock(&self.inner.commits).push(CommittedOffset {
            group: self.binding.group.clone(),
            marker: marker.clone(),
        });
        Ok(())
    }
}

impl Drop for MemoryStream {
    fn drop(&mut self) {
        // Hand the queue back so the topic can be subscribed again
        if let Some(receiver) = self.receiver.take() {
            if let Some(queue) = lock(&self.inner.topics).get_mut(&self.binding.topic) {
                queue.receiver = Some(receiver);
            }
        }
        self.inner.open_streams.fetch_sub(1, Ordering::SeqCst);
    }
}

struct MemoryPublisher {
    inner: Arc<Inner>,
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(&self, topic: &str, key: Option<&str>, value: &[u8]) -> Result<()> {
        if self.inner.fail_publish.load(Ordering::SeqCst) {
            return Err(Error::Publish {
                topic: topic.to_string(),
                reason: "broker unavailable".to_string(),
            });
        }
        lock(&self.inner.published).push(PublishedMessage {
            topic: topic.to_string(),
            key: key.map(str::to_string),
            value: value.to_vec(),
        });
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
