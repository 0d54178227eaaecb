//! The consumption loop: pull -> decode -> dispatch -> commit.

use std::sync::Arc;
use std::time::Duration;

use relay_types::{CommitMarker, RawRecord, TopicBinding};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::broker::{Broker, RecordStream};
use crate::dispatcher::{DispatchError, Dispatcher};
use crate::error::{Error, Result};
use crate::offsets::OffsetTracker;

/// What happened to one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Dispatched and acknowledged to the broker
    Committed(CommitMarker),
    /// Dispatched, but an earlier failure on the partition holds the commit back
    CommitHeld,
    /// Dispatched, but the broker rejected the commit
    CommitFailed,
    /// Payload was not a JSON object; left uncommitted
    DecodeFailed,
    /// Handler or forward failed; left uncommitted
    DispatchFailed,
    /// Shutdown began while the record was in flight; left uncommitted
    Abandoned,
}

/// Drives one topic binding until cancelled.
///
/// Records are processed strictly one at a time, so within a partition they
/// are handled and committed in order.
pub struct ConsumerLoop {
    binding: TopicBinding,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
    poll_error_backoff: Duration,
    offsets: OffsetTracker,
}

impl ConsumerLoop {
    pub fn new(
        binding: TopicBinding,
        dispatcher: Arc<Dispatcher>,
        shutdown: CancellationToken,
        poll_error_backoff: Duration,
    ) -> Self {
        Self {
            binding,
            dispatcher,
            shutdown,
            poll_error_backoff,
            offsets: OffsetTracker::new(),
        }
    }

    /// Subscribe and consume until cancelled or a fatal error occurs.
    ///
    /// The subscription is dropped, and its connection released, on every
    /// exit path.
    pub async fn run(mut self, broker: Arc<dyn Broker>) -> Result<()> {
        let mut stream = broker.subscribe(&self.binding).await?;
        self.consume(stream.as_mut()).await
    }

    /// Consume from an already subscribed stream until cancelled or a fatal error occurs.
    pub async fn consume(&mut self, stream: &mut dyn RecordStream) -> Result<()> {
        loop {
            let received = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                received = stream.next_record() => received,
            };

            match received {
                Ok(record) => {
                    self.process(stream, record).await?;
                }
                Err(e) if e.is_fatal() => {
                    error!(
                        topic = %self.binding.topic,
                        group = %self.binding.group,
                        "Consumer lost its broker connection: {e}"
                    );
                    return Err(e);
                }
                Err(e) => {
                    warn!(topic = %self.binding.topic, "Error receiving message: {e}");
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.poll_error_backoff) => {}
                    }
                }
            }
        }

        info!(
            topic = %self.binding.topic,
            group = %self.binding.group,
            "Consumer task cancelled"
        );
        Ok(())
    }

    /// Decode, dispatch and, on success, commit a single record.
    ///
    /// Per-record failures are logged and reported as an outcome; only
    /// configuration errors are returned as `Err`.
    pub async fn process(
        &mut self,
        stream: &mut dyn RecordStream,
        record: RawRecord,
    ) -> Result<RecordOutcome> {
        let key = relay_types::decode_key(record.key.as_deref()).ok().flatten();
        debug!(
            topic = %record.topic,
            partition = record.partition,
            offset = record.offset,
            key = ?key,
            timestamp = ?record.timestamp_utc(),
            "Received record"
        );

        let message = match relay_types::decode(&record.value) {
            Ok(message) => message,
            Err(e) => {
                warn!(
                    topic = %record.topic,
                    partition = record.partition,
                    offset = record.offset,
                    "Skipping undecodable record, it stays uncommitted: {e}"
                );
                self.offsets.record_failure(&record);
                return Ok(RecordOutcome::DecodeFailed);
            }
        };

        if let Err(e) = self.dispatcher.dispatch(&record.topic, &message).await {
            if e.is_fatal() {
                error!(
                    topic = %record.topic,
                    group = %self.binding.group,
                    "Stopping consumer on configuration error: {e}"
                );
                self.offsets.record_failure(&record);
                return Err(match e {
                    DispatchError::MissingHandler(topic) => Error::MissingHandler(topic),
                    other => Error::InvalidConfig(other.to_string()),
                });
            }
            error!(
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                "Error processing message: {e}"
            );
            self.offsets.record_failure(&record);
            return Ok(RecordOutcome::DispatchFailed);
        }

        if self.shutdown.is_cancelled() {
            info!(
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                "Shutdown in progress, leaving record uncommitted"
            );
            return Ok(RecordOutcome::Abandoned);
        }

        let Some(marker) = self.offsets.commit_candidate(&record) else {
            debug!(
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                "Commit held back by an earlier failure on this partition"
            );
            return Ok(RecordOutcome::CommitHeld);
        };

        match stream.commit(&marker).await {
            Ok(()) => {
                self.offsets.mark_committed(&marker);
                debug!(
                    topic = %marker.topic,
                    partition = marker.partition,
                    offset = marker.next_offset,
                    "Committed offset"
                );
                Ok(RecordOutcome::Committed(marker))
            }
            Err(e) => {
                error!(
                    topic = %marker.topic,
                    partition = marker.partition,
                    offset = marker.next_offset,
                    "Failed to commit offset: {e}"
                );
                Ok(RecordOutcome::CommitFailed)
            }
        }
    }
}
