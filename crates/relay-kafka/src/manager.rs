//! Lifecycle coordination for the consumer pool and the forwarding producer.

use std::sync::Arc;
use std::time::Duration;

use relay_types::TopicBinding;
use tokio::sync::Mutex;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::broker::Broker;
use crate::config::{RelaySettings, MAX_SHUTDOWN_TIMEOUT};
use crate::consumer::ConsumerLoop;
use crate::dispatcher::Dispatcher;
use crate::error::{Error, Result};
use crate::producer::Producer;
use crate::registry::HandlerRegistry;

/// One running consumption loop.
struct ConsumerTask {
    binding: TopicBinding,
    handle: JoinHandle<Result<()>>,
}

struct ConsumerPool {
    running: bool,
    shutdown: CancellationToken,
    tasks: Vec<ConsumerTask>,
    /// Failures of tasks that exited on their own, reported at the next stop
    reaped: Vec<TaskFailure>,
}

/// A consumer task that ended with an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub binding: TopicBinding,
    pub reason: String,
}

/// Outcome of [`Manager::stop_consumers`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Tasks that stopped cleanly after cancellation
    pub stopped: usize,
    /// Tasks that failed, panicked, or had to be aborted
    pub failures: Vec<TaskFailure>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Owns the consumer tasks and the shared producer.
///
/// Consumers and producer have independent, idempotent start/stop
/// operations. A consumer task that dies does not affect the others; its
/// error is logged and reported when the pool is stopped.
pub struct Manager {
    bindings: Vec<TopicBinding>,
    shutdown_timeout: Duration,
    poll_error_backoff: Duration,
    broker: Arc<dyn Broker>,
    dispatcher: Arc<Dispatcher>,
    producer: Arc<Producer>,
    pool: Mutex<ConsumerPool>,
}

impl Manager {
    /// Build a manager, checking that every bound topic has a handler.
    pub fn new(
        settings: RelaySettings,
        broker: Arc<dyn Broker>,
        registry: HandlerRegistry,
    ) -> Result<Self> {
        settings.validate()?;
        for binding in &settings.bindings {
            if !registry.contains(&binding.topic) {
                return Err(Error::MissingHandler(binding.topic.clone()));
            }
        }
        for topic in registry.topics() {
            if !settings.bindings.iter().any(|b| b.topic == topic) {
                warn!(topic, "Handler registered for a topic that is not consumed");
            }
        }

        let producer = Arc::new(Producer::new(Arc::clone(&broker)));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(registry),
            settings.routes,
            Arc::clone(&producer),
        ));

        Ok(Self {
            bindings: settings.bindings,
            shutdown_timeout: settings.shutdown_timeout,
            poll_error_backoff: settings.poll_error_backoff,
            broker,
            dispatcher,
            producer,
            pool: Mutex::new(ConsumerPool {
                running: false,
                shutdown: CancellationToken::new(),
                tasks: Vec::new(),
                reaped: Vec::new(),
            }),
        })
    }

    pub fn bindings(&self) -> &[TopicBinding] {
        &self.bindings
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn producer(&self) -> &Arc<Producer> {
        &self.producer
    }

    /// Start the producer, then the consumers.
    pub async fn start(&self) -> Result<()> {
        self.start_producer().await?;
        self.start_consumers().await;
        Ok(())
    }

    /// Stop the consumers, then the producer.
    pub async fn shutdown(&self) -> ShutdownReport {
        let report = self.stop_consumers().await;
        if let Err(e) = self.stop_producer().await {
            error!("Failed to stop producer cleanly: {e}");
        }
        report
    }

    /// Spawn one consumption loop per binding. No-op when already running.
    pub async fn start_consumers(&self) {
        let mut pool = self.pool.lock().await;
        if pool.running {
            info!("Consumers already running");
            return;
        }

        for binding in &self.bindings {
            let consumer = ConsumerLoop::new(
                binding.clone(),
                Arc::clone(&self.dispatcher),
                pool.shutdown.child_token(),
                self.poll_error_backoff,
            );
            let span = info_span!("consumer", topic = %binding.topic, group = %binding.group);
            let handle = tokio::spawn(consumer.run(Arc::clone(&self.broker)).instrument(span));
            pool.tasks.push(ConsumerTask {
                binding: binding.clone(),
                handle,
            });
        }
        pool.running = true;
        info!("Started {} consumer tasks", pool.tasks.len());
    }

    /// Cancel every consumption loop and wait for all of them to finish.
    ///
    /// Individual task errors are collected in the report rather than
    /// returned. Tasks still running after the shutdown timeout are aborted.
    /// No-op when already stopped.
    pub async fn stop_consumers(&self) -> ShutdownReport {
        let mut pool = self.pool.lock().await;
        if !pool.running {
            debug!("Consumers not running, nothing to stop");
            return ShutdownReport::default();
        }

        info!("Stopping Kafka consumers...");
        pool.shutdown.cancel();

        let now = tokio::time::Instant::now();
        let deadline = now
            .checked_add(self.shutdown_timeout)
            .unwrap_or(now + MAX_SHUTDOWN_TIMEOUT);
        let mut report = ShutdownReport {
            stopped: 0,
            failures: std::mem::take(&mut pool.reaped),
        };

        for mut task in pool.tasks.drain(..) {
            let joined = match tokio::time::timeout_at(deadline, &mut task.handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(
                        topic = %task.binding.topic,
                        "Consumer did not stop within {:?}, aborting it",
                        self.shutdown_timeout
                    );
                    task.handle.abort();
                    (&mut task.handle).await
                }
            };
            match task_failure(&task.binding, joined) {
                None => report.stopped += 1,
                Some(failure) => report.failures.push(failure),
            }
        }

        pool.running = false;
        pool.shutdown = CancellationToken::new();
        info!(
            stopped = report.stopped,
            failed = report.failures.len(),
            "All Kafka consumers stopped"
        );
        report
    }

    pub async fn start_producer(&self) -> Result<()> {
        self.producer.start().await
    }

    pub async fn stop_producer(&self) -> Result<()> {
        self.producer.stop().await
    }

    pub async fn is_running(&self) -> bool {
        self.pool.lock().await.running
    }

    /// Number of consumer tasks still alive.
    ///
    /// Tasks that have already exited are removed from the pool and their
    /// errors logged.
    pub async fn running_consumers(&self) -> usize {
        let mut pool = self.pool.lock().await;
        let (finished, alive): (Vec<_>, Vec<_>) = pool
            .tasks
            .drain(..)
            .partition(|task| task.handle.is_finished());
        pool.tasks = alive;

        for task in finished {
            if let Some(failure) = task_failure(&task.binding, task.handle.await) {
                error!(
                    topic = %failure.binding.topic,
                    group = %failure.binding.group,
                    "Consumer task exited: {}",
                    failure.reason
                );
                pool.reaped.push(failure);
            }
        }
        pool.tasks.len()
    }
}

fn task_failure(
    binding: &TopicBinding,
    joined: std::result::Result<Result<()>, JoinError>,
) -> Option<TaskFailure> {
    let reason = match joined {
        Ok(Ok(())) => return None,
        Ok(Err(e)) => e.to_string(),
        Err(e) if e.is_cancelled() => "aborted after shutdown timeout".to_string(),
        Err(e) => format!("task panicked: {e}"),
    };
    Some(TaskFailure {
        binding: binding.clone(),
        reason,
    })
}
