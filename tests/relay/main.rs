//! Relay scenarios against the in-memory broker
//!
//! Each test wires a Manager to a MemoryBroker, pushes JSON records and
//! asserts on what was forwarded and committed.

mod failures;
mod forwarding;
mod lifecycle;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use relay_kafka::testing::MemoryBroker;
use relay_kafka::{handler_fn, ForwardRoutes, Handler, HandlerRegistry, Manager, RelaySettings};
use relay_types::{DecodedMessage, ForwardInstruction, TopicBinding};

const WAIT: Duration = Duration::from_secs(5);

fn settings(bindings: &[(&str, &str)], routes: &[(&str, &str)]) -> RelaySettings {
    let routes = routes
        .iter()
        .fold(ForwardRoutes::new(), |acc, (topic, dest)| {
            acc.with_route(*topic, *dest)
        });
    let mut settings = RelaySettings::new(
        bindings
            .iter()
            .map(|(topic, group)| TopicBinding::new(*topic, *group))
            .collect(),
        routes,
    );
    settings.shutdown_timeout = Duration::from_secs(2);
    settings.poll_error_backoff = Duration::from_millis(10);
    settings
}

fn manager(broker: &MemoryBroker, settings: RelaySettings, registry: HandlerRegistry) -> Manager {
    Manager::new(settings, Arc::new(broker.clone()), registry).unwrap()
}

/// Handler that fails its first `failures` calls, then acknowledges.
fn flaky(failures: usize, calls: Arc<AtomicUsize>) -> impl Handler {
    handler_fn(move |_: DecodedMessage| {
        let call = calls.fetch_add(1, Ordering::SeqCst);
        let result: anyhow::Result<Option<ForwardInstruction>> = if call < failures {
            Err(anyhow::anyhow!("handler failure {call}"))
        } else {
            Ok(None)
        };
        async move { result }
    })
}
