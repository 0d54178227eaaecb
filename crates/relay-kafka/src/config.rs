//! Relay configuration.
//!
//! Settings come from command-line flags (see [`Config`]) and, optionally, a
//! TOML file. [`Config::resolve`] merges both into an immutable
//! [`RelaySettings`]; CLI entries win over file entries for the same topic.
//!
//! ```toml
//! brokers = ["localhost:9092"]
//!
//! [topics]
//! orders = "grp1"
//!
//! [forward]
//! orders = "orders-exchange"
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use clap::Args;
use relay_types::TopicBinding;
use serde::Deserialize;

use crate::error::{Error, Result};

const DEFAULT_BROKERS: &str = "localhost:9092";
const OFFSET_RESET_POLICIES: &[&str] = &["earliest", "latest", "error"];
/// Upper bound on how long shutdown may wait for consumers
pub const MAX_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(24 * 3600);

/// Configuration for the relay's consumers and producer.
#[derive(Debug, Clone, Args)]
pub struct Config {
    /// Kafka brokers (comma-separated or multiple --brokers)
    #[arg(long, value_delimiter = ',', env = "KAFKA_BROKERS")]
    pub brokers: Vec<String>,

    /// Topic to consume and the consumer group to consume it with (repeatable)
    #[arg(long = "bind", value_name = "TOPIC=GROUP")]
    pub bindings: Vec<TopicBinding>,

    /// Topic whose handled messages may be forwarded, and where to (repeatable)
    #[arg(long = "forward", value_name = "TOPIC=DESTINATION")]
    pub forwards: Vec<ForwardRoute>,

    /// TOML file with `brokers`, `[topics]` and `[forward]` entries
    #[arg(long, value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    /// Where to start when the group has no committed offset ("earliest", "latest" or "error")
    #[arg(long, default_value = "earliest")]
    pub auto_offset_reset: String,

    /// Consumer session timeout in milliseconds
    #[arg(long, default_value = "6000")]
    pub session_timeout_ms: String,

    /// How long a forwarded message may wait for delivery, in milliseconds
    #[arg(long, default_value_t = 5000)]
    pub message_timeout_ms: u64,

    /// How long to wait for consumers to stop before aborting them.
    /// Format: seconds or with units like "30s", "2m", "1h"
    #[arg(long, default_value = "30s", value_parser = parse_duration)]
    pub shutdown_timeout: Duration,

    /// Pause after a transient receive error, in milliseconds
    #[arg(long, default_value_t = 500)]
    pub poll_error_backoff_ms: u64,
}

impl Config {
    /// Merge flags with the optional config file and validate the result.
    pub fn resolve(&self) -> Result<RelaySettings> {
        let file = match &self.config_file {
            Some(path) => FileConfig::from_file(path)?,
            None => FileConfig::default(),
        };

        let mut topics = file.topics;
        let mut seen = BTreeSet::new();
        for binding in &self.bindings {
            if !seen.insert(binding.topic.as_str()) {
                return Err(Error::DuplicateBinding(binding.topic.clone()));
            }
            topics.insert(binding.topic.clone(), binding.group.clone());
        }

        let mut forward = file.forward;
        for route in &self.forwards {
            forward.insert(route.topic.clone(), route.destination.clone());
        }

        let brokers = if !self.brokers.is_empty() {
            self.brokers.join(",")
        } else if let Some(brokers) = file.brokers.filter(|b| !b.is_empty()) {
            brokers.join(",")
        } else {
            DEFAULT_BROKERS.to_string()
        };

        if !OFFSET_RESET_POLICIES.contains(&self.auto_offset_reset.as_str()) {
            return Err(Error::InvalidConfig(format!(
                "unknown auto offset reset policy '{}', expected one of {OFFSET_RESET_POLICIES:?}",
                self.auto_offset_reset
            )));
        }

        let settings = RelaySettings {
            bindings: topics
                .into_iter()
                .map(|(topic, group)| TopicBinding::new(topic, group))
                .collect(),
            routes: ForwardRoutes::from(forward),
            consumer: ConsumerConfig {
                brokers: brokers.clone(),
                auto_offset_reset: self.auto_offset_reset.clone(),
                session_timeout_ms: self.session_timeout_ms.clone(),
                ..Default::default()
            },
            producer: ProducerConfig {
                brokers,
                message_timeout_ms: self.message_timeout_ms,
            },
            shutdown_timeout: self.shutdown_timeout,
            poll_error_backoff: Duration::from_millis(self.poll_error_backoff_ms),
        };
        settings.validate()?;
        Ok(settings)
    }
}

/// Contents of the optional TOML config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub brokers: Option<Vec<String>>,
    pub topics: BTreeMap<String, String>,
    pub forward: BTreeMap<String, String>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
            .map_err(|e| Error::InvalidConfig(format!("{}: {e}", path.display())))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::InvalidConfig(e.to_string()))
    }
}

/// A `topic=destination` pair from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardRoute {
    pub topic: String,
    pub destination: String,
}

impl FromStr for ForwardRoute {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let binding: TopicBinding = s
            .parse()
            .map_err(|_| format!("expected 'topic=destination', got '{s}'"))?;
        Ok(Self {
            topic: binding.topic,
            destination: binding.group,
        })
    }
}

/// Destination topic for each source topic whose messages may be forwarded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardRoutes(BTreeMap<String, String>);

impl ForwardRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(mut self, topic: impl Into<String>, destination: impl Into<String>) -> Self {
        self.0.insert(topic.into(), destination.into());
        self
    }

    pub fn destination(&self, topic: &str) -> Option<&str> {
        self.0.get(topic).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl From<BTreeMap<String, String>> for ForwardRoutes {
    fn from(routes: BTreeMap<String, String>) -> Self {
        Self(routes)
    }
}

/// Settings shared by every consumer the relay opens.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Kafka brokers (comma-separated list)
    pub brokers: String,
    /// Auto offset reset strategy ("earliest", "latest" or "error")
    ///
    /// "earliest" means a group with no committed offsets starts from the
    /// beginning of the topic, so nothing published before the first start is
    /// skipped.
    pub auto_offset_reset: String,
    /// Session timeout in milliseconds
    pub session_timeout_ms: String,
    /// Enable auto commit
    ///
    /// Always false for the relay: offsets are committed only after a record
    /// has been dispatched.
    pub enable_auto_commit: bool,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            brokers: DEFAULT_BROKERS.to_string(),
            auto_offset_reset: "earliest".to_string(),
            session_timeout_ms: "6000".to_string(),
            enable_auto_commit: false,
        }
    }
}

/// Settings for the forwarding producer.
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// Kafka brokers (comma-separated list)
    pub brokers: String,
    /// Delivery timeout in milliseconds
    pub message_timeout_ms: u64,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            brokers: DEFAULT_BROKERS.to_string(),
            message_timeout_ms: 5000,
        }
    }
}

/// Resolved, immutable relay settings.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// One consumption loop per binding, sorted by topic
    pub bindings: Vec<TopicBinding>,
    pub routes: ForwardRoutes,
    pub consumer: ConsumerConfig,
    pub producer: ProducerConfig,
    /// Bound on how long `stop_consumers` waits before aborting tasks
    pub shutdown_timeout: Duration,
    /// Pause after a transient receive error
    pub poll_error_backoff: Duration,
}

impl RelaySettings {
    /// Settings with default broker options for the given bindings and routes.
    pub fn new(bindings: Vec<TopicBinding>, routes: ForwardRoutes) -> Self {
        Self {
            bindings,
            routes,
            consumer: ConsumerConfig::default(),
            producer: ProducerConfig::default(),
            shutdown_timeout: Duration::from_secs(30),
            poll_error_backoff: Duration::from_millis(500),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.bindings.is_empty() {
            return Err(Error::InvalidConfig(
                "at least one topic binding is required".to_string(),
            ));
        }
        let mut topics = BTreeSet::new();
        for binding in &self.bindings {
            if binding.topic.is_empty() || binding.group.is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "binding '{binding}' has an empty topic or group"
                )));
            }
            if !topics.insert(binding.topic.as_str()) {
                return Err(Error::DuplicateBinding(binding.topic.clone()));
            }
        }
        for (topic, destination) in self.routes.iter() {
            if destination.is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "forward route for '{topic}' has an empty destination"
                )));
            }
            if destination == topic {
                return Err(Error::InvalidConfig(format!(
                    "forward route for '{topic}' points back at itself"
                )));
            }
        }
        if self.consumer.brokers.trim().is_empty() {
            return Err(Error::InvalidConfig("broker list is empty".to_string()));
        }
        if self.shutdown_timeout > MAX_SHUTDOWN_TIMEOUT {
            return Err(Error::InvalidConfig(format!(
                "shutdown timeout {:?} exceeds the maximum of {MAX_SHUTDOWN_TIMEOUT:?}",
                self.shutdown_timeout
            )));
        }
        Ok(())
    }
}

/// Parse a duration string like "1h", "30m", "300s", "300".
///
/// Plain numbers are seconds.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Empty duration string".to_string());
    }

    let (num_str, multiplier) = if let Some(num_str) = s.strip_suffix('h') {
        (num_str, 3600)
    } else if let Some(num_str) = s.strip_suffix('m') {
        (num_str, 60)
    } else if let Some(num_str) = s.strip_suffix('s') {
        (num_str, 1)
    } else {
        (s, 1)
    };

    let value: u64 = num_str
        .parse()
        .map_err(|e| format!("Invalid duration value '{s}': {e}"))?;
    let secs = value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("Duration '{s}' is too large"))?;
    Ok(Duration::from_secs(secs))
}
