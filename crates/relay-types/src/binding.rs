//! Topic bindings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A topic paired with the consumer group that reads it.
///
/// Each binding drives exactly one consumption loop.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TopicBinding {
    pub topic: String,
    pub group: String,
}

impl TopicBinding {
    pub fn new(topic: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            group: group.into(),
        }
    }
}

impl fmt::Display for TopicBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.topic, self.group)
    }
}

/// Parses the `topic=group` form used on the command line.
impl FromStr for TopicBinding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (topic, group) = s
            .split_once('=')
            .ok_or_else(|| format!("expected 'topic=group', got '{s}'"))?;
        let (topic, group) = (topic.trim(), group.trim());
        if topic.is_empty() || group.is_empty() {
            return Err(format!("topic and group must be non-empty in '{s}'"));
        }
        Ok(Self::new(topic, group))
    }
}
