//! Per-partition commit bookkeeping for one consumption loop.
//!
//! A record that fails (decode, handler or forward) pins its partition: no
//! later success on that partition may commit past the failed offset, so the
//! failed record is redelivered after a restart or rebalance. When the failed
//! offset itself is redelivered and succeeds, the pin is released.

use std::collections::HashMap;

use relay_types::{CommitMarker, RawRecord};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct PartitionOffsets {
    /// Last next-offset acknowledged by the broker
    committed: Option<i64>,
    /// Lowest offset that failed since the last time it was released
    held_at: Option<i64>,
}

#[derive(Debug, Default)]
pub struct OffsetTracker {
    partitions: HashMap<(String, i32), PartitionOffsets>,
}

impl OffsetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember that `record` was not processed.
    pub fn record_failure(&mut self, record: &RawRecord) {
        let state = self.state_mut(&record.topic, record.partition);
        state.held_at = Some(match state.held_at {
            Some(held) => held.min(record.offset),
            None => record.offset,
        });
    }

    /// The marker to commit after `record` succeeded, if committing it is safe and useful.
    ///
    /// Returns `None` when the partition is pinned below this record or when
    /// the marker would not move the committed position forward.
    pub fn commit_candidate(&mut self, record: &RawRecord) -> Option<CommitMarker> {
        let state = self.state_mut(&record.topic, record.partition);
        if let Some(held) = state.held_at {
            if record.offset > held {
                return None;
            }
            if record.offset == held {
                state.held_at = None;
            }
        }

        let marker = record.commit_marker();
        match state.committed {
            Some(committed) if marker.next_offset <= committed => None,
            _ => Some(marker),
        }
    }

    /// Record a marker the broker acknowledged.
    pub fn mark_committed(&mut self, marker: &CommitMarker) {
        let state = self.state_mut(&marker.topic, marker.partition);
        state.committed = Some(match state.committed {
            Some(committed) => committed.max(marker.next_offset),
            None => marker.next_offset,
        });
    }

    pub fn committed(&self, topic: &str, partition: i32) -> Option<i64> {
        self.state(topic, partition).and_then(|s| s.committed)
    }

    pub fn held_at(&self, topic: &str, partition: i32) -> Option<i64> {
        self.state(topic, partition).and_then(|s| s.held_at)
    }

    fn state(&self, topic: &str, partition: i32) -> Option<&PartitionOffsets> {
        self.partitions.get(&(topic.to_string(), partition))
    }

    fn state_mut(&mut self, topic: &str, partition: i32) -> &mut PartitionOffsets {
        self.partitions
            .entry((topic.to_string(), partition))
            .or_default()
    }
}
