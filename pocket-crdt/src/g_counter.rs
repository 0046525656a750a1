//! Grow-only Counter CRDT.
//!
//! Each node owns one slot and only ever adds to it. The value is the sum
//! of all slots. Increments from different nodes never interact, so every
//! application order yields the same total.

use pocket_types::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A Grow-only Counter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GCounter {
    slots: BTreeMap<NodeId, u64>,
}

impl GCounter {
    /// Creates a new counter with value 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `amount` to the node's slot.
    pub fn increment(&mut self, node_id: &NodeId, amount: u64) {
        let slot = self.slots.entry(node_id.clone()).or_insert(0);
        *slot = slot.saturating_add(amount);
    }

    /// Returns the sum of all slots.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.slots.values().fold(0u64, |acc, v| acc.saturating_add(*v))
    }

    /// Returns the slot for one node (0 if it never incremented).
    #[must_use]
    pub fn slot(&self, node_id: &NodeId) -> u64 {
        self.slots.get(node_id).copied().unwrap_or(0)
    }

    /// Iterates over every node's slot.
    pub fn slots(&self) -> impl Iterator<Item = (&NodeId, &u64)> {
        self.slots.iter()
    }

    /// Merges another counter's state into this one (per-node max).
    ///
    /// Only valid between states that each hold complete per-node totals,
    /// such as snapshots of the same node's history.
    pub fn merge(&mut self, other: &Self) {
        for (node_id, &count) in &other.slots {
            self.merge_slot(node_id, count);
        }
    }

    /// Raises one node's slot to `count` if it is currently lower.
    pub fn merge_slot(&mut self, node_id: &NodeId, count: u64) {
        let entry = self.slots.entry(node_id.clone()).or_insert(0);
        *entry = (*entry).max(count);
    }

    /// Returns a new counter that is the merge of this and another.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.merge(other);
        result
    }
}
