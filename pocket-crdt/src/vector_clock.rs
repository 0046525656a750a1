//! Per-node operation counts.
//!
//! The field engine keeps one clock per document, counting how many
//! operations of each node the document has absorbed. Two replicas can
//! exchange these clocks as a cheap digest before syncing: if one clock
//! dominates the other, that replica already holds everything the other
//! has applied to the document and nothing needs to be sent back.

use pocket_types::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// How two document digests relate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CausalOrder {
    /// The other replica has seen strictly more.
    Before,
    /// This replica has seen strictly more.
    After,
    /// Each replica holds operations the other lacks.
    Concurrent,
    /// Both have seen the same number of operations from every node.
    Equal,
}

/// Operation counts keyed by originating node.
///
/// Counts only grow. A node without an entry has count zero, so `{a: 0}`
/// and `{}` compare equal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock {
    counts: BTreeMap<NodeId, u64>,
}

impl VectorClock {
    /// Creates a new empty vector clock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many operations of a node were counted.
    #[must_use]
    pub fn get(&self, node_id: &NodeId) -> u64 {
        self.counts.get(node_id).copied().unwrap_or(0)
    }

    /// Returns every node with its count, ordered by node id.
    pub fn nodes(&self) -> impl Iterator<Item = (&NodeId, &u64)> {
        self.counts.iter()
    }

    /// Returns the number of nodes with an entry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Returns true if the clock has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Counts one more operation of a node. Returns the new count.
    pub fn increment(&mut self, node_id: &NodeId) -> u64 {
        let count = self.counts.entry(node_id.clone()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Raises a node's count to `count`; lower values are ignored.
    pub fn update(&mut self, node_id: &NodeId, count: u64) {
        let entry = self.counts.entry(node_id.clone()).or_insert(0);
        *entry = (*entry).max(count);
    }

    /// Takes the larger count of every node.
    pub fn merge(&mut self, other: &Self) {
        for (node_id, &count) in &other.counts {
            self.update(node_id, count);
        }
    }

    /// Returns the merge of two digests.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.merge(other);
        result
    }

    /// Compares two digests node by node.
    #[must_use]
    pub fn compare(&self, other: &Self) -> CausalOrder {
        let nodes: BTreeSet<&NodeId> = self.counts.keys().chain(other.counts.keys()).collect();
        let (ahead, behind) = nodes.into_iter().fold((false, false), |(ahead, behind), node| {
            let (mine, theirs) = (self.get(node), other.get(node));
            (ahead || mine > theirs, behind || mine < theirs)
        });

        match (!behind, !ahead) {
            (true, true) => CausalOrder::Equal,
            (true, false) => CausalOrder::After,
            (false, true) => CausalOrder::Before,
            (false, false) => CausalOrder::Concurrent,
        }
    }

    /// Returns true if this clock is causally before the other.
    #[must_use]
    pub fn is_before(&self, other: &Self) -> bool {
        self.compare(other) == CausalOrder::Before
    }

    /// Returns true if this clock is causally after the other.
    #[must_use]
    pub fn is_after(&self, other: &Self) -> bool {
        self.compare(other) == CausalOrder::After
    }

    /// Returns true if this clock is concurrent with the other.
    #[must_use]
    pub fn is_concurrent(&self, other: &Self) -> bool {
        self.compare(other) == CausalOrder::Concurrent
    }

    /// Returns true if this digest counts at least as many operations as
    /// the other for every node.
    #[must_use]
    pub fn dominates(&self, other: &Self) -> bool {
        matches!(self.compare(other), CausalOrder::After | CausalOrder::Equal)
    }
}

impl PartialEq for VectorClock {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == CausalOrder::Equal
    }
}

impl Eq for VectorClock {}
