//! Lamport clock for ordering operations across replicas.
//!
//! Guarantees:
//! - Monotonicity (a replica never observes its own counter decrease)
//! - Causality (if A happens-before B, then ts(A) < ts(B))
//! - A total order over all timestamps, ties broken by node id

use crate::NodeId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A Lamport timestamp: a logical counter plus the node that issued it.
///
/// The derived `Ord` is the total order used to pick winners: counter
/// first, then node id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LamportTimestamp {
    /// Logical counter.
    pub counter: u64,
    /// Node that issued this timestamp.
    pub node_id: NodeId,
}

impl LamportTimestamp {
    /// Creates a timestamp from components.
    #[must_use]
    pub fn new(counter: u64, node_id: NodeId) -> Self {
        Self { counter, node_id }
    }

    /// The zero timestamp for a node, lower than anything it will issue.
    #[must_use]
    pub fn zero(node_id: NodeId) -> Self {
        Self {
            counter: 0,
            node_id,
        }
    }

    /// Returns true if neither timestamp causally dominates the other:
    /// same counter, issued by different nodes.
    #[must_use]
    pub fn is_concurrent_with(&self, other: &Self) -> bool {
        self.counter == other.counter && self.node_id != other.node_id
    }
}

impl PartialOrd for LamportTimestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LamportTimestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.counter.cmp(&other.counter) {
            Ordering::Equal => self.node_id.cmp(&other.node_id),
            other => other,
        }
    }
}

impl fmt::Display for LamportTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.counter, self.node_id)
    }
}

/// Compares two timestamps by counter only.
///
/// `Equal` means the two operations are Lamport-concurrent. Use the `Ord`
/// impl on [`LamportTimestamp`] when a deterministic winner is needed.
#[must_use]
pub fn compare_lamport_timestamps(a: &LamportTimestamp, b: &LamportTimestamp) -> Ordering {
    a.counter.cmp(&b.counter)
}

/// A per-replica Lamport clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LamportClock {
    counter: u64,
    node_id: NodeId,
}

impl LamportClock {
    /// Creates a clock at zero for a node.
    #[must_use]
    pub fn new(node_id: NodeId) -> Self {
        Self {
            counter: 0,
            node_id,
        }
    }

    /// Restores a clock at a known counter (snapshot reload).
    #[must_use]
    pub fn with_counter(node_id: NodeId, counter: u64) -> Self {
        Self { counter, node_id }
    }

    /// Returns the node this clock belongs to.
    #[must_use]
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Returns the current counter value.
    #[must_use]
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Returns the current timestamp without advancing.
    #[must_use]
    pub fn now(&self) -> LamportTimestamp {
        LamportTimestamp::new(self.counter, self.node_id.clone())
    }

    /// Advances the clock for a new local operation.
    ///
    /// Call exactly once per locally generated operation.
    pub fn tick(&mut self) -> LamportTimestamp {
        self.counter = self.counter.saturating_add(1);
        self.now()
    }

    /// Folds a remote timestamp into the clock.
    ///
    /// Sets the counter to `max(local, remote) + 1`. Must run before any
    /// ordering decision about the remote operation.
    pub fn receive(&mut self, remote: &LamportTimestamp) -> LamportTimestamp {
        self.counter = self.counter.max(remote.counter).saturating_add(1);
        self.now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(counter: u64, node: &str) -> LamportTimestamp {
        LamportTimestamp::new(counter, NodeId::new(node))
    }

    #[test]
    fn total_order_breaks_ties_by_node() {
        assert!(ts(1, "a") < ts(1, "b"));
        assert!(ts(2, "a") > ts(1, "z"));
    }

    #[test]
    fn compare_ignores_node_on_equal_counter() {
        assert_eq!(compare_lamport_timestamps(&ts(3, "a"), &ts(3, "b")), Ordering::Equal);
        assert!(ts(3, "a").is_concurrent_with(&ts(3, "b")));
        assert!(!ts(3, "a").is_concurrent_with(&ts(3, "a")));
    }

    #[test]
    fn receive_jumps_past_remote() {
        let mut clock = LamportClock::new(NodeId::new("a"));
        clock.tick();
        let after = clock.receive(&ts(10, "b"));
        assert_eq!(after.counter, 11);
        let after = clock.receive(&ts(2, "b"));
        assert_eq!(after.counter, 12);
    }
}
