//! Last-Writer-Wins Register (LWW-Register).
//!
//! A CRDT that stores a single value. Concurrent writes are resolved by
//! comparing Lamport timestamps: the higher counter wins, and equal counters
//! fall back to the node id.
//!
//! Use cases:
//! - Single-value document fields (title, status, owner)
//! - Each key of an [`LWWMap`](crate::LWWMap)

use pocket_types::{LamportTimestamp, NodeId};
use serde::{Deserialize, Serialize};

/// Outcome of folding a write into a register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterUpdate {
    /// The incoming write replaced the stored value.
    pub applied: bool,
    /// The incoming write was Lamport-concurrent with the stored one.
    /// Resolution is still deterministic; this only reports the race.
    pub concurrent: bool,
}

/// A Last-Writer-Wins Register.
///
/// The timestamp carries the writing node, so `(counter, node)` is unique per
/// write and the winner is the same on every replica.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LWWRegister<T> {
    /// The current value.
    value: T,
    /// Timestamp of the last winning write.
    timestamp: LamportTimestamp,
}

impl<T> LWWRegister<T> {
    /// Creates a register holding `value` written at `timestamp`.
    #[must_use]
    pub fn new(value: T, timestamp: LamportTimestamp) -> Self {
        Self { value, timestamp }
    }

    /// Returns a reference to the current value.
    #[must_use]
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Consumes the register, returning its value.
    #[must_use]
    pub fn into_value(self) -> T {
        self.value
    }

    /// Returns the timestamp of the last winning write.
    #[must_use]
    pub fn timestamp(&self) -> &LamportTimestamp {
        &self.timestamp
    }

    /// Returns the node that performed the last winning write.
    #[must_use]
    pub fn node_id(&self) -> &NodeId {
        &self.timestamp.node_id
    }

    /// Stores a local write unconditionally.
    ///
    /// The caller ticks its clock first, so the timestamp is already above
    /// anything this replica has seen.
    pub fn set(&mut self, value: T, timestamp: LamportTimestamp) {
        self.value = value;
        self.timestamp = timestamp;
    }

    /// Folds a (usually remote) write into the register.
    ///
    /// The write wins if its timestamp is greater in the total order.
    /// Re-applying the stored write is a no-op and reports no concurrency.
    pub fn apply(&mut self, value: T, timestamp: LamportTimestamp) -> RegisterUpdate {
        let concurrent = timestamp.is_concurrent_with(&self.timestamp);
        let applied = timestamp > self.timestamp;
        if applied {
            self.value = value;
            self.timestamp = timestamp;
        }
        RegisterUpdate {
            applied,
            concurrent,
        }
    }
}

impl<T: Clone> LWWRegister<T> {
    /// Merges another register into this one.
    ///
    /// The value with the higher timestamp wins. This operation is
    /// commutative, associative and idempotent.
    pub fn merge(&mut self, other: &Self) -> RegisterUpdate {
        self.apply(other.value.clone(), other.timestamp.clone())
    }

    /// Creates a new register that is the merge of this and another.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.merge(other);
        result
    }
}

impl<T: PartialEq> PartialEq for LWWRegister<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value && self.timestamp == other.timestamp
    }
}

impl<T: Eq> Eq for LWWRegister<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(counter: u64, node: &str) -> LamportTimestamp {
        LamportTimestamp::new(counter, NodeId::new(node))
    }

    #[test]
    fn higher_counter_wins() {
        let mut reg = LWWRegister::new("old", ts(1, "b"));
        let update = reg.apply("new", ts(2, "a"));
        assert!(update.applied);
        assert!(!update.concurrent);
        assert_eq!(*reg.value(), "new");
    }

    #[test]
    fn lower_counter_loses() {
        let mut reg = LWWRegister::new("kept", ts(5, "a"));
        let update = reg.apply("stale", ts(4, "z"));
        assert!(!update.applied);
        assert!(!update.concurrent);
        assert_eq!(*reg.value(), "kept");
    }

    #[test]
    fn concurrent_write_resolved_by_node() {
        let mut reg = LWWRegister::new("alice", ts(3, "alice"));
        let update = reg.apply("bob", ts(3, "bob"));
        assert!(update.applied);
        assert!(update.concurrent);
        assert_eq!(*reg.value(), "bob");

        let update = reg.apply("alice", ts(3, "alice"));
        assert!(!update.applied);
        assert!(update.concurrent);
        assert_eq!(*reg.value(), "bob");
    }

    #[test]
    fn reapplying_same_write_is_noop() {
        let mut reg = LWWRegister::new(1, ts(3, "a"));
        let update = reg.apply(1, ts(3, "a"));
        assert_eq!(update, RegisterUpdate::default());
    }

    #[test]
    fn merge_is_commutative() {
        let a = LWWRegister::new("a", ts(2, "x"));
        let b = LWWRegister::new("b", ts(2, "y"));
        assert_eq!(a.merged(&b), b.merged(&a));
    }
}
