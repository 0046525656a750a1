//! Positive-Negative Counter CRDT.
//!
//! A PN-Counter supports both increment and decrement operations across
//! distributed nodes. It pairs two [`GCounter`]s (positive and negative)
//! keyed by node ID. The value is `sum(positive) - sum(negative)`.

use crate::GCounter;
use pocket_types::NodeId;
use serde::{Deserialize, Serialize};

/// A Positive-Negative Counter CRDT.
///
/// Each node tracks its own increments and decrements independently.
/// The counter value is the difference between all increments and all
/// decrements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PNCounter {
    positive: GCounter,
    negative: GCounter,
}

impl PNCounter {
    /// Creates a new counter with value 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the counter by `amount` for the given node.
    pub fn increment(&mut self, node_id: &NodeId, amount: u64) {
        self.positive.increment(node_id, amount);
    }

    /// Decrements the counter by `amount` for the given node.
    pub fn decrement(&mut self, node_id: &NodeId, amount: u64) {
        self.negative.increment(node_id, amount);
    }

    /// Returns the current counter value (may be negative).
    #[must_use]
    pub fn value(&self) -> i64 {
        let pos = i128::from(self.positive.value());
        let neg = i128::from(self.negative.value());
        (pos - neg).clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
    }

    /// Returns the positive half.
    #[must_use]
    pub fn positive(&self) -> &GCounter {
        &self.positive
    }

    /// Returns the negative half.
    #[must_use]
    pub fn negative(&self) -> &GCounter {
        &self.negative
    }

    /// Merges another PNCounter into this one (takes per-node max).
    pub fn merge(&mut self, other: &Self) {
        self.positive.merge(&other.positive);
        self.negative.merge(&other.negative);
    }

    /// Raises one node's increment and decrement totals to at least the
    /// given values.
    pub fn merge_slots(&mut self, node_id: &NodeId, positive: u64, negative: u64) {
        self.positive.merge_slot(node_id, positive);
        self.negative.merge_slot(node_id, negative);
    }

    /// Returns a new counter that is the merge of this and another.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.merge(other);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(n: u8) -> NodeId {
        NodeId::new(format!("node-{n}"))
    }

    #[test]
    fn new_counter_is_zero() {
        let c = PNCounter::new();
        assert_eq!(c.value(), 0);
    }

    #[test]
    fn increment_increases_value() {
        let mut c = PNCounter::new();
        c.increment(&node(1), 5);
        assert_eq!(c.value(), 5);
        c.increment(&node(1), 3);
        assert_eq!(c.value(), 8);
    }

    #[test]
    fn decrement_decreases_value() {
        let mut c = PNCounter::new();
        c.increment(&node(1), 10);
        c.decrement(&node(1), 3);
        assert_eq!(c.value(), 7);
    }

    #[test]
    fn value_can_go_negative() {
        let mut c = PNCounter::new();
        c.decrement(&node(1), 5);
        assert_eq!(c.value(), -5);
    }

    #[test]
    fn merge_is_commutative() {
        let mut a = PNCounter::new();
        a.increment(&node(1), 3);
        a.decrement(&node(2), 1);

        let mut b = PNCounter::new();
        b.increment(&node(2), 5);
        b.decrement(&node(1), 2);

        let ab = a.merged(&b);
        let ba = b.merged(&a);
        assert_eq!(ab, ba);
        assert_eq!(ab.value(), ba.value());
    }

    #[test]
    fn merge_is_idempotent() {
        let mut a = PNCounter::new();
        a.increment(&node(1), 5);
        a.decrement(&node(2), 2);

        let aa = a.merged(&a);
        assert_eq!(a, aa);
    }

    #[test]
    fn merge_takes_max_for_decrements_too() {
        let mut a = PNCounter::new();
        a.decrement(&node(1), 10);

        let mut b = PNCounter::new();
        b.decrement(&node(1), 3);

        assert_eq!(a.merged(&b).value(), -10);
    }

    #[test]
    fn serialization_roundtrip() {
        let mut c = PNCounter::new();
        c.increment(&node(1), 10);
        c.increment(&node(2), 5);
        c.decrement(&node(1), 3);

        let json = serde_json::to_string(&c).unwrap();
        let parsed: PNCounter = serde_json::from_str(&json).unwrap();

        assert_eq!(c, parsed);
        assert_eq!(parsed.value(), 12);
    }

    #[test]
    fn equality_checks_per_node_not_just_value() {
        let mut a = PNCounter::new();
        a.increment(&node(1), 5);

        let mut b = PNCounter::new();
        b.increment(&node(2), 5);

        assert_eq!(a.value(), b.value());
        assert_ne!(a, b);
    }

    #[test]
    fn value_clamps_at_i64_bounds() {
        let mut c = PNCounter::new();
        c.increment(&node(1), u64::MAX);
        assert_eq!(c.value(), i64::MAX);
    }
}
