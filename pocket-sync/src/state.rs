//! Per-document replication state.
//!
//! Tracks the field states of one document together with the operations
//! already folded into them, grouped by originating node. Re-delivered
//! operations are recognized without consulting the log, and two states
//! can tell which of them has seen more of a node's history.

use crate::field::FieldState;
use pocket_crdt::VectorClock;
use pocket_types::{FieldOperation, NodeId, OperationId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// State of a single document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentState {
    /// Field states keyed by field name.
    pub fields: BTreeMap<String, FieldState>,
    /// Operations applied per node.
    pub clock: VectorClock,
    /// Ids of every operation applied, per origin node. Kept across
    /// compaction.
    pub seen_operations: BTreeMap<NodeId, BTreeSet<OperationId>>,
    /// Operations of this document currently held in the engine log.
    pub logged: usize,
}

impl DocumentState {
    /// Creates an empty document state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the operation has already been applied.
    #[must_use]
    pub fn has_seen(&self, id: &OperationId) -> bool {
        self.seen_operations.values().any(|ids| ids.contains(id))
    }

    /// Records that an operation was applied.
    pub fn record(&mut self, op: &FieldOperation) {
        if self
            .seen_operations
            .entry(op.node_id.clone())
            .or_default()
            .insert(op.id)
        {
            self.clock.increment(&op.node_id);
            self.logged += 1;
        }
    }

    /// Returns the operations of `node` seen here but not by `other`.
    #[must_use]
    pub fn unseen_by(&self, other: &Self, node: &NodeId) -> BTreeSet<OperationId> {
        let theirs = other.seen_operations.get(node);
        self.seen_operations
            .get(node)
            .into_iter()
            .flatten()
            .filter(|id| !theirs.is_some_and(|t| t.contains(*id)))
            .copied()
            .collect()
    }

    /// Adds every operation `other` has seen to this state's record.
    ///
    /// Field state is merged separately; the log count is unchanged.
    pub fn absorb_seen(&mut self, other: &Self) {
        for (node, ids) in &other.seen_operations {
            let mine = self.seen_operations.entry(node.clone()).or_default();
            mine.extend(ids.iter().copied());
            self.clock
                .update(node, u64::try_from(mine.len()).unwrap_or(u64::MAX));
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldState> {
        self.fields.get(name)
    }
}
