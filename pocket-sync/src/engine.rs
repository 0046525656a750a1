//! Field CRDT engine.
//!
//! Applies local mutations and merges remote operations into per-document
//! field state. The engine is synchronous: every call runs to completion
//! and takes `&mut self`. Convergence across replicas comes entirely from
//! the merge rules of the field types.

use crate::config::EngineConfig;
use crate::event::{EngineEvent, EventSink, MergeResult};
use crate::field::{self, FieldChange, FieldState};
use crate::state::DocumentState;
use crate::{SyncError, SyncResult};
use pocket_crdt::VectorClock;
use pocket_types::{
    DocumentId, FieldOperation, FieldType, LamportClock, LamportTimestamp, NodeId, OperationId,
    OperationKind,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

/// Serializable state of an engine, used to persist and restore a replica.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub clock: LamportClock,
    pub documents: BTreeMap<DocumentId, DocumentState>,
    pub log: Vec<FieldOperation>,
}

/// Applies and merges typed field operations for one replica.
#[derive(Debug)]
pub struct FieldCrdtEngine {
    config: EngineConfig,
    clock: LamportClock,
    documents: BTreeMap<DocumentId, DocumentState>,
    log: Vec<FieldOperation>,
    events: Option<EventSink>,
}

impl FieldCrdtEngine {
    /// Creates an empty engine for a replica.
    pub fn new(node_id: NodeId, config: EngineConfig) -> Self {
        Self {
            config,
            clock: LamportClock::new(node_id),
            documents: BTreeMap::new(),
            log: Vec::new(),
            events: None,
        }
    }

    /// Restores an engine from a snapshot, replacing all state. Use
    /// [`merge_snapshot`](Self::merge_snapshot) to combine replicas.
    pub fn from_snapshot(snapshot: EngineSnapshot, config: EngineConfig) -> Self {
        Self {
            config,
            clock: snapshot.clock,
            documents: snapshot.documents,
            log: snapshot.log,
            events: None,
        }
    }

    /// Captures the engine's state.
    #[must_use]
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            clock: self.clock.clone(),
            documents: self.documents.clone(),
            log: self.log.clone(),
        }
    }

    /// Routes engine events to `sink`. A closed receiver is ignored.
    pub fn set_event_sink(&mut self, sink: EventSink) {
        self.events = Some(sink);
    }

    pub fn node_id(&self) -> &NodeId {
        self.clock.node_id()
    }

    pub fn clock(&self) -> &LamportClock {
        &self.clock
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Declares or redeclares a field's CRDT type for local writes.
    pub fn declare_field(&mut self, field: impl Into<String>, field_type: FieldType) {
        self.config.fields.insert(field.into(), field_type);
    }

    /// Returns the configured type of a field.
    pub fn field_type(&self, field: &str) -> Option<FieldType> {
        self.config.field_type(field)
    }

    /// Returns the ids of every document with state.
    pub fn document_ids(&self) -> impl Iterator<Item = &DocumentId> {
        self.documents.keys()
    }

    /// Returns the raw state of one document.
    pub fn document(&self, document_id: &DocumentId) -> Option<&DocumentState> {
        self.documents.get(document_id)
    }

    /// Returns how many operations of each node a document has absorbed.
    #[must_use]
    pub fn document_clock(&self, document_id: &DocumentId) -> VectorClock {
        self.documents
            .get(document_id)
            .map(|d| d.clock.clone())
            .unwrap_or_default()
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(sink) = &self.events {
            let _ = sink.send(event);
        }
    }

    // ── Local mutations ──────────────────────────────────────────

    /// Applies a local mutation and returns the operation to replicate.
    ///
    /// For OR-Set removes, `value` is the element to remove; the tags
    /// currently observed for it are filled in.
    pub fn apply(
        &mut self,
        document_id: impl Into<DocumentId>,
        field: &str,
        kind: OperationKind,
        value: Value,
    ) -> SyncResult<FieldOperation> {
        let field_type = self
            .config
            .field_type(field)
            .ok_or_else(|| SyncError::UnconfiguredField {
                field: field.to_string(),
            })?;
        let (op, change) = self.prepare(document_id.into(), field, field_type, kind, value)?;
        Ok(self.commit(op, change))
    }

    /// Validates a local mutation without touching any state.
    ///
    /// The returned operation carries a provisional timestamp that
    /// [`commit`](Self::commit) replaces.
    pub(crate) fn prepare(
        &self,
        document_id: DocumentId,
        field: &str,
        field_type: FieldType,
        kind: OperationKind,
        value: Value,
    ) -> SyncResult<(FieldOperation, FieldChange)> {
        let existing = self.documents.get(&document_id).and_then(|d| d.field(field));
        if let Some(state) = existing {
            if state.field_type() != field_type {
                return Err(SyncError::invalid(format!(
                    "field {field:?} holds {} state, configured as {field_type}",
                    state.field_type()
                )));
            }
        }

        let value = match (field_type, kind) {
            (FieldType::OrSet, OperationKind::Remove) => {
                let tags = match existing {
                    Some(state) => state.observed_tags(&value)?,
                    None => Vec::new(),
                };
                field::remove_payload(value, &tags)
            }
            _ => value,
        };

        let op = FieldOperation::new(
            document_id,
            field,
            field_type,
            self.clock.now(),
            kind,
            value,
        );
        let change = FieldChange::parse(&op)?;
        Ok((op, change))
    }

    /// Stamps and applies a prepared operation. Cannot fail.
    pub(crate) fn commit(&mut self, mut op: FieldOperation, change: FieldChange) -> FieldOperation {
        op.timestamp = self.clock.tick();
        op.node_id = op.timestamp.node_id.clone();
        if self.config.field_type(&op.field).is_none() {
            self.declare_field(op.field.clone(), op.field_type);
        }

        let document = self.documents.entry(op.document_id.clone()).or_default();
        document
            .fields
            .entry(op.field.clone())
            .or_insert_with(|| FieldState::new(op.field_type))
            .apply(&op, change);
        document.record(&op);
        self.log.push(op.clone());

        debug!(
            "Applied local {} to {}.{} at {}",
            op.operation, op.document_id, op.field, op.timestamp
        );
        self.emit(EngineEvent::LocalApplied {
            operation: op.clone(),
        });
        op
    }

    // ── Remote operations ────────────────────────────────────────

    /// Merges operations received from `origin`.
    ///
    /// Duplicates are skipped. Malformed operations are dropped and
    /// reported; they never abort the rest of the batch.
    pub fn merge_remote(&mut self, origin: &NodeId, operations: &[FieldOperation]) -> MergeResult {
        let mut result = MergeResult::default();
        self.merge_operations(origin, operations, &mut result);

        result.merged = true;
        debug!(
            "Merged {} operations from {}: {} applied, {} skipped, {} rejected, {} conflicts",
            operations.len(),
            origin,
            result.applied,
            result.skipped,
            result.rejected,
            result.conflicts
        );
        self.emit(EngineEvent::RemoteMerged {
            origin: origin.clone(),
            result,
        });
        result
    }

    /// Merges the full state of another replica.
    ///
    /// Operations still in the snapshot's log are merged one by one first.
    /// Whatever the other replica has already compacted arrives as field
    /// state, so a peer that missed those operations still converges.
    pub fn merge_snapshot(&mut self, origin: &NodeId, snapshot: &EngineSnapshot) -> MergeResult {
        let mut result = MergeResult::default();
        self.merge_operations(origin, &snapshot.log, &mut result);
        for (document_id, remote) in &snapshot.documents {
            self.merge_document(document_id, remote, &mut result);
        }
        self.clock.receive(&snapshot.clock.now());

        result.merged = true;
        info!(
            "Merged snapshot of {} documents from {}: {} operations applied, {} rejected, {} conflicts",
            snapshot.documents.len(),
            origin,
            result.applied,
            result.rejected,
            result.conflicts
        );
        self.emit(EngineEvent::RemoteMerged {
            origin: origin.clone(),
            result,
        });
        result
    }

    fn merge_operations(
        &mut self,
        origin: &NodeId,
        operations: &[FieldOperation],
        result: &mut MergeResult,
    ) {
        for op in operations {
            if self
                .documents
                .get(&op.document_id)
                .is_some_and(|d| d.has_seen(&op.id))
            {
                result.skipped += 1;
                continue;
            }

            match self.merge_one(op) {
                Ok(conflicts) => {
                    result.applied += 1;
                    result.conflicts += conflicts;
                }
                Err(e) => {
                    warn!("Rejected operation {} from {}: {}", op.id, origin, e);
                    result.rejected += 1;
                    self.emit(EngineEvent::OperationRejected {
                        operation_id: op.id,
                        document_id: op.document_id.clone(),
                        field: op.field.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    /// Joins another replica's state of one document into the local one.
    fn merge_document(
        &mut self,
        document_id: &DocumentId,
        remote: &DocumentState,
        result: &mut MergeResult,
    ) {
        let Self {
            config,
            documents,
            log,
            ..
        } = self;
        let local = documents.entry(document_id.clone()).or_default();

        // Local operations the remote never saw, per node. A node is left
        // out when some of them are no longer logged; its counter slots
        // then fall back to the larger total.
        let mut unseen: BTreeMap<NodeId, Vec<&FieldOperation>> = BTreeMap::new();
        for node in local.seen_operations.keys() {
            let missing = local.unseen_by(remote, node);
            if missing.is_empty() {
                continue;
            }
            let logged: Vec<&FieldOperation> = log
                .iter()
                .filter(|op| op.document_id == *document_id && missing.contains(&op.id))
                .collect();
            if logged.len() == missing.len() {
                unseen.insert(node.clone(), logged);
            } else if !remote.unseen_by(local, node).is_empty() {
                warn!(
                    "Counter slots of {} in {} merged from partial history",
                    node, document_id
                );
            }
        }

        for (name, theirs) in &remote.fields {
            let expected = local
                .field(name)
                .map(FieldState::field_type)
                .or_else(|| config.field_type(name));
            if let Some(expected) = expected.filter(|t| *t != theirs.field_type()) {
                warn!(
                    "Rejected {} state for {}.{}: field is {}",
                    theirs.field_type(),
                    document_id,
                    name,
                    expected
                );
                result.rejected += 1;
                continue;
            }

            let Some(mine) = local.fields.get_mut(name) else {
                local.fields.insert(name.clone(), theirs.clone());
                continue;
            };
            let deltas: BTreeMap<NodeId, (u64, u64)> = unseen
                .iter()
                .map(|(node, ops)| (node.clone(), field::counter_deltas(ops.iter().copied(), name)))
                .collect();
            match mine.merge(theirs, &deltas) {
                Ok(conflicts) => result.conflicts += conflicts,
                Err(e) => {
                    warn!("Rejected state for {}.{}: {}", document_id, name, e);
                    result.rejected += 1;
                }
            }
        }

        local.absorb_seen(remote);
    }

    /// Folds one unseen remote operation. Returns the number of conflicts.
    fn merge_one(&mut self, op: &FieldOperation) -> SyncResult<usize> {
        if op.node_id != op.timestamp.node_id {
            return Err(SyncError::invalid(format!(
                "node {} does not match timestamp node {}",
                op.node_id, op.timestamp.node_id
            )));
        }
        let change = FieldChange::parse(op)?;

        let existing = self
            .documents
            .get(&op.document_id)
            .and_then(|d| d.field(&op.field))
            .map(FieldState::field_type)
            .or_else(|| self.config.field_type(&op.field));
        if let Some(expected) = existing {
            if expected != op.field_type {
                return Err(SyncError::invalid(format!(
                    "field {:?} is {expected}, operation is {}",
                    op.field, op.field_type
                )));
            }
        }

        self.clock.receive(&op.timestamp);

        let document = self.documents.entry(op.document_id.clone()).or_default();
        let conflicts = document
            .fields
            .entry(op.field.clone())
            .or_insert_with(|| FieldState::new(op.field_type))
            .apply(op, change);
        document.record(op);
        self.log.push(op.clone());

        debug!(
            "Applied remote {} to {}.{} at {}",
            op.operation, op.document_id, op.field, op.timestamp
        );
        for conflict in &conflicts {
            self.emit(EngineEvent::ConflictDetected {
                document_id: op.document_id.clone(),
                field: op.field.clone(),
                key: conflict.key.clone(),
                local: conflict.local.clone(),
                remote: op.timestamp.clone(),
            });
        }
        Ok(conflicts.len())
    }

    // ── Reads ────────────────────────────────────────────────────

    /// Returns the flattened `{field: value}` view of a document.
    #[must_use]
    pub fn document_state(&self, document_id: &DocumentId) -> Option<Map<String, Value>> {
        self.documents.get(document_id).map(|doc| {
            doc.fields
                .iter()
                .map(|(name, state)| (name.clone(), state.value()))
                .collect()
        })
    }

    /// Returns every logged operation in application order.
    pub fn operation_log(&self) -> &[FieldOperation] {
        &self.log
    }

    /// Returns logged operations ordered after `since`.
    #[must_use]
    pub fn operations_since(&self, since: &LamportTimestamp) -> Vec<FieldOperation> {
        self.log
            .iter()
            .filter(|op| op.timestamp > *since)
            .cloned()
            .collect()
    }

    // ── Compaction ───────────────────────────────────────────────

    /// Drops logged operations of every document holding more than the
    /// configured threshold, except the `pinned` ones.
    ///
    /// Field state and the seen-operation set are kept, so later merges
    /// and re-deliveries behave exactly as before. Returns the number of
    /// documents compacted.
    pub fn run_garbage_collection(&mut self, pinned: &HashSet<OperationId>) -> usize {
        let threshold = self.config.compaction_threshold;
        let compacted: HashSet<DocumentId> = self
            .documents
            .iter()
            .filter(|(_, doc)| doc.logged > threshold)
            .map(|(id, _)| id.clone())
            .collect();
        if compacted.is_empty() {
            return 0;
        }

        let before = self.log.len();
        self.log
            .retain(|op| !compacted.contains(&op.document_id) || pinned.contains(&op.id));

        for id in &compacted {
            if let Some(doc) = self.documents.get_mut(id) {
                doc.logged = self.log.iter().filter(|op| &op.document_id == id).count();
            }
        }

        info!(
            "Compacted {} documents, dropped {} operations",
            compacted.len(),
            before - self.log.len()
        );
        compacted.len()
    }
}
