//! Replication bridge.
//!
//! Turns whole-document writes into field operations, one engine per
//! collection, and tracks which operations still have to reach other
//! replicas.

use crate::config::BridgeConfig;
use crate::engine::{EngineSnapshot, FieldCrdtEngine};
use crate::event::{EventSink, MergeResult};
use crate::field::{self, FieldState};
use crate::{SyncError, SyncResult};
use pocket_types::{
    DocumentId, FieldOperation, FieldType, LamportTimestamp, NodeId, OperationId, OperationKind,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::debug;

/// Reserved field marking a document as deleted.
pub const DELETED_FIELD: &str = "_deleted";

/// A local operation not yet acknowledged by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperation {
    pub collection: String,
    pub operation: FieldOperation,
    /// True once handed to the transport by [`ReplicationBridge::flush_ops`].
    pub sent: bool,
}

/// One planned field mutation.
struct Intent {
    field: String,
    field_type: FieldType,
    kind: OperationKind,
    value: Value,
}

/// Routes document writes of one replica into per-collection engines.
#[derive(Debug)]
pub struct ReplicationBridge {
    node_id: NodeId,
    config: BridgeConfig,
    engines: BTreeMap<String, FieldCrdtEngine>,
    pending: Vec<PendingOperation>,
    events: Option<EventSink>,
}

impl ReplicationBridge {
    pub fn new(node_id: NodeId, config: BridgeConfig) -> Self {
        Self {
            node_id,
            config,
            engines: BTreeMap::new(),
            pending: Vec::new(),
            events: None,
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Routes events of every engine, existing or future, to `sink`.
    pub fn set_event_sink(&mut self, sink: EventSink) {
        for engine in self.engines.values_mut() {
            engine.set_event_sink(sink.clone());
        }
        self.events = Some(sink);
    }

    /// Returns the engine of a collection, if one was created.
    pub fn engine(&self, collection: &str) -> Option<&FieldCrdtEngine> {
        self.engines.get(collection)
    }

    /// Returns the names of collections with an engine.
    pub fn collections(&self) -> impl Iterator<Item = &str> {
        self.engines.keys().map(String::as_str)
    }

    fn engine_mut(&mut self, collection: &str) -> &mut FieldCrdtEngine {
        let Self {
            node_id,
            config,
            engines,
            events,
            ..
        } = self;
        engines.entry(collection.to_string()).or_insert_with(|| {
            let mut engine = FieldCrdtEngine::new(node_id.clone(), config.engine_config(collection));
            engine.declare_field(DELETED_FIELD, FieldType::LwwRegister);
            if let Some(sink) = events {
                engine.set_event_sink(sink.clone());
            }
            engine
        })
    }

    // ── Local writes ─────────────────────────────────────────────

    /// Writes a document, emitting one operation per changed field.
    ///
    /// Every operation is validated by the engine before the first one is
    /// applied, so a failed write leaves the document untouched.
    pub fn write(
        &mut self,
        collection: &str,
        document_id: impl Into<DocumentId>,
        document: &Value,
    ) -> SyncResult<Vec<FieldOperation>> {
        let document_id = document_id.into();
        let Value::Object(fields) = document else {
            return Err(SyncError::invalid(format!(
                "document {document_id} must be a JSON object"
            )));
        };

        let default_type = self.config.default_field_type;
        let engine = self.engine_mut(collection);
        let current = engine.document_state(&document_id).unwrap_or_default();

        let mut intents = Vec::new();
        if current.get(DELETED_FIELD) == Some(&Value::Bool(true)) {
            intents.push(Intent {
                field: DELETED_FIELD.to_string(),
                field_type: FieldType::LwwRegister,
                kind: OperationKind::Set,
                value: Value::Bool(false),
            });
        }
        for (name, value) in fields {
            if name == DELETED_FIELD {
                return Err(SyncError::invalid(format!("{DELETED_FIELD} is reserved")));
            }
            let stored = engine
                .document(&document_id)
                .and_then(|d| d.field(name))
                .map(FieldState::field_type);
            let field_type = engine
                .field_type(name)
                .or(stored)
                .or(default_type)
                .ok_or_else(|| SyncError::UnconfiguredField {
                    field: name.clone(),
                })?;
            if let Some(stored) = stored.filter(|t| *t != field_type) {
                return Err(SyncError::invalid(format!(
                    "{name}: holds {stored} state, configured as {field_type}"
                )));
            }
            plan_field(&mut intents, name, field_type, current.get(name), value)?;
        }

        let mut prepared = Vec::with_capacity(intents.len());
        for intent in intents {
            prepared.push(engine.prepare(
                document_id.clone(),
                &intent.field,
                intent.field_type,
                intent.kind,
                intent.value,
            )?);
        }
        let ops: Vec<FieldOperation> = prepared
            .into_iter()
            .map(|(op, change)| engine.commit(op, change))
            .collect();

        debug!(
            "Wrote {}/{} as {} operations",
            collection,
            document_id,
            ops.len()
        );
        self.track(collection, &ops);
        Ok(ops)
    }

    /// Marks a document deleted.
    pub fn delete(
        &mut self,
        collection: &str,
        document_id: impl Into<DocumentId>,
    ) -> SyncResult<FieldOperation> {
        let op = self.engine_mut(collection).apply(
            document_id,
            DELETED_FIELD,
            OperationKind::Set,
            Value::Bool(true),
        )?;
        self.track(collection, std::slice::from_ref(&op));
        Ok(op)
    }

    fn track(&mut self, collection: &str, ops: &[FieldOperation]) {
        self.pending.extend(ops.iter().map(|op| PendingOperation {
            collection: collection.to_string(),
            operation: op.clone(),
            sent: false,
        }));
    }

    /// Returns a live document without the deletion marker.
    #[must_use]
    pub fn get(&self, collection: &str, document_id: &DocumentId) -> Option<Map<String, Value>> {
        let mut state = self.engines.get(collection)?.document_state(document_id)?;
        if state.remove(DELETED_FIELD) == Some(Value::Bool(true)) {
            return None;
        }
        Some(state)
    }

    // ── Remote operations ────────────────────────────────────────

    /// Merges operations received for a collection.
    pub fn receive(
        &mut self,
        collection: &str,
        origin: &NodeId,
        operations: &[FieldOperation],
    ) -> MergeResult {
        self.engine_mut(collection).merge_remote(origin, operations)
    }

    /// Captures the state of one collection for a peer to merge.
    #[must_use]
    pub fn snapshot(&self, collection: &str) -> Option<EngineSnapshot> {
        self.engines.get(collection).map(FieldCrdtEngine::snapshot)
    }

    /// Merges a peer's snapshot of a collection.
    ///
    /// This is how a replica catches up on operations the peer has
    /// already compacted away.
    pub fn merge_snapshot(
        &mut self,
        collection: &str,
        origin: &NodeId,
        snapshot: &EngineSnapshot,
    ) -> MergeResult {
        self.engine_mut(collection).merge_snapshot(origin, snapshot)
    }

    // ── Transport hand-off ───────────────────────────────────────

    /// Returns every operation awaiting acknowledgement.
    pub fn pending_ops(&self) -> &[PendingOperation] {
        &self.pending
    }

    /// Returns operations not yet handed to the transport and marks them
    /// sent. They stay pending until acknowledged.
    pub fn flush_ops(&mut self) -> Vec<PendingOperation> {
        let mut flushed = Vec::new();
        for pending in self.pending.iter_mut().filter(|p| !p.sent) {
            pending.sent = true;
            flushed.push(pending.clone());
        }
        flushed
    }

    /// Drops acknowledged operations. Returns how many were pending.
    pub fn acknowledge_ops(&mut self, ids: &[OperationId]) -> usize {
        let ids: HashSet<&OperationId> = ids.iter().collect();
        let before = self.pending.len();
        self.pending.retain(|p| !ids.contains(&p.operation.id));
        before - self.pending.len()
    }

    /// Returns logged operations of a collection ordered after `since`.
    #[must_use]
    pub fn operations_since(&self, collection: &str, since: &LamportTimestamp) -> Vec<FieldOperation> {
        self.engines
            .get(collection)
            .map(|engine| engine.operations_since(since))
            .unwrap_or_default()
    }

    /// Compacts every engine, keeping pending operations in the logs.
    pub fn compact(&mut self) -> usize {
        let mut compacted = 0;
        for (name, engine) in &mut self.engines {
            let pinned: HashSet<OperationId> = self
                .pending
                .iter()
                .filter(|p| &p.collection == name)
                .map(|p| p.operation.id)
                .collect();
            compacted += engine.run_garbage_collection(&pinned);
        }
        compacted
    }
}

/// Plans the operations turning `current` into `desired` for one field.
fn plan_field(
    intents: &mut Vec<Intent>,
    name: &str,
    field_type: FieldType,
    current: Option<&Value>,
    desired: &Value,
) -> SyncResult<()> {
    let mut push = |kind: OperationKind, value: Value| {
        intents.push(Intent {
            field: name.to_string(),
            field_type,
            kind,
            value,
        });
    };

    match field_type {
        FieldType::LwwRegister => {
            if current != Some(desired) {
                push(OperationKind::Set, desired.clone());
            }
        }
        FieldType::GCounter => {
            let want = desired.as_u64().ok_or_else(|| {
                SyncError::invalid(format!("{name}: g-counter value must be a non-negative integer"))
            })?;
            let have = current.and_then(Value::as_u64).unwrap_or(0);
            if want < have {
                return Err(SyncError::invalid(format!(
                    "{name}: g-counter cannot decrease from {have} to {want}"
                )));
            }
            if want > have {
                push(OperationKind::Increment, Value::from(want - have));
            }
        }
        FieldType::PnCounter => {
            let want = desired.as_i64().ok_or_else(|| {
                SyncError::invalid(format!("{name}: pn-counter value must be an integer"))
            })?;
            let have = current.and_then(Value::as_i64).unwrap_or(0);
            let diff = i128::from(want) - i128::from(have);
            let magnitude = u64::try_from(diff.unsigned_abs())
                .map_err(|_| SyncError::invalid(format!("{name}: counter delta out of range")))?;
            if diff > 0 {
                push(OperationKind::Increment, Value::from(magnitude));
            } else if diff < 0 {
                push(OperationKind::Decrement, Value::from(magnitude));
            }
        }
        FieldType::OrSet => {
            let Value::Array(wanted) = desired else {
                return Err(SyncError::invalid(format!("{name}: or-set value must be an array")));
            };
            let mut have: BTreeMap<String, &Value> = BTreeMap::new();
            for element in current.and_then(Value::as_array).into_iter().flatten() {
                have.insert(field::canonical(element)?, element);
            }
            let mut want = BTreeSet::new();
            for element in wanted {
                let key = field::canonical(element)?;
                if !have.contains_key(&key) && !want.contains(&key) {
                    push(OperationKind::Add, element.clone());
                }
                want.insert(key);
            }
            for (key, element) in &have {
                if !want.contains(key) {
                    push(OperationKind::Remove, (*element).clone());
                }
            }
        }
        FieldType::LwwMap => {
            let Value::Object(wanted) = desired else {
                return Err(SyncError::invalid(format!("{name}: lww-map value must be an object")));
            };
            let have = current.and_then(Value::as_object);
            let changed: Map<String, Value> = wanted
                .iter()
                .filter(|(k, v)| have.and_then(|h| h.get(*k)) != Some(*v))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            let removed: Vec<Value> = have
                .into_iter()
                .flat_map(|h| h.keys())
                .filter(|k| !wanted.contains_key(*k))
                .map(|k| Value::String(k.clone()))
                .collect();
            if !changed.is_empty() {
                push(OperationKind::Set, Value::Object(changed));
            }
            if !removed.is_empty() {
                push(OperationKind::Remove, Value::Array(removed));
            }
        }
    }
    Ok(())
}
