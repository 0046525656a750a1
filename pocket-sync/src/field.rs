//! Per-field CRDT state.
//!
//! A field's type is fixed the first time an operation touches it. Each
//! variant owns one state-transition rule; operations are parsed into a
//! [`FieldChange`] first so that nothing is mutated unless the whole
//! operation is valid.

use crate::{SyncError, SyncResult};
use pocket_crdt::{GCounter, LWWMap, LWWRegister, ORSet, PNCounter, Tag};
use pocket_types::{FieldOperation, FieldType, LamportTimestamp, NodeId, OperationKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Replicated state of one document field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "state", rename_all = "kebab-case")]
pub enum FieldState {
    LwwRegister(Option<LWWRegister<Value>>),
    GCounter(GCounter),
    PnCounter(PNCounter),
    /// Elements are kept in their serialized JSON form.
    OrSet(ORSet<String>),
    LwwMap(LWWMap<String, Value>),
}

/// A write that raced the stored one with the same Lamport counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FieldConflict {
    pub key: Option<String>,
    pub local: LamportTimestamp,
}

/// A validated operation payload.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FieldChange {
    Set(Value),
    Increment(u64),
    Decrement(u64),
    Add(String),
    Remove(Vec<Tag>),
    MapSet(Map<String, Value>),
    MapRemove(Vec<String>),
}

impl FieldChange {
    /// Validates an operation's kind and value against its declared type.
    pub(crate) fn parse(op: &FieldOperation) -> SyncResult<Self> {
        if !op.field_type.supports(op.operation) {
            return Err(SyncError::invalid(format!(
                "{} is not supported by {} field {:?}",
                op.operation, op.field_type, op.field
            )));
        }

        let change = match (op.field_type, op.operation) {
            (FieldType::LwwRegister, _) => Self::Set(op.value.clone()),
            (_, OperationKind::Increment) => Self::Increment(delta(&op.value)?),
            (_, OperationKind::Decrement) => Self::Decrement(delta(&op.value)?),
            (_, OperationKind::Add) => Self::Add(canonical(&op.value)?),
            (FieldType::OrSet, OperationKind::Remove) => Self::Remove(observed_tags(&op.value)?),
            (FieldType::LwwMap, OperationKind::Set) => match &op.value {
                Value::Object(entries) => Self::MapSet(entries.clone()),
                other => {
                    return Err(SyncError::invalid(format!(
                        "lww-map set expects an object, got {other}"
                    )));
                }
            },
            (FieldType::LwwMap, OperationKind::Remove) => Self::MapRemove(map_keys(&op.value)?),
            (field_type, kind) => {
                return Err(SyncError::invalid(format!(
                    "{kind} is not supported by {field_type}"
                )));
            }
        };
        Ok(change)
    }
}

fn delta(value: &Value) -> SyncResult<u64> {
    value.as_u64().ok_or_else(|| {
        SyncError::invalid(format!("counter delta must be a non-negative integer, got {value}"))
    })
}

fn observed_tags(value: &Value) -> SyncResult<Vec<Tag>> {
    let malformed =
        || SyncError::invalid(format!("or-set remove expects {{element, tags}}, got {value}"));
    let tags = value
        .get("tags")
        .and_then(Value::as_array)
        .ok_or_else(malformed)?;
    if value.get("element").is_none() {
        return Err(malformed());
    }
    tags.iter()
        .map(|tag| {
            tag.as_str()
                .and_then(|s| Uuid::parse_str(s).ok())
                .map(Tag::from_uuid)
                .ok_or_else(malformed)
        })
        .collect()
}

fn map_keys(value: &Value) -> SyncResult<Vec<String>> {
    let malformed = || {
        SyncError::invalid(format!(
            "lww-map remove expects a key or an array of keys, got {value}"
        ))
    };
    match value {
        Value::String(key) => Ok(vec![key.clone()]),
        Value::Array(keys) => keys
            .iter()
            .map(|k| k.as_str().map(str::to_string).ok_or_else(malformed))
            .collect(),
        _ => Err(malformed()),
    }
}

/// Serialized form of an OR-Set element. Object keys are sorted, so equal
/// values always serialize identically.
pub(crate) fn canonical(value: &Value) -> SyncResult<String> {
    Ok(serde_json::to_string(value)?)
}

/// Sums the counter deltas `ops` apply to `field` as
/// `(increments, decrements)`.
pub(crate) fn counter_deltas<'a>(
    ops: impl IntoIterator<Item = &'a FieldOperation>,
    field: &str,
) -> (u64, u64) {
    ops.into_iter()
        .filter(|op| op.field == field)
        .fold((0u64, 0u64), |(up, down), op| {
            let by = op.value.as_u64().unwrap_or(0);
            match op.operation {
                OperationKind::Increment => (up.saturating_add(by), down),
                OperationKind::Decrement => (up, down.saturating_add(by)),
                _ => (up, down),
            }
        })
}

/// Builds the wire value of an OR-Set remove from the observed tags.
pub(crate) fn remove_payload(element: Value, tags: &[Tag]) -> Value {
    let tags: Vec<Value> = tags.iter().map(|t| Value::String(t.to_string())).collect();
    serde_json::json!({ "element": element, "tags": tags })
}

impl FieldState {
    /// Creates empty state for a field type.
    #[must_use]
    pub fn new(field_type: FieldType) -> Self {
        match field_type {
            FieldType::LwwRegister => Self::LwwRegister(None),
            FieldType::GCounter => Self::GCounter(GCounter::new()),
            FieldType::PnCounter => Self::PnCounter(PNCounter::new()),
            FieldType::OrSet => Self::OrSet(ORSet::new()),
            FieldType::LwwMap => Self::LwwMap(LWWMap::new()),
        }
    }

    #[must_use]
    pub fn field_type(&self) -> FieldType {
        match self {
            Self::LwwRegister(_) => FieldType::LwwRegister,
            Self::GCounter(_) => FieldType::GCounter,
            Self::PnCounter(_) => FieldType::PnCounter,
            Self::OrSet(_) => FieldType::OrSet,
            Self::LwwMap(_) => FieldType::LwwMap,
        }
    }

    /// Folds a validated change into the field.
    ///
    /// Counters and sets never conflict. Register and map writes report a
    /// conflict when their timestamp has the same counter as the stored one
    /// but comes from another node; the write is still resolved by the
    /// total order.
    pub(crate) fn apply(&mut self, op: &FieldOperation, change: FieldChange) -> Vec<FieldConflict> {
        let ts = op.timestamp.clone();
        let mut conflicts = Vec::new();

        match (self, change) {
            (Self::LwwRegister(slot), FieldChange::Set(value)) => {
                if let Some(register) = slot.as_mut() {
                    let local = register.timestamp().clone();
                    if register.apply(value, ts).concurrent {
                        conflicts.push(FieldConflict { key: None, local });
                    }
                } else {
                    *slot = Some(LWWRegister::new(value, ts));
                }
            }
            (Self::GCounter(counter), FieldChange::Increment(by)) => {
                counter.increment(&op.node_id, by);
            }
            (Self::PnCounter(counter), FieldChange::Increment(by)) => {
                counter.increment(&op.node_id, by);
            }
            (Self::PnCounter(counter), FieldChange::Decrement(by)) => {
                counter.decrement(&op.node_id, by);
            }
            (Self::OrSet(set), FieldChange::Add(element)) => {
                set.add_with_tag(element, Tag::from(op.id));
            }
            (Self::OrSet(set), FieldChange::Remove(tags)) => set.remove_tags(&tags),
            (Self::LwwMap(map), FieldChange::MapSet(entries)) => {
                for (key, value) in entries {
                    conflicts.extend(write_key(map, key, Some(value), &ts));
                }
            }
            (Self::LwwMap(map), FieldChange::MapRemove(keys)) => {
                for key in keys {
                    conflicts.extend(write_key(map, key, None, &ts));
                }
            }
            // `FieldChange::parse` only yields changes matching the
            // operation's type, and callers check the type against the
            // stored state first.
            _ => {}
        }
        conflicts
    }

    /// Folds the state of the same field held by another replica.
    ///
    /// Registers, maps and sets use their own joins. A counter slot holds a
    /// node's total as seen by one replica, so `unseen_by_other` supplies,
    /// per node, the `(increments, decrements)` this replica applied that
    /// the other never saw; each slot becomes the larger of the local total
    /// and the other's total plus those. Returns the number of
    /// Lamport-concurrent register or map writes.
    pub(crate) fn merge(
        &mut self,
        other: &Self,
        unseen_by_other: &BTreeMap<NodeId, (u64, u64)>,
    ) -> SyncResult<usize> {
        let (mine, theirs) = (self.field_type(), other.field_type());
        let extra = |node: &NodeId| unseen_by_other.get(node).copied().unwrap_or((0, 0));

        let conflicts = match (self, other) {
            (Self::LwwRegister(slot), Self::LwwRegister(other)) => match other {
                Some(other) => {
                    if let Some(register) = slot.as_mut() {
                        usize::from(register.merge(other).concurrent)
                    } else {
                        *slot = Some(other.clone());
                        0
                    }
                }
                None => 0,
            },
            (Self::GCounter(counter), Self::GCounter(other)) => {
                for (node, &count) in other.slots() {
                    counter.merge_slot(node, count.saturating_add(extra(node).0));
                }
                0
            }
            (Self::PnCounter(counter), Self::PnCounter(other)) => {
                let nodes: BTreeSet<&NodeId> = other
                    .positive()
                    .slots()
                    .chain(other.negative().slots())
                    .map(|(node, _)| node)
                    .collect();
                for node in nodes {
                    let (up, down) = extra(node);
                    counter.merge_slots(
                        node,
                        other.positive().slot(node).saturating_add(up),
                        other.negative().slot(node).saturating_add(down),
                    );
                }
                0
            }
            (Self::OrSet(set), Self::OrSet(other)) => {
                set.merge(other);
                0
            }
            (Self::LwwMap(map), Self::LwwMap(other)) => map.merge(other),
            _ => {
                return Err(SyncError::invalid(format!(
                    "cannot merge {theirs} state into {mine} field"
                )));
            }
        };
        Ok(conflicts)
    }

    /// Returns the field's value as seen by the application.
    #[must_use]
    pub fn value(&self) -> Value {
        match self {
            Self::LwwRegister(register) => register
                .as_ref()
                .map_or(Value::Null, |r| r.value().clone()),
            Self::GCounter(counter) => Value::from(counter.value()),
            Self::PnCounter(counter) => Value::from(counter.value()),
            Self::OrSet(set) => {
                let mut elements: Vec<&String> = set.iter().collect();
                elements.sort();
                Value::Array(
                    elements
                        .into_iter()
                        .filter_map(|e| serde_json::from_str(e).ok())
                        .collect(),
                )
            }
            Self::LwwMap(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
        }
    }

    /// Returns the live tags observed for an OR-Set element.
    pub(crate) fn observed_tags(&self, element: &Value) -> SyncResult<Vec<Tag>> {
        match self {
            Self::OrSet(set) => Ok(set.tags_for(&canonical(element)?)),
            _ => Ok(Vec::new()),
        }
    }
}

fn write_key(
    map: &mut LWWMap<String, Value>,
    key: String,
    value: Option<Value>,
    ts: &LamportTimestamp,
) -> Option<FieldConflict> {
    let local = map.timestamp(&key).cloned();
    let update = map.apply(key.clone(), value, ts.clone());
    match local {
        Some(local) if update.concurrent => Some(FieldConflict {
            key: Some(key),
            local,
        }),
        _ => None,
    }
}
