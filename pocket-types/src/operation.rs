//! Field operation schema.
//!
//! Field operations are the unit of replication for structured documents.
//! Each operation is immutable and carries everything a replica needs to
//! apply it: the document, the field, the field's CRDT type, the issuing
//! node and its Lamport timestamp.
//!
//! The JSON form uses camelCase keys so transports written in other
//! languages can carry it unmodified.

use crate::{DocumentId, LamportTimestamp, NodeId, OperationId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// CRDT type declared for a document field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldType {
    /// Last-writer-wins register holding any JSON value.
    LwwRegister,
    /// Grow-only counter.
    GCounter,
    /// Counter supporting increments and decrements.
    PnCounter,
    /// Observed-remove (add-wins) set.
    OrSet,
    /// Map whose keys are resolved independently by last-writer-wins.
    LwwMap,
}

impl FieldType {
    /// Returns true if the operation kind is meaningful for this type.
    #[must_use]
    pub fn supports(self, kind: OperationKind) -> bool {
        use OperationKind::*;
        match self {
            Self::LwwRegister => kind == Set,
            Self::GCounter => kind == Increment,
            Self::PnCounter => matches!(kind, Increment | Decrement),
            Self::OrSet => matches!(kind, Add | Remove),
            Self::LwwMap => matches!(kind, Set | Remove),
        }
    }

    /// Returns the wire name of the type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LwwRegister => "lww-register",
            Self::GCounter => "g-counter",
            Self::PnCounter => "pn-counter",
            Self::OrSet => "or-set",
            Self::LwwMap => "lww-map",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lww-register" => Ok(Self::LwwRegister),
            "g-counter" => Ok(Self::GCounter),
            "pn-counter" => Ok(Self::PnCounter),
            "or-set" => Ok(Self::OrSet),
            "lww-map" => Ok(Self::LwwMap),
            other => Err(crate::Error::UnknownFieldType(other.to_string())),
        }
    }
}

/// The mutation an operation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Set,
    Increment,
    Decrement,
    Add,
    Remove,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Set => "set",
            Self::Increment => "increment",
            Self::Decrement => "decrement",
            Self::Add => "add",
            Self::Remove => "remove",
        };
        f.write_str(name)
    }
}

/// A single mutation of one field of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldOperation {
    /// Unique identifier for this operation.
    pub id: OperationId,

    /// The document this operation applies to.
    pub document_id: DocumentId,

    /// Field name within the document.
    pub field: String,

    /// CRDT type of the field.
    #[serde(rename = "type")]
    pub field_type: FieldType,

    /// The node that created this operation.
    pub node_id: NodeId,

    /// Lamport timestamp assigned at creation.
    pub timestamp: LamportTimestamp,

    /// The mutation to perform.
    pub operation: OperationKind,

    /// Operation payload; its shape depends on type and kind.
    pub value: Value,
}

impl FieldOperation {
    /// Creates a new operation with a fresh id.
    #[must_use]
    pub fn new(
        document_id: DocumentId,
        field: impl Into<String>,
        field_type: FieldType,
        timestamp: LamportTimestamp,
        operation: OperationKind,
        value: Value,
    ) -> Self {
        Self {
            id: OperationId::new(),
            document_id,
            field: field.into(),
            field_type,
            node_id: timestamp.node_id.clone(),
            timestamp,
            operation,
            value,
        }
    }

    /// Serializes the operation to its JSON wire form.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses an operation from its JSON wire form.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
