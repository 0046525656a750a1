//! Operations produced and consumed by [`RichText`](crate::RichText).
//!
//! One insert or delete operation is produced per character so that remote
//! replicas can interleave concurrent edits at single-character resolution.

use crate::{CharacterId, MarkId};
use pocket_types::{LamportTimestamp, NodeId, OperationId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A rich-text operation as exchanged between replicas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextOperation {
    pub id: OperationId,
    pub timestamp: LamportTimestamp,
    pub node_id: NodeId,
    #[serde(flatten)]
    pub payload: TextPayload,
}

/// What a [`TextOperation`] does. Serialized under the `kind` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum TextPayload {
    Insert {
        character_id: CharacterId,
        #[serde(default)]
        origin_id: Option<CharacterId>,
        value: char,
    },
    Delete {
        character_id: CharacterId,
    },
    Format {
        mark_id: MarkId,
        start_id: CharacterId,
        end_id: CharacterId,
        format_type: String,
        #[serde(default)]
        format_value: Option<Value>,
    },
    Unformat {
        mark_id: MarkId,
    },
}

impl TextOperation {
    pub(crate) fn new(timestamp: LamportTimestamp, payload: TextPayload) -> Self {
        Self {
            id: OperationId::new(),
            node_id: timestamp.node_id.clone(),
            timestamp,
            payload,
        }
    }

    /// Returns the wire name of the operation kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self.payload {
            TextPayload::Insert { .. } => "insert",
            TextPayload::Delete { .. } => "delete",
            TextPayload::Format { .. } => "format",
            TextPayload::Unformat { .. } => "unformat",
        }
    }
}
