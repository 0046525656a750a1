//! Notifications emitted by the engine.
//!
//! Events are informational: nothing in the engine depends on anyone
//! receiving them. A host that wants them passes an [`EventSink`] to
//! [`FieldCrdtEngine::set_event_sink`](crate::FieldCrdtEngine::set_event_sink).

use pocket_types::{DocumentId, FieldOperation, LamportTimestamp, NodeId, OperationId};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

/// Sending half of the event channel.
pub type EventSink = UnboundedSender<EngineEvent>;

/// Summary of one [`merge_remote`](crate::FieldCrdtEngine::merge_remote)
/// call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResult {
    /// True once the batch has been folded in.
    pub merged: bool,
    /// Lamport-concurrent register or map writes encountered.
    pub conflicts: usize,
    /// Operations applied to state.
    pub applied: usize,
    /// Operations already seen.
    pub skipped: usize,
    /// Malformed operations dropped.
    pub rejected: usize,
}

/// Something observable happened inside an engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum EngineEvent {
    /// A local mutation was applied.
    LocalApplied { operation: FieldOperation },
    /// A batch of remote operations was merged.
    RemoteMerged { origin: NodeId, result: MergeResult },
    /// A remote write raced a stored one with the same Lamport counter.
    ConflictDetected {
        document_id: DocumentId,
        field: String,
        /// Map key, for LWW-map fields.
        key: Option<String>,
        local: LamportTimestamp,
        remote: LamportTimestamp,
    },
    /// A remote operation was malformed and dropped.
    OperationRejected {
        operation_id: OperationId,
        document_id: DocumentId,
        field: String,
        reason: String,
    },
}
