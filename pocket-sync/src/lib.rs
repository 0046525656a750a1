//! Field CRDT engine and replication bridge for Pocket.
//!
//! Structured documents are maps of named fields, each replicated by the
//! CRDT type declared for it in [`EngineConfig`]:
//!
//! - `lww-register`: last-writer-wins value
//! - `g-counter` / `pn-counter`: per-node counters summed on read
//! - `or-set`: add-wins set of JSON values
//! - `lww-map`: map with per-key last-writer-wins
//!
//! # Architecture
//!
//! - **Engine**: [`FieldCrdtEngine`] applies local mutations, merges remote
//!   operations, keeps the operation log and compacts it on request
//! - **Bridge**: [`ReplicationBridge`] turns whole-document writes into
//!   field operations and tracks what the transport still has to deliver
//! - **Events**: an optional [`EventSink`] receives [`EngineEvent`]s
//!
//! Transport, storage and presence live outside this crate.
//!
//! # Example
//!
//! ```
//! use pocket_sync::{EngineConfig, FieldCrdtEngine};
//! use pocket_types::{DocumentId, FieldType, NodeId, OperationKind};
//! use serde_json::json;
//!
//! let config = EngineConfig::new().with_field("viewCount", FieldType::GCounter);
//! let mut engine = FieldCrdtEngine::new(NodeId::new("n1"), config);
//!
//! engine.apply("doc-1", "viewCount", OperationKind::Increment, json!(1)).unwrap();
//! engine.apply("doc-1", "viewCount", OperationKind::Increment, json!(5)).unwrap();
//!
//! let state = engine.document_state(&DocumentId::new("doc-1")).unwrap();
//! assert_eq!(state["viewCount"], 6);
//! ```

mod bridge;
mod config;
mod engine;
mod error;
mod event;
mod field;
mod state;

pub use bridge::{DELETED_FIELD, PendingOperation, ReplicationBridge};
pub use config::{BridgeConfig, DEFAULT_COMPACTION_THRESHOLD, EngineConfig};
pub use engine::{EngineSnapshot, FieldCrdtEngine};
pub use error::{SyncError, SyncResult};
pub use event::{EngineEvent, EventSink, MergeResult};
pub use field::FieldState;
pub use state::DocumentState;
