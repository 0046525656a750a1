//! Core type definitions for Pocket.
//!
//! This crate defines the fundamental types shared by every replica:
//! - Node, document and operation identifiers
//! - Lamport timestamps and the per-replica Lamport clock
//! - The field operation schema exchanged between replicas
//!
//! CRDT state lives in `pocket-crdt`; the engine that drives it lives in
//! `pocket-sync`.

mod ids;
mod operation;
mod timestamp;

pub use ids::{DocumentId, NodeId, OperationId};
pub use operation::{FieldOperation, FieldType, OperationKind};
pub use timestamp::{LamportClock, LamportTimestamp, compare_lamport_timestamps};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid node id: {0:?}")]
    InvalidNodeId(String),

    #[error("invalid character id: {0:?}")]
    InvalidCharacterId(String),

    #[error("unknown field type: {0}")]
    UnknownFieldType(String),
}
