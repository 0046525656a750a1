//! Engine and bridge configuration.
//!
//! Both structs are plain data with defaults so a host can build them in
//! code or load them from JSON.

use crate::SyncResult;
use pocket_types::FieldType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default number of logged operations per document before compaction
/// applies to it.
pub const DEFAULT_COMPACTION_THRESHOLD: usize = 1000;

/// Configuration for a [`FieldCrdtEngine`](crate::FieldCrdtEngine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// CRDT type declared for each field name.
    pub fields: BTreeMap<String, FieldType>,
    /// Logged operations a document may hold before garbage collection
    /// compacts it.
    pub compaction_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fields: BTreeMap::new(),
            compaction_threshold: DEFAULT_COMPACTION_THRESHOLD,
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with no declared fields.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a field.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.insert(field.into(), field_type);
        self
    }

    #[must_use]
    pub fn with_compaction_threshold(mut self, threshold: usize) -> Self {
        self.compaction_threshold = threshold;
        self
    }

    /// Returns the declared type of a field.
    #[must_use]
    pub fn field_type(&self, field: &str) -> Option<FieldType> {
        self.fields.get(field).copied()
    }

    /// Parses a configuration from JSON. Missing keys take their defaults.
    pub fn from_json(json: &str) -> SyncResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Configuration for a [`ReplicationBridge`](crate::ReplicationBridge).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeConfig {
    /// Engine configuration per collection.
    pub collections: BTreeMap<String, EngineConfig>,
    /// Type given to fields a collection does not declare. Without it,
    /// writing an undeclared field fails.
    pub default_field_type: Option<FieldType>,
}

impl BridgeConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a collection.
    #[must_use]
    pub fn with_collection(mut self, name: impl Into<String>, config: EngineConfig) -> Self {
        self.collections.insert(name.into(), config);
        self
    }

    #[must_use]
    pub fn with_default_field_type(mut self, field_type: FieldType) -> Self {
        self.default_field_type = Some(field_type);
        self
    }

    /// Returns the engine configuration for a collection, or the default
    /// one for collections that were never declared.
    #[must_use]
    pub fn engine_config(&self, collection: &str) -> EngineConfig {
        self.collections.get(collection).cloned().unwrap_or_default()
    }

    /// Parses a configuration from JSON. Missing keys take their defaults.
    pub fn from_json(json: &str) -> SyncResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
