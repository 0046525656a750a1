//! Formatting marks anchored to character identities.
//!
//! A mark covers every character between its start and end anchors in the
//! linearized sequence, tombstones included. Anchoring to ids instead of
//! offsets keeps a mark on the text it was applied to while concurrent
//! inserts and deletes shift numeric positions.

use crate::CharacterId;
use pocket_types::LamportTimestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier of a formatting mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarkId(Uuid);

impl MarkId {
    /// Creates a new mark ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a mark ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for MarkId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MarkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MarkId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A formatting mark over an inclusive range of characters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatMark {
    pub id: MarkId,
    /// First covered character.
    pub start: CharacterId,
    /// Last covered character.
    pub end: CharacterId,
    /// Mark type, e.g. `bold`, `link`, `comment`.
    pub mark_type: String,
    /// Optional payload, e.g. a link target.
    #[serde(default)]
    pub value: Option<Value>,
    pub timestamp: LamportTimestamp,
    pub removed: bool,
}

/// A mark as seen by a renderer: identity, type and payload only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveMark {
    pub id: MarkId,
    pub mark_type: String,
    #[serde(default)]
    pub value: Option<Value>,
}

impl From<&FormatMark> for ActiveMark {
    fn from(mark: &FormatMark) -> Self {
        Self {
            id: mark.id,
            mark_type: mark.mark_type.clone(),
            value: mark.value.clone(),
        }
    }
}

/// A maximal run of live text sharing one set of active marks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSpan {
    pub text: String,
    /// Active marks, ordered by mark id.
    pub marks: Vec<ActiveMark>,
}

impl TextSpan {
    /// Returns true if any active mark has the given type.
    #[must_use]
    pub fn has_mark(&self, mark_type: &str) -> bool {
        self.marks.iter().any(|m| m.mark_type == mark_type)
    }
}

/// Rendered view of a rich-text document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RichTextSnapshot {
    pub text: String,
    /// Number of live characters.
    pub length: usize,
    /// Partition of `text` into formatted runs.
    pub spans: Vec<TextSpan>,
}
