//! Character identities for the rich-text sequence.

use pocket_types::{Error, NodeId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Unique, immutable identity of one inserted character.
///
/// Assigned once from the inserting node's Lamport clock and never reused.
/// Independent of the character's visible position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterId {
    /// Node that inserted the character.
    pub node_id: NodeId,
    /// Lamport counter at insertion.
    pub counter: u64,
}

impl CharacterId {
    /// Creates a character ID.
    #[must_use]
    pub fn new(node_id: NodeId, counter: u64) -> Self {
        Self { node_id, counter }
    }
}

/// Ordered by counter, then node id. Siblings sharing an origin are
/// linearized by this order (greatest first).
impl Ord for CharacterId {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.counter.cmp(&other.counter) {
            Ordering::Equal => self.node_id.cmp(&other.node_id),
            ord => ord,
        }
    }
}

impl PartialOrd for CharacterId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node_id, self.counter)
    }
}

impl FromStr for CharacterId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Node ids may themselves contain ':', the counter never does.
        let (node, counter) = s
            .rsplit_once(':')
            .ok_or_else(|| Error::InvalidCharacterId(s.to_string()))?;
        let counter: u64 = counter
            .parse()
            .map_err(|_| Error::InvalidCharacterId(s.to_string()))?;
        let node_id: NodeId = node
            .parse()
            .map_err(|_| Error::InvalidCharacterId(s.to_string()))?;
        Ok(Self { node_id, counter })
    }
}

/// One slot of the character arena.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct CharEntry {
    pub(crate) id: CharacterId,
    pub(crate) value: char,
    /// Character immediately to the left at insertion time; `None` is the
    /// start of the document.
    pub(crate) origin: Option<CharacterId>,
    pub(crate) tombstoned: bool,
}

/// Serializes the arena with textual keys so it survives JSON.
pub(crate) mod arena_serde {
    use super::{CharEntry, CharacterId};
    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};
    use std::collections::HashMap;
    use std::fmt;

    pub fn serialize<S>(
        entries: &HashMap<CharacterId, CharEntry>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (k, v) in entries {
            map.serialize_entry(&k.to_string(), v)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<HashMap<CharacterId, CharEntry>, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ArenaVisitor;

        impl<'de> Visitor<'de> for ArenaVisitor {
            type Value = HashMap<CharacterId, CharEntry>;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a map keyed by character id")
            }

            fn visit_map<M>(self, mut access: M) -> Result<Self::Value, M::Error>
            where
                M: MapAccess<'de>,
            {
                let mut map = HashMap::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, CharEntry>()? {
                    let id: CharacterId = key.parse().map_err(serde::de::Error::custom)?;
                    if id != value.id {
                        return Err(serde::de::Error::custom(format!(
                            "arena key {key} does not match entry id {}",
                            value.id
                        )));
                    }
                    map.insert(id, value);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(ArenaVisitor)
    }
}
