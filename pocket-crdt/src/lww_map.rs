//! Last-Writer-Wins Map.
//!
//! Every key is an independent [`LWWRegister`] holding an optional value.
//! Removing a key stores `None` at the removal timestamp rather than dropping
//! the entry, so a stale `set` for that key cannot resurrect it.

use crate::lww_register::{LWWRegister, RegisterUpdate};
use pocket_types::LamportTimestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A map resolving each key by last-writer-wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    transparent,
    bound(deserialize = "K: Ord + Deserialize<'de>, V: Deserialize<'de>")
)]
pub struct LWWMap<K, V> {
    entries: BTreeMap<K, LWWRegister<Option<V>>>,
}

impl<K, V> Default for LWWMap<K, V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Clone, V: Clone> LWWMap<K, V> {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a local write for `key` unconditionally.
    pub fn set(&mut self, key: K, value: V, timestamp: LamportTimestamp) {
        self.write(key, Some(value), timestamp);
    }

    /// Removes `key` locally, leaving a timestamped tombstone.
    pub fn remove(&mut self, key: K, timestamp: LamportTimestamp) {
        self.write(key, None, timestamp);
    }

    fn write(&mut self, key: K, value: Option<V>, timestamp: LamportTimestamp) {
        match self.entries.get_mut(&key) {
            Some(register) => register.set(value, timestamp),
            None => {
                self.entries.insert(key, LWWRegister::new(value, timestamp));
            }
        }
    }

    /// Folds a (usually remote) write for one key. `None` removes.
    pub fn apply(
        &mut self,
        key: K,
        value: Option<V>,
        timestamp: LamportTimestamp,
    ) -> RegisterUpdate {
        match self.entries.get_mut(&key) {
            Some(register) => register.apply(value, timestamp),
            None => {
                self.entries.insert(key, LWWRegister::new(value, timestamp));
                RegisterUpdate {
                    applied: true,
                    concurrent: false,
                }
            }
        }
    }

    /// Returns the live value for a key.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key).and_then(|r| r.value().as_ref())
    }

    /// Returns true if the key has a live value.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Returns the timestamp of the last winning write for a key, including
    /// removals.
    #[must_use]
    pub fn timestamp(&self, key: &K) -> Option<&LamportTimestamp> {
        self.entries.get(key).map(LWWRegister::timestamp)
    }

    /// Iterates over live entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries
            .iter()
            .filter_map(|(k, r)| r.value().as_ref().map(|v| (k, v)))
    }

    /// Returns the number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Returns true if no key has a live value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Merges another map into this one key by key.
    ///
    /// Returns the number of keys whose writes were Lamport-concurrent.
    pub fn merge(&mut self, other: &Self) -> usize {
        let mut concurrent = 0;
        for (key, register) in &other.entries {
            let update = self.apply(
                key.clone(),
                register.value().clone(),
                register.timestamp().clone(),
            );
            if update.concurrent {
                concurrent += 1;
            }
        }
        concurrent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pocket_types::NodeId;

    fn ts(counter: u64, node: &str) -> LamportTimestamp {
        LamportTimestamp::new(counter, NodeId::new(node))
    }

    #[test]
    fn keys_resolve_independently() {
        let mut map: LWWMap<String, i32> = LWWMap::new();
        map.set("a".into(), 1, ts(1, "x"));
        map.apply("b".into(), Some(2), ts(1, "y"));
        map.apply("a".into(), Some(10), ts(2, "y"));
        assert_eq!(map.get(&"a".to_string()), Some(&10));
        assert_eq!(map.get(&"b".to_string()), Some(&2));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn stale_set_does_not_resurrect_removed_key() {
        let mut map: LWWMap<String, i32> = LWWMap::new();
        map.set("a".into(), 1, ts(1, "x"));
        map.remove("a".into(), ts(3, "x"));
        let update = map.apply("a".into(), Some(5), ts(2, "y"));
        assert!(!update.applied);
        assert!(!map.contains_key(&"a".to_string()));
        assert!(map.is_empty());
    }

    #[test]
    fn merge_counts_concurrent_keys() {
        let mut a: LWWMap<String, &str> = LWWMap::new();
        a.set("k".into(), "a", ts(1, "a"));
        let mut b: LWWMap<String, &str> = LWWMap::new();
        b.set("k".into(), "b", ts(1, "b"));
        b.set("other".into(), "b", ts(2, "b"));

        let mut ab = a.clone();
        assert_eq!(ab.merge(&b), 1);
        let mut ba = b.clone();
        assert_eq!(ba.merge(&a), 1);
        assert_eq!(ab, ba);
        assert_eq!(ab.get(&"k".to_string()), Some(&"b"));
    }
}
