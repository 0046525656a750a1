//! Observed-Remove Set (OR-Set / Add-Wins Set).
//!
//! A CRDT set that supports both add and remove operations. Unlike naive sets,
//! concurrent add and remove of the same element results in the element being present
//! (add-wins semantics).
//!
//! Each add operation creates a unique tag. Remove operations remove the specific tags
//! they observed. An element is in the set if it has at least one tag that hasn't been
//! removed.
//!
//! Use cases:
//! - Tag lists on a document
//! - Membership lists (collaborators, labels)

use pocket_types::OperationId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use uuid::Uuid;

/// A unique tag identifying a specific add operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(Uuid);

impl Tag {
    /// Creates a new unique tag.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a tag from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for Tag {
    fn default() -> Self {
        Self::new()
    }
}

impl From<OperationId> for Tag {
    fn from(id: OperationId) -> Self {
        Self(id.as_uuid())
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An Observed-Remove Set (OR-Set).
///
/// Provides set semantics with add and remove operations that commute properly.
/// Add-wins: if an element is concurrently added and removed, it remains in the set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ORSet<T>
where
    T: Eq + std::hash::Hash + Clone,
{
    /// Map from element to its active tags.
    elements: HashMap<T, HashSet<Tag>>,
    /// Set of all removed tags (tombstones). Never shrinks.
    tombstones: HashSet<Tag>,
}

impl<T> Default for ORSet<T>
where
    T: Eq + std::hash::Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ORSet<T>
where
    T: Eq + std::hash::Hash + Clone,
{
    /// Creates a new empty set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            elements: HashMap::new(),
            tombstones: HashSet::new(),
        }
    }

    /// Returns true if the set contains the element.
    #[must_use]
    pub fn contains(&self, element: &T) -> bool {
        self.elements
            .get(element)
            .is_some_and(|tags| !tags.is_empty())
    }

    /// Returns the number of elements in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements
            .values()
            .filter(|tags| !tags.is_empty())
            .count()
    }

    /// Returns true if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns an iterator over the elements in the set.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.elements
            .iter()
            .filter(|(_, tags)| !tags.is_empty())
            .map(|(elem, _)| elem)
    }

    /// Adds an element under a fresh tag and returns the tag.
    ///
    /// The same element can be added multiple times, creating multiple tags.
    pub fn add(&mut self, element: T) -> Tag {
        let tag = Tag::new();
        self.add_with_tag(element, tag);
        tag
    }

    /// Adds an element with a specific tag (for replication).
    ///
    /// A tag that was already removed stays removed, whatever order the add
    /// and the remove arrive in. Returns true if the tag became visible.
    pub fn add_with_tag(&mut self, element: T, tag: Tag) -> bool {
        if self.tombstones.contains(&tag) {
            return false;
        }
        self.elements.entry(element).or_default().insert(tag)
    }

    /// Removes an element from the set.
    ///
    /// This removes all current tags for the element. Concurrent adds with new tags
    /// will still succeed (add-wins semantics).
    ///
    /// Returns the tags that were removed.
    pub fn remove(&mut self, element: &T) -> Vec<Tag> {
        let mut removed: Vec<Tag> = self
            .elements
            .get_mut(element)
            .map(|tags| tags.drain().collect())
            .unwrap_or_default();
        removed.sort();

        self.tombstones.extend(removed.iter().copied());
        removed
    }

    /// Removes specific tags (for replication).
    pub fn remove_tags(&mut self, tags: &[Tag]) {
        self.tombstones.extend(tags.iter().copied());
        for tag_set in self.elements.values_mut() {
            for tag in tags {
                tag_set.remove(tag);
            }
        }
    }

    /// Merges another OR-Set into this one.
    ///
    /// The resulting set contains all elements that have at least one tag
    /// that isn't tombstoned in either set.
    pub fn merge(&mut self, other: &Self) {
        self.tombstones.extend(&other.tombstones);

        for (element, other_tags) in &other.elements {
            let entry = self.elements.entry(element.clone()).or_default();
            for tag in other_tags {
                if !self.tombstones.contains(tag) {
                    entry.insert(*tag);
                }
            }
        }

        for tags in self.elements.values_mut() {
            tags.retain(|tag| !self.tombstones.contains(tag));
        }
    }

    /// Creates a new set that is the merge of this and another.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.merge(other);
        result
    }

    /// Returns the live tags for an element, sorted.
    #[must_use]
    pub fn tags_for(&self, element: &T) -> Vec<Tag> {
        let mut tags: Vec<Tag> = self
            .elements
            .get(element)
            .map(|tags| tags.iter().copied().collect())
            .unwrap_or_default();
        tags.sort();
        tags
    }

    /// Returns all tombstones.
    #[must_use]
    pub fn tombstones(&self) -> &HashSet<Tag> {
        &self.tombstones
    }

    /// Returns true if the tag has been removed.
    #[must_use]
    pub fn is_tombstoned(&self, tag: &Tag) -> bool {
        self.tombstones.contains(tag)
    }
}

impl<T> PartialEq for ORSet<T>
where
    T: Eq + std::hash::Hash + Clone,
{
    fn eq(&self, other: &Self) -> bool {
        let live = |set: &Self| -> HashMap<T, HashSet<Tag>> {
            set.elements
                .iter()
                .filter(|(_, tags)| !tags.is_empty())
                .map(|(e, tags)| (e.clone(), tags.clone()))
                .collect()
        };
        self.tombstones == other.tombstones && live(self) == live(other)
    }
}

impl<T> Eq for ORSet<T> where T: Eq + std::hash::Hash + Clone {}

impl<T> FromIterator<T> for ORSet<T>
where
    T: Eq + std::hash::Hash + Clone,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Self::new();
        for item in iter {
            set.add(item);
        }
        set
    }
}
