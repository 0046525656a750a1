//! Replicated rich text (RGA sequence with Peritext-style marks).
//!
//! Characters live in an arena keyed by [`CharacterId`]. Each entry records
//! the character that was immediately to its left when it was inserted (its
//! origin). The visible order is a depth-first walk of that origin tree in
//! which siblings sharing an origin are visited greatest id first. The walk
//! depends only on the set of entries, never on arrival order, which is what
//! makes replicas converge.
//!
//! A local insert always receives an id greater than anything the replica has
//! seen, so it lands immediately after its origin; the cached order is patched
//! in place. A remote insert whose origin is already placed is spliced in
//! after its origin, past every entry with a greater id. Since a child's id
//! is always greater than its origin's, that scan stops exactly where the
//! walk would put it. Anything else rebuilds the cache.
//!
//! Deleted characters stay in the arena as tombstones so that concurrent
//! inserts and marks anchored to them still resolve.

use crate::character::{CharEntry, arena_serde};
use crate::mark::{ActiveMark, FormatMark, MarkId, RichTextSnapshot, TextSpan};
use crate::text_op::{TextOperation, TextPayload};
use crate::CharacterId;
use pocket_types::{LamportClock, NodeId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A collaboratively edited rich-text document owned by one replica.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "RichTextState", into = "RichTextState")]
pub struct RichText {
    clock: LamportClock,
    entries: HashMap<CharacterId, CharEntry>,
    marks: BTreeMap<MarkId, FormatMark>,
    /// Deletes that arrived before their insert.
    pending_deletes: BTreeSet<CharacterId>,
    /// Unformats that arrived before their format.
    pending_unformats: BTreeSet<MarkId>,
    /// Locally generated operations not yet handed to the transport.
    outbox: Vec<TextOperation>,
    /// Linearized ids of every reachable entry, tombstones included.
    order: Vec<CharacterId>,
    /// Number of live characters in `order`.
    live_len: usize,
}

/// Persisted form of [`RichText`]; the order cache is rebuilt on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RichTextState {
    clock: LamportClock,
    #[serde(with = "arena_serde")]
    entries: HashMap<CharacterId, CharEntry>,
    marks: BTreeMap<MarkId, FormatMark>,
    #[serde(default)]
    pending_deletes: BTreeSet<CharacterId>,
    #[serde(default)]
    pending_unformats: BTreeSet<MarkId>,
    #[serde(default)]
    outbox: Vec<TextOperation>,
}

impl From<RichTextState> for RichText {
    fn from(state: RichTextState) -> Self {
        let mut text = Self {
            clock: state.clock,
            entries: state.entries,
            marks: state.marks,
            pending_deletes: state.pending_deletes,
            pending_unformats: state.pending_unformats,
            outbox: state.outbox,
            order: Vec::new(),
            live_len: 0,
        };
        text.refresh();
        text
    }
}

impl From<RichText> for RichTextState {
    fn from(text: RichText) -> Self {
        Self {
            clock: text.clock,
            entries: text.entries,
            marks: text.marks,
            pending_deletes: text.pending_deletes,
            pending_unformats: text.pending_unformats,
            outbox: text.outbox,
        }
    }
}

impl RichText {
    /// Creates an empty document for a replica.
    #[must_use]
    pub fn new(node_id: NodeId) -> Self {
        Self {
            clock: LamportClock::new(node_id),
            entries: HashMap::new(),
            marks: BTreeMap::new(),
            pending_deletes: BTreeSet::new(),
            pending_unformats: BTreeSet::new(),
            outbox: Vec::new(),
            order: Vec::new(),
            live_len: 0,
        }
    }

    /// Creates a document holding `text`. The insert operations are queued
    /// in the outbox.
    #[must_use]
    pub fn with_text(node_id: NodeId, text: &str) -> Self {
        let mut doc = Self::new(node_id);
        doc.insert(0, text);
        doc
    }

    /// Copies this document's state for another replica.
    ///
    /// The fork continues from this replica's clock so its ids never
    /// collide with or sort below anything already present. The outbox is
    /// not carried over.
    #[must_use]
    pub fn fork(&self, node_id: NodeId) -> Self {
        let mut forked = self.clone();
        forked.clock = LamportClock::with_counter(node_id, self.clock.counter());
        forked.outbox.clear();
        forked
    }

    /// Returns the replica's node id.
    #[must_use]
    pub fn node_id(&self) -> &NodeId {
        self.clock.node_id()
    }

    /// Returns the replica's Lamport clock.
    #[must_use]
    pub fn clock(&self) -> &LamportClock {
        &self.clock
    }

    /// Number of live characters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live_len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live_len == 0
    }

    /// Concatenates live characters in linearized order.
    #[must_use]
    pub fn text(&self) -> String {
        self.live_entries().map(|e| e.value).collect()
    }

    fn live_entries(&self) -> impl Iterator<Item = &CharEntry> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id))
            .filter(|e| !e.tombstoned)
    }

    /// Returns the id of the live character at a visible index.
    #[must_use]
    pub fn character_id_at(&self, index: usize) -> Option<CharacterId> {
        self.live_entries().nth(index).map(|e| e.id.clone())
    }

    /// Returns the visible index of a live character.
    #[must_use]
    pub fn index_of(&self, id: &CharacterId) -> Option<usize> {
        self.live_entries().position(|e| &e.id == id)
    }

    /// Returns true if the character is known, live or tombstoned.
    #[must_use]
    pub fn contains(&self, id: &CharacterId) -> bool {
        self.entries.contains_key(id)
    }

    /// Returns true if the character is known and deleted.
    #[must_use]
    pub fn is_tombstoned(&self, id: &CharacterId) -> bool {
        self.entries.get(id).is_some_and(|e| e.tombstoned)
    }

    /// Position in `order` of the live character at a visible index.
    fn order_position_of_live(&self, index: usize) -> Option<usize> {
        self.order
            .iter()
            .enumerate()
            .filter(|(_, id)| self.entries.get(*id).is_some_and(|e| !e.tombstoned))
            .nth(index)
            .map(|(pos, _)| pos)
    }

    // ── Local edits ──────────────────────────────────────────────

    /// Inserts `text` at a visible index, one operation per character.
    ///
    /// An index past the end is clamped to the end. The characters are
    /// visible immediately; the returned operations are also queued for
    /// [`flush_ops`](Self::flush_ops).
    pub fn insert(&mut self, index: usize, text: &str) -> Vec<TextOperation> {
        let index = index.min(self.live_len);
        let (mut origin, mut pos) = match index {
            0 => (None, 0),
            _ => match self.order_position_of_live(index - 1) {
                Some(p) => (Some(self.order[p].clone()), p + 1),
                None => (None, 0),
            },
        };

        let mut ops = Vec::with_capacity(text.len());
        for value in text.chars() {
            let timestamp = self.clock.tick();
            let id = CharacterId::new(timestamp.node_id.clone(), timestamp.counter);
            self.entries.insert(
                id.clone(),
                CharEntry {
                    id: id.clone(),
                    value,
                    origin: origin.clone(),
                    tombstoned: false,
                },
            );
            self.order.insert(pos, id.clone());
            self.live_len += 1;
            pos += 1;

            ops.push(TextOperation::new(
                timestamp,
                TextPayload::Insert {
                    character_id: id.clone(),
                    origin_id: origin,
                    value,
                },
            ));
            origin = Some(id);
        }

        self.outbox.extend(ops.iter().cloned());
        ops
    }

    /// Deletes up to `length` live characters starting at `start`.
    ///
    /// Tombstoned characters inside the range are skipped, not counted.
    pub fn delete(&mut self, start: usize, length: usize) -> Vec<TextOperation> {
        let doomed: Vec<CharacterId> = self
            .live_entries()
            .skip(start)
            .take(length)
            .map(|e| e.id.clone())
            .collect();

        let mut ops = Vec::with_capacity(doomed.len());
        for id in doomed {
            if let Some(entry) = self.entries.get_mut(&id) {
                entry.tombstoned = true;
                self.live_len -= 1;
            }
            let timestamp = self.clock.tick();
            ops.push(TextOperation::new(
                timestamp,
                TextPayload::Delete { character_id: id },
            ));
        }

        self.outbox.extend(ops.iter().cloned());
        ops
    }

    /// Applies a mark to the live characters `start..end` (end exclusive).
    ///
    /// Returns `None` if the clamped range is empty.
    pub fn format(
        &mut self,
        start: usize,
        end: usize,
        mark_type: impl Into<String>,
        value: Option<Value>,
    ) -> Option<TextOperation> {
        let end = end.min(self.live_len);
        if start >= end {
            return None;
        }
        let start_id = self.character_id_at(start)?;
        let end_id = self.character_id_at(end - 1)?;

        let timestamp = self.clock.tick();
        let mark = FormatMark {
            id: MarkId::new(),
            start: start_id.clone(),
            end: end_id.clone(),
            mark_type: mark_type.into(),
            value,
            timestamp: timestamp.clone(),
            removed: false,
        };
        let op = TextOperation::new(
            timestamp,
            TextPayload::Format {
                mark_id: mark.id,
                start_id,
                end_id,
                format_type: mark.mark_type.clone(),
                format_value: mark.value.clone(),
            },
        );
        self.marks.insert(mark.id, mark);
        self.outbox.push(op.clone());
        Some(op)
    }

    /// Removes a previously applied mark.
    ///
    /// Returns `None` if the mark is unknown or already removed.
    pub fn unformat(&mut self, mark_id: MarkId) -> Option<TextOperation> {
        let mark = self.marks.get_mut(&mark_id).filter(|m| !m.removed)?;
        mark.removed = true;
        let op = TextOperation::new(self.clock.tick(), TextPayload::Unformat { mark_id });
        self.outbox.push(op.clone());
        Some(op)
    }

    /// Drains locally generated operations not yet handed to the transport.
    pub fn flush_ops(&mut self) -> Vec<TextOperation> {
        std::mem::take(&mut self.outbox)
    }

    /// Number of operations waiting in the outbox.
    #[must_use]
    pub fn pending_op_count(&self) -> usize {
        self.outbox.len()
    }

    // ── Remote operations ────────────────────────────────────────

    /// Applies one operation received from another replica.
    ///
    /// Duplicates and out-of-order deliveries are absorbed. Returns true if
    /// the document state changed. Prefer
    /// [`apply_remote_ops`](Self::apply_remote_ops) for logs and other
    /// batches that may arrive out of order.
    pub fn apply_remote_op(&mut self, op: &TextOperation) -> bool {
        self.apply_remote_ops(std::slice::from_ref(op)) > 0
    }

    /// Applies a batch of remote operations, rebuilding the order cache at
    /// most once. Returns how many operations changed state.
    pub fn apply_remote_ops(&mut self, ops: &[TextOperation]) -> usize {
        let mut changed = 0;
        let mut dirty = false;
        for op in ops {
            self.clock.receive(&op.timestamp);
            let (did_change, structural) = self.integrate(op, !dirty);
            if did_change {
                changed += 1;
            }
            dirty |= structural;
        }
        if dirty {
            self.refresh();
        }
        changed
    }

    /// Folds one operation into state. Returns `(changed, needs_refresh)`.
    ///
    /// With `patch` set, inserts are spliced into the cached order when
    /// possible; otherwise the caller rebuilds it.
    fn integrate(&mut self, op: &TextOperation, patch: bool) -> (bool, bool) {
        match &op.payload {
            TextPayload::Insert {
                character_id,
                origin_id,
                value,
            } => {
                if self.entries.contains_key(character_id) {
                    return (false, false);
                }
                let tombstoned = self.pending_deletes.remove(character_id);
                // Nothing can be waiting on this entry unless some entry
                // is unreachable.
                let orphan_free = self.order.len() == self.entries.len();
                self.entries.insert(
                    character_id.clone(),
                    CharEntry {
                        id: character_id.clone(),
                        value: *value,
                        origin: origin_id.clone(),
                        tombstoned,
                    },
                );
                let placed = patch
                    && orphan_free
                    && self.splice(character_id, origin_id.as_ref(), tombstoned);
                (true, !placed)
            }
            TextPayload::Delete { character_id } => {
                let reachable = self.order.len() == self.entries.len()
                    || self.order.contains(character_id);
                match self.entries.get_mut(character_id) {
                    Some(entry) if entry.tombstoned => (false, false),
                    Some(entry) => {
                        entry.tombstoned = true;
                        if reachable {
                            self.live_len = self.live_len.saturating_sub(1);
                        }
                        (true, false)
                    }
                    None => (self.pending_deletes.insert(character_id.clone()), false),
                }
            }
            TextPayload::Format {
                mark_id,
                start_id,
                end_id,
                format_type,
                format_value,
            } => {
                if self.marks.contains_key(mark_id) {
                    return (false, false);
                }
                let removed = self.pending_unformats.remove(mark_id);
                self.marks.insert(
                    *mark_id,
                    FormatMark {
                        id: *mark_id,
                        start: start_id.clone(),
                        end: end_id.clone(),
                        mark_type: format_type.clone(),
                        value: format_value.clone(),
                        timestamp: op.timestamp.clone(),
                        removed,
                    },
                );
                (true, false)
            }
            TextPayload::Unformat { mark_id } => match self.marks.get_mut(mark_id) {
                Some(mark) if mark.removed => (false, false),
                Some(mark) => {
                    mark.removed = true;
                    (true, false)
                }
                None => (self.pending_unformats.insert(*mark_id), false),
            },
        }
    }

    /// Places a freshly integrated entry in the cached order. Returns false
    /// if the order has to be rebuilt instead.
    fn splice(&mut self, id: &CharacterId, origin: Option<&CharacterId>, tombstoned: bool) -> bool {
        let start = match origin {
            None => 0,
            // A child never sorts below its origin in a well-formed history.
            Some(origin) if origin >= id => return false,
            Some(origin) => match self.order.iter().position(|o| o == origin) {
                Some(pos) => pos + 1,
                // Unplaced origin: the entry stays hidden with it.
                None => return true,
            },
        };
        let offset = self.order[start..]
            .iter()
            .position(|other| other < id)
            .unwrap_or(self.order.len() - start);
        self.order.insert(start + offset, id.clone());
        if !tombstoned {
            self.live_len += 1;
        }
        true
    }

    /// Rebuilds the linearized order and live count from the arena.
    fn refresh(&mut self) {
        let mut children: HashMap<Option<&CharacterId>, Vec<&CharacterId>> = HashMap::new();
        for entry in self.entries.values() {
            children.entry(entry.origin.as_ref()).or_default().push(&entry.id);
        }
        for siblings in children.values_mut() {
            siblings.sort_unstable();
        }

        // Entries whose origin has not arrived are unreachable and stay
        // hidden until it does.
        let mut order = Vec::with_capacity(self.entries.len());
        let mut stack: Vec<&CharacterId> = children.get(&None).cloned().unwrap_or_default();
        while let Some(id) = stack.pop() {
            order.push(id.clone());
            if let Some(kids) = children.get(&Some(id)) {
                stack.extend(kids.iter().copied());
            }
        }

        self.live_len = order
            .iter()
            .filter(|id| self.entries.get(*id).is_some_and(|e| !e.tombstoned))
            .count();
        self.order = order;
    }

    // ── Marks and rendering ──────────────────────────────────────

    /// Returns a mark by id, removed or not.
    #[must_use]
    pub fn mark(&self, id: &MarkId) -> Option<&FormatMark> {
        self.marks.get(id)
    }

    /// Iterates over all known marks, ordered by id.
    pub fn marks(&self) -> impl Iterator<Item = &FormatMark> {
        self.marks.values()
    }

    /// Renders the document as text plus formatted spans.
    ///
    /// A mark is active when it is not removed and both anchors are present;
    /// it covers every character between its anchors, inclusive.
    #[must_use]
    pub fn snapshot(&self) -> RichTextSnapshot {
        let positions: HashMap<&CharacterId, usize> =
            self.order.iter().enumerate().map(|(i, id)| (id, i)).collect();

        let ranges: Vec<(usize, usize, &FormatMark)> = self
            .marks
            .values()
            .filter(|m| !m.removed)
            .filter_map(|m| {
                let start = *positions.get(&m.start)?;
                let end = *positions.get(&m.end)?;
                (start <= end).then_some((start, end, m))
            })
            .collect();

        let mut spans: Vec<TextSpan> = Vec::new();
        let mut current_ids: Vec<MarkId> = Vec::new();
        let mut text = String::new();

        for (pos, id) in self.order.iter().enumerate() {
            let Some(entry) = self.entries.get(id).filter(|e| !e.tombstoned) else {
                continue;
            };
            text.push(entry.value);

            let active: Vec<&FormatMark> = ranges
                .iter()
                .filter(|(s, e, _)| *s <= pos && pos <= *e)
                .map(|(_, _, m)| *m)
                .collect();
            let ids: Vec<MarkId> = active.iter().map(|m| m.id).collect();

            if ids == current_ids {
                if let Some(span) = spans.last_mut() {
                    span.text.push(entry.value);
                    continue;
                }
            }
            spans.push(TextSpan {
                text: entry.value.to_string(),
                marks: active.into_iter().map(ActiveMark::from).collect(),
            });
            current_ids = ids;
        }

        RichTextSnapshot {
            length: self.live_len,
            text,
            spans,
        }
    }
}

impl PartialEq for RichText {
    /// Replicas are equal when they hold the same characters, tombstones and
    /// marks, regardless of clocks or outboxes.
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries && self.marks == other.marks && self.order == other.order
    }
}
