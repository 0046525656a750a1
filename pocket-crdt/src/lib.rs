//! CRDT implementations for Pocket.
//!
//! This crate provides Conflict-free Replicated Data Types:
//!
//! - [`VectorClock`]: Causality tracking across nodes
//! - [`LWWRegister<T>`]: Last-Writer-Wins Register for single values
//! - [`GCounter`]: Grow-only counter
//! - [`PNCounter`]: Positive-Negative Counter for distributed inc/dec
//! - [`ORSet<T>`]: Observed-Remove Set for collections
//! - [`LWWMap<K, V>`]: Map with per-key last-writer-wins
//! - [`RichText`]: Character sequence with formatting marks
//!
//! State-based merges in this crate satisfy the following properties:
//! - **Commutative**: merge(a, b) == merge(b, a)
//! - **Associative**: merge(merge(a, b), c) == merge(a, merge(b, c))
//! - **Idempotent**: merge(a, a) == a
//!
//! [`RichText`] is operation-based: its operations commute and re-delivery
//! is a no-op, so replicas converge regardless of the order in which
//! operations are received.

mod character;
mod g_counter;
mod lww_map;
mod lww_register;
mod mark;
mod orset;
mod pn_counter;
mod rich_text;
mod text_op;
mod vector_clock;

pub use character::CharacterId;
pub use g_counter::GCounter;
pub use lww_map::LWWMap;
pub use lww_register::{LWWRegister, RegisterUpdate};
pub use mark::{ActiveMark, FormatMark, MarkId, RichTextSnapshot, TextSpan};
pub use orset::{ORSet, Tag};
pub use pn_counter::PNCounter;
pub use rich_text::RichText;
pub use text_op::{TextOperation, TextPayload};
pub use vector_clock::{CausalOrder, VectorClock};
