//! # Vellum Model
//!
//! Collaborative rich-text document model: a tree of elements and
//! grapheme-aware text runs, edited through atomic, invertible, version
//! stamped operations, reconciled across peers by operational
//! transformation.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ positions & ranges: tree addresses +        │
//! │ rebasing arithmetic                         │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ operations & deltas: insert / move / rename │
//! │ / attribute / marker edits, grouped into    │
//! │ logical actions                             │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ document: apply + validate, version         │
//! │ counter, history log, graveyard root,       │
//! │ marker collection, differ buffer            │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ transform: rebase concurrent operations so  │
//! │ peers converge; differ: render-ready diffs  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **The tree is the source of truth**: diffs and markers are derived or
//!    dependent views.
//! 2. **Every mutation is an operation**: no code path splices children
//!    behind the document's back, so history is complete and undo is exact.
//! 3. **Removal is a move**: the graveyard root keeps removed content, so
//!    remove, move and reinsert are one invertible family.
//! 4. **Transforms converge**: applying `a` then `transform(b, a)` and `b`
//!    then `transform(a, b)` yield the same tree, given complementary
//!    importance flags.
//!
//! ## Usage
//!
//! ```rust
//! use vellum_model::{Document, Position, Text, MAIN_ROOT};
//!
//! let mut doc = Document::new();
//! let position = Position::new(MAIN_ROOT, vec![0]).unwrap();
//! let op = doc.create_insert(position, vec![Text::new("hello").into()]);
//! doc.apply_operation(op).unwrap();
//! assert_eq!(doc.root(MAIN_ROOT).unwrap().text(), "hello");
//! assert_eq!(doc.version(), 1);
//! ```

mod delta;
mod differ;
mod document;
mod error;
mod history;
mod marker;
mod node;
mod operation;
mod position;
mod range;
mod transform;

pub use delta::{Delta, DeltaId};
pub use differ::{DiffItem, Differ};
pub use document::{Document, SubscriptionId, MAIN_ROOT};
pub use error::ModelError;
pub use history::{History, HistoryItem, HistoryItems};
pub use marker::MarkerCollection;
pub use node::{Attributes, Element, Node, Text};
pub use operation::{Operation, OperationKind};
pub use position::{CompareResult, Position, GRAVEYARD_ROOT};
pub use range::Range;
pub use transform::{transform, transform_delta_sets};
