//! # Vellum Editor
//!
//! Session layer around the document model.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ model: tree + operations + transform        │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ editor: session + undo                      │
//! │  - Apply local deltas optimistically        │
//! │  - Rebase remote deltas past pending ones   │
//! │  - Delta-based undo/redo through history    │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Optimistic clients**: local edits apply immediately and queue for
//!    acknowledgment.
//! 2. **Transform, never replay blindly**: remote deltas are rebased with
//!    the model's transform engine, so peers converge no matter the
//!    delivery order.
//! 3. **Undo is a transform problem**: an undo step is the recorded inverse
//!    rebased past everything that happened since, not a snapshot rollback.
//!
//! ## Usage
//!
//! ```rust
//! use vellum_editor::EditSession;
//! use vellum_model::{Delta, Document, Position, Text, MAIN_ROOT};
//!
//! let mut session = EditSession::new("client-1", 1, Document::new());
//! let position = Position::new(MAIN_ROOT, vec![0]).unwrap();
//! let op = session.document.create_insert(position, vec![Text::new("hi").into()]);
//! session.apply_local(Delta::new(vec![op])).unwrap();
//! assert_eq!(session.pending_count(), 1);
//! ```

mod errors;
mod session;
mod undo;

pub use errors::EditorError;
pub use session::{EditSession, PendingDelta};
pub use undo::UndoStack;
