//! # Undo/Redo Stack
//!
//! Delta-based undo built on the model's history and transform engine.
//!
//! ## Design
//!
//! - Each tracked delta records its inverse before being applied.
//! - Undo transforms the recorded inverse past every delta applied since
//!   (read from the document's history, which substitutes inactivated
//!   entries), applies the result, and marks the original delta inactive.
//! - Redo does the same with the inverse of the applied undo delta.
//! - New tracked deltas clear the redo stack.
//! - A whole delta is always reverted at once, never a partial operation.

use vellum_model::{transform_delta_sets, Delta, DeltaId, Document};

use crate::EditorError;

#[derive(Debug, Clone)]
struct UndoEntry {
    /// The delta this entry reverts.
    delta_id: DeltaId,
    /// Its inverse, valid immediately after the delta applied.
    inverse: Delta,
}

/// Undo/redo stack for tracked document deltas.
#[derive(Debug, Default)]
pub struct UndoStack {
    undo_stack: Vec<UndoEntry>,
    redo_stack: Vec<UndoEntry>,
    /// Maximum number of undo levels (0 = unlimited).
    max_levels: usize,
}

impl UndoStack {
    /// Creates a stack with the default limit of 100 levels.
    pub fn new() -> Self {
        Self::with_max_levels(100)
    }

    pub fn with_max_levels(max_levels: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_levels,
        }
    }

    /// Applies a delta and records it for undo.
    pub fn apply(&mut self, delta: Delta, doc: &mut Document) -> Result<(), EditorError> {
        if delta.is_empty() {
            return Ok(());
        }
        let entry = UndoEntry {
            delta_id: delta.id,
            inverse: delta.reversed(),
        };
        doc.apply_delta(delta)?;
        self.undo_stack.push(entry);
        if self.max_levels > 0 && self.undo_stack.len() > self.max_levels {
            self.undo_stack.remove(0);
        }
        self.redo_stack.clear();
        Ok(())
    }

    /// Reverts the most recent tracked delta. Returns `false` when there is
    /// nothing to undo.
    pub fn undo(&mut self, doc: &mut Document) -> Result<bool, EditorError> {
        let Some(entry) = self.undo_stack.pop() else {
            return Ok(false);
        };
        let reverse = Self::replay(entry, doc)?;
        self.redo_stack.push(reverse);
        Ok(true)
    }

    /// Reapplies the most recently undone delta. Returns `false` when there
    /// is nothing to redo.
    pub fn redo(&mut self, doc: &mut Document) -> Result<bool, EditorError> {
        let Some(entry) = self.redo_stack.pop() else {
            return Ok(false);
        };
        let reverse = Self::replay(entry, doc)?;
        self.undo_stack.push(reverse);
        Ok(true)
    }

    /// Applies `entry`'s inverse, rebased past everything that happened
    /// since, and retires the original delta in history. Returns the entry
    /// that reverts the just-applied inverse.
    fn replay(entry: UndoEntry, doc: &mut Document) -> Result<UndoEntry, EditorError> {
        let since = entry
            .inverse
            .base_version()
            .expect("tracked deltas are never empty");
        let later: Vec<Delta> = doc
            .history()
            .items_from(since)?
            .map(|item| item.delta.clone())
            .collect();

        let (rebased, _) = transform_delta_sets(&[entry.inverse], &later, true);
        let mut applied = None;
        for mut delta in rebased {
            delta.renumber(doc.version());
            doc.apply_delta(delta.clone())?;
            applied = Some(delta);
        }
        doc.history_mut().mark_inactive_delta(entry.delta_id)?;

        let applied = applied.expect("transforming one delta yields one delta");
        tracing::debug!(reverted = ?entry.delta_id, "replayed inverse delta");
        Ok(UndoEntry {
            delta_id: applied.id,
            inverse: applied.reversed(),
        })
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_levels(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_levels(&self) -> usize {
        self.redo_stack.len()
    }

    /// Clears all undo/redo history.
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}
