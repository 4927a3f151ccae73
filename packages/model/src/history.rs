//! Append-only log of applied deltas.

use std::collections::HashMap;

use crate::delta::{Delta, DeltaId};
use crate::error::ModelError;
use crate::operation::{Operation, OperationKind};

/// The document's change log. Deltas are appended exactly once, indexed by
/// the version they applied against, and can later be substituted: marked
/// inactive (replaced by equivalent no-ops) or updated to a rebased
/// representation. Traversals transparently yield the substitutions, never
/// the stale originals.
#[derive(Debug, Default)]
pub struct History {
    entries: Vec<Entry>,
    version_to_index: HashMap<u64, usize>,
    id_to_index: HashMap<DeltaId, usize>,
    /// Earliest version with a substitution; traversals before it skip the
    /// substitution lookup entirely. Purely an optimization, observable
    /// behavior does not depend on it.
    earliest_substituted: Option<u64>,
}

#[derive(Debug)]
struct Entry {
    delta: Delta,
    base_version: u64,
    op_len: usize,
    substitution: Option<Vec<Delta>>,
}

/// One step of a history traversal.
#[derive(Debug)]
pub struct HistoryItem<'a> {
    pub delta: &'a Delta,
    pub index: usize,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Version right after the last recorded delta.
    pub fn end_version(&self) -> u64 {
        self.entries
            .last()
            .map(|e| e.base_version + e.op_len as u64)
            .unwrap_or(0)
    }

    /// Records a delta. Called once per applied operation; repeated calls
    /// for operations of the same delta are collapsed into one entry,
    /// recognized by the delta id.
    pub fn add_delta(&mut self, delta: &Delta) {
        if delta.is_empty() {
            return;
        }
        if self
            .entries
            .last()
            .is_some_and(|last| last.delta.id == delta.id)
        {
            return;
        }
        let base_version = delta.base_version().expect("non-empty delta has a base");
        let index = self.entries.len();
        self.version_to_index.insert(base_version, index);
        self.id_to_index.insert(delta.id, index);
        self.entries.push(Entry {
            delta: delta.clone(),
            base_version,
            op_len: delta.len(),
            substitution: None,
        });
    }

    /// Lazily yields `{delta, index}` from the delta recorded at `from`
    /// to the end. `from` must land exactly on a delta boundary; resuming
    /// from the middle of an atomic change is a caller bug.
    pub fn items_from(&self, from: u64) -> Result<HistoryItems<'_>, ModelError> {
        if from == self.end_version() {
            return Ok(HistoryItems {
                history: self,
                index: self.entries.len(),
                pending: Vec::new(),
            });
        }
        let index = *self
            .version_to_index
            .get(&from)
            .ok_or(ModelError::HistoryPointNotFound(from))?;
        Ok(HistoryItems {
            history: self,
            index,
            pending: Vec::new(),
        })
    }

    /// Replaces a delta, for all future traversals, with an equivalent run
    /// of no-ops. Version numbering is preserved: the substitution has the
    /// same operation count as the original.
    pub fn mark_inactive_delta(&mut self, id: DeltaId) -> Result<(), ModelError> {
        let index = *self.id_to_index.get(&id).ok_or(ModelError::UnknownDelta)?;
        let entry = &mut self.entries[index];
        let ops = (0..entry.op_len)
            .map(|i| Operation::new(entry.base_version + i as u64, OperationKind::NoOp))
            .collect();
        entry.substitution = Some(vec![Delta::new(ops)]);
        self.note_substituted(index);
        Ok(())
    }

    /// Represents the delta at `index` by a different delta sequence going
    /// forward. The replacement's operations are renumbered to start at the
    /// original base version.
    pub fn update_delta(&mut self, index: usize, mut replacement: Vec<Delta>) -> Result<(), ModelError> {
        let entry = self
            .entries
            .get(index)
            .ok_or(ModelError::UnknownDelta)?;
        let mut version = entry.base_version;
        for delta in &mut replacement {
            delta.renumber(version);
            version += delta.len() as u64;
        }
        self.entries[index].substitution = Some(replacement);
        self.note_substituted(index);
        Ok(())
    }

    fn note_substituted(&mut self, index: usize) {
        let base = self.entries[index].base_version;
        self.earliest_substituted = Some(match self.earliest_substituted {
            Some(v) => v.min(base),
            None => base,
        });
    }

    fn effective(&self, index: usize) -> Vec<&Delta> {
        let entry = &self.entries[index];
        if self
            .earliest_substituted
            .map_or(true, |v| entry.base_version < v)
        {
            return vec![&entry.delta];
        }
        match &entry.substitution {
            Some(deltas) => deltas.iter().collect(),
            None => vec![&entry.delta],
        }
    }
}

/// Lazy traversal handle returned by [`History::items_from`].
pub struct HistoryItems<'a> {
    history: &'a History,
    index: usize,
    pending: Vec<HistoryItem<'a>>,
}

impl<'a> Iterator for HistoryItems<'a> {
    type Item = HistoryItem<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.pending.pop() {
                return Some(item);
            }
            if self.index >= self.history.entries.len() {
                return None;
            }
            let index = self.index;
            self.index += 1;
            let mut items: Vec<HistoryItem<'a>> = self
                .history
                .effective(index)
                .into_iter()
                .map(|delta| HistoryItem { delta, index })
                .collect();
            items.reverse();
            self.pending = items;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_delta(base: u64, len: usize) -> Delta {
        let ops = (0..len)
            .map(|i| Operation::new(base + i as u64, OperationKind::NoOp))
            .collect();
        Delta::new(ops)
    }

    #[test]
    fn duplicate_appends_of_the_same_delta_collapse() {
        let mut history = History::new();
        let delta = noop_delta(0, 2);
        history.add_delta(&delta);
        history.add_delta(&delta);
        assert_eq!(history.len(), 1);
        assert_eq!(history.end_version(), 2);
    }

    #[test]
    fn items_from_requires_a_delta_boundary() {
        let mut history = History::new();
        history.add_delta(&noop_delta(0, 2));
        history.add_delta(&noop_delta(2, 1));

        assert_eq!(history.items_from(0).unwrap().count(), 2);
        assert_eq!(history.items_from(2).unwrap().count(), 1);
        // End of history is a valid (empty) starting point.
        assert_eq!(history.items_from(3).unwrap().count(), 0);
        // Middle of the first delta is not.
        assert!(matches!(
            history.items_from(1),
            Err(ModelError::HistoryPointNotFound(1))
        ));
        assert!(matches!(
            history.items_from(9),
            Err(ModelError::HistoryPointNotFound(9))
        ));
    }

    #[test]
    fn inactive_deltas_are_substituted_in_traversals() {
        let mut history = History::new();
        let delta = noop_delta(0, 2);
        history.add_delta(&delta);
        history.mark_inactive_delta(delta.id).unwrap();

        let items: Vec<_> = history.items_from(0).unwrap().collect();
        assert_eq!(items.len(), 1);
        assert_ne!(items[0].delta.id, delta.id);
        assert_eq!(items[0].delta.len(), 2);
        assert!(items[0].delta.ops.iter().all(Operation::is_noop));
        // Version numbering is preserved by the substitution.
        assert_eq!(items[0].delta.base_version(), Some(0));
    }

    #[test]
    fn updated_deltas_replace_the_original_going_forward() {
        let mut history = History::new();
        history.add_delta(&noop_delta(0, 1));
        history.add_delta(&noop_delta(1, 2));

        let replacement = vec![noop_delta(0, 1), noop_delta(0, 1)];
        history.update_delta(1, replacement).unwrap();

        let items: Vec<_> = history.items_from(0).unwrap().collect();
        assert_eq!(items.len(), 3);
        assert_eq!(items[1].index, 1);
        assert_eq!(items[2].index, 1);
        assert_eq!(items[1].delta.base_version(), Some(1));
        assert_eq!(items[2].delta.base_version(), Some(2));
    }

    #[test]
    fn unknown_delta_ids_are_rejected() {
        let mut history = History::new();
        let stray = noop_delta(0, 1);
        assert!(matches!(
            history.mark_inactive_delta(stray.id),
            Err(ModelError::UnknownDelta)
        ));
    }
}
