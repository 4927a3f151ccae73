//! Positions in the document tree.
//!
//! A position is a root name plus a path of offsets leading from that root
//! down to a spot *between* two items (or at an element boundary). Positions
//! are immutable value types: every rebasing helper returns a new instance.
//! The insertion/deletion/move arithmetic here is the foundation the whole
//! transform engine is built on.

use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::error::ModelError;

/// Name of the internal root that holds removed content.
pub const GRAVEYARD_ROOT: &str = "$graveyard";

/// Result of comparing two positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareResult {
    Same,
    Before,
    After,
    /// The positions live in different roots and are not comparable.
    Different,
}

/// An address between two items in a document tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    root: String,
    path: Vec<usize>,
}

impl Position {
    /// Creates a position. The path must be non-empty: a bare root is not an
    /// addressable spot, which makes before/after-root construction fail
    /// immediately rather than at use time.
    pub fn new(root: impl Into<String>, path: Vec<usize>) -> Result<Self, ModelError> {
        if path.is_empty() {
            return Err(ModelError::InvalidPosition(
                "position path must not be empty".to_string(),
            ));
        }
        Ok(Self {
            root: root.into(),
            path,
        })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn path(&self) -> &[usize] {
        &self.path
    }

    /// Offset in the direct parent, i.e. the last path component.
    pub fn offset(&self) -> usize {
        *self.path.last().expect("position path is never empty")
    }

    /// Path of the direct parent element.
    pub fn parent_path(&self) -> &[usize] {
        &self.path[..self.path.len() - 1]
    }

    pub fn is_in_graveyard(&self) -> bool {
        self.root == GRAVEYARD_ROOT
    }

    /// Same parent, different offset.
    pub fn with_offset(&self, offset: usize) -> Position {
        let mut path = self.path.clone();
        *path.last_mut().expect("position path is never empty") = offset;
        Position {
            root: self.root.clone(),
            path,
        }
    }

    pub fn shifted_by(&self, delta: usize) -> Position {
        self.with_offset(self.offset() + delta)
    }

    /// Whether both positions have the same direct parent.
    pub fn has_same_parent(&self, other: &Position) -> bool {
        self.root == other.root && self.parent_path() == other.parent_path()
    }

    /// Compares document order. Paths compare lexicographically; a position
    /// that is a strict prefix of another addresses an ancestor boundary and
    /// orders before it.
    pub fn compare(&self, other: &Position) -> CompareResult {
        if self.root != other.root {
            return CompareResult::Different;
        }
        for (a, b) in self.path.iter().zip(other.path.iter()) {
            if a < b {
                return CompareResult::Before;
            }
            if a > b {
                return CompareResult::After;
            }
        }
        match self.path.len().cmp(&other.path.len()) {
            std::cmp::Ordering::Less => CompareResult::Before,
            std::cmp::Ordering::Greater => CompareResult::After,
            std::cmp::Ordering::Equal => CompareResult::Same,
        }
    }

    pub fn is_before(&self, other: &Position) -> bool {
        self.compare(other) == CompareResult::Before
    }

    pub fn is_after(&self, other: &Position) -> bool {
        self.compare(other) == CompareResult::After
    }

    /// True when no content (characters or elements) lies between the two
    /// positions, even if their paths differ. Needed to avoid reporting
    /// spurious empty ranges.
    pub fn is_touching(&self, other: &Position, doc: &Document) -> Result<bool, ModelError> {
        let (left, right) = match self.compare(other) {
            CompareResult::Same => return Ok(true),
            CompareResult::Different => return Ok(false),
            CompareResult::Before => (self, other),
            CompareResult::After => (other, self),
        };

        let divergence = left
            .path
            .iter()
            .zip(right.path.iter())
            .position(|(a, b)| a != b)
            .unwrap_or(left.path.len().min(right.path.len()));

        if divergence == left.path.len() {
            // `left` is an ancestor boundary of `right`: touching when the
            // deeper path enters every level at its very start.
            return Ok(right.path[divergence..].iter().all(|&c| c == 0));
        }

        // `right` being a prefix of `left` would order before it, so both
        // sides have a component at the divergence index here.
        if right.path[divergence] != left.path[divergence] + 1 {
            return Ok(false);
        }
        if right.path[divergence + 1..].iter().any(|&c| c != 0) {
            return Ok(false);
        }
        if left.path.len() == divergence + 1 {
            // The node at the divergence offset itself sits between them.
            return Ok(false);
        }

        // `left` must sit at the very end of every level it descends into
        // past the divergence node.
        let mut parent = doc.root(&left.root)?;
        for (depth, &component) in left.path.iter().enumerate() {
            if depth <= divergence {
                parent = parent.child_element_at(component)?;
                continue;
            }
            if depth == left.path.len() - 1 {
                if component != parent.offset_size() {
                    return Ok(false);
                }
            } else {
                if component + 1 != parent.offset_size() {
                    return Ok(false);
                }
                parent = parent.child_element_at(component)?;
            }
        }
        Ok(true)
    }

    /// Rebases this position past an insertion of `how_many` offsets at
    /// `at`. `insert_before` decides ties when the insertion lands exactly
    /// on this position: `true` pushes this position behind the new content.
    pub fn transformed_by_insertion(
        &self,
        at: &Position,
        how_many: usize,
        insert_before: bool,
    ) -> Position {
        let mut transformed = self.clone();
        if self.root != at.root {
            return transformed;
        }
        if at.parent_path() == self.parent_path() {
            if at.offset() < self.offset() || (at.offset() == self.offset() && insert_before) {
                *transformed.path.last_mut().unwrap() += how_many;
            }
        } else if self.path.len() > at.path.len()
            && self.path[..at.path.len() - 1] == at.path[..at.path.len() - 1]
        {
            // The insertion happened in an ancestor of this position's
            // parent; shift the ancestor component the path descends through.
            let depth = at.path.len() - 1;
            if at.offset() <= self.path[depth] {
                transformed.path[depth] += how_many;
            }
        }
        transformed
    }

    /// Rebases this position past a removal of `how_many` offsets at `at`.
    /// Returns `None` when the position pointed inside the removed content.
    pub fn transformed_by_deletion(&self, at: &Position, how_many: usize) -> Option<Position> {
        let mut transformed = self.clone();
        if self.root != at.root {
            return Some(transformed);
        }
        if at.parent_path() == self.parent_path() {
            if at.offset() < self.offset() {
                if at.offset() + how_many > self.offset() {
                    return None;
                }
                *transformed.path.last_mut().unwrap() -= how_many;
            }
        } else if self.path.len() > at.path.len()
            && self.path[..at.path.len() - 1] == at.path[..at.path.len() - 1]
        {
            let depth = at.path.len() - 1;
            if at.offset() <= self.path[depth] {
                if at.offset() + how_many > self.path[depth] {
                    // An ancestor of this position was removed.
                    return None;
                }
                transformed.path[depth] -= how_many;
            }
        }
        Some(transformed)
    }

    /// Rebases this position past a move of `how_many` offsets from `source`
    /// to `target` (both expressed before the move applied). A position
    /// inside the moved content follows it to the target.
    pub fn transformed_by_move(
        &self,
        source: &Position,
        target: &Position,
        how_many: usize,
        insert_before: bool,
    ) -> Position {
        let adjusted_target = target
            .transformed_by_deletion(source, how_many)
            .unwrap_or_else(|| target.clone());
        match self.transformed_by_deletion(source, how_many) {
            Some(shifted) => {
                shifted.transformed_by_insertion(&adjusted_target, how_many, insert_before)
            }
            None => self.combined_with(source, &adjusted_target),
        }
    }

    /// Splices this position's path through a move: the ancestor component
    /// addressed relative to `source` is re-expressed relative to `target`
    /// (already adjusted for the removal), keeping the deeper tail intact.
    pub fn combined_with(&self, source: &Position, target: &Position) -> Position {
        let depth = source.path.len() - 1;
        let mut path = target.path.clone();
        *path.last_mut().unwrap() += self.path[depth] - source.offset();
        path.extend_from_slice(&self.path[depth + 1..]);
        Position {
            root: target.root.clone(),
            path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(path: Vec<usize>) -> Position {
        Position::new("main", path).unwrap()
    }

    #[test]
    fn empty_path_is_rejected() {
        let err = Position::new("main", vec![]).unwrap_err();
        assert!(matches!(err, ModelError::InvalidPosition(_)));
    }

    #[test]
    fn compare_orders_lexicographically() {
        assert_eq!(pos(vec![0]).compare(&pos(vec![1])), CompareResult::Before);
        assert_eq!(pos(vec![1, 2]).compare(&pos(vec![1, 2])), CompareResult::Same);
        assert_eq!(pos(vec![2]).compare(&pos(vec![1, 9])), CompareResult::After);
        // A prefix addresses an ancestor boundary and orders first.
        assert_eq!(pos(vec![1]).compare(&pos(vec![1, 0])), CompareResult::Before);
        let other_root = Position::new("other", vec![0]).unwrap();
        assert_eq!(pos(vec![0]).compare(&other_root), CompareResult::Different);
    }

    #[test]
    fn insertion_shifts_same_parent_offsets() {
        let p = pos(vec![3]);
        assert_eq!(p.transformed_by_insertion(&pos(vec![1]), 2, false).offset(), 5);
        assert_eq!(p.transformed_by_insertion(&pos(vec![3]), 2, false).offset(), 3);
        assert_eq!(p.transformed_by_insertion(&pos(vec![3]), 2, true).offset(), 5);
        assert_eq!(p.transformed_by_insertion(&pos(vec![4]), 2, true).offset(), 3);
    }

    #[test]
    fn insertion_shifts_ancestor_components() {
        let p = pos(vec![2, 4]);
        let shifted = p.transformed_by_insertion(&pos(vec![1]), 3, false);
        assert_eq!(shifted.path(), &[5, 4]);
        // Insertions deeper than the path leave it alone.
        let untouched = p.transformed_by_insertion(&pos(vec![2, 0, 1]), 3, false);
        assert_eq!(untouched.path(), &[2, 4]);
    }

    #[test]
    fn deletion_shifts_or_swallows() {
        let p = pos(vec![5]);
        assert_eq!(
            p.transformed_by_deletion(&pos(vec![1]), 2).unwrap().offset(),
            3
        );
        assert!(pos(vec![3]).transformed_by_deletion(&pos(vec![2]), 3).is_none());
        // Boundary positions survive.
        assert_eq!(
            pos(vec![2]).transformed_by_deletion(&pos(vec![2]), 3).unwrap().offset(),
            2
        );
        // Removing an ancestor swallows the whole position.
        assert!(pos(vec![2, 4]).transformed_by_deletion(&pos(vec![2]), 1).is_none());
    }

    #[test]
    fn move_rebases_positions_outside_the_range() {
        // Move two offsets from 1..3 to offset 6.
        let moved = pos(vec![4]).transformed_by_move(&pos(vec![1]), &pos(vec![6]), 2, false);
        // Removal shifts 4 -> 2, insertion lands at 6 - 2 = 4, behind it.
        assert_eq!(moved.offset(), 2);
    }

    #[test]
    fn move_carries_positions_inside_the_range() {
        let inside = pos(vec![2, 1]);
        let moved = inside.transformed_by_move(&pos(vec![2]), &pos(vec![7]), 1, false);
        // The node at offset 2 lands at 7 - 1 = 6; the tail stays.
        assert_eq!(moved.path(), &[6, 1]);
    }

    #[test]
    fn move_into_another_root_changes_root() {
        let inside = pos(vec![3, 2]);
        let gy = Position::new(GRAVEYARD_ROOT, vec![0]).unwrap();
        let moved = inside.transformed_by_move(&pos(vec![3]), &gy, 1, false);
        assert_eq!(moved.root(), GRAVEYARD_ROOT);
        assert_eq!(moved.path(), &[0, 2]);
    }
}
