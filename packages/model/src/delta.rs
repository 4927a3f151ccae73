//! Deltas: ordered operation bundles.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::operation::Operation;

static NEXT_DELTA_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a delta. History uses it to recognize a
/// delta it has already recorded; ids from other processes are treated as
/// opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeltaId(u64);

impl DeltaId {
    fn next() -> Self {
        DeltaId(NEXT_DELTA_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// One logical user action: an ordered list of operations applied as a unit.
/// Deltas are what peers exchange and what undo reverts, never a partial
/// operation list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub id: DeltaId,
    pub ops: Vec<Operation>,
}

impl Delta {
    pub fn new(ops: Vec<Operation>) -> Self {
        Self {
            id: DeltaId::next(),
            ops,
        }
    }

    /// Rebuilds a delta under an existing identity, used when a transform
    /// produces the rebased form of the same logical action.
    pub fn with_id(id: DeltaId, ops: Vec<Operation>) -> Self {
        Self { id, ops }
    }

    /// Version this delta expects to apply against.
    pub fn base_version(&self) -> Option<u64> {
        self.ops.first().map(|op| op.base_version)
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Renumbers the contained operations to apply consecutively from
    /// `base_version`.
    pub fn renumber(&mut self, base_version: u64) {
        for (i, op) in self.ops.iter_mut().enumerate() {
            op.base_version = base_version + i as u64;
        }
    }

    /// The inverse delta: reversed operations in reverse order, numbered to
    /// apply right after this delta.
    pub fn reversed(&self) -> Delta {
        let base = self
            .base_version()
            .map(|v| v + self.ops.len() as u64)
            .unwrap_or(0);
        let mut ops: Vec<Operation> = self.ops.iter().rev().map(Operation::reversed).collect();
        for (i, op) in ops.iter_mut().enumerate() {
            op.base_version = base + i as u64;
        }
        Delta::new(ops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::OperationKind;

    #[test]
    fn delta_ids_are_unique() {
        let a = Delta::new(vec![]);
        let b = Delta::new(vec![]);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn renumber_assigns_consecutive_versions() {
        let mut delta = Delta::new(vec![
            Operation::new(0, OperationKind::NoOp),
            Operation::new(0, OperationKind::NoOp),
        ]);
        delta.renumber(7);
        assert_eq!(delta.ops[0].base_version, 7);
        assert_eq!(delta.ops[1].base_version, 8);
        assert_eq!(delta.base_version(), Some(7));
    }

    #[test]
    fn reversed_numbers_from_the_delta_end() {
        let mut delta = Delta::new(vec![
            Operation::new(0, OperationKind::NoOp),
            Operation::new(0, OperationKind::NoOp),
        ]);
        delta.renumber(3);
        let inverse = delta.reversed();
        assert_eq!(inverse.base_version(), Some(5));
        assert_eq!(inverse.ops.len(), 2);
    }
}
