//! Operations: atomic, invertible, version-stamped tree edits.
//!
//! ## Semantics
//!
//! - **Insert**: splice nodes in at a position.
//! - **Remove**: move content to the graveyard root; always reversible.
//! - **Move**: relocate a contiguous run of siblings. Source and target are
//!   both expressed against the tree *before* the operation applies.
//! - **Reinsert**: move content back out of the graveyard.
//! - **Rename**: change an element's name, keeping children and attributes.
//! - **Attribute**: set or clear one key over a flat range with a uniform
//!   prior value.
//! - **Marker**: add, update or remove a named tracked range.
//! - **NoOp**: does nothing but still consumes a version; transforms may
//!   collapse conflicting operations into it.
//!
//! An operation only applies to a document whose version equals its
//! `base_version`; a mismatch is a fatal desynchronization error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::position::{Position, GRAVEYARD_ROOT};
use crate::range::Range;

/// A single tree edit, stamped with the document version it applies to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(rename = "baseVersion")]
    pub base_version: u64,
    #[serde(flatten)]
    pub kind: OperationKind,
}

/// The tagged payload of an [`Operation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum OperationKind {
    Insert {
        position: Position,
        nodes: Vec<crate::node::Node>,
    },
    Remove {
        source: Position,
        how_many: usize,
        graveyard_position: Position,
    },
    Move {
        source: Position,
        how_many: usize,
        target: Position,
    },
    Reinsert {
        source: Position,
        how_many: usize,
        target: Position,
    },
    Rename {
        position: Position,
        old_name: String,
        new_name: String,
    },
    Attribute {
        range: Range,
        key: String,
        old_value: Option<Value>,
        new_value: Option<Value>,
    },
    Marker {
        name: String,
        old_range: Option<Range>,
        new_range: Option<Range>,
    },
    NoOp,
}

impl Operation {
    pub fn new(base_version: u64, kind: OperationKind) -> Self {
        Self { base_version, kind }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self.kind, OperationKind::NoOp)
    }

    /// The exact inverse, numbered to apply right after this operation.
    /// Applying an operation and then its inverse restores the prior tree,
    /// including graveyard contents.
    pub fn reversed(&self) -> Operation {
        Operation {
            base_version: self.base_version + 1,
            kind: self.kind.reversed(),
        }
    }
}

impl OperationKind {
    pub(crate) fn reversed(&self) -> OperationKind {
        match self {
            OperationKind::Insert { position, nodes } => {
                let how_many: usize = nodes.iter().map(crate::node::Node::offset_size).sum();
                OperationKind::Remove {
                    source: position.clone(),
                    how_many,
                    // Context-free inverse: drop the content at the start of
                    // the graveyard.
                    graveyard_position: Position::new(GRAVEYARD_ROOT, vec![0])
                        .expect("graveyard position is valid"),
                }
            }
            OperationKind::Remove {
                source,
                how_many,
                graveyard_position,
            } => OperationKind::Reinsert {
                source: graveyard_position.clone(),
                how_many: *how_many,
                target: source.clone(),
            },
            OperationKind::Move {
                source,
                how_many,
                target,
            } => OperationKind::Move {
                source: target
                    .transformed_by_deletion(source, *how_many)
                    .unwrap_or_else(|| target.clone()),
                how_many: *how_many,
                target: source.transformed_by_insertion(target, *how_many, false),
            },
            OperationKind::Reinsert {
                source,
                how_many,
                target,
            } => OperationKind::Remove {
                source: target
                    .transformed_by_deletion(source, *how_many)
                    .unwrap_or_else(|| target.clone()),
                how_many: *how_many,
                graveyard_position: source.clone(),
            },
            OperationKind::Rename {
                position,
                old_name,
                new_name,
            } => OperationKind::Rename {
                position: position.clone(),
                old_name: new_name.clone(),
                new_name: old_name.clone(),
            },
            OperationKind::Attribute {
                range,
                key,
                old_value,
                new_value,
            } => OperationKind::Attribute {
                range: range.clone(),
                key: key.clone(),
                old_value: new_value.clone(),
                new_value: old_value.clone(),
            },
            OperationKind::Marker {
                name,
                old_range,
                new_range,
            } => OperationKind::Marker {
                name: name.clone(),
                old_range: new_range.clone(),
                new_range: old_range.clone(),
            },
            OperationKind::NoOp => OperationKind::NoOp,
        }
    }

    /// Move-family view: Remove, Move and Reinsert are all moves between
    /// roots and transform through one shared path.
    pub(crate) fn as_move(&self) -> Option<MoveView> {
        match self {
            OperationKind::Remove {
                source,
                how_many,
                graveyard_position,
            } => Some(MoveView {
                source: source.clone(),
                how_many: *how_many,
                target: graveyard_position.clone(),
            }),
            OperationKind::Move {
                source,
                how_many,
                target,
            }
            | OperationKind::Reinsert {
                source,
                how_many,
                target,
            } => Some(MoveView {
                source: source.clone(),
                how_many: *how_many,
                target: target.clone(),
            }),
            _ => None,
        }
    }

    /// Rebuilds the same move-family variant from a rebased view.
    pub(crate) fn with_move(&self, view: MoveView) -> OperationKind {
        match self {
            OperationKind::Remove { .. } => OperationKind::Remove {
                source: view.source,
                how_many: view.how_many,
                graveyard_position: view.target,
            },
            OperationKind::Move { .. } => OperationKind::Move {
                source: view.source,
                how_many: view.how_many,
                target: view.target,
            },
            OperationKind::Reinsert { .. } => OperationKind::Reinsert {
                source: view.source,
                how_many: view.how_many,
                target: view.target,
            },
            _ => unreachable!("with_move is only called on move-family operations"),
        }
    }
}

/// Uniform source/target/how-many view over the move family.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MoveView {
    pub source: Position,
    pub how_many: usize,
    pub target: Position,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Text;
    use serde_json::json;

    fn pos(path: Vec<usize>) -> Position {
        Position::new("main", path).unwrap()
    }

    #[test]
    fn operations_serialize_with_type_tag_and_base_version() {
        let op = Operation::new(
            4,
            OperationKind::Insert {
                position: pos(vec![0]),
                nodes: vec![Text::new("hi").into()],
            },
        );
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value["type"], json!("insert"));
        assert_eq!(value["baseVersion"], json!(4));
        let back: Operation = serde_json::from_value(value).unwrap();
        assert_eq!(back, op);
    }

    #[test]
    fn move_reversal_round_trips_positions() {
        // Move one node from offset 0 to offset 2.
        let op = OperationKind::Move {
            source: pos(vec![0]),
            how_many: 1,
            target: pos(vec![2]),
        };
        let OperationKind::Move {
            source, target, ..
        } = op.reversed()
        else {
            panic!("move reverses to move");
        };
        // After the move the node sits at offset 1; reversing brings it back
        // to offset 0.
        assert_eq!(source.offset(), 1);
        assert_eq!(target.offset(), 0);
    }

    #[test]
    fn remove_reverses_to_reinsert_from_the_same_slot() {
        let gy = Position::new(GRAVEYARD_ROOT, vec![3]).unwrap();
        let op = OperationKind::Remove {
            source: pos(vec![5]),
            how_many: 2,
            graveyard_position: gy.clone(),
        };
        let OperationKind::Reinsert {
            source,
            how_many,
            target,
        } = op.reversed()
        else {
            panic!("remove reverses to reinsert");
        };
        assert_eq!(source, gy);
        assert_eq!(how_many, 2);
        assert_eq!(target, pos(vec![5]));
    }

    #[test]
    fn attribute_reversal_swaps_values() {
        let op = OperationKind::Attribute {
            range: Range::from_position_and_shift(pos(vec![0]), 3),
            key: "bold".to_string(),
            old_value: None,
            new_value: Some(json!(true)),
        };
        let OperationKind::Attribute {
            old_value,
            new_value,
            ..
        } = op.reversed()
        else {
            panic!("attribute reverses to attribute");
        };
        assert_eq!(old_value, Some(json!(true)));
        assert_eq!(new_value, None);
    }
}
