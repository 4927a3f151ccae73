//! The document: named roots, a version counter, and the machinery around
//! operation application.
//!
//! All tree mutation flows through [`Document::apply_operation`] /
//! [`Document::apply_delta`]; no other code path splices children. Applying
//! an operation validates it against the current tree first, so a failed
//! application leaves the document untouched, then mutates the tree, bumps
//! the version by exactly one, buffers the differ, rebases markers and
//! records the delta in history.
//!
//! Removed content lives under the `$graveyard` root, an ordinary element
//! root with a special name. Removal being a move keeps every operation in
//! one invertible family and gives undo its memory for free.

use std::collections::BTreeMap;
use std::fmt;

use crate::delta::Delta;
use crate::differ::{DiffItem, Differ};
use crate::error::ModelError;
use crate::history::History;
use crate::marker::MarkerCollection;
use crate::node::{Element, Node};
use crate::operation::{Operation, OperationKind};
use crate::position::{Position, GRAVEYARD_ROOT};
use crate::range::Range;
use serde_json::Value;

/// Default content root created by [`Document::new`].
pub const MAIN_ROOT: &str = "main";

/// Handle returned by [`Document::on_change`], used to unsubscribe.
pub type SubscriptionId = usize;

type ChangeListener = Box<dyn Fn(&Delta)>;

pub struct Document {
    roots: BTreeMap<String, Element>,
    version: u64,
    history: History,
    differ: Differ,
    markers: MarkerCollection,
    listeners: Vec<(SubscriptionId, ChangeListener)>,
    next_subscription: SubscriptionId,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("roots", &self.roots)
            .field("version", &self.version)
            .field("markers", &self.markers)
            .finish_non_exhaustive()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Creates a document with the default content root and the graveyard.
    pub fn new() -> Self {
        let mut roots = BTreeMap::new();
        roots.insert(MAIN_ROOT.to_string(), Element::new(MAIN_ROOT));
        roots.insert(GRAVEYARD_ROOT.to_string(), Element::new(GRAVEYARD_ROOT));
        Self {
            roots,
            version: 0,
            history: History::new(),
            differ: Differ::new(),
            markers: MarkerCollection::new(),
            listeners: Vec::new(),
            next_subscription: 0,
        }
    }

    /// Adds another named content root.
    pub fn create_root(&mut self, name: impl Into<String>) {
        let name = name.into();
        self.roots
            .entry(name.clone())
            .or_insert_with(|| Element::new(name));
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn root(&self, name: &str) -> Result<&Element, ModelError> {
        self.roots
            .get(name)
            .ok_or_else(|| ModelError::NoSuchRoot(name.to_string()))
    }

    pub fn graveyard(&self) -> &Element {
        self.roots
            .get(GRAVEYARD_ROOT)
            .expect("the graveyard root always exists")
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut History {
        &mut self.history
    }

    pub fn markers(&self) -> &MarkerCollection {
        &self.markers
    }

    /// Render diff for the buffered change session; see [`Differ`].
    pub fn changes(&self) -> Vec<DiffItem> {
        self.differ.changes(self)
    }

    /// Clears the differ buffer, ending the current change session.
    pub fn reset_differ(&mut self) {
        self.differ.reset();
    }

    /// Registers a callback invoked after every applied delta.
    pub fn on_change(&mut self, listener: impl Fn(&Delta) + 'static) -> SubscriptionId {
        let id = self.next_subscription;
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
    }

    /// Resolves the element at `path` under `root`.
    pub fn element_by_path(&self, root: &str, path: &[usize]) -> Result<&Element, ModelError> {
        let mut element = self.root(root)?;
        for &offset in path {
            element = element.child_element_at(offset)?;
        }
        Ok(element)
    }

    fn element_by_path_mut(
        &mut self,
        root: &str,
        path: &[usize],
    ) -> Result<&mut Element, ModelError> {
        let mut element = self
            .roots
            .get_mut(root)
            .ok_or_else(|| ModelError::NoSuchRoot(root.to_string()))?;
        for &offset in path {
            element = element.child_element_at_mut(offset)?;
        }
        Ok(element)
    }

    /// Applies one standalone operation as its own delta.
    pub fn apply_operation(&mut self, op: Operation) -> Result<(), ModelError> {
        self.apply_delta(Delta::new(vec![op]))
    }

    /// Applies a delta: every operation in order, as one history entry.
    pub fn apply_delta(&mut self, delta: Delta) -> Result<(), ModelError> {
        for op in &delta.ops {
            if op.base_version != self.version {
                return Err(ModelError::VersionMismatch {
                    expected: op.base_version,
                    actual: self.version,
                });
            }
            self.validate(&op.kind)?;
            let mut differ = std::mem::take(&mut self.differ);
            differ.buffer_operation(op, self);
            self.differ = differ;
            self.apply_kind(&op.kind)?;
            self.markers.rebase(&op.kind);
            self.version += 1;
            tracing::debug!(version = self.version, "applied operation");
        }
        self.history.add_delta(&delta);
        for (_, listener) in &self.listeners {
            listener(&delta);
        }
        Ok(())
    }

    /// Checks an operation against the current tree without mutating it, so
    /// application is all-or-nothing.
    fn validate(&self, kind: &OperationKind) -> Result<(), ModelError> {
        match kind {
            OperationKind::Insert { position, .. } => {
                let parent = self.element_by_path(position.root(), position.parent_path())?;
                if position.offset() > parent.offset_size() {
                    return Err(ModelError::OffsetOutOfBounds {
                        offset: position.offset(),
                        max: parent.offset_size(),
                    });
                }
                Ok(())
            }
            OperationKind::Rename {
                position, old_name, ..
            } => {
                let parent = self.element_by_path(position.root(), position.parent_path())?;
                let element = parent.child_element_at(position.offset())?;
                if element.name() != old_name {
                    return Err(ModelError::NameMismatch {
                        expected: old_name.clone(),
                        found: element.name().to_string(),
                    });
                }
                Ok(())
            }
            OperationKind::Attribute {
                range,
                key,
                old_value,
                ..
            } => {
                if !range.is_flat() {
                    return Err(ModelError::InvalidRange(
                        "attribute ranges must be flat".to_string(),
                    ));
                }
                let parent = self.element_by_path(range.start.root(), range.start.parent_path())?;
                let size = parent.offset_size();
                if range.end.offset() > size {
                    return Err(ModelError::OffsetOutOfBounds {
                        offset: range.end.offset(),
                        max: size,
                    });
                }
                let uniform = parent.range_attribute(
                    range.start.offset(),
                    range.how_many(),
                    key,
                )?;
                if uniform != old_value.as_ref() {
                    return Err(ModelError::AttributeMismatch { key: key.clone() });
                }
                Ok(())
            }
            OperationKind::Marker {
                name, old_range, ..
            } => {
                if self.markers.get(name) != old_range.as_ref() {
                    return Err(ModelError::MarkerMismatch(name.clone()));
                }
                Ok(())
            }
            OperationKind::NoOp => Ok(()),
            _ => {
                let view = kind.as_move().expect("remaining kinds are the move family");
                if view.how_many == 0 {
                    return Err(ModelError::InvalidRange(
                        "nothing to move".to_string(),
                    ));
                }
                let source_parent =
                    self.element_by_path(view.source.root(), view.source.parent_path())?;
                let size = source_parent.offset_size();
                if view.source.offset() + view.how_many > size {
                    return Err(ModelError::OffsetOutOfBounds {
                        offset: view.source.offset() + view.how_many,
                        max: size,
                    });
                }
                let adjusted = view
                    .target
                    .transformed_by_deletion(&view.source, view.how_many)
                    .ok_or_else(|| {
                        ModelError::InvalidPosition(
                            "move target lies inside the moved range".to_string(),
                        )
                    })?;
                let target_parent =
                    self.element_by_path(view.target.root(), view.target.parent_path())?;
                let mut limit = target_parent.offset_size();
                if view.target.has_same_parent(&view.source) {
                    limit -= view.how_many;
                }
                if adjusted.offset() > limit {
                    return Err(ModelError::OffsetOutOfBounds {
                        offset: adjusted.offset(),
                        max: limit,
                    });
                }
                Ok(())
            }
        }
    }

    fn apply_kind(&mut self, kind: &OperationKind) -> Result<(), ModelError> {
        match kind {
            OperationKind::Insert { position, nodes } => {
                let parent =
                    self.element_by_path_mut(position.root(), position.parent_path())?;
                parent.insert_at(position.offset(), nodes.clone())
            }
            OperationKind::Rename {
                position, new_name, ..
            } => {
                let parent =
                    self.element_by_path_mut(position.root(), position.parent_path())?;
                parent
                    .child_element_at_mut(position.offset())?
                    .set_name(new_name.clone());
                Ok(())
            }
            OperationKind::Attribute {
                range,
                key,
                old_value,
                new_value,
            } => {
                let parent =
                    self.element_by_path_mut(range.start.root(), range.start.parent_path())?;
                parent.set_attribute_range(
                    range.start.offset(),
                    range.how_many(),
                    key,
                    old_value.as_ref(),
                    new_value.as_ref(),
                )
            }
            OperationKind::Marker {
                name, new_range, ..
            } => {
                self.markers.set(name, new_range.clone());
                Ok(())
            }
            OperationKind::NoOp => Ok(()),
            _ => {
                let view = kind.as_move().expect("remaining kinds are the move family");
                let adjusted = view
                    .target
                    .transformed_by_deletion(&view.source, view.how_many)
                    .expect("validated before application");
                let source_parent =
                    self.element_by_path_mut(view.source.root(), view.source.parent_path())?;
                let nodes = source_parent.remove_range(view.source.offset(), view.how_many)?;
                let target_parent =
                    self.element_by_path_mut(adjusted.root(), adjusted.parent_path())?;
                target_parent.insert_at(adjusted.offset(), nodes)
            }
        }
    }

    // ------------------------------------------------------------------
    // Operation builders: stamp the current version and resolve values the
    // caller should not have to look up.
    // ------------------------------------------------------------------

    pub fn create_insert(&self, position: Position, nodes: Vec<Node>) -> Operation {
        Operation::new(self.version, OperationKind::Insert { position, nodes })
    }

    /// Remove = move to the next free graveyard offset.
    pub fn create_remove(&self, source: Position, how_many: usize) -> Operation {
        let graveyard_position = Position::new(GRAVEYARD_ROOT, vec![self.graveyard().offset_size()])
            .expect("graveyard position is valid");
        Operation::new(
            self.version,
            OperationKind::Remove {
                source,
                how_many,
                graveyard_position,
            },
        )
    }

    pub fn create_move(&self, source: Position, how_many: usize, target: Position) -> Operation {
        Operation::new(
            self.version,
            OperationKind::Move {
                source,
                how_many,
                target,
            },
        )
    }

    pub fn create_reinsert(
        &self,
        source: Position,
        how_many: usize,
        target: Position,
    ) -> Operation {
        Operation::new(
            self.version,
            OperationKind::Reinsert {
                source,
                how_many,
                target,
            },
        )
    }

    /// Reads the element's current name for the inverse.
    pub fn create_rename(
        &self,
        position: Position,
        new_name: impl Into<String>,
    ) -> Result<Operation, ModelError> {
        let parent = self.element_by_path(position.root(), position.parent_path())?;
        let element = parent.child_element_at(position.offset())?;
        Ok(Operation::new(
            self.version,
            OperationKind::Rename {
                position,
                old_name: element.name().to_string(),
                new_name: new_name.into(),
            },
        ))
    }

    /// Reads the uniform prior value of `key` over `range`; a heterogeneous
    /// range is the caller's bug, they are responsible for splitting it into
    /// runs of constant value first.
    pub fn create_attribute(
        &self,
        range: Range,
        key: impl Into<String>,
        new_value: Option<Value>,
    ) -> Result<Operation, ModelError> {
        if !range.is_flat() {
            return Err(ModelError::InvalidRange(
                "attribute ranges must be flat".to_string(),
            ));
        }
        let key = key.into();
        let parent = self.element_by_path(range.start.root(), range.start.parent_path())?;
        let old_value = parent
            .range_attribute(range.start.offset(), range.how_many(), &key)?
            .cloned();
        Ok(Operation::new(
            self.version,
            OperationKind::Attribute {
                range,
                key,
                old_value,
                new_value,
            },
        ))
    }

    pub fn create_marker_set(&self, name: impl Into<String>, range: Range) -> Operation {
        let name = name.into();
        Operation::new(
            self.version,
            OperationKind::Marker {
                old_range: self.markers.get(&name).cloned(),
                new_range: Some(range),
                name,
            },
        )
    }

    pub fn create_marker_remove(&self, name: impl Into<String>) -> Operation {
        let name = name.into();
        Operation::new(
            self.version,
            OperationKind::Marker {
                old_range: self.markers.get(&name).cloned(),
                new_range: None,
                name,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Text;
    use serde_json::json;

    fn pos(path: Vec<usize>) -> Position {
        Position::new(MAIN_ROOT, path).unwrap()
    }

    #[test]
    fn insert_then_insert_builds_foobar_at_version_two() {
        let mut doc = Document::new();
        let op = doc.create_insert(pos(vec![0]), vec![Text::new("foo").into()]);
        doc.apply_operation(op).unwrap();
        let op = doc.create_insert(pos(vec![3]), vec![Text::new("bar").into()]);
        doc.apply_operation(op).unwrap();

        assert_eq!(doc.root(MAIN_ROOT).unwrap().text(), "foobar");
        assert_eq!(doc.version(), 2);
    }

    #[test]
    fn version_mismatch_is_fatal() {
        let mut doc = Document::new();
        let op = Operation::new(
            5,
            OperationKind::Insert {
                position: pos(vec![0]),
                nodes: vec![Text::new("x").into()],
            },
        );
        let err = doc.apply_operation(op).unwrap_err();
        assert_eq!(
            err,
            ModelError::VersionMismatch {
                expected: 5,
                actual: 0
            }
        );
        // Nothing was applied.
        assert_eq!(doc.version(), 0);
        assert!(doc.root(MAIN_ROOT).unwrap().is_empty());
    }

    #[test]
    fn remove_moves_content_to_the_graveyard() {
        let mut doc = Document::new();
        let op = doc.create_insert(pos(vec![0]), vec![Text::new("abcd").into()]);
        doc.apply_operation(op).unwrap();
        let op = doc.create_remove(pos(vec![1]), 2);
        doc.apply_operation(op).unwrap();

        assert_eq!(doc.root(MAIN_ROOT).unwrap().text(), "ad");
        assert_eq!(doc.graveyard().text(), "bc");

        // Reversing the removal restores both roots.
        let history_delta = doc.history().items_from(1).unwrap().next().unwrap();
        let inverse = history_delta.delta.reversed();
        doc.apply_delta(inverse).unwrap();
        assert_eq!(doc.root(MAIN_ROOT).unwrap().text(), "abcd");
        assert!(doc.graveyard().is_empty());
    }

    #[test]
    fn move_target_inside_moved_range_is_rejected() {
        let mut doc = Document::new();
        let paragraph = Element::new("paragraph").with_child(Text::new("x"));
        let op = doc.create_insert(pos(vec![0]), vec![paragraph.into()]);
        doc.apply_operation(op).unwrap();

        let op = doc.create_move(pos(vec![0]), 1, pos(vec![0, 0]));
        let err = doc.apply_operation(op).unwrap_err();
        assert!(matches!(err, ModelError::InvalidPosition(_)));
    }

    #[test]
    fn markers_follow_structural_changes() {
        let mut doc = Document::new();
        let op = doc.create_insert(pos(vec![0]), vec![Text::new("hello").into()]);
        doc.apply_operation(op).unwrap();

        let range = Range::new(pos(vec![1]), pos(vec![3])).unwrap();
        let op = doc.create_marker_set("comment", range.clone());
        doc.apply_operation(op).unwrap();
        assert_eq!(doc.markers().get("comment"), Some(&range));

        // Insert before the marker; it shifts right.
        let op = doc.create_insert(pos(vec![0]), vec![Text::new("xy").into()]);
        doc.apply_operation(op).unwrap();
        let shifted = doc.markers().get("comment").unwrap();
        assert_eq!(shifted.start.offset(), 3);
        assert_eq!(shifted.end.offset(), 5);
    }

    #[test]
    fn marker_mismatch_is_rejected() {
        let mut doc = Document::new();
        let op = doc.create_insert(pos(vec![0]), vec![Text::new("hello").into()]);
        doc.apply_operation(op).unwrap();
        let op = Operation::new(
            1,
            OperationKind::Marker {
                name: "ghost".to_string(),
                old_range: Some(Range::new(pos(vec![0]), pos(vec![1])).unwrap()),
                new_range: None,
            },
        );
        assert!(matches!(
            doc.apply_operation(op),
            Err(ModelError::MarkerMismatch(_))
        ));
    }

    #[test]
    fn listeners_observe_applied_deltas() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let mut doc = Document::new();
        let seen = Rc::new(RefCell::new(0usize));
        let seen_in_listener = Rc::clone(&seen);
        let id = doc.on_change(move |delta| {
            *seen_in_listener.borrow_mut() += delta.len();
        });

        let op = doc.create_insert(pos(vec![0]), vec![Text::new("a").into()]);
        doc.apply_operation(op).unwrap();
        assert_eq!(*seen.borrow(), 1);

        doc.unsubscribe(id);
        let op = doc.create_insert(pos(vec![1]), vec![Text::new("b").into()]);
        doc.apply_operation(op).unwrap();
        assert_eq!(*seen.borrow(), 1);
    }

    #[test]
    fn attribute_builder_reads_the_uniform_old_value() {
        let mut doc = Document::new();
        let op = doc.create_insert(
            pos(vec![0]),
            vec![Text::new("abc").with_attr("bold", true).into()],
        );
        doc.apply_operation(op).unwrap();

        let range = Range::new(pos(vec![0]), pos(vec![3])).unwrap();
        let op = doc.create_attribute(range, "bold", None).unwrap();
        let OperationKind::Attribute { old_value, .. } = &op.kind else {
            panic!()
        };
        assert_eq!(old_value, &Some(json!(true)));
        doc.apply_operation(op).unwrap();
        assert!(doc.root(MAIN_ROOT).unwrap().children()[0]
            .attrs()
            .get("bold")
            .is_none());
    }
}
