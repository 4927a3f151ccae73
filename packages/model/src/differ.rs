//! Change buffering and diff computation for re-rendering.
//!
//! Before each operation applies, the differ snapshots the children of every
//! element the operation is about to touch. After the change session, each
//! snapshot is diffed against the element's current children: text runs are
//! exploded into per-grapheme tokens carrying their attributes, so character
//! level attribute changes are detectable. Raw insert+delete pairs covering
//! the same characters are reclassified as attribute changes by re-diffing
//! the ambiguous run without attribute sensitivity. This reclassification is
//! deliberately best effort: repeated identical characters adjacent to the
//! changed run can keep a change reported as insert plus remove, and that
//! output is part of the contract.

use serde::Serialize;
use serde_json::Value;

use crate::document::Document;
use crate::node::{Attributes, Element, Node};
use crate::operation::{Operation, OperationKind};
use crate::position::{Position, GRAVEYARD_ROOT};
use crate::range::Range;
use crate::transform::{
    node_position_transformed_by_insertion, node_position_transformed_by_move,
};

/// One entry of the render diff: the sole contract the rendering layer
/// consumes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum DiffItem {
    Insert {
        position: Position,
        /// Element name, or `None` for text.
        name: Option<String>,
        length: usize,
    },
    Remove {
        position: Position,
        name: Option<String>,
        length: usize,
    },
    Attribute {
        range: Range,
        key: String,
        old_value: Option<Value>,
        new_value: Option<Value>,
    },
}

/// Per-change-session buffer of element snapshots.
#[derive(Debug, Default)]
pub struct Differ {
    entries: Vec<BufferedElement>,
}

#[derive(Debug)]
struct BufferedElement {
    root: String,
    /// Path of the element, kept current as further operations are buffered.
    path: Vec<usize>,
    tokens: Vec<ChildToken>,
    order: usize,
}

/// One offset of an element's content: a child element (snapshotted whole,
/// so two siblings with different content stay distinguishable) or a single
/// grapheme.
#[derive(Debug, Clone, PartialEq)]
enum ChildToken {
    Element { element: Element },
    Symbol { glyph: String, attrs: Attributes },
}

impl ChildToken {
    fn attrs(&self) -> &Attributes {
        match self {
            ChildToken::Element { element } => element.attrs(),
            ChildToken::Symbol { attrs, .. } => attrs,
        }
    }

    /// Equality ignoring attributes, used by the reclassification re-diff.
    fn same_content(&self, other: &ChildToken) -> bool {
        match (self, other) {
            (ChildToken::Element { element: a }, ChildToken::Element { element: b }) => {
                a.name() == b.name() && a.children() == b.children()
            }
            (ChildToken::Symbol { glyph: a, .. }, ChildToken::Symbol { glyph: b, .. }) => a == b,
            _ => false,
        }
    }
}

fn tokens_of(element: &Element) -> Vec<ChildToken> {
    let mut tokens = Vec::new();
    for child in element.children() {
        match child {
            Node::Element(el) => tokens.push(ChildToken::Element {
                element: el.clone(),
            }),
            Node::Text(text) => {
                for glyph in text.symbols() {
                    tokens.push(ChildToken::Symbol {
                        glyph: glyph.to_string(),
                        attrs: text.attrs().clone(),
                    });
                }
            }
        }
    }
    tokens
}

impl Differ {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_changes(&self) -> bool {
        !self.entries.is_empty()
    }

    /// Discards the buffer; the next change session starts clean.
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    /// Snapshots every element `op` is about to touch. Must be called right
    /// before the operation applies.
    pub(crate) fn buffer_operation(&mut self, op: &Operation, doc: &Document) {
        for (root, path) in touched_parents(&op.kind) {
            if root == GRAVEYARD_ROOT {
                continue;
            }
            if self
                .entries
                .iter()
                .any(|e| e.root == root && e.path == path)
            {
                continue;
            }
            let Ok(element) = doc.element_by_path(&root, &path) else {
                continue;
            };
            self.entries.push(BufferedElement {
                tokens: tokens_of(element),
                order: self.entries.len(),
                root,
                path,
            });
        }
        self.rebase_paths(&op.kind);
        tracing::trace!(buffered = self.entries.len(), "buffered operation");
    }

    /// Keeps entry paths valid across the operation that is about to apply.
    fn rebase_paths(&mut self, kind: &OperationKind) {
        let rebase: Box<dyn Fn(&Position) -> Position> = match kind {
            OperationKind::Insert { position, nodes } => {
                let n: usize = nodes.iter().map(Node::offset_size).sum();
                let at = position.clone();
                Box::new(move |p| node_position_transformed_by_insertion(p, &at, n))
            }
            _ => match kind.as_move() {
                Some(view) => Box::new(move |p| {
                    node_position_transformed_by_move(p, &view.source, &view.target, view.how_many)
                }),
                None => return,
            },
        };
        for entry in &mut self.entries {
            if entry.path.is_empty() {
                // Roots never move.
                continue;
            }
            let position = Position::new(entry.root.clone(), entry.path.clone())
                .expect("buffered paths are non-empty here");
            let moved = rebase(&position);
            entry.root = moved.root().to_string();
            entry.path = moved.path().to_vec();
        }
    }

    /// Computes the diff between the buffered snapshots and the current
    /// tree. Pure: calling it twice without further buffering returns the
    /// same items; an empty buffer yields an empty list.
    pub fn changes(&self, doc: &Document) -> Vec<DiffItem> {
        let mut collected: Vec<(DiffItem, usize, usize)> = Vec::new();
        for entry in &self.entries {
            if entry.root == GRAVEYARD_ROOT {
                // The element itself was removed; the removal is reported by
                // its old parent.
                continue;
            }
            let Ok(element) = doc.element_by_path(&entry.root, &entry.path) else {
                continue;
            };
            let current = tokens_of(element);
            let actions = refine(&entry.tokens, &current);
            for (seq, item) in emit(entry, &actions).into_iter().enumerate() {
                collected.push((item, entry.order, seq));
            }
        }

        collected.sort_by(|(a, ao, aseq), (b, bo, bseq)| {
            compare_item_positions(a, b)
                .then(ao.cmp(bo))
                .then(aseq.cmp(bseq))
        });

        let items: Vec<DiffItem> = collected.into_iter().map(|(item, _, _)| item).collect();
        let items = prune_contained(items);
        merge_adjacent(items)
    }
}

fn touched_parents(kind: &OperationKind) -> Vec<(String, Vec<usize>)> {
    let parent_of = |p: &Position| (p.root().to_string(), p.parent_path().to_vec());
    match kind {
        OperationKind::Insert { position, .. } => vec![parent_of(position)],
        OperationKind::Rename { position, .. } => vec![parent_of(position)],
        OperationKind::Attribute { range, .. } => vec![parent_of(&range.start)],
        _ => match kind.as_move() {
            Some(view) => vec![parent_of(&view.source), parent_of(&view.target)],
            None => Vec::new(),
        },
    }
}

#[derive(Debug)]
enum Action {
    Equal,
    Insert(ChildToken),
    Delete(ChildToken),
    AttrChange(ChildToken, ChildToken),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Step {
    Equal,
    Insert,
    Delete,
}

/// Two-sequence diff: one step per token, insertions preferred over
/// deletions on ties so reordered content reads as insert-then-remove.
fn diff<T, F: Fn(&T, &T) -> bool>(old: &[T], new: &[T], eq: F) -> Vec<Step> {
    let n = old.len();
    let m = new.len();
    // lcs[i][j] = longest common subsequence length of old[i..] and new[j..].
    let mut lcs = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if eq(&old[i], &new[j]) {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }
    let mut steps = Vec::with_capacity(n + m);
    let (mut i, mut j) = (0, 0);
    while i < n || j < m {
        if i < n && j < m && eq(&old[i], &new[j]) {
            steps.push(Step::Equal);
            i += 1;
            j += 1;
        } else if j < m && (i == n || lcs[i][j + 1] >= lcs[i + 1][j]) {
            steps.push(Step::Insert);
            j += 1;
        } else {
            steps.push(Step::Delete);
            i += 1;
        }
    }
    steps
}

/// Runs the attribute-sensitive diff, then reclassifies adjacent
/// insert+delete blocks whose content matches (ignoring attributes) into
/// attribute changes.
fn refine(old: &[ChildToken], new: &[ChildToken]) -> Vec<Action> {
    let steps = diff(old, new, |a: &ChildToken, b: &ChildToken| a == b);

    // Group into blocks of consecutive identical steps, tracking the token
    // slices they cover.
    let mut actions = Vec::new();
    let (mut i, mut j) = (0usize, 0usize);
    let mut k = 0;
    while k < steps.len() {
        match steps[k] {
            Step::Equal => {
                actions.push(Action::Equal);
                i += 1;
                j += 1;
                k += 1;
            }
            Step::Insert | Step::Delete => {
                // Collect the full mixed insert/delete block.
                let mut inserted = Vec::new();
                let mut deleted = Vec::new();
                while k < steps.len() && steps[k] != Step::Equal {
                    match steps[k] {
                        Step::Insert => {
                            inserted.push(new[j].clone());
                            j += 1;
                        }
                        Step::Delete => {
                            deleted.push(old[i].clone());
                            i += 1;
                        }
                        Step::Equal => unreachable!(),
                    }
                    k += 1;
                }
                actions.extend(reclassify(deleted, inserted));
            }
        }
    }
    actions
}

/// Re-diffs a deleted/inserted block pair without attribute sensitivity;
/// aligned tokens become attribute changes.
fn reclassify(deleted: Vec<ChildToken>, inserted: Vec<ChildToken>) -> Vec<Action> {
    if deleted.is_empty() || inserted.is_empty() {
        let mut out: Vec<Action> = inserted.into_iter().map(Action::Insert).collect();
        out.extend(deleted.into_iter().map(Action::Delete));
        return out;
    }
    let steps = diff(&deleted, &inserted, |a: &ChildToken, b: &ChildToken| {
        a.same_content(b)
    });
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    for step in steps {
        match step {
            Step::Equal => {
                if deleted[i].attrs() == inserted[j].attrs() {
                    // Same content, same attributes: the raw diff only saw a
                    // difference because of reordering inside the block.
                    out.push(Action::Equal);
                } else {
                    out.push(Action::AttrChange(deleted[i].clone(), inserted[j].clone()));
                }
                i += 1;
                j += 1;
            }
            Step::Insert => {
                out.push(Action::Insert(inserted[j].clone()));
                j += 1;
            }
            Step::Delete => {
                out.push(Action::Delete(deleted[i].clone()));
                i += 1;
            }
        }
    }
    out
}

fn item_position(entry: &BufferedElement, offset: usize) -> Position {
    let mut path = entry.path.clone();
    path.push(offset);
    Position::new(entry.root.clone(), path).expect("path with offset is non-empty")
}

fn token_name(token: &ChildToken) -> Option<String> {
    match token {
        ChildToken::Element { element } => Some(element.name().to_string()),
        ChildToken::Symbol { .. } => None,
    }
}

/// Walks refined actions, assigning post-state offsets: insertions and
/// matches advance the cursor, removals are reported at the offset where
/// the content used to be.
fn emit(entry: &BufferedElement, actions: &[Action]) -> Vec<DiffItem> {
    let mut items = Vec::new();
    let mut offset = 0usize;
    for action in actions {
        match action {
            Action::Equal => offset += 1,
            Action::Insert(token) => {
                items.push(DiffItem::Insert {
                    position: item_position(entry, offset),
                    name: token_name(token),
                    length: 1,
                });
                offset += 1;
            }
            Action::Delete(token) => {
                items.push(DiffItem::Remove {
                    position: item_position(entry, offset),
                    name: token_name(token),
                    length: 1,
                });
            }
            Action::AttrChange(old_token, new_token) => {
                let mut keys: Vec<&String> = old_token
                    .attrs()
                    .keys()
                    .chain(new_token.attrs().keys())
                    .collect();
                keys.sort();
                keys.dedup();
                for key in keys {
                    let old_value = old_token.attrs().get(key).cloned();
                    let new_value = new_token.attrs().get(key).cloned();
                    if old_value == new_value {
                        continue;
                    }
                    let start = item_position(entry, offset);
                    items.push(DiffItem::Attribute {
                        range: Range::from_position_and_shift(start, 1),
                        key: key.clone(),
                        old_value,
                        new_value,
                    });
                }
                offset += 1;
            }
        }
    }
    items
}

fn item_sort_position(item: &DiffItem) -> &Position {
    match item {
        DiffItem::Insert { position, .. } | DiffItem::Remove { position, .. } => position,
        DiffItem::Attribute { range, .. } => &range.start,
    }
}

fn compare_item_positions(a: &DiffItem, b: &DiffItem) -> std::cmp::Ordering {
    let pa = item_sort_position(a);
    let pb = item_sort_position(b);
    pa.root()
        .cmp(pb.root())
        .then_with(|| pa.path().cmp(pb.path()))
}

/// Drops items lying strictly inside the span of an insert item: reporting
/// the outer insertion subsumes every change within the new content.
fn prune_contained(items: Vec<DiffItem>) -> Vec<DiffItem> {
    let spans: Vec<(String, Vec<usize>, usize, usize)> = items
        .iter()
        .filter_map(|item| match item {
            DiffItem::Insert {
                position, length, ..
            } => Some((
                position.root().to_string(),
                position.parent_path().to_vec(),
                position.offset(),
                *length,
            )),
            _ => None,
        })
        .collect();
    items
        .into_iter()
        .filter(|item| {
            let pos = item_sort_position(item);
            !spans.iter().any(|(root, parent, offset, length)| {
                pos.root() == root
                    && pos.path().len() > parent.len() + 1
                    && pos.path().starts_with(parent)
                    && (*offset..offset + length).contains(&pos.path()[parent.len()])
            })
        })
        .collect()
}

/// Merges adjacent compatible items: contiguous text inserts, removals at
/// the same gap, and attribute items with identical values over contiguous
/// ranges.
fn merge_adjacent(items: Vec<DiffItem>) -> Vec<DiffItem> {
    let mut out: Vec<DiffItem> = Vec::new();
    for item in items {
        if let Some(last) = out.last_mut() {
            match (last, &item) {
                (
                    DiffItem::Insert {
                        position: last_pos,
                        name: None,
                        length: last_len,
                    },
                    DiffItem::Insert {
                        position,
                        name: None,
                        length,
                    },
                ) if position.has_same_parent(last_pos)
                    && position.offset() == last_pos.offset() + *last_len =>
                {
                    *last_len += length;
                    continue;
                }
                (
                    DiffItem::Remove {
                        position: last_pos,
                        name: None,
                        length: last_len,
                    },
                    DiffItem::Remove {
                        position,
                        name: None,
                        length,
                    },
                ) if position == last_pos => {
                    *last_len += length;
                    continue;
                }
                (
                    DiffItem::Attribute {
                        range: last_range,
                        key: last_key,
                        old_value: last_old,
                        new_value: last_new,
                    },
                    DiffItem::Attribute {
                        range,
                        key,
                        old_value,
                        new_value,
                    },
                ) if key == last_key
                    && old_value == last_old
                    && new_value == last_new
                    && range.start == last_range.end =>
                {
                    last_range.end = range.end.clone();
                    continue;
                }
                _ => {}
            }
        }
        out.push(item);
    }
    out
}
