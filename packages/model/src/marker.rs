//! Named tracked ranges: comments, highlights, collaborative carets.
//!
//! Markers change only through marker operations, so their history and
//! transform behavior is exactly that of content edits. Independently of
//! that, every structural operation rebases the stored ranges so a marker
//! keeps spanning the content it was attached to: content inserted inside a
//! marker widens it, moved content carries markers along, and a marker
//! endpoint caught in a removal clamps to the gap the removal left.

use std::collections::BTreeMap;

use crate::operation::OperationKind;
use crate::position::Position;
use crate::range::Range;

/// Lookup table of all markers of one document.
#[derive(Debug, Default)]
pub struct MarkerCollection {
    markers: BTreeMap<String, Range>,
}

impl MarkerCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Range> {
        self.markers.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Range)> {
        self.markers.iter().map(|(name, range)| (name.as_str(), range))
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub(crate) fn set(&mut self, name: &str, range: Option<Range>) {
        match range {
            Some(range) => {
                self.markers.insert(name.to_string(), range);
            }
            None => {
                self.markers.remove(name);
            }
        }
    }

    /// Rebases every stored range past a structural operation.
    pub(crate) fn rebase(&mut self, kind: &OperationKind) {
        match kind {
            OperationKind::Insert { position, nodes } => {
                let how_many: usize = nodes.iter().map(crate::node::Node::offset_size).sum();
                for range in self.markers.values_mut() {
                    *range = rebase_by_insertion(range, position, how_many);
                }
            }
            _ => {
                if let Some(view) = kind.as_move() {
                    for range in self.markers.values_mut() {
                        *range = rebase_by_move(range, &view.source, &view.target, view.how_many);
                    }
                }
            }
        }
    }
}

/// Marker flavor of range rebasing: always a single range, growing over
/// content inserted strictly inside it.
pub(crate) fn rebase_by_insertion(range: &Range, at: &Position, how_many: usize) -> Range {
    Range {
        start: range.start.transformed_by_insertion(at, how_many, true),
        end: range.end.transformed_by_insertion(at, how_many, false),
    }
}

/// Marker flavor of move rebasing: endpoints follow moved content; when only
/// one endpoint would follow, the marker collapses to the removal gap.
pub(crate) fn rebase_by_move(
    range: &Range,
    source: &Position,
    target: &Position,
    how_many: usize,
) -> Range {
    let adjusted_target = target
        .transformed_by_deletion(source, how_many)
        .unwrap_or_else(|| target.clone());
    let start = range.start.transformed_by_deletion(source, how_many);
    let end = range.end.transformed_by_deletion(source, how_many);
    match (start, end) {
        (Some(start), Some(end)) => Range {
            start: start.transformed_by_insertion(&adjusted_target, how_many, true),
            end: end.transformed_by_insertion(&adjusted_target, how_many, false),
        },
        (None, None) => Range {
            start: range.start.combined_with(source, &adjusted_target),
            end: range.end.combined_with(source, &adjusted_target),
        },
        (Some(start), None) => {
            // The tail followed the content away; clamp to the removal gap.
            Range {
                start: start.transformed_by_insertion(&adjusted_target, how_many, true),
                end: source.transformed_by_insertion(&adjusted_target, how_many, false),
            }
        }
        (None, Some(end)) => {
            Range {
                start: source.transformed_by_insertion(&adjusted_target, how_many, true),
                end: end.transformed_by_insertion(&adjusted_target, how_many, false),
            }
        }
    }
}
