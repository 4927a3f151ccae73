//! Ranges between two positions.

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::position::{CompareResult, Position};

/// A span of content between `start` and `end`, both in the same root and
/// with `start <= end`. Immutable like [`Position`].
///
/// A range is *flat* when both endpoints share a parent; attribute
/// operations only ever carry flat ranges, marker ranges may be arbitrary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Result<Self, ModelError> {
        match start.compare(&end) {
            CompareResult::Different => Err(ModelError::InvalidRange(
                "range endpoints must share a root".to_string(),
            )),
            CompareResult::After => Err(ModelError::InvalidRange(
                "range start must not be after its end".to_string(),
            )),
            _ => Ok(Self { start, end }),
        }
    }

    /// Flat range covering `how_many` offsets after `start`.
    pub fn from_position_and_shift(start: Position, how_many: usize) -> Self {
        let end = start.shifted_by(how_many);
        Self { start, end }
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }

    pub fn is_flat(&self) -> bool {
        self.start.has_same_parent(&self.end)
    }

    /// Offset span of a flat range.
    pub fn how_many(&self) -> usize {
        debug_assert!(self.is_flat());
        self.end.offset() - self.start.offset()
    }

    /// True when `position` lies strictly inside this range.
    pub fn contains_position(&self, position: &Position) -> bool {
        self.start.is_before(position) && position.is_before(&self.end)
    }

    pub fn contains_range(&self, other: &Range) -> bool {
        !matches!(
            self.start.compare(&other.start),
            CompareResult::After | CompareResult::Different
        ) && !matches!(
            self.end.compare(&other.end),
            CompareResult::Before | CompareResult::Different
        )
    }

    /// Intersection of two flat ranges with a common parent. Ranges in
    /// different parents never target the same nodes, so anything else is
    /// reported as no intersection.
    pub fn intersection(&self, other: &Range) -> Option<Range> {
        if !self.is_flat() || !other.is_flat() || !self.start.has_same_parent(&other.start) {
            return None;
        }
        let start = self.start.offset().max(other.start.offset());
        let end = self.end.offset().min(other.end.offset());
        if start >= end {
            return None;
        }
        Some(Range {
            start: self.start.with_offset(start),
            end: self.start.with_offset(end),
        })
    }

    /// Parts of this flat range not covered by `other` (zero, one or two
    /// pieces). For ranges without a common parent the whole range is
    /// returned untouched.
    pub fn difference(&self, other: &Range) -> Vec<Range> {
        if self.intersection(other).is_none() {
            return vec![self.clone()];
        }
        let mut pieces = Vec::new();
        if self.start.offset() < other.start.offset() {
            pieces.push(Range {
                start: self.start.clone(),
                end: self.start.with_offset(other.start.offset()),
            });
        }
        if self.end.offset() > other.end.offset() {
            pieces.push(Range {
                start: self.start.with_offset(other.end.offset()),
                end: self.end.clone(),
            });
        }
        pieces
    }

    /// Rebases this range past an insertion. With `spread` an insertion
    /// strictly inside a flat range splits it in two, leaving the inserted
    /// content uncovered; without it the range stretches over the new
    /// content. Either way a returned piece never collapses to nothing.
    pub fn transformed_by_insertion(
        &self,
        at: &Position,
        how_many: usize,
        spread: bool,
    ) -> Vec<Range> {
        if spread
            && self.is_flat()
            && at.has_same_parent(&self.start)
            && self.start.offset() < at.offset()
            && at.offset() < self.end.offset()
        {
            return vec![
                Range {
                    start: self.start.clone(),
                    end: self.start.with_offset(at.offset()),
                },
                Range {
                    start: self.start.with_offset(at.offset() + how_many),
                    end: self.end.shifted_by(how_many),
                },
            ];
        }
        vec![Range {
            start: self.start.transformed_by_insertion(at, how_many, true),
            end: self.end.transformed_by_insertion(at, how_many, false),
        }]
    }

    /// Rebases a flat range past a move, splitting it at the move
    /// boundaries: surviving pieces stay (re-split around content moved into
    /// their middle), the part the move took follows it to the target.
    /// Collapsed pieces are dropped.
    pub fn transformed_by_move(
        &self,
        source: &Position,
        target: &Position,
        how_many: usize,
    ) -> Vec<Range> {
        let adjusted_target = target
            .transformed_by_deletion(source, how_many)
            .unwrap_or_else(|| target.clone());
        let moved = Range::from_position_and_shift(source.clone(), how_many);

        if self.is_flat()
            && self.start.has_same_parent(source)
            && self.intersection(&moved).is_some()
        {
            let mut out = Vec::new();
            for piece in self.difference(&moved) {
                // Shift past the removal, then split around the re-insertion.
                let removed_before = moved
                    .intersection(&Range {
                        start: piece.start.with_offset(0),
                        end: piece.start.clone(),
                    })
                    .map(|r| r.how_many())
                    .unwrap_or(0);
                let shifted = Range {
                    start: piece.start.with_offset(piece.start.offset() - removed_before),
                    end: piece.end.with_offset(piece.end.offset() - removed_before),
                };
                out.extend(shifted.transformed_by_insertion(&adjusted_target, how_many, true));
            }
            if let Some(common) = self.intersection(&moved) {
                let start = common.start.combined_with(source, &adjusted_target);
                out.push(Range::from_position_and_shift(start, common.how_many()));
            }
            out.retain(|r| !r.is_collapsed());
            return out;
        }

        let start = self.start.transformed_by_deletion(source, how_many);
        let end = self.end.transformed_by_deletion(source, how_many);
        match (start, end) {
            (Some(start), Some(end)) => {
                Range { start, end }.transformed_by_insertion(&adjusted_target, how_many, true)
            }
            (None, None) => {
                // The whole range sat inside the moved content; follow it.
                // Combined positions are already in post-move coordinates.
                vec![Range {
                    start: self.start.combined_with(source, &adjusted_target),
                    end: self.end.combined_with(source, &adjusted_target),
                }]
            }
            // One endpoint followed the content away; collapse the range to
            // the gap the move left behind.
            (Some(gap), None) | (None, Some(gap)) => {
                let gap = gap.transformed_by_insertion(&adjusted_target, how_many, true);
                vec![Range {
                    start: gap.clone(),
                    end: gap,
                }]
            }
        }
    }
}
