//! Operational transformation.
//!
//! `transform(a, b, a_is_important)` rebases `a` so it can apply right after
//! `b`, assuming both were valid against the same document version. The
//! result may be several operations (a range split by a move) or collapse to
//! a single no-op (a conflict the other side already settled).
//!
//! The importance flag is the tie-breaker for conflicting pairs; peers must
//! pass complementary values for the same pair so both derive the same
//! winner. Per pair family:
//!
//! - Insert vs Insert at the same spot: the important side's content ends up
//!   first.
//! - Attribute vs Attribute on the same key: the important side yields on
//!   the intersection (possibly to a no-op); the other side re-asserts its
//!   value there with a corrected old value.
//! - Move vs Move over the same nodes: the important side wins and re-moves
//!   them; the other side yields. Mutually nested targets reverse the less
//!   important move outright.
//!
//! Transforming anything against a no-op returns the operation unchanged;
//! transforming a no-op returns a no-op.

use crate::delta::Delta;
use crate::marker;
use crate::node::Node;
use crate::operation::{MoveView, Operation, OperationKind};
use crate::position::Position;

/// Rebases `a` to apply immediately after `b`. Both operations must have
/// been valid against the same document version. Returned operations are
/// numbered to apply consecutively after `b`.
pub fn transform(a: &Operation, b: &Operation, a_is_important: bool) -> Vec<Operation> {
    transform_kind(&a.kind, &b.kind, a_is_important)
        .into_iter()
        .enumerate()
        .map(|(i, kind)| Operation::new(b.base_version + 1 + i as u64, kind))
        .collect()
}

fn nodes_size(nodes: &[Node]) -> usize {
    nodes.iter().map(Node::offset_size).sum()
}

fn transform_kind(a: &OperationKind, b: &OperationKind, imp: bool) -> Vec<OperationKind> {
    use OperationKind::*;

    if matches!(a, NoOp) {
        return vec![NoOp];
    }
    if matches!(b, NoOp) {
        return vec![a.clone()];
    }

    match (a, b) {
        (Insert { position, nodes }, Insert { position: at, nodes: b_nodes }) => {
            vec![Insert {
                position: position.transformed_by_insertion(at, nodes_size(b_nodes), !imp),
                nodes: nodes.clone(),
            }]
        }
        (Insert { position, nodes }, _) if b.as_move().is_some() => {
            let v = b.as_move().expect("checked by guard");
            vec![Insert {
                position: position.transformed_by_move(&v.source, &v.target, v.how_many, !imp),
                nodes: nodes.clone(),
            }]
        }
        (Insert { .. }, _) => vec![a.clone()],

        (
            Attribute { range, key, old_value, new_value },
            Attribute { range: b_range, key: b_key, new_value: b_new, .. },
        ) => {
            if key != b_key {
                return vec![a.clone()];
            }
            let Some(common) = range.intersection(b_range) else {
                return vec![a.clone()];
            };
            let mut out: Vec<OperationKind> = range
                .difference(b_range)
                .into_iter()
                .map(|piece| Attribute {
                    range: piece,
                    key: key.clone(),
                    old_value: old_value.clone(),
                    new_value: new_value.clone(),
                })
                .collect();
            // The less important side re-asserts its value over the part the
            // other operation already changed; setting the same value twice
            // collapses silently.
            if !imp && new_value != b_new {
                out.push(Attribute {
                    range: common,
                    key: key.clone(),
                    old_value: b_new.clone(),
                    new_value: new_value.clone(),
                });
            }
            if out.is_empty() {
                vec![NoOp]
            } else {
                out
            }
        }
        (Attribute { range, key, old_value, new_value }, Insert { position, nodes }) => {
            range
                .transformed_by_insertion(position, nodes_size(nodes), true)
                .into_iter()
                .map(|piece| Attribute {
                    range: piece,
                    key: key.clone(),
                    old_value: old_value.clone(),
                    new_value: new_value.clone(),
                })
                .collect()
        }
        (Attribute { range, key, old_value, new_value }, _) if b.as_move().is_some() => {
            let v = b.as_move().expect("checked by guard");
            let out: Vec<OperationKind> = range
                .transformed_by_move(&v.source, &v.target, v.how_many)
                .into_iter()
                .map(|piece| Attribute {
                    range: piece,
                    key: key.clone(),
                    old_value: old_value.clone(),
                    new_value: new_value.clone(),
                })
                .collect();
            if out.is_empty() {
                vec![NoOp]
            } else {
                out
            }
        }
        (Attribute { .. }, _) => vec![a.clone()],

        (Rename { position, old_name, new_name }, Insert { position: at, nodes }) => {
            vec![Rename {
                position: position.transformed_by_insertion(at, nodes_size(nodes), true),
                old_name: old_name.clone(),
                new_name: new_name.clone(),
            }]
        }
        (Rename { position, old_name, new_name }, _) if b.as_move().is_some() => {
            let v = b.as_move().expect("checked by guard");
            vec![Rename {
                position: node_position_transformed_by_move(
                    position, &v.source, &v.target, v.how_many,
                ),
                old_name: old_name.clone(),
                new_name: new_name.clone(),
            }]
        }
        (
            Rename { position, new_name, .. },
            Rename { position: b_position, new_name: b_new, .. },
        ) => {
            if position != b_position {
                return vec![a.clone()];
            }
            if imp && new_name != b_new {
                vec![Rename {
                    position: position.clone(),
                    old_name: b_new.clone(),
                    new_name: new_name.clone(),
                }]
            } else {
                vec![NoOp]
            }
        }
        (Rename { .. }, _) => vec![a.clone()],

        (Marker { name, old_range, new_range }, Insert { position, nodes }) => {
            let n = nodes_size(nodes);
            vec![Marker {
                name: name.clone(),
                old_range: old_range
                    .as_ref()
                    .map(|r| marker::rebase_by_insertion(r, position, n)),
                new_range: new_range
                    .as_ref()
                    .map(|r| marker::rebase_by_insertion(r, position, n)),
            }]
        }
        (Marker { name, old_range, new_range }, _) if b.as_move().is_some() => {
            let v = b.as_move().expect("checked by guard");
            vec![Marker {
                name: name.clone(),
                old_range: old_range
                    .as_ref()
                    .map(|r| marker::rebase_by_move(r, &v.source, &v.target, v.how_many)),
                new_range: new_range
                    .as_ref()
                    .map(|r| marker::rebase_by_move(r, &v.source, &v.target, v.how_many)),
            }]
        }
        (
            Marker { name, new_range, .. },
            Marker { name: b_name, new_range: b_new, .. },
        ) => {
            if name != b_name {
                return vec![a.clone()];
            }
            if imp && new_range != b_new {
                vec![Marker {
                    name: name.clone(),
                    old_range: b_new.clone(),
                    new_range: new_range.clone(),
                }]
            } else {
                vec![NoOp]
            }
        }
        (Marker { .. }, _) => vec![a.clone()],

        (_, Insert { position, nodes }) if a.as_move().is_some() => {
            let va = a.as_move().expect("checked by guard");
            let n = nodes_size(nodes);
            let inside = position.has_same_parent(&va.source)
                && va.source.offset() < position.offset()
                && position.offset() < va.source.offset() + va.how_many;
            let (source, how_many) = if inside {
                // Content typed into the middle of the moved run travels
                // with it.
                (va.source.clone(), va.how_many + n)
            } else {
                (
                    va.source.transformed_by_insertion(position, n, true),
                    va.how_many,
                )
            };
            vec![a.with_move(MoveView {
                source,
                how_many,
                target: va.target.transformed_by_insertion(position, n, !imp),
            })]
        }
        (_, _) if a.as_move().is_some() && b.as_move().is_some() => {
            let va = a.as_move().expect("checked by guard");
            let vb = b.as_move().expect("checked by guard");
            transform_move_move(a, va, b, vb, imp)
        }
        (_, _) if a.as_move().is_some() => vec![a.clone()],

        _ => vec![a.clone()],
    }
}

/// The move family against itself: the richest transform. Overlapping
/// ranges decompose into surviving difference pieces plus the common part
/// the other move already relocated; the common part is re-moved only by
/// the important side.
fn transform_move_move(
    a_kind: &OperationKind,
    va: MoveView,
    b_kind: &OperationKind,
    vb: MoveView,
    imp: bool,
) -> Vec<OperationKind> {
    if va == vb {
        // The other side already performed exactly this move.
        return vec![OperationKind::NoOp];
    }

    let a_target_in_b = va
        .target
        .transformed_by_deletion(&vb.source, vb.how_many)
        .is_none();
    let b_target_in_a = vb
        .target
        .transformed_by_deletion(&va.source, va.how_many)
        .is_none();
    if a_target_in_b && b_target_in_a {
        // Each move targets the inside of the range the other is moving; no
        // order of the two can satisfy both. The less important move ends up
        // reversed: the winner's transform first undoes the loser, then
        // applies cleanly against the restored tree.
        return if imp {
            vec![b_kind.reversed(), a_kind.clone()]
        } else {
            vec![OperationKind::NoOp]
        };
    }

    let adj_b_target = vb
        .target
        .transformed_by_deletion(&vb.source, vb.how_many)
        .unwrap_or_else(|| vb.target.clone());
    let new_target = va
        .target
        .transformed_by_move(&vb.source, &vb.target, vb.how_many, !imp);

    let same_parent = va.source.has_same_parent(&vb.source);
    let (a0, a1) = (va.source.offset(), va.source.offset() + va.how_many);
    let (b0, b1) = (vb.source.offset(), vb.source.offset() + vb.how_many);
    let overlap = same_parent && a0 < b1 && b0 < a1;

    if !overlap {
        let rebased = match va.source.transformed_by_deletion(&vb.source, vb.how_many) {
            None => {
                // The whole range sits inside a node `b` relocated; follow it.
                MoveView {
                    source: va.source.combined_with(&vb.source, &adj_b_target),
                    how_many: va.how_many,
                    target: new_target,
                }
            }
            Some(shifted) => {
                let swallowed = adj_b_target.has_same_parent(&shifted)
                    && shifted.offset() < adj_b_target.offset()
                    && adj_b_target.offset() < shifted.offset() + va.how_many;
                if swallowed {
                    // `b` dropped content into the middle of the moved run;
                    // it travels along.
                    MoveView {
                        source: shifted,
                        how_many: va.how_many + vb.how_many,
                        target: new_target,
                    }
                } else {
                    MoveView {
                        source: shifted.transformed_by_insertion(&adj_b_target, vb.how_many, true),
                        how_many: va.how_many,
                        target: new_target,
                    }
                }
            }
        };
        return vec![a_kind.with_move(rebased)];
    }

    // Same-parent overlap: left difference, common part, right difference.
    struct Piece {
        start_off: usize,
        len: usize,
        common: bool,
    }
    let mut pieces = Vec::new();
    if a0 < b0 {
        pieces.push(Piece {
            start_off: a0,
            len: b0 - a0,
            common: false,
        });
    }
    let (c0, c1) = (a0.max(b0), a1.min(b1));
    if imp && c1 > c0 {
        pieces.push(Piece {
            start_off: c0,
            len: c1 - c0,
            common: true,
        });
    }
    if a1 > b1 {
        pieces.push(Piece {
            start_off: b1,
            len: a1 - b1,
            common: false,
        });
    }
    if pieces.is_empty() {
        return vec![OperationKind::NoOp];
    }

    // Express every piece as a move valid right after `b`, then chain them:
    // each subsequent piece is rebased past the pieces emitted before it.
    let mut chained: Vec<MoveView> = Vec::new();
    for piece in pieces {
        let start = va.source.with_offset(piece.start_off);
        let (source, how_many) = if piece.common {
            (
                start.combined_with(&vb.source, &adj_b_target),
                piece.len,
            )
        } else {
            let shifted = start
                .transformed_by_deletion(&vb.source, vb.how_many)
                .expect("difference pieces survive the removal");
            let swallowed = adj_b_target.has_same_parent(&shifted)
                && shifted.offset() < adj_b_target.offset()
                && adj_b_target.offset() < shifted.offset() + piece.len;
            if swallowed {
                (shifted, piece.len + vb.how_many)
            } else {
                (
                    shifted.transformed_by_insertion(&adj_b_target, vb.how_many, true),
                    piece.len,
                )
            }
        };
        let mut view = MoveView {
            source,
            how_many,
            target: new_target.clone(),
        };
        for prev in &chained {
            view.source =
                view.source
                    .transformed_by_move(&prev.source, &prev.target, prev.how_many, true);
            view.target =
                view.target
                    .transformed_by_move(&prev.source, &prev.target, prev.how_many, true);
        }
        chained.push(view);
    }
    chained
        .into_iter()
        .map(|view| a_kind.with_move(view))
        .collect()
}

/// Rebases the address of a tree node (not a boundary between nodes) past a
/// move: a node caught in the moved range keeps being addressed at its new
/// location.
pub(crate) fn node_position_transformed_by_move(
    position: &Position,
    source: &Position,
    target: &Position,
    how_many: usize,
) -> Position {
    let mut extended = position.path().to_vec();
    extended.push(0);
    let inside = Position::new(position.root(), extended).expect("extended path is non-empty");
    let moved = inside.transformed_by_move(source, target, how_many, true);
    let mut path = moved.path().to_vec();
    path.pop();
    Position::new(moved.root(), path).expect("node path keeps at least one component")
}

/// Insertion flavor of [`node_position_transformed_by_move`].
pub(crate) fn node_position_transformed_by_insertion(
    position: &Position,
    at: &Position,
    how_many: usize,
) -> Position {
    position.transformed_by_insertion(at, how_many, true)
}

/// Rebases two consecutive operation sequences, both valid against the same
/// starting state, against each other. Returns `(xs', ys')` where `xs'`
/// applies after all of `ys` and `ys'` after all of `xs`.
fn transform_ops(
    xs: &[Operation],
    ys: &[Operation],
    x_important: bool,
) -> (Vec<Operation>, Vec<Operation>) {
    if xs.is_empty() {
        return (Vec::new(), ys.to_vec());
    }
    if ys.is_empty() {
        return (xs.to_vec(), Vec::new());
    }
    if xs.len() == 1 && ys.len() == 1 {
        let x1 = transform(&xs[0], &ys[0], x_important);
        let y1 = transform(&ys[0], &xs[0], !x_important);
        return (x1, y1);
    }
    if xs.len() > 1 {
        let (head, tail) = xs.split_at(1);
        let (head1, ys1) = transform_ops(head, ys, x_important);
        let (tail1, ys2) = transform_ops(tail, &ys1, x_important);
        let mut out = head1;
        out.extend(tail1);
        (out, ys2)
    } else {
        let (head, tail) = ys.split_at(1);
        let (xs1, head1) = transform_ops(xs, head, x_important);
        let (xs2, tail1) = transform_ops(&xs1, tail, x_important);
        let mut out = head1;
        out.extend(tail1);
        (xs2, out)
    }
}

/// Rebases two delta sets against each other so two peers that exchanged
/// them reconcile symmetrically: the returned `a` set applies after all of
/// `b` and vice versa, with base versions renumbered accordingly. Delta
/// identities are preserved.
pub fn transform_delta_sets(
    a: &[Delta],
    b: &[Delta],
    a_is_important: bool,
) -> (Vec<Delta>, Vec<Delta>) {
    let total_a: usize = a.iter().map(Delta::len).sum();
    let total_b: usize = b.iter().map(Delta::len).sum();
    let base = a
        .iter()
        .chain(b)
        .find_map(Delta::base_version)
        .unwrap_or(0);

    let mut b_sets: Vec<Vec<Operation>> = b.iter().map(|d| d.ops.clone()).collect();
    let mut a_out: Vec<Delta> = Vec::new();
    for delta in a {
        let mut ops = delta.ops.clone();
        for b_set in b_sets.iter_mut() {
            let (rebased, b_rebased) = transform_ops(&ops, b_set, a_is_important);
            ops = rebased;
            *b_set = b_rebased;
        }
        a_out.push(Delta::with_id(delta.id, ops));
    }

    let mut version = base + total_b as u64;
    for delta in &mut a_out {
        delta.renumber(version);
        version += delta.len() as u64;
    }
    let mut b_out: Vec<Delta> = b
        .iter()
        .zip(b_sets)
        .map(|(delta, ops)| Delta::with_id(delta.id, ops))
        .collect();
    let mut version = base + total_a as u64;
    for delta in &mut b_out {
        delta.renumber(version);
        version += delta.len() as u64;
    }

    tracing::debug!(
        a_deltas = a.len(),
        b_deltas = b.len(),
        a_ops = total_a,
        b_ops = total_b,
        "transformed delta sets"
    );
    (a_out, b_out)
}
