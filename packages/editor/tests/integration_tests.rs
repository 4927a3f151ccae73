//! Integration tests: two sessions exchanging deltas, and undo interleaved
//! with remote edits.

use vellum_editor::{EditSession, UndoStack};
use vellum_model::{Delta, Document, Position, Range, Text, MAIN_ROOT};

fn pos(path: Vec<usize>) -> Position {
    Position::new(MAIN_ROOT, path).unwrap()
}

fn seed() -> Document {
    let mut doc = Document::new();
    let op = doc.create_insert(pos(vec![0]), vec![Text::new("hello world").into()]);
    doc.apply_operation(op).unwrap();
    doc
}

#[test]
fn two_sessions_converge_after_exchanging_deltas() {
    let mut one = EditSession::new("one", 1, seed());
    let mut two = EditSession::new("two", 2, seed());

    let op = one
        .document
        .create_insert(pos(vec![5]), vec![Text::new(",").into()]);
    let from_one = Delta::new(vec![op]);
    one.apply_local(from_one.clone()).unwrap();

    let op = two.document.create_remove(pos(vec![6]), 5);
    let from_two = Delta::new(vec![op]);
    two.apply_local(from_two.clone()).unwrap();

    one.receive_remote(from_two, 2).unwrap();
    two.receive_remote(from_one, 1).unwrap();

    assert_eq!(
        one.document.root(MAIN_ROOT).unwrap(),
        two.document.root(MAIN_ROOT).unwrap()
    );
    assert_eq!(one.document.graveyard(), two.document.graveyard());
    assert_eq!(one.document.root(MAIN_ROOT).unwrap().text(), "hello, ");
}

#[test]
fn conflicting_edits_resolve_by_priority_on_both_peers() {
    let mut one = EditSession::new("one", 1, seed());
    let mut two = EditSession::new("two", 2, seed());

    let op = one
        .document
        .create_insert(pos(vec![0]), vec![Text::new("A").into()]);
    let from_one = Delta::new(vec![op]);
    one.apply_local(from_one.clone()).unwrap();

    let op = two
        .document
        .create_insert(pos(vec![0]), vec![Text::new("B").into()]);
    let from_two = Delta::new(vec![op]);
    two.apply_local(from_two.clone()).unwrap();

    one.receive_remote(from_two, 2).unwrap();
    two.receive_remote(from_one, 1).unwrap();

    // The lower-priority client's content wins the tie on both replicas.
    assert_eq!(one.document.root(MAIN_ROOT).unwrap().text(), "ABhello world");
    assert_eq!(
        one.document.root(MAIN_ROOT).unwrap(),
        two.document.root(MAIN_ROOT).unwrap()
    );
}

#[test]
fn markers_stay_aligned_across_peers() {
    let mut one = EditSession::new("one", 1, seed());
    let mut two = EditSession::new("two", 2, seed());

    // Client one marks "world" while client two types at the front.
    let marker_range = Range::new(pos(vec![6]), pos(vec![11])).unwrap();
    let from_one = Delta::new(vec![one.document.create_marker_set("sel", marker_range)]);
    one.apply_local(from_one.clone()).unwrap();

    let op = two
        .document
        .create_insert(pos(vec![0]), vec![Text::new(">> ").into()]);
    let from_two = Delta::new(vec![op]);
    two.apply_local(from_two.clone()).unwrap();

    one.receive_remote(from_two, 2).unwrap();
    two.receive_remote(from_one, 1).unwrap();

    let range_one = one.document.markers().get("sel").unwrap();
    let range_two = two.document.markers().get("sel").unwrap();
    assert_eq!(range_one, range_two);
    assert_eq!(
        (range_one.start.offset(), range_one.end.offset()),
        (9, 14)
    );
}

#[test]
fn undo_survives_a_concurrent_remote_edit() {
    let mut doc = seed();
    let mut stack = UndoStack::new();

    let tracked = Delta::new(vec![
        doc.create_insert(pos(vec![11]), vec![Text::new("!").into()])
    ]);
    stack.apply(tracked, &mut doc).unwrap();
    assert_eq!(doc.root(MAIN_ROOT).unwrap().text(), "hello world!");

    // A remote peer removes "hello " after our tracked edit.
    let remote = Delta::new(vec![doc.create_remove(pos(vec![0]), 6)]);
    doc.apply_delta(remote).unwrap();
    assert_eq!(doc.root(MAIN_ROOT).unwrap().text(), "world!");

    assert!(stack.undo(&mut doc).unwrap());
    assert_eq!(doc.root(MAIN_ROOT).unwrap().text(), "world");

    assert!(stack.redo(&mut doc).unwrap());
    assert_eq!(doc.root(MAIN_ROOT).unwrap().text(), "world!");
}

#[test]
fn undone_deltas_are_inactive_in_history() {
    let mut doc = seed();
    let mut stack = UndoStack::new();

    let tracked = Delta::new(vec![
        doc.create_insert(pos(vec![0]), vec![Text::new("X").into()])
    ]);
    let tracked_id = tracked.id;
    stack.apply(tracked, &mut doc).unwrap();
    stack.undo(&mut doc).unwrap();

    // Traversing history from the tracked delta's base yields a no-op
    // substitution in its place, not the original operations.
    let items: Vec<_> = doc.history().items_from(1).unwrap().collect();
    let substituted = items.iter().find(|item| item.index == 1).unwrap();
    assert_ne!(substituted.delta.id, tracked_id);
    assert!(substituted.delta.ops.iter().all(|op| op.is_noop()));
}

#[test]
fn differ_drives_rendering_after_a_remote_delta() {
    let mut session = EditSession::new("one", 1, seed());
    session.document.reset_differ();

    let other = seed();
    let remote = Delta::new(vec![other.create_remove(pos(vec![0]), 5)]);
    session.receive_remote(remote, 2).unwrap();

    let changes = session.document.changes();
    assert_eq!(changes.len(), 1);
    assert!(matches!(
        &changes[0],
        vellum_model::DiffItem::Remove { length: 5, .. }
    ));
}
