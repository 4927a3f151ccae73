//! Convergence tests: for operations A and B valid against the same base
//! version, applying A then transform(B, A) must produce the same tree as
//! applying B then transform(A, B), with complementary importance flags.

use serde_json::json;
use vellum_model::{
    transform, transform_delta_sets, Delta, Document, Element, Operation, OperationKind, Position,
    Range, Text, MAIN_ROOT,
};

fn pos(path: Vec<usize>) -> Position {
    Position::new(MAIN_ROOT, path).unwrap()
}

fn flat(start: usize, end: usize) -> Range {
    Range::new(pos(vec![start]), pos(vec![end])).unwrap()
}

/// A document seeded with one text run in the main root; version 1.
fn text_doc(text: &str) -> Document {
    let mut doc = Document::new();
    let op = doc.create_insert(pos(vec![0]), vec![Text::new(text).into()]);
    doc.apply_operation(op).unwrap();
    doc
}

/// A document seeded with paragraph elements; version 1.
fn paragraph_doc(texts: &[&str]) -> Document {
    let mut doc = Document::new();
    let nodes = texts
        .iter()
        .map(|t| Element::new("paragraph").with_child(Text::new(*t)).into())
        .collect();
    let op = doc.create_insert(pos(vec![0]), nodes);
    doc.apply_operation(op).unwrap();
    doc
}

/// Applies `first`, then `second` rebased past it.
fn apply_pair(doc: &mut Document, first: &Operation, second: &Operation, second_important: bool) {
    doc.apply_operation(first.clone()).unwrap();
    let rebased = transform(second, first, second_important);
    doc.apply_delta(Delta::new(rebased)).unwrap();
}

/// Both application orders must yield identical trees, with `important`
/// winning ties on both sides.
fn assert_converges(make_doc: impl Fn() -> Document, important: &Operation, weak: &Operation) {
    let mut left = make_doc();
    apply_pair(&mut left, important, weak, false);
    let mut right = make_doc();
    apply_pair(&mut right, weak, important, true);

    assert_eq!(
        left.root(MAIN_ROOT).unwrap(),
        right.root(MAIN_ROOT).unwrap(),
        "main roots diverged"
    );
    assert_eq!(left.graveyard(), right.graveyard(), "graveyards diverged");
}

fn insert_text(doc: &Document, at: usize, text: &str) -> Operation {
    doc.create_insert(pos(vec![at]), vec![Text::new(text).into()])
}

#[test]
fn concurrent_inserts_at_the_same_offset() {
    let make = || text_doc("abc");
    let doc = make();
    let a = insert_text(&doc, 1, "X");
    let b = insert_text(&doc, 1, "Y");
    assert_converges(make, &a, &b);

    // The important operation's content ends up first.
    let mut check = make();
    apply_pair(&mut check, &a, &b, false);
    assert_eq!(check.root(MAIN_ROOT).unwrap().text(), "aXYbc");
}

#[test]
fn insert_against_overlapping_remove() {
    let make = || text_doc("abcdef");
    let doc = make();
    let a = insert_text(&doc, 4, "X");
    let b = doc.create_remove(pos(vec![1]), 3);
    assert_converges(make, &a, &b);

    let mut check = make();
    apply_pair(&mut check, &a, &b, false);
    assert_eq!(check.root(MAIN_ROOT).unwrap().text(), "aXef");
}

#[test]
fn insert_into_removed_content_follows_it_to_the_graveyard() {
    let make = || text_doc("abcd");
    let doc = make();
    let a = insert_text(&doc, 1, "X");
    let b = doc.create_remove(pos(vec![0]), 2);
    assert_converges(make, &b, &a);
}

#[test]
fn identical_conflicting_attribute_ranges() {
    let make = || text_doc("abc");
    let doc = make();
    let a = doc
        .create_attribute(flat(0, 3), "bold", Some(json!(true)))
        .unwrap();
    let b = doc
        .create_attribute(flat(0, 3), "bold", Some(json!(false)))
        .unwrap();
    assert_converges(make, &a, &b);

    // The important side defers to the value the other peer settled on.
    let mut check = text_doc("abc");
    apply_pair(&mut check, &a, &b, false);
    for child in check.root(MAIN_ROOT).unwrap().children() {
        assert_eq!(child.attrs().get("bold"), Some(&json!(false)));
    }
}

#[test]
fn partially_overlapping_attribute_ranges() {
    let make = || text_doc("abcdef");
    let doc = make();
    let a = doc
        .create_attribute(flat(0, 4), "bold", Some(json!(true)))
        .unwrap();
    let b = doc
        .create_attribute(flat(2, 6), "bold", Some(json!(false)))
        .unwrap();
    assert_converges(make, &a, &b);

    let mut check = make();
    apply_pair(&mut check, &a, &b, false);
    let root = check.root(MAIN_ROOT).unwrap();
    // a keeps its difference, b's value stands on the overlap and its own
    // range.
    assert_eq!(root.children()[0].as_text().unwrap().data(), "ab");
    assert_eq!(root.children()[0].attrs().get("bold"), Some(&json!(true)));
    assert_eq!(root.children()[1].attrs().get("bold"), Some(&json!(false)));
}

#[test]
fn attribute_range_straddling_a_move() {
    let make = || text_doc("abcdef");
    let doc = make();
    let attr = doc
        .create_attribute(flat(1, 5), "bold", Some(json!(true)))
        .unwrap();
    let mv = doc.create_move(pos(vec![3]), 3, pos(vec![0]));
    assert_converges(make, &mv, &attr);

    let mut check = make();
    apply_pair(&mut check, &mv, &attr, false);
    // Moved text "def" sits first; the attribute survived on b, c, d, e.
    assert_eq!(check.root(MAIN_ROOT).unwrap().text(), "defabc");
    let bold: String = check
        .root(MAIN_ROOT)
        .unwrap()
        .children()
        .iter()
        .filter(|c| c.attrs().get("bold") == Some(&json!(true)))
        .filter_map(|c| c.as_text().map(|t| t.data().to_string()))
        .collect();
    assert_eq!(bold, "debc");
}

#[test]
fn disjoint_concurrent_moves() {
    let make = || text_doc("0123456789");
    let doc = make();
    let a = doc.create_move(pos(vec![6]), 2, pos(vec![0]));
    let b = doc.create_move(pos(vec![1]), 1, pos(vec![9]));
    assert_converges(make, &a, &b);

    let mut check = make();
    apply_pair(&mut check, &a, &b, false);
    assert_eq!(check.root(MAIN_ROOT).unwrap().text(), "6702345819");
}

#[test]
fn same_range_moved_to_different_targets() {
    let make = || text_doc("abcdef");
    let doc = make();
    let a = doc.create_move(pos(vec![0]), 2, pos(vec![4]));
    let b = doc.create_move(pos(vec![0]), 2, pos(vec![6]));
    assert_converges(make, &a, &b);

    // The important move wins placement.
    let mut check = make();
    apply_pair(&mut check, &a, &b, false);
    assert_eq!(check.root(MAIN_ROOT).unwrap().text(), "cdabef");
}

#[test]
fn straddling_concurrent_moves() {
    let make = || text_doc("abcdefgh");
    let doc = make();
    let a = doc.create_move(pos(vec![1]), 4, pos(vec![7]));
    let b = doc.create_move(pos(vec![3]), 4, pos(vec![0]));
    assert_converges(make, &a, &b);

    let mut check = make();
    apply_pair(&mut check, &a, &b, false);
    assert_eq!(check.root(MAIN_ROOT).unwrap().text(), "fgabcdeh");
}

#[test]
fn insert_inside_a_concurrently_moved_element() {
    let make = || paragraph_doc(&["ab", "q"]);
    let doc = make();
    let a = doc.create_insert(pos(vec![0, 1]), vec![Text::new("X").into()]);
    let b = doc.create_move(pos(vec![0]), 1, pos(vec![2]));
    assert_converges(make, &a, &b);

    let mut check = make();
    apply_pair(&mut check, &a, &b, false);
    let root = check.root(MAIN_ROOT).unwrap();
    // The paragraph moved behind its sibling and kept the typed character.
    assert_eq!(root.children()[1].as_element().unwrap().text(), "aXb");
}

#[test]
fn mutually_nested_moves_resolve_by_reversal() {
    let make = || paragraph_doc(&["x", "y"]);
    let doc = make();
    // Each move targets the inside of the element the other is moving.
    let a = doc.create_move(pos(vec![0]), 1, pos(vec![1, 1]));
    let b = doc.create_move(pos(vec![1]), 1, pos(vec![0, 1]));
    assert_converges(make, &a, &b);

    // The winner's intent survives: the first paragraph ends up inside the
    // second.
    let mut check = make();
    apply_pair(&mut check, &a, &b, false);
    let root = check.root(MAIN_ROOT).unwrap();
    assert_eq!(root.children().len(), 1);
    let outer = root.children()[0].as_element().unwrap();
    assert_eq!(outer.text(), "y");
    assert_eq!(outer.children()[1].as_element().unwrap().text(), "x");
}

#[test]
fn concurrent_renames_of_the_same_element() {
    let make = || paragraph_doc(&["x"]);
    let doc = make();
    let a = doc.create_rename(pos(vec![0]), "heading").unwrap();
    let b = doc.create_rename(pos(vec![0]), "blockquote").unwrap();
    assert_converges(make, &a, &b);

    let mut check = make();
    apply_pair(&mut check, &a, &b, false);
    let root = check.root(MAIN_ROOT).unwrap();
    assert_eq!(root.children()[0].as_element().unwrap().name(), "heading");
}

#[test]
fn concurrent_marker_updates_of_the_same_name() {
    let make = || text_doc("abcdef");
    let doc = make();
    let a = doc.create_marker_set("caret", flat(1, 2));
    let b = doc.create_marker_set("caret", flat(4, 5));

    let mut left = make();
    apply_pair(&mut left, &a, &b, false);
    let mut right = make();
    apply_pair(&mut right, &b, &a, true);
    assert_eq!(left.markers().get("caret"), right.markers().get("caret"));
    assert_eq!(left.markers().get("caret"), Some(&flat(1, 2)));
}

#[test]
fn delta_sets_reconcile_symmetrically() {
    let make = || text_doc("abcd");
    let doc = make();
    let local = vec![Delta::new(vec![insert_text(&doc, 1, "X")])];
    let remote = vec![Delta::new(vec![doc.create_remove(pos(vec![0]), 2)])];

    let (local_rebased, remote_rebased) = transform_delta_sets(&local, &remote, true);

    // Peer one: local first, then the rebased remote set.
    let mut one = make();
    for delta in &local {
        one.apply_delta(delta.clone()).unwrap();
    }
    for delta in remote_rebased {
        one.apply_delta(delta).unwrap();
    }

    // Peer two: remote first, then the rebased local set.
    let mut two = make();
    for delta in &remote {
        two.apply_delta(delta.clone()).unwrap();
    }
    for delta in local_rebased {
        two.apply_delta(delta).unwrap();
    }

    assert_eq!(one.root(MAIN_ROOT).unwrap(), two.root(MAIN_ROOT).unwrap());
    assert_eq!(one.graveyard(), two.graveyard());
}

#[test]
fn transforming_against_noop_changes_nothing() {
    let doc = text_doc("abc");
    let a = insert_text(&doc, 0, "X");
    let noop = Operation::new(1, OperationKind::NoOp);
    let out = transform(&a, &noop, false);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].kind, a.kind);
    let out = transform(&noop, &a, true);
    assert!(out[0].is_noop());
}
