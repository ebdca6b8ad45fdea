//! Test undo of grouped deletes, both as a unit and key by key.

use crate::e2e_tests::helpers::{TestStore, key};
use crate::store::DocumentState;

#[test]
fn test_group_undo_restores_all() {
    let mut t = TestStore::new();
    t.put("doc://a", "common alpha");
    t.put("doc://b", "common beta");
    t.put("doc://c", "unrelated");

    let deleted = t.store.delete_all("common").expect("delete");
    assert_eq!(deleted.len(), 2);
    assert!(t.search("common").is_empty());

    t.store.undo().expect("undo");
    assert_eq!(t.search("common").len(), 2);
    let a = t.store.last_use_time(&key("doc://a"));
    let b = t.store.last_use_time(&key("doc://b"));
    assert_eq!(a, b);
    t.assert_consistent();
}

#[test]
fn test_undo_key_inside_group_keeps_rest_of_group() {
    let mut t = TestStore::new();
    t.put("doc://a", "pre alpha");
    t.put("doc://b", "pre beta");
    t.put("doc://c", "pre gamma");
    t.store.delete_all_with_prefix("pr").expect("delete");
    t.put("doc://d", "later");

    t.store.undo_key(&key("doc://b")).expect("undo b");
    assert_eq!(t.text("doc://b").as_deref(), Some("pre beta"));
    assert_eq!(t.text("doc://a"), None);
    assert_eq!(t.text("doc://d").as_deref(), Some("later"));

    t.store.undo_key(&key("doc://a")).expect("undo a");
    t.store.undo_key(&key("doc://c")).expect("undo c");
    assert_eq!(t.search_by_prefix("pre").len(), 3);
    assert_eq!(t.store.undo_depth(), 4);
    t.assert_consistent();
}

#[test]
fn test_group_undo_with_parked_members() {
    let mut t = TestStore::new();
    t.put("doc://a", "group member");
    t.put("doc://b", "group member too");
    t.store.delete_all("group").expect("delete");
    t.store.set_max_document_count(1).expect("limit");

    t.store.undo().expect("undo");
    assert_eq!(t.store.resident_document_count(), 1);
    let parked = [t.state("doc://a"), t.state("doc://b")]
        .into_iter()
        .filter(|s| *s == Some(DocumentState::Parked))
        .count();
    assert_eq!(parked, 1);
    assert_eq!(t.search("member").len(), 2);
    t.assert_consistent();
}
