//! Test keyword and prefix bulk deletes.

use std::collections::HashSet;

use crate::e2e_tests::helpers::{TestStore, key};

#[test]
fn test_prefix_delete_scope() {
    let mut t = TestStore::new();
    t.put("doc://too", "TOO");
    t.put("doc://tool", "tool");
    t.put("doc://tooth", "Tooth");
    t.put("doc://to", "to");
    t.put("doc://top", "top");

    let deleted = t.store.delete_all_with_prefix("TOOL").expect("delete");
    assert_eq!(deleted, HashSet::from([key("doc://tool")]));

    let deleted = t.store.delete_all_with_prefix("too").expect("delete");
    assert_eq!(deleted, HashSet::from([key("doc://too"), key("doc://tooth")]));

    assert_eq!(t.search_by_prefix("to"), vec!["to", "top"]);
    t.assert_consistent();
}

#[test]
fn test_keyword_delete_leaves_longer_words() {
    let mut t = TestStore::new();
    t.put("doc://a", "too");
    t.put("doc://b", "tooth");

    let deleted = t.store.delete_all("too").expect("delete");
    assert_eq!(deleted, HashSet::from([key("doc://a")]));
    assert_eq!(t.search("tooth"), vec!["tooth"]);
    assert_eq!(t.text("doc://a"), None);
    t.assert_consistent();
}

#[test]
fn test_delete_all_then_put_again() {
    let mut t = TestStore::new();
    t.put("doc://a", "apple");
    t.store.delete_all("apple").expect("delete");
    assert_eq!(t.put("doc://a", "apple again"), None);
    assert_eq!(t.search("apple"), vec!["apple again"]);
    t.assert_consistent();
}
