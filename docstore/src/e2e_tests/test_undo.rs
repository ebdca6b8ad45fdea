//! Test that undo restores the exact prior state.

use crate::e2e_tests::helpers::{TestStore, key};
use crate::store::StoreError;

#[test]
fn test_undo_restores_prior_content_with_refreshed_time() {
    let mut t = TestStore::new();
    t.put("doc://k", "content x");
    let original_use = t.store.last_use_time(&key("doc://k")).expect("resident");
    t.advance(1_000);
    t.put("doc://k", "content y");
    t.advance(1_000);

    t.store.undo_key(&key("doc://k")).expect("undo");

    assert_eq!(t.text("doc://k").as_deref(), Some("content x"));
    assert!(t.store.last_use_time(&key("doc://k")).expect("resident") > original_use);
    assert_eq!(t.search("x"), vec!["content x"]);
    assert!(t.search("y").is_empty());
    t.assert_consistent();
}

#[test]
fn test_undo_everything_empties_store() {
    let mut t = TestStore::new();
    t.put("doc://a", "one");
    t.put("doc://b", "two");
    t.put("doc://a", "three");
    t.store.delete_document(&key("doc://b")).expect("delete");

    while t.store.undo_depth() > 0 {
        t.store.undo().expect("undo");
        t.assert_consistent();
    }

    assert_eq!(t.text("doc://a"), None);
    assert_eq!(t.text("doc://b"), None);
    assert_eq!(t.store.resident_document_count(), 0);
    assert!(matches!(t.store.undo(), Err(StoreError::NothingToUndo)));
}

#[test]
fn test_undo_key_without_history() {
    let mut t = TestStore::new();
    t.put("doc://a", "one");
    let result = t.store.undo_key(&key("doc://b"));
    assert!(matches!(result, Err(StoreError::NoUndoForKey(k)) if k == key("doc://b")));
    assert_eq!(t.store.undo_depth(), 1);
}

#[test]
fn test_undo_of_put_none_delete() {
    let mut t = TestStore::new();
    t.put("doc://a", "still here");
    t.store
        .put_document(None, &key("doc://a"), crate::document::DocumentFormat::PlainText)
        .expect("delete");
    assert_eq!(t.text("doc://a"), None);

    t.store.undo().expect("undo");
    assert_eq!(t.text("doc://a").as_deref(), Some("still here"));
    t.assert_consistent();
}
