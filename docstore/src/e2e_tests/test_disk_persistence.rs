//! Test parking documents as JSON files in a real directory.

use crate::document::DocumentFormat;
use crate::e2e_tests::helpers::{TestStore, key};
use crate::store::DocumentState;

#[test]
fn test_parked_documents_appear_and_vanish_on_disk() {
    let mut t = TestStore::on_disk();
    let a = t.record_path("http://example.com/docs/a");
    let b = t.record_path("http://example.com/docs/b");
    assert!(a.starts_with(t.dir.as_ref().expect("temp dir").path().join("example.com/docs")));

    t.put("http://example.com/docs/a", "alpha on disk");
    t.put("http://example.com/docs/b", "beta on disk");
    t.store.set_max_document_count(1).expect("limit");

    assert!(a.is_file());
    assert!(!b.exists());
    assert_eq!(t.state("http://example.com/docs/a"), Some(DocumentState::Parked));

    assert_eq!(
        t.text("http://example.com/docs/a").as_deref(),
        Some("alpha on disk")
    );
    assert!(!a.exists());
    assert!(b.is_file());
    t.assert_consistent();
}

#[test]
fn test_keys_differing_in_scheme_or_query_keep_separate_records() {
    let mut t = TestStore::on_disk();
    let keys = ["http://host/a", "https://host/a", "http://host/a?v=2"];
    for (i, k) in keys.iter().enumerate() {
        t.put(k, &format!("version {i}"));
    }
    t.store.set_max_document_count(0).expect("limit");
    for k in keys {
        assert!(t.record_path(k).is_file(), "{k} has no record");
    }

    for (i, k) in keys.iter().enumerate() {
        assert_eq!(t.text(k), Some(format!("version {i}")));
    }
    for k in keys {
        assert!(t.store.delete_document(&key(k)).expect("delete"));
    }
    assert!(!t.dir.as_ref().expect("temp dir").path().join("host").exists());
}

#[test]
fn test_empty_directories_are_pruned() {
    let mut t = TestStore::on_disk();
    let base = t.dir.as_ref().expect("temp dir").path().to_path_buf();
    let record = t.record_path("http://host/deep/nested/path/doc");

    t.put("http://host/deep/nested/path/doc", "deep");
    t.store.set_max_document_count(0).expect("limit");
    assert!(record.is_file());

    t.store.set_max_document_count(1).expect("limit");
    assert_eq!(t.text("http://host/deep/nested/path/doc").as_deref(), Some("deep"));
    assert!(!base.join("host").exists());
    assert!(base.exists());
}

#[test]
fn test_delete_of_parked_document_removes_record() {
    let mut t = TestStore::on_disk();
    let record = t.record_path("http://host/a");

    t.put("http://host/a", "gone soon");
    t.store.set_max_document_count(0).expect("limit");
    assert!(record.is_file());

    assert!(t.store.delete_document(&key("http://host/a")).expect("delete"));
    assert!(!record.exists());
    assert_eq!(t.text("http://host/a"), None);

    t.store.undo().expect("undo");
    assert_eq!(t.text("http://host/a").as_deref(), Some("gone soon"));
}

#[test]
fn test_search_pages_in_from_disk() {
    let mut t = TestStore::on_disk();
    for i in 0..5 {
        t.store
            .put_document(
                Some(format!("needle {i}").as_bytes()),
                &key(&format!("http://host/n{i}")),
                DocumentFormat::PlainText,
            )
            .expect("put");
    }
    t.store.set_max_document_count(2).expect("limit");

    assert_eq!(t.search("needle").len(), 5);
    assert_eq!(t.store.resident_document_count(), 2);
    t.assert_consistent();
}
