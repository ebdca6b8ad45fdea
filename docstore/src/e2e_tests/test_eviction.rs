//! Test that the memory ceilings park the least recently used documents.

use crate::e2e_tests::helpers::{TestStore, key};
use crate::store::DocumentState;

#[test]
fn test_count_ceiling_with_three_documents() {
    let mut t = TestStore::new();
    t.store.set_max_document_count(2).expect("limit");

    t.put("doc://first", "first document");
    t.advance(10);
    t.put("doc://second", "second document");
    t.advance(10);
    t.put("doc://third", "third document");

    assert_eq!(t.store.resident_document_count(), 2);
    assert_eq!(t.state("doc://first"), Some(DocumentState::Parked));
    assert_eq!(t.state("doc://second"), Some(DocumentState::Resident));
    assert_eq!(t.state("doc://third"), Some(DocumentState::Resident));
    t.assert_consistent();
}

#[test]
fn test_touching_changes_eviction_order() {
    let mut t = TestStore::new();
    t.put("doc://a", "alpha");
    t.put("doc://b", "beta");
    t.put("doc://c", "gamma");

    t.text("doc://a");
    t.search("beta");
    t.store.set_max_document_count(2).expect("limit");

    assert_eq!(t.state("doc://c"), Some(DocumentState::Parked));
    t.assert_consistent();

    t.store.set_max_document_count(1).expect("limit");
    assert_eq!(t.state("doc://a"), Some(DocumentState::Parked));
    assert_eq!(t.state("doc://b"), Some(DocumentState::Resident));
    t.assert_consistent();
}

#[test]
fn test_parked_document_pages_back_in() {
    let mut t = TestStore::new();
    t.store.set_max_document_count(1).expect("limit");
    t.put("doc://a", "alpha words");
    t.put("doc://b", "beta words");

    let persistence = t.persistence.clone().expect("simulated");
    assert!(persistence.contains(&key("doc://a")));

    assert_eq!(t.text("doc://a").as_deref(), Some("alpha words"));
    assert!(!persistence.contains(&key("doc://a")));
    assert!(persistence.contains(&key("doc://b")));
    assert_eq!(persistence.stats().reads, 1);
    t.assert_consistent();
}

#[test]
fn test_byte_ceiling() {
    let mut t = TestStore::new();
    t.store.set_max_document_bytes(20).expect("limit");
    t.put("doc://a", "0123456789");
    t.put("doc://b", "0123456789");
    assert_eq!(t.store.resident_document_bytes(), 20);

    t.put("doc://c", "0123456789");
    assert_eq!(t.store.resident_document_bytes(), 20);
    assert_eq!(t.state("doc://a"), Some(DocumentState::Parked));
    t.assert_consistent();
}

#[test]
fn test_document_larger_than_byte_ceiling_is_parked() {
    let mut t = TestStore::new();
    t.store.set_max_document_bytes(5).expect("limit");
    t.put("doc://big", "far more than five bytes");

    assert_eq!(t.state("doc://big"), Some(DocumentState::Parked));
    assert_eq!(t.store.resident_document_bytes(), 0);
    assert_eq!(t.text("doc://big").as_deref(), Some("far more than five bytes"));
    assert_eq!(t.state("doc://big"), Some(DocumentState::Parked));
    t.assert_consistent();
}

#[test]
fn test_zero_count_ceiling_parks_everything() {
    let mut t = TestStore::new();
    t.put("doc://a", "one");
    t.put("doc://b", "two");
    t.store.set_max_document_count(0).expect("limit");

    assert_eq!(t.store.resident_document_count(), 0);
    assert_eq!(t.search("two"), vec!["two"]);
    assert_eq!(t.store.resident_document_count(), 0);
    t.assert_consistent();
}
