//! Test ingesting PDF input and producing renderings.

use crate::document::{DocumentFormat, Renderer, SinglePageRenderer};
use crate::e2e_tests::helpers::{TestStore, key};
use crate::store::StoreError;

#[test]
fn test_pdf_words_are_searchable() {
    let mut t = TestStore::new();
    let pdf = SinglePageRenderer
        .render("  Quarterly report: revenue grew  ")
        .expect("render");

    t.store
        .put_document(Some(&pdf), &key("doc://report.pdf"), DocumentFormat::Pdf)
        .expect("put pdf");

    assert_eq!(
        t.text("doc://report.pdf").as_deref(),
        Some("Quarterly report: revenue grew")
    );
    assert_eq!(t.search("revenue"), vec!["Quarterly report: revenue grew"]);
    assert_eq!(
        t.store
            .get_document_as_rendering(&key("doc://report.pdf"))
            .expect("render"),
        Some(pdf)
    );
}

#[test]
fn test_non_pdf_is_rejected_without_changes() {
    let mut t = TestStore::new();
    let result = t.store.put_document(
        Some(b"just text"),
        &key("doc://fake.pdf"),
        DocumentFormat::Pdf,
    );

    assert!(matches!(result, Err(StoreError::InvalidDocument(_))));
    assert_eq!(t.text("doc://fake.pdf"), None);
    assert_eq!(t.store.undo_depth(), 0);
}

#[test]
fn test_plain_text_rendering_round_trips_through_extraction() {
    let mut t = TestStore::new();
    t.put("doc://note", "hello (world)");

    let rendering = t
        .store
        .get_document_as_rendering(&key("doc://note"))
        .expect("render")
        .expect("present");
    assert_eq!(
        SinglePageRenderer.extract_text(&rendering).expect("extract"),
        "hello (world)"
    );
    assert!(t.store.resident_document_bytes() > "hello (world)".len());
    t.assert_consistent();
}

#[test]
fn test_rendering_of_missing_document() {
    let mut t = TestStore::new();
    assert_eq!(
        t.store
            .get_document_as_rendering(&key("doc://nothing"))
            .expect("render"),
        None
    );
}
