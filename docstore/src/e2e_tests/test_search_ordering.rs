//! Test search result ordering and normalization.

use crate::e2e_tests::helpers::TestStore;

#[test]
fn test_search_is_ordered_by_count() {
    let mut t = TestStore::new();
    t.put("doc://1", "The quick brown fox");
    t.put("doc://2", "fox fox, FOX! and a fox");
    t.put("doc://3", "Fox? fox.");
    t.put("doc://4", "no match here");

    assert_eq!(
        t.search("fox"),
        vec!["fox fox, FOX! and a fox", "Fox? fox.", "The quick brown fox"]
    );
    assert_eq!(t.search("FOX"), t.search("f-o-x"));
}

#[test]
fn test_prefix_search_sums_all_matching_words() {
    let mut t = TestStore::new();
    t.put("doc://1", "car car car");
    t.put("doc://2", "cart carton carbon card");
    t.put("doc://3", "cat");

    assert_eq!(
        t.search_by_prefix("car"),
        vec!["cart carton carbon card", "car car car"]
    );
    assert_eq!(t.search_by_prefix("ca").len(), 3);
    assert!(t.search_by_prefix("dog").is_empty());
}

#[test]
fn test_search_after_replacement_uses_new_words() {
    let mut t = TestStore::new();
    t.put("doc://1", "old words");
    t.put("doc://1", "new words");

    assert!(t.search("old").is_empty());
    assert_eq!(t.search("new"), vec!["new words"]);
    assert_eq!(t.search("words"), vec!["new words"]);
}

#[test]
fn test_search_marks_results_used() {
    let mut t = TestStore::new();
    t.put("doc://1", "shared");
    t.put("doc://2", "shared");
    t.put("doc://3", "other");

    let before = t.store.last_use_time(&crate::testing::key("doc://1"));
    t.search("shared");
    let one = t.store.last_use_time(&crate::testing::key("doc://1"));
    let two = t.store.last_use_time(&crate::testing::key("doc://2"));
    assert!(one > before);
    assert_eq!(one, two);
}
