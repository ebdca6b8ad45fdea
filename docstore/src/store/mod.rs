//! The document store: one B-tree, one trie, one heap and an undo stack kept
//! in step with each other.
//!
//! Every public operation runs to completion before returning and finishes
//! with a memory-management pass. When a ceiling on the number or the bytes of
//! resident documents is exceeded, the least recently used documents are
//! parked with the persistence manager. Their keys stay in the B-tree and
//! their words stay in the trie, so searches and lookups page them back in
//! transparently.
//!
//! Per-key states: absent, resident, parked. Deleting a key leaves a vacant
//! entry in the B-tree, which reads as absent.
//!
//! # Invariants
//!
//! - The heap holds exactly the resident documents, keyed by last-use time.
//! - The trie holds `word → key` for every word of every resident or parked
//!   document.
//! - Use times handed out by the store are strictly increasing.

mod error;
mod history;
mod memory;
mod search;

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::document::{Document, DocumentFormat, DocumentKey, Renderer, SinglePageRenderer};
use crate::index::{EvictionHeap, Trie};
use crate::storage::btree::{BTree, ValueState};
use crate::storage::time::{SystemTimeSource, TimeSource};
use crate::storage::{DocumentPersistenceManager, PersistenceManager};
use crate::undo::{Command, GenericCommand, UndoStack};

pub use error::StoreError;
use history::Reversal;

/// Where a stored document currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    /// In memory and tracked for eviction.
    Resident,
    /// Handed to the persistence manager; paged in on next use.
    Parked,
}

/// Document store with keyword search, LRU parking and undo.
pub struct DocumentStore {
    tree: BTree<DocumentKey, Document>,
    trie: Trie<DocumentKey>,
    heap: EvictionHeap<DocumentKey, u64>,
    history: UndoStack<Command<DocumentKey, Reversal>>,
    renderer: Box<dyn Renderer>,
    clock: Box<dyn TimeSource>,
    last_tick: u64,
    resident_count: usize,
    resident_bytes: usize,
    max_document_count: Option<usize>,
    max_document_bytes: Option<usize>,
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("documents", &self.tree.len())
            .field("resident_count", &self.resident_count)
            .field("resident_bytes", &self.resident_bytes)
            .field("max_document_count", &self.max_document_count)
            .field("max_document_bytes", &self.max_document_bytes)
            .field("undo_depth", &self.history.len())
            .finish_non_exhaustive()
    }
}

impl DocumentStore {
    /// Create a store that parks documents as JSON records under
    /// `base_directory`.
    #[must_use]
    pub fn new(base_directory: impl Into<PathBuf>) -> Self {
        Self::with_persistence(Box::new(DocumentPersistenceManager::new(base_directory)))
    }

    /// Create a store from configuration, applying its ceilings.
    #[must_use]
    pub fn open(config: &StoreConfig) -> Self {
        let mut store = Self::new(config.base_directory.clone());
        store.max_document_count = config.max_document_count;
        store.max_document_bytes = config.max_document_bytes;
        info!(
            base_directory = %config.base_directory.display(),
            max_document_count = ?config.max_document_count,
            max_document_bytes = ?config.max_document_bytes,
            "opened document store"
        );
        store
    }

    /// Create a store with a custom persistence manager.
    #[must_use]
    pub fn with_persistence(
        persistence: Box<dyn PersistenceManager<DocumentKey, Document>>,
    ) -> Self {
        Self::with_parts(
            persistence,
            Box::new(SinglePageRenderer),
            Box::new(SystemTimeSource),
        )
    }

    /// Create a store from all of its collaborators.
    #[must_use]
    pub fn with_parts(
        persistence: Box<dyn PersistenceManager<DocumentKey, Document>>,
        renderer: Box<dyn Renderer>,
        clock: Box<dyn TimeSource>,
    ) -> Self {
        let mut tree = BTree::new();
        tree.set_persistence_manager(persistence);
        Self {
            tree,
            trie: Trie::new(),
            heap: EvictionHeap::new(),
            history: UndoStack::new(),
            renderer,
            clock,
            last_tick: 0,
            resident_count: 0,
            resident_bytes: 0,
            max_document_count: None,
            max_document_bytes: None,
        }
    }

    /// Store a document, or delete `key` when `input` is `None`.
    ///
    /// Returns the text hash of the document that was replaced (or deleted),
    /// if there was one.
    ///
    /// # Errors
    ///
    /// Input that cannot be ingested is rejected before anything changes, and
    /// so is a previous document whose record cannot be read. Once the put
    /// is applied it succeeds: if parking other documents then fails, they
    /// stay resident until a later operation parks them.
    pub fn put_document(
        &mut self,
        input: Option<&[u8]>,
        key: &DocumentKey,
        format: DocumentFormat,
    ) -> Result<Option<u32>, StoreError> {
        let Some(bytes) = input else {
            let deleted = self.delete_with_undo(key)?;
            self.settle_memory();
            return Ok(deleted);
        };

        let now = self.tick();
        let document = Document::ingest(key.clone(), bytes, format, self.renderer.as_ref(), now)?;
        debug!(%key, ?format, bytes = bytes.len(), "ingested document");

        let previous = self.insert_document(document)?;
        let previous_hash = previous.as_ref().map(Document::text_hash);
        self.history.push(Command::Single(GenericCommand::new(
            key.clone(),
            Reversal::RemovePut { previous },
        )));

        self.settle_memory();
        Ok(previous_hash)
    }

    /// The text of `key`, paging it in if needed and marking it used.
    pub fn get_document_as_text(&mut self, key: &DocumentKey) -> Result<Option<String>, StoreError> {
        let now = self.tick();
        let text = if self.touch(key, now)? {
            self.tree.peek(key).map(|document| document.text().to_string())
        } else {
            None
        };
        self.settle_memory();
        Ok(text)
    }

    /// The rendering of `key`, producing it on first request.
    ///
    /// The rendering counts towards the document's footprint from then on.
    pub fn get_document_as_rendering(
        &mut self,
        key: &DocumentKey,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let now = self.tick();
        let rendering = if self.touch(key, now)? {
            self.render(key)?
        } else {
            None
        };
        self.settle_memory();
        Ok(rendering)
    }

    /// Delete `key`. Returns whether a document was deleted.
    pub fn delete_document(&mut self, key: &DocumentKey) -> Result<bool, StoreError> {
        let deleted = self.delete_with_undo(key)?.is_some();
        self.settle_memory();
        Ok(deleted)
    }

    /// Limit the number of resident documents and park any excess now.
    pub fn set_max_document_count(&mut self, max: usize) -> Result<(), StoreError> {
        info!(max, "set max document count");
        self.max_document_count = Some(max);
        self.manage_memory()
    }

    /// Limit the bytes of resident documents and park any excess now.
    pub fn set_max_document_bytes(&mut self, max: usize) -> Result<(), StoreError> {
        info!(max, "set max document bytes");
        self.max_document_bytes = Some(max);
        self.manage_memory()
    }

    /// Where `key` lives, or `None` if no document is stored under it.
    #[must_use]
    pub fn document_state(&self, key: &DocumentKey) -> Option<DocumentState> {
        match self.tree.state(key)? {
            ValueState::Resident => Some(DocumentState::Resident),
            ValueState::Parked => Some(DocumentState::Parked),
            ValueState::Vacant => None,
        }
    }

    /// Last-use time of a resident document.
    #[must_use]
    pub fn last_use_time(&self, key: &DocumentKey) -> Option<u64> {
        self.tree.peek(key).map(Document::last_use)
    }

    #[must_use]
    pub const fn resident_document_count(&self) -> usize {
        self.resident_count
    }

    #[must_use]
    pub const fn resident_document_bytes(&self) -> usize {
        self.resident_bytes
    }

    /// Number of commands on the undo stack.
    #[must_use]
    pub fn undo_depth(&self) -> usize {
        self.history.len()
    }

    /// Configured ceilings as `(max_document_count, max_document_bytes)`.
    #[must_use]
    pub const fn limits(&self) -> (Option<usize>, Option<usize>) {
        (self.max_document_count, self.max_document_bytes)
    }

    pub(crate) const fn tree(&self) -> &BTree<DocumentKey, Document> {
        &self.tree
    }

    pub(crate) const fn heap(&self) -> &EvictionHeap<DocumentKey, u64> {
        &self.heap
    }

    /// A new use time: the clock reading, bumped past the previous tick when
    /// the clock has not advanced.
    fn tick(&mut self) -> u64 {
        let now = self.clock.now_ns().max(self.last_tick.saturating_add(1));
        self.last_tick = now;
        now
    }

    /// Put `document` into the tree, trie and heap, replacing whatever was
    /// stored under its key. Returns the replaced document.
    fn insert_document(&mut self, document: Document) -> Result<Option<Document>, StoreError> {
        let key = document.key().clone();
        let footprint = document.footprint();
        let last_use = document.last_use();
        let words: Vec<String> = document.words().map(str::to_string).collect();

        self.unregister(&key)?;
        let was_parked = self.tree.state(&key) == Some(ValueState::Parked);
        let previous = self.tree.put(key.clone(), document)?;
        match &previous {
            Some(previous) => {
                for word in previous.words() {
                    self.trie.delete(word, &key);
                }
            }
            None if was_parked => self.forget_lost_words(&key),
            None => {}
        }
        for word in &words {
            self.trie.put(word, key.clone());
        }
        self.register(key, footprint, last_use)?;
        Ok(previous)
    }

    /// Remove `key` from the tree, trie and heap. Returns the removed
    /// document, paged in if it was parked.
    fn delete_one(&mut self, key: &DocumentKey) -> Result<Option<Document>, StoreError> {
        self.unregister(key)?;
        let was_parked = self.tree.state(key) == Some(ValueState::Parked);
        let Some(document) = self.tree.clear(key)? else {
            if was_parked {
                self.forget_lost_words(key);
            }
            return Ok(None);
        };
        for word in document.words() {
            self.trie.delete(word, key);
        }
        Ok(Some(document))
    }

    /// Drop the trie entries of a parked document whose record was lost, so
    /// its old words stop matching.
    fn forget_lost_words(&mut self, key: &DocumentKey) {
        let words = self.trie.delete_everywhere(key);
        warn!(%key, words, "parked record was missing; removed its index entries");
    }

    /// Delete `key` and record the deletion for undo. Returns the deleted
    /// document's text hash.
    fn delete_with_undo(&mut self, key: &DocumentKey) -> Result<Option<u32>, StoreError> {
        let Some(document) = self.delete_one(key)? else {
            return Ok(None);
        };
        let hash = document.text_hash();
        self.history.push(Command::Single(GenericCommand::new(
            key.clone(),
            Reversal::RestoreDeleted { document },
        )));
        debug!(%key, "deleted document");
        Ok(Some(hash))
    }

    /// Rendering of a resident document, memoizing it and accounting for
    /// the bytes it adds.
    fn render(&mut self, key: &DocumentKey) -> Result<Option<Vec<u8>>, StoreError> {
        let Some(document) = self.tree.get_mut(key)? else {
            return Ok(None);
        };
        let before = document.footprint();
        let rendering = document.render_with(self.renderer.as_ref())?.to_vec();
        let added = document.footprint().saturating_sub(before);
        if added > 0 {
            debug!(%key, bytes = added, "rendered document");
            self.grow_footprint(added);
        }
        Ok(Some(rendering))
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::document::text_hash;
    use crate::simulation::{SimulatedPersistence, SimulatedTimeSource};

    fn key(s: &str) -> DocumentKey {
        DocumentKey::new(s).expect("valid key")
    }

    fn store() -> (DocumentStore, SimulatedPersistence, Rc<SimulatedTimeSource>) {
        let persistence = SimulatedPersistence::new(0);
        let clock = Rc::new(SimulatedTimeSource::new(1_000));
        let store = DocumentStore::with_parts(
            Box::new(persistence.clone()),
            Box::new(SinglePageRenderer),
            Box::new(Rc::clone(&clock)),
        );
        (store, persistence, clock)
    }

    fn put(store: &mut DocumentStore, k: &str, text: &str) -> Option<u32> {
        store
            .put_document(Some(text.as_bytes()), &key(k), DocumentFormat::PlainText)
            .expect("put")
    }

    fn text(store: &mut DocumentStore, k: &str) -> Option<String> {
        store.get_document_as_text(&key(k)).expect("get")
    }

    #[test]
    fn test_put_and_get() {
        let (mut store, _, _) = store();
        assert_eq!(put(&mut store, "doc://a", "hello world"), None);
        assert_eq!(text(&mut store, "doc://a").as_deref(), Some("hello world"));
        assert_eq!(text(&mut store, "doc://missing"), None);
        assert_eq!(store.resident_document_count(), 1);
        assert_eq!(store.resident_document_bytes(), "hello world".len());
    }

    #[test]
    fn test_put_returns_previous_hash() {
        let (mut store, _, _) = store();
        put(&mut store, "doc://a", "first");
        assert_eq!(put(&mut store, "doc://a", "second"), Some(text_hash("first")));
        assert_eq!(text(&mut store, "doc://a").as_deref(), Some("second"));
        assert_eq!(store.resident_document_count(), 1);
        assert_eq!(store.resident_document_bytes(), "second".len());
    }

    #[test]
    fn test_put_none_deletes() {
        let (mut store, _, _) = store();
        put(&mut store, "doc://a", "gone soon");
        let hash = store
            .put_document(None, &key("doc://a"), DocumentFormat::PlainText)
            .expect("delete");
        assert_eq!(hash, Some(text_hash("gone soon")));
        assert_eq!(store.document_state(&key("doc://a")), None);
        assert!(store.search("gone").expect("search").is_empty());
        assert_eq!(store.resident_document_count(), 0);
    }

    #[test]
    fn test_invalid_utf8_is_rejected_before_mutation() {
        let (mut store, _, _) = store();
        put(&mut store, "doc://a", "kept");
        let result = store.put_document(
            Some(&[0xff, 0xfe, 0xfd]),
            &key("doc://a"),
            DocumentFormat::PlainText,
        );
        assert!(matches!(result, Err(StoreError::InvalidDocument(_))));
        assert_eq!(text(&mut store, "doc://a").as_deref(), Some("kept"));
        assert_eq!(store.undo_depth(), 1);
    }

    #[test]
    fn test_delete_document() {
        let (mut store, _, _) = store();
        put(&mut store, "doc://a", "alpha");
        assert!(store.delete_document(&key("doc://a")).expect("delete"));
        assert!(!store.delete_document(&key("doc://a")).expect("delete again"));
        assert_eq!(text(&mut store, "doc://a"), None);
        assert_eq!(store.undo_depth(), 2);
    }

    #[test]
    fn test_count_ceiling_parks_least_recently_used() {
        let (mut store, persistence, _) = store();
        put(&mut store, "doc://a", "one");
        put(&mut store, "doc://b", "two");
        put(&mut store, "doc://c", "three");
        text(&mut store, "doc://a");

        store.set_max_document_count(2).expect("limit");
        assert_eq!(store.resident_document_count(), 2);
        assert_eq!(store.document_state(&key("doc://b")), Some(DocumentState::Parked));
        assert_eq!(store.document_state(&key("doc://a")), Some(DocumentState::Resident));
        assert!(persistence.contains(&key("doc://b")));

        assert_eq!(text(&mut store, "doc://b").as_deref(), Some("two"));
        assert!(!persistence.contains(&key("doc://b")));
        assert_eq!(store.document_state(&key("doc://c")), Some(DocumentState::Parked));
        assert_eq!(store.resident_document_count(), 2);
    }

    #[test]
    fn test_byte_ceiling_counts_renderings() {
        let (mut store, _, _) = store();
        put(&mut store, "doc://a", "aaaa");
        put(&mut store, "doc://b", "bbbb");
        store.set_max_document_bytes(100_000).expect("limit");

        let rendering = store
            .get_document_as_rendering(&key("doc://a"))
            .expect("render")
            .expect("present");
        assert!(rendering.starts_with(b"%PDF"));
        assert_eq!(store.resident_document_bytes(), 8 + rendering.len());

        store.set_max_document_bytes(rendering.len() + 4).expect("limit");
        assert_eq!(store.document_state(&key("doc://b")), Some(DocumentState::Parked));
        assert_eq!(store.document_state(&key("doc://a")), Some(DocumentState::Resident));

        store.set_max_document_bytes(4).expect("limit");
        assert_eq!(store.document_state(&key("doc://a")), Some(DocumentState::Parked));
        assert_eq!(store.resident_document_bytes(), 0);
    }

    #[test]
    fn test_put_over_parked_document_returns_its_hash() {
        let (mut store, persistence, _) = store();
        store.set_max_document_count(1).expect("limit");
        put(&mut store, "doc://a", "original");
        put(&mut store, "doc://b", "other");
        assert_eq!(store.document_state(&key("doc://a")), Some(DocumentState::Parked));

        assert_eq!(put(&mut store, "doc://a", "replacement"), Some(text_hash("original")));
        assert!(!persistence.contains(&key("doc://a")));
        assert!(store.search("original").expect("search").is_empty());
    }

    #[test]
    fn test_ticks_are_strictly_increasing() {
        let (mut store, _, clock) = store();
        put(&mut store, "doc://a", "a");
        put(&mut store, "doc://b", "b");
        let a = store.last_use_time(&key("doc://a")).expect("resident");
        let b = store.last_use_time(&key("doc://b")).expect("resident");
        assert!(b > a);

        clock.advance(1_000_000);
        text(&mut store, "doc://a");
        assert_eq!(store.last_use_time(&key("doc://a")), Some(1_001_000));
    }

    #[test]
    fn test_open_applies_config() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config = StoreConfig {
            base_directory: dir.path().to_path_buf(),
            max_document_count: Some(1),
            max_document_bytes: None,
        };
        let mut store = DocumentStore::open(&config);
        assert_eq!(store.limits(), (Some(1), None));

        let records = DocumentPersistenceManager::new(dir.path());
        let one = records.record_path(&key("http://host/one")).expect("path");
        let two = records.record_path(&key("http://host/two")).expect("path");

        put(&mut store, "http://host/one", "first");
        put(&mut store, "http://host/two", "second");
        assert!(one.exists());
        assert_eq!(text(&mut store, "http://host/one").as_deref(), Some("first"));
        assert!(!one.exists());
        assert!(two.exists());
    }

    #[test]
    fn test_failed_park_keeps_document_resident() {
        let (mut store, persistence, _) = store();
        put(&mut store, "doc://a", "one");
        put(&mut store, "doc://b", "two");
        persistence.set_fail_writes(true);

        let result = store.set_max_document_count(1);
        assert!(matches!(result, Err(StoreError::Storage(_))));
        assert_eq!(store.resident_document_count(), 2);
        assert_eq!(store.document_state(&key("doc://a")), Some(DocumentState::Resident));

        persistence.set_fail_writes(false);
        put(&mut store, "doc://c", "three");
        assert_eq!(store.resident_document_count(), 1);
        assert_eq!(store.document_state(&key("doc://c")), Some(DocumentState::Resident));
    }

    #[test]
    fn test_lost_record_does_not_leave_stale_search_hits() {
        let (mut store, persistence, _) = store();
        put(&mut store, "doc://a", "ancient words");
        put(&mut store, "doc://b", "ancient history");
        store.set_max_document_count(0).expect("limit");
        assert!(persistence.lose(&key("doc://a")));
        assert!(persistence.lose(&key("doc://b")));
        store.set_max_document_count(10).expect("limit");

        assert_eq!(put(&mut store, "doc://a", "modern words"), None);
        assert!(!store.delete_document(&key("doc://b")).expect("delete"));

        assert!(store.search("ancient").expect("search").is_empty());
        assert!(store.search("history").expect("search").is_empty());
        assert_eq!(store.search("words").expect("search"), vec!["modern words".to_string()]);
        assert_eq!(store.document_state(&key("doc://b")), None);
    }

    #[test]
    fn test_put_succeeds_when_parking_afterwards_fails() {
        let (mut store, persistence, _) = store();
        store.set_max_document_count(1).expect("limit");
        put(&mut store, "doc://a", "one");
        put(&mut store, "doc://b", "first b");
        assert_eq!(store.document_state(&key("doc://a")), Some(DocumentState::Parked));
        persistence.set_fail_writes(true);

        assert_eq!(text(&mut store, "doc://a").as_deref(), Some("one"));
        assert_eq!(store.resident_document_count(), 2);

        assert_eq!(put(&mut store, "doc://b", "second b"), Some(text_hash("first b")));
        assert_eq!(store.undo_depth(), 3);
        assert_eq!(store.resident_document_count(), 2);
        assert_eq!(store.document_state(&key("doc://b")), Some(DocumentState::Resident));

        persistence.set_fail_writes(false);
        assert_eq!(put(&mut store, "doc://c", "three"), None);
        assert_eq!(store.resident_document_count(), 1);
        assert_eq!(store.undo_depth(), 4);
    }

    #[test]
    fn test_undo_and_delete_all_succeed_when_parking_fails() {
        let (mut store, persistence, _) = store();
        put(&mut store, "doc://a", "shared one");
        put(&mut store, "doc://b", "shared two");
        store.delete_all("shared").expect("delete all");
        store.set_max_document_count(1).expect("limit");
        persistence.set_fail_writes(true);

        store.undo().expect("undo");
        assert_eq!(store.resident_document_count(), 2);
        assert_eq!(store.undo_depth(), 2);

        let deleted = store.delete_all("two").expect("delete all");
        assert_eq!(deleted.len(), 1);
        assert_eq!(store.undo_depth(), 3);
        assert_eq!(store.resident_document_count(), 1);
    }
}
