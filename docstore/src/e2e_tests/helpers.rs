//! Common helpers for end-to-end tests.

use std::path::PathBuf;
use std::rc::Rc;

use tempfile::TempDir;

use crate::document::DocumentFormat;
use crate::simulation::{InvariantChecker, SimulatedPersistence, SimulatedTimeSource};
use crate::storage::DocumentPersistenceManager;
use crate::store::{DocumentState, DocumentStore};
use crate::testing;

pub use crate::testing::key;

/// A store under test with convenience wrappers that panic on error.
pub struct TestStore {
    pub store: DocumentStore,
    pub persistence: Option<SimulatedPersistence>,
    pub clock: Option<Rc<SimulatedTimeSource>>,
    /// Keeps the record directory alive for disk-backed stores.
    pub dir: Option<TempDir>,
}

impl TestStore {
    /// A store on simulated persistence and a simulated clock.
    #[must_use]
    pub fn new() -> Self {
        let (store, persistence, clock) = testing::simulated_store();
        Self {
            store,
            persistence: Some(persistence),
            clock: Some(clock),
            dir: None,
        }
    }

    /// A store writing records to a temporary directory.
    #[must_use]
    pub fn on_disk() -> Self {
        let (store, dir) = testing::disk_store();
        Self {
            store,
            persistence: None,
            clock: None,
            dir: Some(dir),
        }
    }

    pub fn put(&mut self, k: &str, text: &str) -> Option<u32> {
        self.store
            .put_document(Some(text.as_bytes()), &key(k), DocumentFormat::PlainText)
            .expect("put document")
    }

    pub fn text(&mut self, k: &str) -> Option<String> {
        self.store
            .get_document_as_text(&key(k))
            .expect("get document text")
    }

    pub fn search(&mut self, keyword: &str) -> Vec<String> {
        self.store.search(keyword).expect("search")
    }

    pub fn search_by_prefix(&mut self, prefix: &str) -> Vec<String> {
        self.store.search_by_prefix(prefix).expect("prefix search")
    }

    pub fn state(&self, k: &str) -> Option<DocumentState> {
        self.store.document_state(&key(k))
    }

    /// Where a disk-backed store keeps the record of `k`.
    pub fn record_path(&self, k: &str) -> PathBuf {
        let dir = self.dir.as_ref().expect("disk-backed store");
        DocumentPersistenceManager::new(dir.path())
            .record_path(&key(k))
            .expect("record path")
    }

    /// Advance the simulated clock, if there is one.
    pub fn advance(&self, ns: u64) {
        if let Some(clock) = &self.clock {
            clock.advance(ns);
        }
    }

    /// Assert that every structural invariant of the store holds.
    pub fn assert_consistent(&self) {
        let mut checker = InvariantChecker::new();
        checker.check_structure(&self.store, 0);
        checker.check_residency(&self.store, 0);
        checker.check_ceilings(&self.store, 0);
        if let Some(persistence) = &self.persistence {
            checker.check_persistence(&self.store, persistence, 0);
        }
        assert!(!checker.has_violations(), "{:?}", checker.violations());
    }
}
