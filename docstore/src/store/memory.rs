//! Residency bookkeeping: which documents are in memory, and eviction.
//!
//! # Invariants
//!
//! - A key is in the heap if and only if its document is resident.
//! - `resident_count` and `resident_bytes` are the count and summed
//!   footprint of the documents in the heap.

use tracing::{debug, info, warn};

use crate::document::DocumentKey;
use crate::storage::btree::ValueState;
use crate::store::{DocumentStore, StoreError};

impl DocumentStore {
    /// Start tracking a resident document.
    pub(super) fn register(
        &mut self,
        key: DocumentKey,
        footprint: usize,
        last_use: u64,
    ) -> Result<(), StoreError> {
        self.heap.insert(key, last_use)?;
        self.resident_count += 1;
        self.resident_bytes += footprint;
        Ok(())
    }

    /// Stop tracking `key`. Returns whether it was tracked.
    pub(super) fn unregister(&mut self, key: &DocumentKey) -> Result<bool, StoreError> {
        if !self.heap.contains(key) {
            return Ok(false);
        }
        self.heap.remove(key)?;
        let footprint = self.tree.peek(key).map_or(0, |document| document.footprint());
        self.resident_count -= 1;
        self.resident_bytes -= footprint;
        Ok(true)
    }

    /// Make `key` resident without changing its recency.
    ///
    /// Returns whether a document exists under `key`. A parked document is
    /// paged in and tracked again with the last-use time it was parked with.
    pub(super) fn load(&mut self, key: &DocumentKey) -> Result<bool, StoreError> {
        match self.tree.state(key) {
            Some(ValueState::Resident) => Ok(true),
            Some(ValueState::Parked) => {
                let Some(document) = self.tree.get(key)? else {
                    return Ok(false);
                };
                let (footprint, last_use) = (document.footprint(), document.last_use());
                self.register(key.clone(), footprint, last_use)?;
                debug!(%key, "paged document in");
                Ok(true)
            }
            Some(ValueState::Vacant) | None => Ok(false),
        }
    }

    /// Make `key` resident and stamp it as used at `now`.
    pub(super) fn touch(&mut self, key: &DocumentKey, now: u64) -> Result<bool, StoreError> {
        if !self.load(key)? {
            return Ok(false);
        }
        if let Some(document) = self.tree.get_mut(key)? {
            document.set_last_use(now);
        }
        self.heap.reheapify(key, now)?;
        Ok(true)
    }

    /// Add `delta` bytes to a tracked document's footprint.
    pub(super) fn grow_footprint(&mut self, delta: usize) {
        self.resident_bytes += delta;
    }

    fn over_limit(&self) -> bool {
        self.max_document_count
            .is_some_and(|max| self.resident_count > max)
            || self
                .max_document_bytes
                .is_some_and(|max| self.resident_bytes > max)
    }

    /// Park least recently used documents until both ceilings hold.
    ///
    /// # Post-conditions
    ///
    /// - On success, neither ceiling is exceeded.
    /// - If parking fails the document stays resident and tracked, and the
    ///   error is returned.
    pub(super) fn manage_memory(&mut self) -> Result<(), StoreError> {
        while self.over_limit() {
            let (key, last_use) = self.heap.remove_min()?;
            let footprint = self.tree.peek(&key).map_or(0, |document| document.footprint());
            if let Err(e) = self.tree.move_to_disk(&key) {
                warn!(%key, error = %e, "failed to park document");
                self.heap.insert(key, last_use)?;
                return Err(e.into());
            }
            self.resident_count -= 1;
            self.resident_bytes -= footprint;
            info!(
                %key,
                resident_count = self.resident_count,
                resident_bytes = self.resident_bytes,
                "parked least recently used document"
            );
        }
        Ok(())
    }

    /// Run [`manage_memory`](Self::manage_memory) after a change that has
    /// already been applied and recorded for undo.
    ///
    /// A failed park does not undo the change: it is logged, the document
    /// stays resident, and the ceiling is retried after the next operation.
    pub(super) fn settle_memory(&mut self) {
        if let Err(e) = self.manage_memory() {
            warn!(
                error = %e,
                resident_count = self.resident_count,
                resident_bytes = self.resident_bytes,
                "resident ceiling left exceeded"
            );
        }
    }
}
