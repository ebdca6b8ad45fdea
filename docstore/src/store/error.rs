//! Errors returned by the document store.

use crate::document::{DocumentError, DocumentKey, RenderError};
use crate::index::HeapError;
use crate::storage::btree::BTreeError;

/// Errors that can occur during store operations.
///
/// Invalid input is rejected before anything is mutated. Storage failures
/// leave the affected document in the state it had before the failing step.
#[derive(Debug)]
pub enum StoreError {
    /// The key or the ingested bytes were rejected.
    InvalidDocument(DocumentError),
    /// `undo` was called with an empty undo stack.
    NothingToUndo,
    /// `undo_key` found no command touching the key.
    NoUndoForKey(DocumentKey),
    /// The index or the persistence layer behind it failed.
    Storage(BTreeError),
    /// A rendering could not be produced.
    Render(RenderError),
    /// The eviction heap and the index disagree.
    Heap(HeapError),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidDocument(e) => write!(f, "invalid document: {e}"),
            Self::NothingToUndo => write!(f, "nothing to undo"),
            Self::NoUndoForKey(key) => write!(f, "nothing to undo for {key}"),
            Self::Storage(e) => write!(f, "storage error: {e}"),
            Self::Render(e) => write!(f, "render error: {e}"),
            Self::Heap(e) => write!(f, "heap error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidDocument(e) => Some(e),
            Self::Storage(e) => Some(e),
            Self::Render(e) => Some(e),
            Self::Heap(e) => Some(e),
            Self::NothingToUndo | Self::NoUndoForKey(_) => None,
        }
    }
}

impl From<DocumentError> for StoreError {
    fn from(e: DocumentError) -> Self {
        Self::InvalidDocument(e)
    }
}

impl From<BTreeError> for StoreError {
    fn from(e: BTreeError) -> Self {
        Self::Storage(e)
    }
}

impl From<RenderError> for StoreError {
    fn from(e: RenderError) -> Self {
        Self::Render(e)
    }
}

impl From<HeapError> for StoreError {
    fn from(e: HeapError) -> Self {
        Self::Heap(e)
    }
}
