// Life of a request:
// 1. Bytes come in with a key and a format
// 2. Ingest: validate UTF-8 or extract the text of a PDF
// 3. Index: B-tree by key, trie by word, eviction heap by last use
// 4. Record the inverse command on the undo stack
// 5. Park least recently used documents until both ceilings hold
//
// System components:
//  - B-tree with individually parkable values
//  - Word trie for keyword and prefix search
//  - Undo stack of single and grouped commands
//  - Persistence manager for parked documents

pub mod config;
pub mod document;
pub mod index;
pub mod simulation;
pub mod storage;
pub mod store;
pub mod text;
pub mod undo;

mod e2e_tests;
#[cfg(test)]
mod testing;

pub use config::StoreConfig;
pub use document::{Document, DocumentFormat, DocumentKey};
pub use store::{DocumentState, DocumentStore, StoreError};
