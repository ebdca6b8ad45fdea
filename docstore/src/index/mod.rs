//! In-memory search and recency indexes.
//!
//! - [`Trie`]: normalized word → set of document keys, for keyword and
//!   prefix search.
//! - [`EvictionHeap`]: min-heap over document last-use times with a
//!   key → slot index, for least-recently-used eviction.

mod heap;
mod trie;

pub use heap::{EvictionHeap, HeapError};
pub use trie::Trie;
