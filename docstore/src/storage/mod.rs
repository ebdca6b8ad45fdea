//! Storage layer: the primary index and where parked documents go.
//!
//! - [`btree`]: in-memory B-tree whose values can be parked individually
//! - [`PersistenceManager`]: the contract parked values are handed to
//! - [`DocumentPersistenceManager`]: one JSON record per parked document on
//!   local disk
//! - [`time`]: clock abstraction used for recency stamps

pub mod btree;
mod disk;
mod persistence;
pub mod time;

pub use disk::{DocumentPersistenceManager, DocumentRecord};
pub use persistence::{PersistenceError, PersistenceManager};
