//! In-memory B-tree used as the primary key index.
//!
//! # Structure
//!
//! The tree is an arena of nodes addressed by index:
//! - Internal nodes hold separator entries, each pointing at a child whose
//!   smallest key it carries
//! - External nodes hold the keys and their value slots, and are doubly
//!   linked for in-order scans
//!
//! A value slot is resident, parked behind a [`PersistenceManager`], or
//! vacant.
//!
//! # Usage
//!
//! ```
//! use docstore::storage::btree::{BTree, ValueState};
//!
//! let mut tree = BTree::new();
//! tree.put("b", 2).expect("put");
//! tree.put("a", 1).expect("put");
//!
//! assert_eq!(tree.get(&"a").expect("get"), Some(&1));
//! assert_eq!(tree.state(&"b"), Some(ValueState::Resident));
//! ```
//!
//! [`PersistenceManager`]: crate::storage::PersistenceManager

mod node;
mod tree;

pub use node::{LeafValue, MAX_ENTRIES, NodeId, ValueState};
pub use tree::{BTree, BTreeError, Iter};
