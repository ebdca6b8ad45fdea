//! Arena B-tree with per-entry parking of values.
//!
//! Every key stays in memory for the lifetime of the tree. Its value can be
//! handed to a [`PersistenceManager`] with [`BTree::move_to_disk`] and is
//! paged back in transparently by the next [`BTree::get`] or
//! [`BTree::get_mut`].
//!
//! # Invariants
//!
//! - Entries within a node are in strictly ascending key order, and a
//!   separator's key is the smallest key stored under its child.
//! - Non-root nodes hold between `MAX_ENTRIES / 2` and `MAX_ENTRIES - 1`
//!   entries.
//! - All external nodes are at depth `height`.
//! - Node 0 is the leftmost external node; following `next` from it visits
//!   every external node in key order.
//! - Keys are never removed: [`BTree::clear`] leaves a vacant entry.

use tracing::{debug, warn};

use crate::storage::btree::node::{Entry, LeafValue, MAX_ENTRIES, Node, NodeId, ValueState};
use crate::storage::persistence::{PersistenceError, PersistenceManager};

/// Ordered map whose values may be parked in secondary storage.
pub struct BTree<K, V> {
    nodes: Vec<Node<K, V>>,
    root: NodeId,
    height: usize,
    len: usize,
    persistence: Option<Box<dyn PersistenceManager<K, V>>>,
}

impl<K: Ord + Clone + std::fmt::Debug, V> Default for BTree<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + Clone + std::fmt::Debug, V> BTree<K, V> {
    /// Create an empty tree with no persistence manager.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new()],
            root: 0,
            height: 0,
            len: 0,
            persistence: None,
        }
    }

    /// Install the manager that receives parked values.
    ///
    /// Values already parked under a previous manager stay with it and can
    /// no longer be paged in.
    pub fn set_persistence_manager(&mut self, manager: Box<dyn PersistenceManager<K, V>>) {
        self.persistence = Some(manager);
    }

    /// Number of keys, including parked and vacant ones.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the tree holds no keys.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Height of the tree; 0 while the root is external.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Look up `key`, paging its value in if it is parked.
    ///
    /// # Post-conditions
    ///
    /// - On success a previously parked entry is resident and its persisted
    ///   record is gone.
    /// - On error the entry is left parked.
    pub fn get(&mut self, key: &K) -> Result<Option<&V>, BTreeError> {
        let Some((node, index)) = self.locate(key) else {
            return Ok(None);
        };
        self.page_in(node, index, key)?;
        Ok(self.nodes[node].entries[index]
            .slot()
            .and_then(LeafValue::resident))
    }

    /// Mutable variant of [`get`](Self::get).
    pub fn get_mut(&mut self, key: &K) -> Result<Option<&mut V>, BTreeError> {
        let Some((node, index)) = self.locate(key) else {
            return Ok(None);
        };
        self.page_in(node, index, key)?;
        match self.nodes[node].entries[index].slot_mut() {
            Some(LeafValue::Resident(value)) => Ok(Some(value)),
            _ => Ok(None),
        }
    }

    /// Read a resident value without paging anything in.
    #[must_use]
    pub fn peek(&self, key: &K) -> Option<&V> {
        let (node, index) = self.locate(key)?;
        self.nodes[node].entries[index]
            .slot()
            .and_then(LeafValue::resident)
    }

    /// State of `key`, or `None` if the tree has never held it.
    #[must_use]
    pub fn state(&self, key: &K) -> Option<ValueState> {
        let (node, index) = self.locate(key)?;
        self.nodes[node].entries[index].slot().map(LeafValue::state)
    }

    /// Store `value` under `key` and return the value it replaced.
    ///
    /// A parked previous value is fetched from (and thereby deleted in) the
    /// persistence layer so it can be returned. A previous record that has
    /// gone missing is reported as no previous value.
    pub fn put(&mut self, key: K, value: V) -> Result<Option<V>, BTreeError> {
        if let Some((node, index)) = self.locate(&key) {
            let previous = self.take_previous(node, index, &key)?;
            if let Some(slot) = self.nodes[node].entries[index].slot_mut() {
                *slot = LeafValue::Resident(value);
            }
            return Ok(previous);
        }

        if let Some(sibling) = self.insert(self.root, key, value) {
            self.grow(sibling);
        }
        self.len += 1;
        Ok(None)
    }

    /// Make `key` vacant and return the value it held.
    ///
    /// The key itself stays in the tree. Parked values are fetched first, as
    /// in [`put`](Self::put).
    pub fn clear(&mut self, key: &K) -> Result<Option<V>, BTreeError> {
        let Some((node, index)) = self.locate(key) else {
            return Ok(None);
        };
        let previous = self.take_previous(node, index, key)?;
        if let Some(slot) = self.nodes[node].entries[index].slot_mut() {
            *slot = LeafValue::Vacant;
        }
        Ok(previous)
    }

    /// Hand the value of `key` to the persistence manager.
    ///
    /// Returns whether a resident value was parked. Parked, vacant and absent
    /// keys are left alone. If serialization fails the value stays resident.
    pub fn move_to_disk(&mut self, key: &K) -> Result<bool, BTreeError> {
        let Some((node, index)) = self.locate(key) else {
            return Ok(false);
        };
        let Some(slot) = self.nodes[node].entries[index].slot_mut() else {
            return Ok(false);
        };
        let LeafValue::Resident(value) = &*slot else {
            return Ok(false);
        };
        let manager = self
            .persistence
            .as_mut()
            .ok_or(BTreeError::NoPersistenceManager)?;
        manager.serialize(key, value)?;
        *slot = LeafValue::Parked;
        debug!(?key, "parked value");
        Ok(true)
    }

    /// Iterate over every key and its value slot in ascending key order.
    #[must_use]
    pub const fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            tree: self,
            node: Some(0),
            index: 0,
        }
    }

    /// Verify the structural invariants of the tree.
    ///
    /// Returns a description of the first violation found.
    pub fn check_structure(&self) -> Result<(), String> {
        let mut leaves = Vec::new();
        self.check_node(self.root, 0, &mut leaves)?;

        let mut linked = Vec::new();
        let mut previous = None;
        let mut current = Some(0);
        while let Some(node) = current {
            if self.nodes[node].previous != previous {
                return Err(format!("node {node} has a stale previous link"));
            }
            linked.push(node);
            previous = Some(node);
            current = self.nodes[node].next;
        }
        if linked != leaves {
            return Err(format!(
                "leaf list {linked:?} does not match in-order leaves {leaves:?}"
            ));
        }

        let keys: Vec<&K> = self.iter().map(|(key, _)| key).collect();
        if keys.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err("keys are not strictly ascending".to_string());
        }
        if keys.len() != self.len {
            return Err(format!(
                "tree reports {} keys but holds {}",
                self.len,
                keys.len()
            ));
        }
        Ok(())
    }

    fn check_node(
        &self,
        node: NodeId,
        depth: usize,
        leaves: &mut Vec<NodeId>,
    ) -> Result<(), String> {
        let entries = &self.nodes[node].entries;
        if node != self.root && !(MAX_ENTRIES / 2..MAX_ENTRIES).contains(&entries.len()) {
            return Err(format!("node {node} holds {} entries", entries.len()));
        }
        if self.nodes[node].is_external() {
            if depth != self.height {
                return Err(format!(
                    "leaf {node} at depth {depth}, expected {}",
                    self.height
                ));
            }
            leaves.push(node);
            return Ok(());
        }
        for entry in entries {
            let Some(child) = entry.child() else {
                return Err(format!("node {node} mixes entry kinds"));
            };
            let smallest = self.nodes[child].entries.first().map(Entry::key);
            if smallest != Some(entry.key()) {
                return Err(format!("separator {:?} is not the minimum of its child", entry.key()));
            }
            self.check_node(child, depth + 1, leaves)?;
        }
        Ok(())
    }

    /// Find the external entry holding exactly `key`.
    fn locate(&self, key: &K) -> Option<(NodeId, usize)> {
        let mut node = self.root;
        loop {
            let index = self.nodes[node].floor_index(key);
            match self.nodes[node].entries.get(index)? {
                Entry::Separator { child, .. } => node = *child,
                Entry::Leaf { key: found, .. } => {
                    return (found == key).then_some((node, index));
                }
            }
        }
    }

    fn page_in(&mut self, node: NodeId, index: usize, key: &K) -> Result<(), BTreeError> {
        let Some(slot) = self.nodes[node].entries[index].slot_mut() else {
            return Ok(());
        };
        if !matches!(slot, LeafValue::Parked) {
            return Ok(());
        }
        let manager = self
            .persistence
            .as_mut()
            .ok_or(BTreeError::NoPersistenceManager)?;
        let value = manager
            .deserialize(key)?
            .ok_or_else(|| BTreeError::MissingRecord {
                key: format!("{key:?}"),
            })?;
        *slot = LeafValue::Resident(value);
        debug!(?key, "paged value in");
        Ok(())
    }

    /// Take the current value out of an entry, fetching it if parked.
    ///
    /// The slot is left in an unspecified state on success; callers
    /// overwrite it. On error it is untouched.
    fn take_previous(
        &mut self,
        node: NodeId,
        index: usize,
        key: &K,
    ) -> Result<Option<V>, BTreeError> {
        let Some(slot) = self.nodes[node].entries[index].slot_mut() else {
            return Ok(None);
        };
        match std::mem::replace(slot, LeafValue::Vacant) {
            LeafValue::Resident(value) => Ok(Some(value)),
            LeafValue::Vacant => Ok(None),
            LeafValue::Parked => {
                *slot = LeafValue::Parked;
                let manager = self
                    .persistence
                    .as_mut()
                    .ok_or(BTreeError::NoPersistenceManager)?;
                let previous = manager.deserialize(key)?;
                if previous.is_none() {
                    warn!(?key, "parked value had no persisted record");
                }
                Ok(previous)
            }
        }
    }

    /// Insert a new key below `node`.
    ///
    /// Returns the id of a new right sibling if `node` had to split.
    fn insert(&mut self, node: NodeId, key: K, value: V) -> Option<NodeId> {
        let index = self.nodes[node].floor_index(&key);
        let (position, entry) = match self.nodes[node].entries.get(index).and_then(Entry::child) {
            Some(child) => {
                if index == 0 && key < *self.nodes[node].entries[0].key() {
                    self.nodes[node].entries[0] = Entry::Separator {
                        key: key.clone(),
                        child,
                    };
                }
                let sibling = self.insert(child, key, value)?;
                let separator = self.nodes[sibling].entries[0].key().clone();
                (
                    index + 1,
                    Entry::Separator {
                        key: separator,
                        child: sibling,
                    },
                )
            }
            None => (
                self.nodes[node].insertion_index(&key),
                Entry::Leaf {
                    key,
                    value: LeafValue::Resident(value),
                },
            ),
        };

        self.nodes[node].entries.insert(position, entry);
        (self.nodes[node].entries.len() == MAX_ENTRIES).then(|| self.split(node))
    }

    /// Move the upper half of `node` into a new sibling and return its id.
    fn split(&mut self, node: NodeId) -> NodeId {
        let upper = self.nodes[node].entries.split_off(MAX_ENTRIES / 2);
        let id = self.nodes.len();
        let mut sibling = Node::with_entries(upper);
        if sibling.is_external() {
            let next = self.nodes[node].next;
            sibling.previous = Some(node);
            sibling.next = next;
            if let Some(next) = next {
                self.nodes[next].previous = Some(id);
            }
            self.nodes[node].next = Some(id);
        }
        self.nodes.push(sibling);
        id
    }

    /// Replace the root with a new internal node over the old root and its
    /// new sibling.
    fn grow(&mut self, sibling: NodeId) {
        let old_root = self.root;
        let left = self.nodes[old_root].entries[0].key().clone();
        let right = self.nodes[sibling].entries[0].key().clone();
        self.root = self.nodes.len();
        self.nodes.push(Node::with_entries(vec![
            Entry::Separator {
                key: left,
                child: old_root,
            },
            Entry::Separator {
                key: right,
                child: sibling,
            },
        ]));
        self.height += 1;
    }
}

/// Iterator over the entries of a [`BTree`] in key order.
pub struct Iter<'a, K, V> {
    tree: &'a BTree<K, V>,
    node: Option<NodeId>,
    index: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a LeafValue<V>);

    fn next(&mut self) -> Option<Self::Item> {
        let tree = self.tree;
        loop {
            let node = &tree.nodes[self.node?];
            match node.entries.get(self.index) {
                Some(Entry::Leaf { key, value }) => {
                    self.index += 1;
                    return Some((key, value));
                }
                Some(Entry::Separator { .. }) => {
                    self.node = None;
                }
                None => {
                    self.node = node.next;
                    self.index = 0;
                }
            }
        }
    }
}

/// Errors that can occur during B-tree operations.
#[derive(Debug)]
pub enum BTreeError {
    /// The persistence manager failed.
    Persistence(PersistenceError),
    /// A value is parked but no persistence manager is installed.
    NoPersistenceManager,
    /// A parked value has no persisted record.
    MissingRecord { key: String },
}

impl std::fmt::Display for BTreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Persistence(e) => write!(f, "persistence error: {e}"),
            Self::NoPersistenceManager => write!(f, "no persistence manager installed"),
            Self::MissingRecord { key } => write!(f, "no persisted record for parked key {key}"),
        }
    }
}

impl std::error::Error for BTreeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Persistence(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PersistenceError> for BTreeError {
    fn from(e: PersistenceError) -> Self {
        Self::Persistence(e)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;
    use std::rc::Rc;

    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    use super::*;

    /// In-memory manager whose records stay inspectable after the tree takes
    /// ownership of it.
    #[derive(Clone, Default)]
    struct MapPersistence {
        records: Rc<RefCell<HashMap<u32, String>>>,
        fail_writes: Rc<Cell<bool>>,
    }

    impl PersistenceManager<u32, String> for MapPersistence {
        fn serialize(&mut self, key: &u32, value: &String) -> Result<(), PersistenceError> {
            if self.fail_writes.get() {
                return Err(PersistenceError::InjectedFault("write".to_string()));
            }
            self.records.borrow_mut().insert(*key, value.clone());
            Ok(())
        }

        fn deserialize(&mut self, key: &u32) -> Result<Option<String>, PersistenceError> {
            Ok(self.records.borrow_mut().remove(key))
        }
    }

    fn tree_with_persistence() -> (BTree<u32, String>, MapPersistence) {
        let persistence = MapPersistence::default();
        let mut tree = BTree::new();
        tree.set_persistence_manager(Box::new(persistence.clone()));
        (tree, persistence)
    }

    #[test]
    fn test_btree_basic_operations() {
        let mut tree = BTree::<u32, String>::new();
        assert!(tree.is_empty());

        assert_eq!(tree.put(2, "two".to_string()).expect("put"), None);
        assert_eq!(tree.put(1, "one".to_string()).expect("put"), None);
        assert_eq!(tree.put(3, "three".to_string()).expect("put"), None);

        assert_eq!(tree.get(&1).expect("get").map(String::as_str), Some("one"));
        assert_eq!(tree.get(&3).expect("get").map(String::as_str), Some("three"));
        assert_eq!(tree.get(&4).expect("get"), None);
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn test_btree_update_returns_previous() {
        let mut tree = BTree::<u32, String>::new();
        tree.put(7, "old".to_string()).expect("put");
        let previous = tree.put(7, "new".to_string()).expect("put");
        assert_eq!(previous.as_deref(), Some("old"));
        assert_eq!(tree.peek(&7).map(String::as_str), Some("new"));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_btree_first_split_increases_height_by_one() {
        let mut tree = BTree::<u32, String>::new();
        for key in 0..MAX_ENTRIES - 1 {
            tree.put(u32::try_from(key).expect("small"), key.to_string()).expect("put");
        }
        assert_eq!(tree.height(), 0);

        tree.put(100, "overflow".to_string()).expect("put");
        assert_eq!(tree.height(), 1);
        tree.check_structure().expect("structure");
    }

    #[test]
    fn test_btree_order_invariant_with_shuffled_keys() {
        let mut keys: Vec<u32> = (0..500).collect();
        keys.shuffle(&mut StdRng::seed_from_u64(7));

        let mut tree = BTree::<u32, String>::new();
        for &key in &keys {
            tree.put(key, key.to_string()).expect("put");
        }
        tree.check_structure().expect("structure");

        let in_order: Vec<u32> = tree.iter().map(|(key, _)| *key).collect();
        assert_eq!(in_order, (0..500).collect::<Vec<_>>());
        for key in [0, 250, 499] {
            assert_eq!(tree.get(&key).expect("get"), Some(&key.to_string()));
        }
        assert!(tree.height() >= 3);
    }

    #[test]
    fn test_btree_descending_inserts_keep_separators_minimal() {
        let mut tree = BTree::<u32, String>::new();
        for key in (0..100).rev() {
            tree.put(key, String::new()).expect("put");
        }
        tree.check_structure().expect("structure");
        assert_eq!(tree.iter().next().map(|(key, _)| *key), Some(0));
    }

    #[test]
    fn test_btree_park_and_page_in_round_trip() {
        let (mut tree, persistence) = tree_with_persistence();
        tree.put(5, "five".to_string()).expect("put");

        assert!(tree.move_to_disk(&5).expect("park"));
        assert_eq!(tree.state(&5), Some(ValueState::Parked));
        assert_eq!(tree.peek(&5), None);
        assert!(persistence.records.borrow().contains_key(&5));

        assert_eq!(tree.get(&5).expect("get").map(String::as_str), Some("five"));
        assert_eq!(tree.state(&5), Some(ValueState::Resident));
        assert!(persistence.records.borrow().is_empty());
    }

    #[test]
    fn test_btree_move_to_disk_is_noop_unless_resident() {
        let (mut tree, persistence) = tree_with_persistence();
        assert!(!tree.move_to_disk(&1).expect("absent"));

        tree.put(1, "one".to_string()).expect("put");
        assert!(tree.move_to_disk(&1).expect("park"));
        assert!(!tree.move_to_disk(&1).expect("already parked"));

        tree.put(2, "two".to_string()).expect("put");
        tree.clear(&2).expect("clear");
        assert!(!tree.move_to_disk(&2).expect("vacant"));
        assert_eq!(persistence.records.borrow().len(), 1);
    }

    #[test]
    fn test_btree_put_over_parked_returns_persisted_value() {
        let (mut tree, persistence) = tree_with_persistence();
        tree.put(9, "first".to_string()).expect("put");
        tree.move_to_disk(&9).expect("park");

        let previous = tree.put(9, "second".to_string()).expect("put");
        assert_eq!(previous.as_deref(), Some("first"));
        assert!(persistence.records.borrow().is_empty());
        assert_eq!(tree.peek(&9).map(String::as_str), Some("second"));
    }

    #[test]
    fn test_btree_put_over_parked_with_missing_record() {
        let (mut tree, persistence) = tree_with_persistence();
        tree.put(9, "first".to_string()).expect("put");
        tree.move_to_disk(&9).expect("park");
        persistence.records.borrow_mut().clear();

        assert_eq!(tree.put(9, "second".to_string()).expect("put"), None);
        assert_eq!(tree.state(&9), Some(ValueState::Resident));
    }

    #[test]
    fn test_btree_get_of_parked_without_record_is_error() {
        let (mut tree, persistence) = tree_with_persistence();
        tree.put(3, "three".to_string()).expect("put");
        tree.move_to_disk(&3).expect("park");
        persistence.records.borrow_mut().clear();

        let error = tree.get(&3).expect_err("record is gone");
        assert!(matches!(error, BTreeError::MissingRecord { .. }));
        assert_eq!(tree.state(&3), Some(ValueState::Parked));
    }

    #[test]
    fn test_btree_failed_park_leaves_value_resident() {
        let (mut tree, persistence) = tree_with_persistence();
        tree.put(4, "four".to_string()).expect("put");
        persistence.fail_writes.set(true);

        let error = tree.move_to_disk(&4).expect_err("write fails");
        assert!(matches!(
            error,
            BTreeError::Persistence(PersistenceError::InjectedFault(_))
        ));
        assert_eq!(tree.peek(&4).map(String::as_str), Some("four"));
    }

    #[test]
    fn test_btree_park_without_manager_is_error() {
        let mut tree = BTree::<u32, String>::new();
        tree.put(1, "one".to_string()).expect("put");
        assert!(matches!(
            tree.move_to_disk(&1),
            Err(BTreeError::NoPersistenceManager)
        ));
        assert_eq!(tree.state(&1), Some(ValueState::Resident));
    }

    #[test]
    fn test_btree_clear_keeps_key() {
        let (mut tree, _persistence) = tree_with_persistence();
        tree.put(1, "one".to_string()).expect("put");
        tree.move_to_disk(&1).expect("park");

        assert_eq!(tree.clear(&1).expect("clear").as_deref(), Some("one"));
        assert_eq!(tree.state(&1), Some(ValueState::Vacant));
        assert_eq!(tree.get(&1).expect("get"), None);
        assert_eq!(tree.len(), 1);

        assert_eq!(tree.put(1, "again".to_string()).expect("put"), None);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_btree_get_mut_updates_in_place() {
        let mut tree = BTree::<u32, String>::new();
        tree.put(1, "a".to_string()).expect("put");
        tree.get_mut(&1).expect("get").expect("present").push('b');
        assert_eq!(tree.peek(&1).map(String::as_str), Some("ab"));
    }
}
