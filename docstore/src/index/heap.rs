//! Index-tracked binary min-heap used to find the least recently used document.
//!
//! Each element is a key paired with a priority (a document's last-use time).
//! Next to the array, the heap keeps a key → slot map so that any element,
//! not just the root, can be moved in O(log n) after its priority changes.
//!
//! # Invariants
//!
//! - For every slot `i > 0`: `slots[parent(i)] <= slots[i]` ordered by
//!   `(priority, key)`.
//! - `positions[key] == i` if and only if `slots[i].key == key`.
//! - `positions.len() == slots.len()`.
//!
//! The array and the map are only ever mutated together, in [`swap`] and in
//! the push/pop paths.
//!
//! [`swap`]: EvictionHeap::swap

use std::collections::HashMap;
use std::hash::Hash;

/// A single heap element.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Slot<K, P> {
    priority: P,
    key: K,
}

/// Min-heap with reverse lookup from key to array slot.
#[derive(Debug)]
pub struct EvictionHeap<K, P> {
    slots: Vec<Slot<K, P>>,
    positions: HashMap<K, usize>,
}

impl<K, P> Default for EvictionHeap<K, P> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            positions: HashMap::new(),
        }
    }
}

impl<K, P> EvictionHeap<K, P>
where
    K: Ord + Hash + Clone,
    P: Ord + Copy,
{
    /// Create an empty heap.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the heap is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether `key` is tracked by the heap.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.positions.contains_key(key)
    }

    /// Current slot of `key`.
    pub fn position(&self, key: &K) -> Result<usize, HeapError> {
        self.positions.get(key).copied().ok_or(HeapError::NotFound)
    }

    /// Current priority of `key`, if tracked.
    #[must_use]
    pub fn priority(&self, key: &K) -> Option<P> {
        self.positions.get(key).map(|&i| self.slots[i].priority)
    }

    /// The minimum element without removing it.
    #[must_use]
    pub fn peek_min(&self) -> Option<(&K, P)> {
        self.slots.first().map(|slot| (&slot.key, slot.priority))
    }

    /// Insert a new element.
    ///
    /// # Errors
    ///
    /// Returns [`HeapError::Duplicate`] if `key` is already tracked; use
    /// [`reheapify`](Self::reheapify) to change its priority instead.
    pub fn insert(&mut self, key: K, priority: P) -> Result<(), HeapError> {
        if self.positions.contains_key(&key) {
            return Err(HeapError::Duplicate);
        }
        let index = self.slots.len();
        self.positions.insert(key.clone(), index);
        self.slots.push(Slot { priority, key });
        self.up_heap(index);
        Ok(())
    }

    /// Remove and return the element with the smallest priority.
    ///
    /// Ties are broken by key order so eviction is deterministic.
    pub fn remove_min(&mut self) -> Result<(K, P), HeapError> {
        let slot = self.take(0)?;
        Ok((slot.key, slot.priority))
    }

    /// Give `key` a new priority and restore heap order around it.
    ///
    /// The priority may have moved in either direction, so this sifts both up
    /// and down from the element's current slot.
    pub fn reheapify(&mut self, key: &K, priority: P) -> Result<(), HeapError> {
        let index = self.position(key)?;
        self.slots[index].priority = priority;
        let index = self.up_heap(index);
        self.down_heap(index);
        Ok(())
    }

    /// Remove an arbitrary element and return its priority.
    pub fn remove(&mut self, key: &K) -> Result<P, HeapError> {
        let index = self.position(key)?;
        Ok(self.take(index)?.priority)
    }

    /// Iterate over `(key, priority)` pairs in array order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, P)> {
        self.slots.iter().map(|slot| (&slot.key, slot.priority))
    }

    /// Check that the position map and the heap order agree with the array.
    ///
    /// Returns a description of the first inconsistency found.
    pub fn check_consistency(&self) -> Result<(), String> {
        if self.positions.len() != self.slots.len() {
            return Err(format!(
                "index map tracks {} elements but array holds {}",
                self.positions.len(),
                self.slots.len()
            ));
        }
        for (i, slot) in self.slots.iter().enumerate() {
            match self.positions.get(&slot.key) {
                Some(&recorded) if recorded == i => {}
                Some(&recorded) => {
                    return Err(format!("element at slot {i} is indexed at slot {recorded}"));
                }
                None => return Err(format!("element at slot {i} is missing from the index map")),
            }
            if i > 0 && self.slots[parent(i)] > *slot {
                return Err(format!("slot {i} is smaller than its parent"));
            }
        }
        Ok(())
    }

    /// Remove the slot at `index`, keeping array and map in step.
    fn take(&mut self, index: usize) -> Result<Slot<K, P>, HeapError> {
        let last = self.slots.len().checked_sub(1).ok_or(HeapError::Empty)?;
        self.swap(index, last);
        let slot = self.slots.pop().ok_or(HeapError::Empty)?;
        self.positions.remove(&slot.key);
        if index < self.slots.len() {
            let index = self.up_heap(index);
            self.down_heap(index);
        }
        Ok(slot)
    }

    /// Move the element at `k` towards the root while it is smaller than its
    /// parent. Returns its final slot.
    fn up_heap(&mut self, mut k: usize) -> usize {
        while k > 0 && self.slots[parent(k)] > self.slots[k] {
            self.swap(k, parent(k));
            k = parent(k);
        }
        k
    }

    /// Move the element at `k` towards the leaves until it is no larger than
    /// both children.
    fn down_heap(&mut self, mut k: usize) {
        let count = self.slots.len();
        loop {
            let left = 2 * k + 1;
            if left >= count {
                break;
            }
            let mut smaller = left;
            if left + 1 < count && self.slots[left] > self.slots[left + 1] {
                smaller = left + 1;
            }
            if self.slots[k] <= self.slots[smaller] {
                break;
            }
            self.swap(k, smaller);
            k = smaller;
        }
    }

    fn swap(&mut self, i: usize, j: usize) {
        if i == j {
            return;
        }
        self.slots.swap(i, j);
        if let Some(position) = self.positions.get_mut(&self.slots[i].key) {
            *position = i;
        }
        if let Some(position) = self.positions.get_mut(&self.slots[j].key) {
            *position = j;
        }
    }
}

const fn parent(k: usize) -> usize {
    (k - 1) / 2
}

/// Errors that can occur during heap operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
    /// `remove_min` on an empty heap.
    Empty,
    /// The element is not tracked by the heap.
    NotFound,
    /// The element is already tracked by the heap.
    Duplicate,
}

impl std::fmt::Display for HeapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "heap is empty"),
            Self::NotFound => write!(f, "element is not in the heap"),
            Self::Duplicate => write!(f, "element is already in the heap"),
        }
    }
}

impl std::error::Error for HeapError {}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_remove_min_returns_in_priority_order() {
        let mut heap = EvictionHeap::new();
        for (key, priority) in [("e", 50u64), ("b", 20), ("d", 40), ("a", 10), ("c", 30)] {
            heap.insert(key, priority).expect("insert");
        }

        let mut order = Vec::new();
        while let Ok((key, _)) = heap.remove_min() {
            order.push(key);
        }
        assert_eq!(order, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_remove_min_on_empty_heap() {
        let mut heap: EvictionHeap<&str, u64> = EvictionHeap::new();
        assert_eq!(heap.remove_min(), Err(HeapError::Empty));
    }

    #[test]
    fn test_heap_emptied_by_remove_reports_empty() {
        let mut heap = EvictionHeap::new();
        heap.insert("only", 7u64).expect("insert");
        assert_eq!(heap.remove(&"only"), Ok(7));
        assert_eq!(heap.remove_min(), Err(HeapError::Empty));
        assert!(heap.is_empty());
        heap.check_consistency().expect("consistent");
    }

    #[test]
    fn test_reheapify_moves_element_in_both_directions() {
        let mut heap = EvictionHeap::new();
        for (key, priority) in [("a", 1u64), ("b", 2), ("c", 3), ("d", 4)] {
            heap.insert(key, priority).expect("insert");
        }

        // Most recently used: "a" moves to the bottom.
        heap.reheapify(&"a", 100).expect("reheapify up");
        assert_eq!(heap.peek_min(), Some((&"b", 2)));

        // "d" becomes the coldest element.
        heap.reheapify(&"d", 0).expect("reheapify down");
        assert_eq!(heap.peek_min(), Some((&"d", 0)));
        heap.check_consistency().expect("consistent");
    }

    #[test]
    fn test_lookup_of_absent_element() {
        let mut heap: EvictionHeap<&str, u64> = EvictionHeap::new();
        heap.insert("a", 1).expect("insert");
        assert_eq!(heap.position(&"missing"), Err(HeapError::NotFound));
        assert_eq!(heap.reheapify(&"missing", 5), Err(HeapError::NotFound));
        assert_eq!(heap.remove(&"missing"), Err(HeapError::NotFound));
    }

    #[test]
    fn test_duplicate_insert_is_rejected() {
        let mut heap = EvictionHeap::new();
        heap.insert("a", 1u64).expect("insert");
        assert_eq!(heap.insert("a", 2), Err(HeapError::Duplicate));
        assert_eq!(heap.len(), 1);
        assert_eq!(heap.priority(&"a"), Some(1));
    }

    #[test]
    fn test_remove_arbitrary_element() {
        let mut heap = EvictionHeap::new();
        for i in 0..10u64 {
            heap.insert(i, i * 10).expect("insert");
        }
        assert_eq!(heap.remove(&4), Ok(40));
        assert!(!heap.contains(&4));
        heap.check_consistency().expect("consistent");

        let drained: Vec<u64> = std::iter::from_fn(|| heap.remove_min().ok().map(|(k, _)| k)).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_equal_priorities_break_ties_by_key() {
        let mut heap = EvictionHeap::new();
        heap.insert("b", 7u64).expect("insert");
        heap.insert("a", 7).expect("insert");
        assert_eq!(heap.remove_min(), Ok(("a", 7)));
    }

    #[test]
    fn test_index_stays_consistent_under_random_operations() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut heap = EvictionHeap::new();
        let mut model: HashMap<u32, u64> = HashMap::new();

        for step in 0..5_000u64 {
            let key = rng.random_range(0..64u32);
            match rng.random_range(0..4) {
                0 => {
                    if heap.insert(key, step).is_ok() {
                        model.insert(key, step);
                    }
                }
                1 => {
                    let expected = model.iter().map(|(k, p)| (*p, *k)).min();
                    match heap.remove_min() {
                        Ok((k, p)) => {
                            assert_eq!(expected, Some((p, k)), "not the global minimum");
                            model.remove(&k);
                        }
                        Err(e) => {
                            assert_eq!(e, HeapError::Empty);
                            assert!(model.is_empty());
                        }
                    }
                }
                2 => {
                    let priority = rng.random_range(0..10_000u64);
                    if heap.reheapify(&key, priority).is_ok() {
                        model.insert(key, priority);
                    } else {
                        assert!(!model.contains_key(&key));
                    }
                }
                _ => {
                    if heap.remove(&key).is_ok() {
                        model.remove(&key);
                    }
                }
            }

            heap.check_consistency().expect("heap consistent");
            for (key, priority) in heap.iter() {
                let slot = heap.position(key).expect("tracked");
                assert_eq!(heap.slots[slot].key, *key);
                assert_eq!(model.get(key), Some(&priority));
            }
            assert_eq!(heap.len(), model.len());
        }
    }
}
