//! Character trie mapping normalized words to sets of values.
//!
//! Keys are passed through [`normalize`] before traversal, so `"Hello!"`,
//! `"hello"` and `"HELLO"` all reach the same node. Each node has one child
//! link per normalized character code and a set of values that terminate at
//! it; a word may map to many values.
//!
//! The trie has no ordering opinion of its own: the sorted getters take a
//! caller-supplied comparator.
//!
//! # Invariants
//!
//! - Apart from the root, no reachable node is empty (no values and no
//!   children). Every removal prunes nodes that become empty on its path.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::hash::Hash;

use crate::text::{ALPHABET_SIZE, normalize};

struct TrieNode<V> {
    values: HashSet<V>,
    children: [Option<Box<TrieNode<V>>>; ALPHABET_SIZE],
}

impl<V: Eq + Hash + Clone> TrieNode<V> {
    fn new() -> Self {
        Self {
            values: HashSet::new(),
            children: std::array::from_fn(|_| None),
        }
    }

    fn is_empty(&self) -> bool {
        self.values.is_empty() && self.children.iter().all(Option::is_none)
    }

    /// Union of the values at this node and everything below it.
    fn collect_into(&self, out: &mut HashSet<V>) {
        out.extend(self.values.iter().cloned());
        for child in self.children.iter().flatten() {
            child.collect_into(out);
        }
    }

    fn child(&self, c: u8) -> Option<&Self> {
        self.children[usize::from(c)].as_deref()
    }
}

/// A trie over normalized words.
pub struct Trie<V> {
    root: TrieNode<V>,
}

impl<V: Eq + Hash + Clone> Default for Trie<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Eq + Hash + Clone> Trie<V> {
    /// Create an empty trie.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: TrieNode::new(),
        }
    }

    /// Add `value` under `key`.
    ///
    /// Adding a value that is already present is a no-op. Keys that
    /// normalize to the empty string are ignored.
    pub fn put(&mut self, key: &str, value: V) {
        let key = normalize(key);
        if key.is_empty() {
            return;
        }
        let mut node = &mut self.root;
        for c in key.bytes() {
            node = node.children[usize::from(c)]
                .get_or_insert_with(|| Box::new(TrieNode::new()))
                .as_mut();
        }
        node.values.insert(value);
    }

    /// All values stored exactly at `key`.
    #[must_use]
    pub fn get_all(&self, key: &str) -> HashSet<V> {
        self.find(&normalize(key))
            .map(|node| node.values.clone())
            .unwrap_or_default()
    }

    /// All values stored exactly at `key`, ordered by `compare`.
    ///
    /// Callers pass a comparator that yields the order they want; the store
    /// uses one that sorts by descending occurrence count.
    pub fn get_all_sorted<F>(&self, key: &str, compare: F) -> Vec<V>
    where
        F: FnMut(&V, &V) -> Ordering,
    {
        let mut values: Vec<V> = self.get_all(key).into_iter().collect();
        values.sort_by(compare);
        values
    }

    /// All values stored at `prefix` or at any word that starts with it.
    #[must_use]
    pub fn get_all_with_prefix(&self, prefix: &str) -> HashSet<V> {
        let mut values = HashSet::new();
        if let Some(node) = self.find(&normalize(prefix)) {
            node.collect_into(&mut values);
        }
        values
    }

    /// Prefix variant of [`get_all_sorted`](Self::get_all_sorted).
    pub fn get_all_with_prefix_sorted<F>(&self, prefix: &str, compare: F) -> Vec<V>
    where
        F: FnMut(&V, &V) -> Ordering,
    {
        let mut values: Vec<V> = self.get_all_with_prefix(prefix).into_iter().collect();
        values.sort_by(compare);
        values
    }

    /// Remove `value` from the node for `key` only.
    ///
    /// Returns the removed value, or `None` if `key` did not hold it.
    pub fn delete(&mut self, key: &str, value: &V) -> Option<V> {
        let key = normalize(key);
        if key.is_empty() {
            return None;
        }
        let mut removed = None;
        detach(&mut self.root, key.as_bytes(), &mut |node: &mut TrieNode<V>| {
            removed = node.values.take(value);
        });
        removed
    }

    /// Remove every value stored at `key`, leaving longer words untouched.
    pub fn delete_all(&mut self, key: &str) -> HashSet<V> {
        let key = normalize(key);
        if key.is_empty() {
            return HashSet::new();
        }
        let mut removed = HashSet::new();
        detach(&mut self.root, key.as_bytes(), &mut |node: &mut TrieNode<V>| {
            removed = std::mem::take(&mut node.values);
        });
        removed
    }

    /// Remove the whole subtree rooted at the last character of `prefix`.
    ///
    /// Returns every value that was reachable from it.
    pub fn delete_all_with_prefix(&mut self, prefix: &str) -> HashSet<V> {
        let prefix = normalize(prefix);
        if prefix.is_empty() {
            return HashSet::new();
        }
        let mut removed = HashSet::new();
        detach(&mut self.root, prefix.as_bytes(), &mut |node: &mut TrieNode<V>| {
            node.collect_into(&mut removed);
            *node = TrieNode::new();
        });
        removed
    }

    /// Remove `value` from every word that holds it, for when the words it
    /// was indexed under are no longer known.
    ///
    /// Visits the whole trie. Returns how many words held `value`.
    pub fn delete_everywhere(&mut self, value: &V) -> usize {
        let mut removed = 0;
        purge(&mut self.root, value, &mut removed);
        removed
    }

    /// Whether the trie holds no values at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    fn find(&self, key: &str) -> Option<&TrieNode<V>> {
        if key.is_empty() {
            return None;
        }
        key.bytes().try_fold(&self.root, |node, c| node.child(c))
    }
}

/// Walk `path` from `node`, apply `at_end` to the terminal node, then prune
/// every node on the way back up that became empty.
///
/// Returns whether `node` itself is now empty. A missing path is a no-op.
fn detach<V, F>(node: &mut TrieNode<V>, path: &[u8], at_end: &mut F) -> bool
where
    V: Eq + Hash + Clone,
    F: FnMut(&mut TrieNode<V>),
{
    match path.split_first() {
        None => at_end(node),
        Some((&c, rest)) => {
            let index = usize::from(c);
            let emptied = match node.children[index].as_deref_mut() {
                Some(child) => detach(child, rest, at_end),
                None => false,
            };
            if emptied {
                node.children[index] = None;
            }
        }
    }
    node.is_empty()
}

/// Remove `value` from `node` and its subtree, pruning emptied children.
///
/// Returns whether `node` itself is now empty.
fn purge<V: Eq + Hash + Clone>(node: &mut TrieNode<V>, value: &V, removed: &mut usize) -> bool {
    if node.values.remove(value) {
        *removed += 1;
    }
    for slot in &mut node.children {
        let emptied = slot
            .as_deref_mut()
            .is_some_and(|child| purge(child, value, removed));
        if emptied {
            *slot = None;
        }
    }
    node.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descending(a: &&str, b: &&str) -> Ordering {
        b.cmp(a)
    }

    #[test]
    fn test_lookup_is_case_and_punctuation_insensitive() {
        let mut trie = Trie::new();
        trie.put("Hello!", "v");

        assert_eq!(trie.get_all_sorted("hello", descending), vec!["v"]);
        assert_eq!(trie.get_all_sorted("HELLO", descending), vec!["v"]);
        assert_eq!(trie.get_all_sorted("h.e.l.l.o", descending), vec!["v"]);
    }

    #[test]
    fn test_put_has_set_semantics() {
        let mut trie = Trie::new();
        trie.put("word", 1);
        trie.put("WORD", 1);
        trie.put("word", 2);
        assert_eq!(trie.get_all("word"), HashSet::from([1, 2]));
    }

    #[test]
    fn test_sorted_getters_use_the_comparator() {
        let mut trie = Trie::new();
        for value in ["b", "c", "a"] {
            trie.put("key", value);
        }
        assert_eq!(trie.get_all_sorted("key", descending), vec!["c", "b", "a"]);
        assert_eq!(trie.get_all_sorted("key", |a: &&str, b: &&str| a.cmp(b)), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_prefix_lookup_collects_subtree() {
        let mut trie = Trie::new();
        trie.put("too", "A");
        trie.put("tool", "B");
        trie.put("tooth", "C");
        trie.put("toast", "D");

        assert_eq!(trie.get_all_with_prefix("TOO"), HashSet::from(["A", "B", "C"]));
        assert_eq!(trie.get_all_with_prefix("to"), HashSet::from(["A", "B", "C", "D"]));
        assert_eq!(trie.get_all_with_prefix_sorted("tool", descending), vec!["B"]);
        assert!(trie.get_all_with_prefix("tx").is_empty());
    }

    #[test]
    fn test_empty_key_matches_nothing() {
        let mut trie = Trie::new();
        trie.put("!!", "ignored");
        trie.put("word", "kept");
        assert!(trie.get_all("").is_empty());
        assert!(trie.get_all_with_prefix("").is_empty());
        assert!(trie.delete_all_with_prefix("").is_empty());
        assert_eq!(trie.get_all("word"), HashSet::from(["kept"]));
    }

    #[test]
    fn test_delete_all_with_prefix_scope() {
        let mut trie = Trie::new();
        trie.put("TOO", "A");
        trie.put("TOOL", "B");
        trie.put("TOOTH", "C");
        trie.put("TO", "D");

        let removed = trie.delete_all_with_prefix("TOO");
        assert_eq!(removed, HashSet::from(["A", "B", "C"]));

        assert!(trie.get_all("TOO").is_empty());
        assert!(trie.get_all("TOOL").is_empty());
        assert!(trie.get_all("TOOTH").is_empty());
        assert_eq!(trie.get_all("TO"), HashSet::from(["D"]));
    }

    #[test]
    fn test_delete_all_with_prefix_prunes_path() {
        let mut trie = Trie::new();
        trie.put("TOOTH", "C");
        trie.delete_all_with_prefix("TOOT");
        assert!(trie.is_empty());
    }

    #[test]
    fn test_delete_leaves_deeper_words() {
        let mut trie = Trie::new();
        trie.put("too", "A");
        trie.put("tool", "B");

        assert_eq!(trie.delete("too", &"A"), Some("A"));
        assert_eq!(trie.delete("too", &"A"), None);
        assert_eq!(trie.get_all("tool"), HashSet::from(["B"]));
    }

    #[test]
    fn test_delete_all_only_touches_one_node() {
        let mut trie = Trie::new();
        trie.put("too", "A");
        trie.put("too", "Z");
        trie.put("tool", "B");

        assert_eq!(trie.delete_all("TOO"), HashSet::from(["A", "Z"]));
        assert!(trie.get_all("too").is_empty());
        assert_eq!(trie.get_all_with_prefix("too"), HashSet::from(["B"]));
    }

    #[test]
    fn test_removing_last_value_prunes_to_empty() {
        let mut trie = Trie::new();
        trie.put("alpha", 1);
        trie.put("alps", 2);

        trie.delete("alpha", &1);
        assert!(!trie.is_empty());
        trie.delete_all("alps");
        assert!(trie.is_empty());
    }

    #[test]
    fn test_delete_of_missing_key_is_noop() {
        let mut trie = Trie::new();
        trie.put("present", 1);
        assert_eq!(trie.delete("absent", &1), None);
        assert!(trie.delete_all("absent").is_empty());
        assert!(trie.delete_all_with_prefix("abs").is_empty());
        assert_eq!(trie.get_all("present"), HashSet::from([1]));
    }

    #[test]
    fn test_delete_everywhere_removes_value_from_all_words() {
        let mut trie = Trie::new();
        trie.put("apple", "stale");
        trie.put("apply", "stale");
        trie.put("apply", "live");
        trie.put("banana", "stale");

        assert_eq!(trie.delete_everywhere(&"stale"), 3);
        assert!(trie.get_all("apple").is_empty());
        assert!(trie.get_all("banana").is_empty());
        assert_eq!(trie.get_all_with_prefix("a"), HashSet::from(["live"]));
        assert_eq!(trie.delete_everywhere(&"stale"), 0);

        trie.delete_everywhere(&"live");
        assert!(trie.is_empty());
    }
}
