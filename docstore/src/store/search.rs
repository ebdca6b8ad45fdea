//! Keyword and prefix search, and the matching bulk deletes.
//!
//! Results are ordered by descending occurrence count, ties broken by key.
//! Every document in a result is paged in and stamped with one shared use
//! time.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::document::{Document, DocumentKey};
use crate::store::{DocumentStore, Reversal, StoreError};
use crate::undo::{Command, CommandSet, GenericCommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Match {
    Word,
    Prefix,
}

impl Match {
    fn count(self, document: &Document, query: &str) -> u32 {
        match self {
            Self::Word => document.word_count(query),
            Self::Prefix => document.prefix_count(query),
        }
    }
}

impl DocumentStore {
    /// Texts of the documents containing `keyword`, most occurrences first.
    ///
    /// Matching ignores case and punctuation.
    pub fn search(&mut self, keyword: &str) -> Result<Vec<String>, StoreError> {
        let keys = self.matching_keys(keyword, Match::Word)?;
        let texts = self.texts_of(&keys);
        self.settle_memory();
        Ok(texts)
    }

    /// Texts of the documents containing a word that starts with `prefix`,
    /// ordered by the summed occurrences of all such words.
    pub fn search_by_prefix(&mut self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let keys = self.matching_keys(prefix, Match::Prefix)?;
        let texts = self.texts_of(&keys);
        self.settle_memory();
        Ok(texts)
    }

    /// Renderings of the documents [`search`](Self::search) would return, in
    /// the same order.
    pub fn search_renderings(&mut self, keyword: &str) -> Result<Vec<Vec<u8>>, StoreError> {
        let keys = self.matching_keys(keyword, Match::Word)?;
        let renderings = self.renderings_of(&keys)?;
        self.settle_memory();
        Ok(renderings)
    }

    /// Renderings of the documents [`search_by_prefix`](Self::search_by_prefix)
    /// would return, in the same order.
    pub fn search_renderings_by_prefix(
        &mut self,
        prefix: &str,
    ) -> Result<Vec<Vec<u8>>, StoreError> {
        let keys = self.matching_keys(prefix, Match::Prefix)?;
        let renderings = self.renderings_of(&keys)?;
        self.settle_memory();
        Ok(renderings)
    }

    /// Delete every document containing `keyword`. The deletes undo as one
    /// group. Returns the deleted keys.
    pub fn delete_all(&mut self, keyword: &str) -> Result<HashSet<DocumentKey>, StoreError> {
        for key in self.trie.get_all(keyword) {
            self.load(&key)?;
        }
        let keys = self.trie.delete_all(keyword);
        self.delete_group(keys, keyword)
    }

    /// Delete every document containing a word that starts with `prefix`.
    /// The deletes undo as one group. Returns the deleted keys.
    pub fn delete_all_with_prefix(
        &mut self,
        prefix: &str,
    ) -> Result<HashSet<DocumentKey>, StoreError> {
        for key in self.trie.get_all_with_prefix(prefix) {
            self.load(&key)?;
        }
        let keys = self.trie.delete_all_with_prefix(prefix);
        self.delete_group(keys, prefix)
    }

    /// Keys of the documents matching `query`, best match first.
    ///
    /// # Post-conditions
    ///
    /// - Every returned document is resident.
    fn matching_keys(&mut self, query: &str, mode: Match) -> Result<Vec<DocumentKey>, StoreError> {
        let candidates = match mode {
            Match::Word => self.trie.get_all(query),
            Match::Prefix => self.trie.get_all_with_prefix(query),
        };
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let now = self.tick();
        let mut counts: HashMap<DocumentKey, u32> = HashMap::with_capacity(candidates.len());
        for key in candidates {
            if !self.touch(&key, now)? {
                continue;
            }
            let count = self.tree.peek(&key).map_or(0, |document| mode.count(document, query));
            if count > 0 {
                counts.insert(key, count);
            }
        }

        let by_count = |a: &DocumentKey, b: &DocumentKey| -> Ordering {
            let count_a = counts.get(a).copied().unwrap_or(0);
            let count_b = counts.get(b).copied().unwrap_or(0);
            count_b.cmp(&count_a).then_with(|| a.cmp(b))
        };
        let sorted = match mode {
            Match::Word => self.trie.get_all_sorted(query, by_count),
            Match::Prefix => self.trie.get_all_with_prefix_sorted(query, by_count),
        };
        let keys: Vec<DocumentKey> = sorted
            .into_iter()
            .filter(|key| counts.contains_key(key))
            .collect();
        debug!(query, ?mode, matches = keys.len(), "searched");
        Ok(keys)
    }

    fn texts_of(&self, keys: &[DocumentKey]) -> Vec<String> {
        keys.iter()
            .filter_map(|key| self.tree.peek(key))
            .map(|document| document.text().to_string())
            .collect()
    }

    fn renderings_of(&mut self, keys: &[DocumentKey]) -> Result<Vec<Vec<u8>>, StoreError> {
        let mut renderings = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(rendering) = self.render(key)? {
                renderings.push(rendering);
            }
        }
        Ok(renderings)
    }

    /// Delete the documents behind `keys` and push one undo group for them.
    fn delete_group(
        &mut self,
        keys: HashSet<DocumentKey>,
        query: &str,
    ) -> Result<HashSet<DocumentKey>, StoreError> {
        let mut group = CommandSet::new();
        let mut deleted = HashSet::with_capacity(keys.len());
        for key in keys {
            if let Some(document) = self.delete_one(&key)? {
                group.add(GenericCommand::new(
                    key.clone(),
                    Reversal::RestoreDeleted { document },
                ));
                deleted.insert(key);
            }
        }
        if !group.is_empty() {
            info!(query, deleted = group.len(), "deleted matching documents");
            self.history.push(Command::Group(group));
        }
        self.settle_memory();
        Ok(deleted)
    }
}
