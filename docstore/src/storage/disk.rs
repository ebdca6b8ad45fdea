//! On-disk persistence for parked documents.
//!
//! Each parked document is written as one JSON file whose path mirrors its
//! key: `http://example.com/docs/a?x=1` lands at
//! `<base>/example.com/docs/a.<crc>.json`, where `<crc>` is the CRC32 of the
//! whole key in hex. The directories come from the authority and path; the
//! suffix keeps keys that differ only in scheme, query or fragment apart.
//!
//! # Invariants
//!
//! - At most one record exists per key; reading a record deletes it.
//! - A record is never overwritten by a different key's record.
//! - Directories created for a record are removed again once they are empty,
//!   up to but never including the base directory.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::{Document, DocumentKey};
use crate::storage::persistence::{PersistenceError, PersistenceManager};

/// JSON form of a parked document.
///
/// The rendering is not stored; it is produced again on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub key: DocumentKey,
    pub text: String,
    pub text_hash: u32,
    pub word_counts: BTreeMap<String, u32>,
    pub last_use: u64,
    /// CRC32 over `text`.
    pub checksum: u32,
}

impl DocumentRecord {
    #[must_use]
    pub fn from_document(document: &Document) -> Self {
        Self {
            key: document.key().clone(),
            text: document.text().to_string(),
            text_hash: document.text_hash(),
            word_counts: document.word_counts().clone(),
            last_use: document.last_use(),
            checksum: crc32fast::hash(document.text().as_bytes()),
        }
    }

    /// Verify the checksum and rebuild the document.
    pub fn into_document(self) -> Result<Document, PersistenceError> {
        let actual = crc32fast::hash(self.text.as_bytes());
        if actual != self.checksum {
            return Err(PersistenceError::Corruption {
                key: self.key.to_string(),
                message: format!(
                    "checksum mismatch: stored {:#010x}, computed {actual:#010x}",
                    self.checksum
                ),
            });
        }
        Ok(Document::from_parts(
            self.key,
            self.text,
            self.text_hash,
            self.word_counts,
            self.last_use,
        ))
    }
}

/// Persistence manager writing one JSON record per document under a base
/// directory.
#[derive(Debug, Clone)]
pub struct DocumentPersistenceManager {
    base_directory: PathBuf,
}

impl DocumentPersistenceManager {
    /// Create a manager rooted at `base_directory`. The directory is created
    /// lazily on the first write.
    #[must_use]
    pub fn new(base_directory: impl Into<PathBuf>) -> Self {
        Self {
            base_directory: base_directory.into(),
        }
    }

    /// The file a key's record is stored in.
    pub fn record_path(&self, key: &DocumentKey) -> Result<PathBuf, PersistenceError> {
        let invalid = || PersistenceError::InvalidKey(key.to_string());
        let location = authority_and_path(key.as_str());
        let segments: Vec<&str> = location.split('/').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() || segments.iter().any(|s| *s == "." || *s == ".." || s.contains('\\')) {
            return Err(invalid());
        }

        let mut path = self.base_directory.clone();
        let (file, directories) = segments.split_last().ok_or_else(invalid)?;
        for directory in directories {
            path.push(directory);
        }
        path.push(format!("{file}.{:08x}.json", crc32fast::hash(key.as_str().as_bytes())));
        Ok(path)
    }

    /// Remove empty directories from `directory` upwards, stopping at the
    /// base directory.
    fn prune_empty_directories(&self, mut directory: &Path) -> Result<(), PersistenceError> {
        while directory != self.base_directory.as_path()
            && directory.starts_with(&self.base_directory)
        {
            if fs::read_dir(directory)?.next().is_some() {
                break;
            }
            fs::remove_dir(directory)?;
            let Some(parent) = directory.parent() else {
                break;
            };
            directory = parent;
        }
        Ok(())
    }
}

impl PersistenceManager<DocumentKey, Document> for DocumentPersistenceManager {
    fn serialize(&mut self, key: &DocumentKey, value: &Document) -> Result<(), PersistenceError> {
        let path = self.record_path(key)?;
        if let Some(existing) = read_record(&path)?
            && existing.key != *key
        {
            return Err(PersistenceError::KeyCollision {
                key: key.to_string(),
                existing: existing.key.to_string(),
            });
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec(&DocumentRecord::from_document(value))?;
        fs::write(&path, json)?;
        debug!(%key, path = %path.display(), "wrote document record");
        Ok(())
    }

    fn deserialize(&mut self, key: &DocumentKey) -> Result<Option<Document>, PersistenceError> {
        let path = self.record_path(key)?;
        let Some(record) = read_record(&path)? else {
            return Ok(None);
        };
        if record.key != *key {
            return Err(PersistenceError::Corruption {
                key: key.to_string(),
                message: format!("record belongs to {}", record.key),
            });
        }
        let document = record.into_document()?;

        fs::remove_file(&path)?;
        if let Some(parent) = path.parent() {
            self.prune_empty_directories(parent)?;
        }
        debug!(%key, path = %path.display(), "read and removed document record");
        Ok(Some(document))
    }
}

/// Parse the record at `path`, if there is one.
fn read_record(path: &Path) -> Result<Option<DocumentRecord>, PersistenceError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_slice(&bytes)?))
}

/// The part of a URI-like key that maps to a path: authority plus path,
/// without scheme, query or fragment.
fn authority_and_path(key: &str) -> &str {
    let end = key.find(['?', '#']).unwrap_or(key.len());
    let key = &key[..end];
    let without_scheme = match key.split_once(':') {
        Some((scheme, rest)) if is_scheme(scheme) => rest,
        _ => key,
    };
    without_scheme.trim_start_matches('/')
}

fn is_scheme(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use tempfile::tempdir;

    fn key(s: &str) -> DocumentKey {
        DocumentKey::new(s).expect("valid key")
    }

    fn document(k: &str, text: &str) -> Document {
        Document::from_text(key(k), text.to_string(), 42)
    }

    #[test]
    fn test_authority_and_path() {
        assert_eq!(authority_and_path("http://example.com/a/b"), "example.com/a/b");
        assert_eq!(authority_and_path("https://host/doc?x=1#frag"), "host/doc");
        assert_eq!(authority_and_path("file:///tmp/doc"), "tmp/doc");
        assert_eq!(authority_and_path("plain/relative"), "plain/relative");
        assert_eq!(authority_and_path("1http:x"), "1http:x");
    }

    #[test]
    fn test_record_path_layout() {
        let manager = DocumentPersistenceManager::new("/base");
        let path = manager
            .record_path(&key("http://www.yu.edu/documents/doc1"))
            .expect("path");
        let crc = crc32fast::hash(b"http://www.yu.edu/documents/doc1");
        assert_eq!(
            path,
            PathBuf::from(format!("/base/www.yu.edu/documents/doc1.{crc:08x}.json"))
        );
    }

    #[test]
    fn test_record_path_distinguishes_scheme_and_query() {
        let manager = DocumentPersistenceManager::new("/base");
        let paths: HashSet<PathBuf> = ["http://host/a", "https://host/a", "http://host/a?v=2"]
            .into_iter()
            .map(|k| manager.record_path(&key(k)).expect("path"))
            .collect();
        assert_eq!(paths.len(), 3);
        assert!(paths.iter().all(|p| p.starts_with("/base/host")));
    }

    #[test]
    fn test_serialize_refuses_to_overwrite_another_key() {
        let dir = tempdir().expect("create temp dir");
        let mut manager = DocumentPersistenceManager::new(dir.path());
        let owner = key("http://host/a");
        let intruder = key("http://host/b");
        manager
            .serialize(&owner, &document(owner.as_str(), "owner"))
            .expect("serialize owner");

        // Plant the owner's record where the intruder's record would go.
        let owner_path = manager.record_path(&owner).expect("path");
        let intruder_path = manager.record_path(&intruder).expect("path");
        fs::copy(&owner_path, &intruder_path).expect("copy");

        let error = manager
            .serialize(&intruder, &document(intruder.as_str(), "intruder"))
            .expect_err("collision");
        assert!(matches!(error, PersistenceError::KeyCollision { .. }));
        assert_eq!(
            manager.deserialize(&owner).expect("read").expect("present").text(),
            "owner"
        );
    }

    #[test]
    fn test_serialize_replaces_own_record() {
        let dir = tempdir().expect("create temp dir");
        let mut manager = DocumentPersistenceManager::new(dir.path());
        let k = key("http://host/a");
        manager.serialize(&k, &document(k.as_str(), "first")).expect("first");
        manager.serialize(&k, &document(k.as_str(), "second")).expect("second");
        assert_eq!(
            manager.deserialize(&k).expect("read").expect("present").text(),
            "second"
        );
    }

    #[test]
    fn test_record_path_rejects_escaping_keys() {
        let manager = DocumentPersistenceManager::new("/base");
        for bad in ["http://host/../etc", "http://./x", "scheme:", "http://?q", "a\\b"] {
            let result = manager.record_path(&key(bad));
            assert!(
                matches!(result, Err(PersistenceError::InvalidKey(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_serialize_then_deserialize_consumes_record() {
        let dir = tempdir().expect("create temp dir");
        let mut manager = DocumentPersistenceManager::new(dir.path());
        let k = key("http://example.com/nested/deeper/doc");
        let original = document(k.as_str(), "the persisted words");

        manager.serialize(&k, &original).expect("serialize");
        let path = manager.record_path(&k).expect("path");
        assert!(path.exists());

        let restored = manager.deserialize(&k).expect("deserialize").expect("present");
        assert_eq!(restored.text(), original.text());
        assert_eq!(restored.text_hash(), original.text_hash());
        assert_eq!(restored.word_counts(), original.word_counts());
        assert_eq!(restored.last_use(), 42);
        assert!(restored.rendering().is_none());

        assert!(!path.exists());
        assert!(!dir.path().join("example.com").exists());
        assert!(dir.path().exists());
        assert!(manager.deserialize(&k).expect("second read").is_none());
    }

    #[test]
    fn test_pruning_keeps_non_empty_directories() {
        let dir = tempdir().expect("create temp dir");
        let mut manager = DocumentPersistenceManager::new(dir.path());
        let a = key("http://host/shared/a");
        let b = key("http://host/shared/b");
        manager.serialize(&a, &document(a.as_str(), "a")).expect("serialize a");
        manager.serialize(&b, &document(b.as_str(), "b")).expect("serialize b");

        manager.deserialize(&a).expect("deserialize a");
        assert!(dir.path().join("host/shared").exists());

        manager.deserialize(&b).expect("deserialize b");
        assert!(!dir.path().join("host").exists());
    }

    #[test]
    fn test_checksum_mismatch_is_corruption() {
        let dir = tempdir().expect("create temp dir");
        let mut manager = DocumentPersistenceManager::new(dir.path());
        let k = key("http://host/doc");
        manager.serialize(&k, &document(k.as_str(), "original")).expect("serialize");

        let path = manager.record_path(&k).expect("path");
        let mut record: DocumentRecord =
            serde_json::from_slice(&fs::read(&path).expect("read")).expect("parse");
        record.text = "tampered".to_string();
        fs::write(&path, serde_json::to_vec(&record).expect("encode")).expect("write");

        let error = manager.deserialize(&k).expect_err("corrupt");
        assert!(matches!(error, PersistenceError::Corruption { .. }));
        assert!(path.exists());
    }

    #[test]
    fn test_garbage_record_is_encoding_error() {
        let dir = tempdir().expect("create temp dir");
        let mut manager = DocumentPersistenceManager::new(dir.path());
        let k = key("http://host/doc");
        let path = manager.record_path(&k).expect("path");
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(&path, b"not json").expect("write");

        assert!(matches!(
            manager.deserialize(&k),
            Err(PersistenceError::Encoding(_))
        ));
    }
}
