//! Contract between the B-tree and whatever holds its parked values.
//!
//! A persistence manager takes custody of a value when the tree parks it and
//! hands it back exactly once when the tree pages it in.

/// Secondary storage for values evicted from memory.
///
/// # Post-conditions
///
/// - After a successful `serialize(k, v)`, a later `deserialize(k)` returns
///   `Some(v)` once and then `None` until `k` is serialized again.
/// - `deserialize` of a key that was never serialized returns `Ok(None)`.
pub trait PersistenceManager<K, V> {
    /// Write `value` as the persisted record for `key`, replacing any
    /// previous record.
    fn serialize(&mut self, key: &K, value: &V) -> Result<(), PersistenceError>;

    /// Read and delete the record for `key`.
    fn deserialize(&mut self, key: &K) -> Result<Option<V>, PersistenceError>;
}

/// Errors that can occur while writing or reading persisted records.
#[derive(Debug)]
pub enum PersistenceError {
    /// I/O error.
    Io(std::io::Error),
    /// The record could not be encoded or decoded.
    Encoding(serde_json::Error),
    /// The record was read but failed its integrity check.
    Corruption { key: String, message: String },
    /// The key cannot be mapped to a storage location.
    InvalidKey(String),
    /// The storage location of `key` already holds the record of `existing`.
    KeyCollision { key: String, existing: String },
    /// Injected fault for simulation.
    InjectedFault(String),
}

impl std::fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Encoding(e) => write!(f, "record encoding error: {e}"),
            Self::Corruption { key, message } => {
                write!(f, "corrupt record for {key}: {message}")
            }
            Self::InvalidKey(key) => write!(f, "key has no storage location: {key}"),
            Self::KeyCollision { key, existing } => {
                write!(f, "record location of {key} is taken by {existing}")
            }
            Self::InjectedFault(msg) => write!(f, "injected fault: {msg}"),
        }
    }
}

impl std::error::Error for PersistenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Encoding(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PersistenceError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(e: serde_json::Error) -> Self {
        Self::Encoding(e)
    }
}
