//! Invariant checking for deterministic simulation testing.
//!
//! This module provides infrastructure for verifying store invariants
//! after each operation, helping to detect bugs in the bookkeeping between
//! the B-tree, the eviction heap and the persistence layer.

use std::fmt;

use crate::document::DocumentKey;
use crate::storage::btree::LeafValue;
use crate::store::DocumentStore;

use super::persistence::SimulatedPersistence;

/// A recorded operation in the simulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Put { key: DocumentKey, text: String },
    Delete { key: DocumentKey },
    Get { key: DocumentKey },
    Render { key: DocumentKey },
    Search { query: String },
    SearchByPrefix { query: String },
    DeleteAll { query: String },
    DeleteAllWithPrefix { query: String },
    Undo,
    UndoKey { key: DocumentKey },
    SetMaxDocumentCount(usize),
    SetMaxDocumentBytes(usize),
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Put { key, text } => write!(f, "put {key} {text:?}"),
            Self::Delete { key } => write!(f, "delete {key}"),
            Self::Get { key } => write!(f, "get {key}"),
            Self::Render { key } => write!(f, "render {key}"),
            Self::Search { query } => write!(f, "search {query:?}"),
            Self::SearchByPrefix { query } => write!(f, "search prefix {query:?}"),
            Self::DeleteAll { query } => write!(f, "delete all {query:?}"),
            Self::DeleteAllWithPrefix { query } => write!(f, "delete all prefix {query:?}"),
            Self::Undo => write!(f, "undo"),
            Self::UndoKey { key } => write!(f, "undo {key}"),
            Self::SetMaxDocumentCount(max) => write!(f, "max count {max}"),
            Self::SetMaxDocumentBytes(max) => write!(f, "max bytes {max}"),
        }
    }
}

/// An operation together with its outcome.
#[derive(Debug, Clone)]
pub struct RecordedOperation {
    pub operation: Operation,
    /// Error message if the store returned an error.
    pub error: Option<String>,
}

/// Tracks the history of operations for replaying failures.
#[derive(Debug, Default)]
pub struct OperationHistory {
    operations: Vec<RecordedOperation>,
    successful: u64,
    failed: u64,
}

impl OperationHistory {
    /// Create a new empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an operation and its outcome.
    pub fn record(&mut self, operation: Operation, error: Option<String>) {
        if error.is_some() {
            self.failed += 1;
        } else {
            self.successful += 1;
        }
        self.operations.push(RecordedOperation { operation, error });
    }

    /// Get the number of operations.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.operations.len()
    }

    /// Check if history is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    #[must_use]
    pub fn operations(&self) -> &[RecordedOperation] {
        &self.operations
    }

    /// Get statistics.
    #[must_use]
    pub const fn stats(&self) -> HistoryStats {
        HistoryStats {
            total_operations: self.operations.len(),
            successful_operations: self.successful,
            failed_operations: self.failed,
        }
    }
}

/// Statistics about the operation history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryStats {
    /// Total number of operations.
    pub total_operations: usize,
    /// Number of operations the store completed.
    pub successful_operations: u64,
    /// Number of operations that returned an error.
    pub failed_operations: u64,
}

/// An invariant violation detected during simulation.
#[derive(Debug, Clone)]
pub struct InvariantViolation {
    /// Description of the violation.
    pub description: String,
    /// Operation index where it was detected.
    pub operation_index: usize,
    /// Additional context.
    pub context: String,
}

/// Checker for store invariants.
#[derive(Debug, Default)]
pub struct InvariantChecker {
    violations: Vec<InvariantViolation>,
}

impl InvariantChecker {
    /// Create a new invariant checker.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            violations: Vec::new(),
        }
    }

    /// Get all violations.
    #[must_use]
    pub fn violations(&self) -> &[InvariantViolation] {
        &self.violations
    }

    /// Check if any violations were detected.
    #[must_use]
    pub const fn has_violations(&self) -> bool {
        !self.violations.is_empty()
    }

    /// Clear all recorded violations.
    pub fn clear(&mut self) {
        self.violations.clear();
    }

    /// Add a violation.
    pub fn add_violation(&mut self, violation: InvariantViolation) {
        self.violations.push(violation);
    }

    fn violation(&mut self, description: &str, operation_index: usize, context: String) {
        self.violations.push(InvariantViolation {
            description: description.to_string(),
            operation_index,
            context,
        });
    }

    /// Check the B-tree shape and the heap's index map.
    pub fn check_structure(&mut self, store: &DocumentStore, operation_index: usize) {
        if let Err(e) = store.tree().check_structure() {
            self.violation("B-tree structure broken", operation_index, e);
        }
        if let Err(e) = store.heap().check_consistency() {
            self.violation("Heap index inconsistent", operation_index, e);
        }
    }

    /// Check that the heap tracks exactly the resident documents and that the
    /// resident counters match them.
    pub fn check_residency(&mut self, store: &DocumentStore, operation_index: usize) {
        let tree = store.tree();
        let heap = store.heap();

        let mut resident = 0;
        let mut bytes = 0;
        for (key, value) in tree.iter() {
            if let LeafValue::Resident(document) = value {
                resident += 1;
                bytes += document.footprint();
                match heap.priority(key) {
                    None => self.violation(
                        "Resident document missing from heap",
                        operation_index,
                        key.to_string(),
                    ),
                    Some(priority) if priority != document.last_use() => self.violation(
                        "Heap priority differs from last use",
                        operation_index,
                        format!("{key}: heap {priority}, document {}", document.last_use()),
                    ),
                    Some(_) => {}
                }
            }
        }

        for (key, _) in heap.iter() {
            if tree.peek(key).is_none() {
                self.violation(
                    "Heap holds a document that is not resident",
                    operation_index,
                    key.to_string(),
                );
            }
        }

        if resident != store.resident_document_count() {
            self.violation(
                "Resident count out of sync",
                operation_index,
                format!("tracked {}, actual {resident}", store.resident_document_count()),
            );
        }
        if bytes != store.resident_document_bytes() {
            self.violation(
                "Resident bytes out of sync",
                operation_index,
                format!("tracked {}, actual {bytes}", store.resident_document_bytes()),
            );
        }
    }

    /// Check that parked documents, and only those, have a persisted record.
    pub fn check_persistence(
        &mut self,
        store: &DocumentStore,
        persistence: &SimulatedPersistence,
        operation_index: usize,
    ) {
        let mut parked = 0;
        for (key, value) in store.tree().iter() {
            let held = persistence.contains(key);
            match value {
                LeafValue::Parked => {
                    parked += 1;
                    if !held {
                        self.violation(
                            "Parked document has no record",
                            operation_index,
                            key.to_string(),
                        );
                    }
                }
                LeafValue::Resident(_) | LeafValue::Vacant if held => self.violation(
                    "Record kept for a document that is not parked",
                    operation_index,
                    key.to_string(),
                ),
                LeafValue::Resident(_) | LeafValue::Vacant => {}
            }
        }
        if parked != persistence.len() {
            self.violation(
                "Records held for unknown keys",
                operation_index,
                format!("parked {parked}, records {}", persistence.len()),
            );
        }
    }

    /// Check that the configured ceilings hold. Only meaningful after an
    /// operation that succeeded.
    pub fn check_ceilings(&mut self, store: &DocumentStore, operation_index: usize) {
        let (max_count, max_bytes) = store.limits();
        if let Some(max) = max_count
            && store.resident_document_count() > max
        {
            self.violation(
                "Document count ceiling exceeded",
                operation_index,
                format!("{} > {max}", store.resident_document_count()),
            );
        }
        if let Some(max) = max_bytes
            && store.resident_document_bytes() > max
        {
            self.violation(
                "Document bytes ceiling exceeded",
                operation_index,
                format!("{} > {max}", store.resident_document_bytes()),
            );
        }
    }

    /// Run every structural check.
    pub fn check_store(
        &mut self,
        store: &DocumentStore,
        persistence: &SimulatedPersistence,
        operation_index: usize,
    ) {
        self.check_structure(store, operation_index);
        self.check_residency(store, operation_index);
        self.check_persistence(store, persistence, operation_index);
    }
}
