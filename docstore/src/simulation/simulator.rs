//! Main simulator harness for deterministic simulation testing.
//!
//! This module ties together all the simulation components: a store wired to
//! simulated persistence and a simulated clock, a seeded random workload, a
//! reference model of what the store should contain, and the invariant
//! checker.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::document::{DocumentFormat, DocumentKey, SinglePageRenderer};
use crate::store::{DocumentStore, StoreError};
use crate::text::{normalize, word_counts};

use super::invariants::{InvariantChecker, InvariantViolation, Operation, OperationHistory};
use super::persistence::{FaultConfig, SimulatedPersistence};
use super::time::SimulatedTimeSource;

/// Words documents are built from. Several share prefixes so that prefix
/// searches and deletes overlap.
const VOCABULARY: &[&str] = &[
    "apple", "apply", "banana", "band", "cherry", "red", "redo", "blue", "to", "too", "tool",
    "tooth", "top",
];

/// Configuration for the simulator.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Random seed for reproducibility.
    pub seed: u64,
    /// Fault injection configuration.
    pub fault_config: FaultConfig,
    /// Number of distinct document keys the workload uses.
    pub key_space: usize,
    /// Whether to advance time between operations.
    pub advance_time: bool,
    /// Nanoseconds to advance time per operation.
    pub time_advance_ns: u64,
    /// Chance that the clock steps back by three advances instead of
    /// moving forward.
    pub rewind_rate: f64,
}

impl SimulatorConfig {
    /// Create a new simulator config with the given seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            fault_config: FaultConfig::default(),
            key_space: 12,
            advance_time: true,
            time_advance_ns: 1_000,
            rewind_rate: 0.05,
        }
    }

    /// Set the fault configuration.
    #[must_use]
    pub fn with_fault_config(mut self, config: FaultConfig) -> Self {
        self.fault_config = config;
        self
    }

    /// Set the number of distinct keys.
    #[must_use]
    pub const fn with_key_space(mut self, key_space: usize) -> Self {
        self.key_space = key_space;
        self
    }

    /// Set how often the clock steps backwards.
    #[must_use]
    pub const fn with_rewind_rate(mut self, rate: f64) -> Self {
        self.rewind_rate = rate;
        self
    }

    /// Disable time advancement; the store then relies on its own ticks.
    #[must_use]
    pub const fn without_time_advance(mut self) -> Self {
        self.advance_time = false;
        self
    }
}

/// Results from a simulation run.
#[derive(Debug)]
pub struct SimulationResult {
    /// The seed used for this simulation.
    pub seed: u64,
    /// Number of operations processed.
    pub operations_processed: u64,
    /// Number of operations the store completed.
    pub successful_operations: u64,
    /// Number of operations that returned an error.
    pub failed_operations: u64,
    /// Invariant violations detected.
    pub invariant_violations: Vec<InvariantViolation>,
    /// Index of the first failed operation, after which the reference model
    /// is no longer compared.
    pub model_diverged_at: Option<usize>,
}

impl SimulationResult {
    /// Check if the simulation passed (no invariant violations).
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.invariant_violations.is_empty()
    }
}

/// A reversal the model keeps on its own undo stack.
#[derive(Debug, Clone)]
enum ModelCommand {
    /// Set the key back to this text, or remove it.
    Single(DocumentKey, Option<String>),
    /// Restore every one of these documents.
    Group(Vec<(DocumentKey, String)>),
}

/// What the store should contain, computed independently of it.
#[derive(Debug, Default)]
struct Model {
    documents: BTreeMap<DocumentKey, String>,
    undo: Vec<ModelCommand>,
}

impl Model {
    fn count(text: &str, query: &str, prefix: bool) -> u32 {
        let query = normalize(query);
        if query.is_empty() {
            return 0;
        }
        word_counts(text)
            .into_iter()
            .filter(|(word, _)| if prefix { word.starts_with(&query) } else { *word == query })
            .map(|(_, count)| count)
            .sum()
    }

    fn put(&mut self, key: DocumentKey, text: String) {
        let previous = self.documents.insert(key.clone(), text);
        self.undo.push(ModelCommand::Single(key, previous));
    }

    fn delete(&mut self, key: &DocumentKey) -> bool {
        let Some(previous) = self.documents.remove(key) else {
            return false;
        };
        self.undo.push(ModelCommand::Single(key.clone(), Some(previous)));
        true
    }

    fn matching(&self, query: &str, prefix: bool) -> Vec<(&DocumentKey, &String, u32)> {
        let mut matches: Vec<_> = self
            .documents
            .iter()
            .map(|(key, text)| (key, text, Self::count(text, query, prefix)))
            .filter(|(_, _, count)| *count > 0)
            .collect();
        matches.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(b.0)));
        matches
    }

    fn search(&self, query: &str, prefix: bool) -> Vec<String> {
        self.matching(query, prefix)
            .into_iter()
            .map(|(_, text, _)| text.clone())
            .collect()
    }

    fn delete_matching(&mut self, query: &str, prefix: bool) -> BTreeSet<DocumentKey> {
        let keys: BTreeSet<DocumentKey> = self
            .matching(query, prefix)
            .into_iter()
            .map(|(key, _, _)| key.clone())
            .collect();
        let group: Vec<(DocumentKey, String)> = keys
            .iter()
            .filter_map(|key| Some((key.clone(), self.documents.remove(key)?)))
            .collect();
        if !group.is_empty() {
            self.undo.push(ModelCommand::Group(group));
        }
        keys
    }

    fn apply(&mut self, key: DocumentKey, text: Option<String>) {
        match text {
            Some(text) => self.documents.insert(key, text),
            None => self.documents.remove(&key),
        };
    }

    fn undo(&mut self) -> bool {
        match self.undo.pop() {
            None => false,
            Some(ModelCommand::Single(key, text)) => {
                self.apply(key, text);
                true
            }
            Some(ModelCommand::Group(group)) => {
                for (key, text) in group {
                    self.apply(key, Some(text));
                }
                true
            }
        }
    }

    fn undo_key(&mut self, key: &DocumentKey) -> bool {
        let Some(index) = self.undo.iter().rposition(|command| match command {
            ModelCommand::Single(target, _) => target == key,
            ModelCommand::Group(group) => group.iter().any(|(target, _)| target == key),
        }) else {
            return false;
        };
        match &mut self.undo[index] {
            ModelCommand::Single(_, text) => {
                let text = text.take();
                self.undo.remove(index);
                self.apply(key.clone(), text);
            }
            ModelCommand::Group(group) => {
                let Some(position) = group.iter().position(|(target, _)| target == key) else {
                    return false;
                };
                let (_, text) = group.remove(position);
                if group.is_empty() {
                    self.undo.remove(index);
                }
                self.apply(key.clone(), Some(text));
            }
        }
        true
    }
}

/// The main simulator harness.
///
/// This ties together all simulation components:
/// - Simulated persistence with fault injection
/// - Simulated time source
/// - Seeded workload generation
/// - Reference model and invariant checker
pub struct Simulator {
    config: SimulatorConfig,
    rng: StdRng,
    keys: Vec<DocumentKey>,
    store: DocumentStore,
    persistence: SimulatedPersistence,
    time_source: Rc<SimulatedTimeSource>,
    model: Model,
    history: OperationHistory,
    checker: InvariantChecker,
    model_diverged_at: Option<usize>,
}

impl Simulator {
    /// Create a new simulator with the given configuration.
    #[must_use]
    pub fn new(config: SimulatorConfig) -> Self {
        let persistence =
            SimulatedPersistence::with_config(config.seed, config.fault_config.clone());
        let time_source = Rc::new(SimulatedTimeSource::default_start());
        let store = DocumentStore::with_parts(
            Box::new(persistence.clone()),
            Box::new(SinglePageRenderer),
            Box::new(Rc::clone(&time_source)),
        );

        let keys = (0..config.key_space.max(1))
            .filter_map(|index| DocumentKey::new(format!("doc://sim/{index}")).ok())
            .collect();

        Self {
            rng: StdRng::seed_from_u64(config.seed),
            keys,
            config,
            store,
            persistence,
            time_source,
            model: Model::default(),
            history: OperationHistory::new(),
            checker: InvariantChecker::new(),
            model_diverged_at: None,
        }
    }

    /// Run the simulation for a given number of operations, checking
    /// invariants after each one.
    pub fn run(&mut self, operation_count: usize) -> SimulationResult {
        for _ in 0..operation_count {
            let operation = self.next_operation();
            let index = self.history.len();
            let write_faults = self.persistence.stats().injected_write_errors;
            let result = self.execute(&operation, index);

            self.checker.check_store(&self.store, &self.persistence, index);
            // A park that failed after the change committed leaves a ceiling
            // exceeded until the next successful pass.
            let parks_failed = self.persistence.stats().injected_write_errors != write_faults;
            match &result {
                Ok(()) if parks_failed => {}
                Ok(()) => self.checker.check_ceilings(&self.store, index),
                Err(StoreError::NothingToUndo | StoreError::NoUndoForKey(_)) => {}
                Err(error) => {
                    if self.model_diverged_at.is_none() {
                        debug!(index, %operation, %error, "model diverged");
                        self.model_diverged_at = Some(index);
                    }
                }
            }
            self.history
                .record(operation, result.err().map(|e| e.to_string()));

            if self.config.advance_time {
                if self.rng.random::<f64>() < self.config.rewind_rate {
                    self.time_source
                        .rewind(self.config.time_advance_ns.saturating_mul(3));
                } else {
                    self.time_source.advance(self.config.time_advance_ns);
                }
            }
        }

        let stats = self.history.stats();
        SimulationResult {
            seed: self.config.seed,
            operations_processed: u64::try_from(stats.total_operations).unwrap_or(u64::MAX),
            successful_operations: stats.successful_operations,
            failed_operations: stats.failed_operations,
            invariant_violations: self.checker.violations().to_vec(),
            model_diverged_at: self.model_diverged_at,
        }
    }

    /// Get the operation history.
    #[must_use]
    pub const fn history(&self) -> &OperationHistory {
        &self.history
    }

    /// Get the invariant checker.
    #[must_use]
    pub const fn checker(&self) -> &InvariantChecker {
        &self.checker
    }

    /// Get the store under test.
    #[must_use]
    pub const fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// Get the simulated persistence shared with the store.
    #[must_use]
    pub const fn persistence(&self) -> &SimulatedPersistence {
        &self.persistence
    }

    fn random_key(&mut self) -> DocumentKey {
        let index = self.rng.random_range(0..self.keys.len());
        self.keys[index].clone()
    }

    fn random_word(&mut self) -> &'static str {
        VOCABULARY.choose(&mut self.rng).copied().unwrap_or("apple")
    }

    fn random_text(&mut self) -> String {
        let length = self.rng.random_range(1..=6);
        let mut words = Vec::with_capacity(length);
        for _ in 0..length {
            let word = self.random_word();
            let word = match self.rng.random_range(0..6) {
                0 => word.to_uppercase(),
                1 => format!("{word},"),
                2 => format!("{word}!"),
                _ => word.to_string(),
            };
            words.push(word);
        }
        words.join(" ")
    }

    fn random_prefix(&mut self) -> String {
        let word = self.random_word();
        let length = self.rng.random_range(1..=word.len());
        word[..length].to_string()
    }

    fn next_operation(&mut self) -> Operation {
        match self.rng.random_range(0..100) {
            0..30 => Operation::Put {
                key: self.random_key(),
                text: self.random_text(),
            },
            30..38 => Operation::Delete {
                key: self.random_key(),
            },
            38..52 => Operation::Get {
                key: self.random_key(),
            },
            52..56 => Operation::Render {
                key: self.random_key(),
            },
            56..64 => Operation::Search {
                query: self.random_word().to_string(),
            },
            64..70 => Operation::SearchByPrefix {
                query: self.random_prefix(),
            },
            70..74 => Operation::DeleteAll {
                query: self.random_word().to_string(),
            },
            74..77 => Operation::DeleteAllWithPrefix {
                query: self.random_prefix(),
            },
            77..85 => Operation::Undo,
            85..93 => Operation::UndoKey {
                key: self.random_key(),
            },
            93..97 => Operation::SetMaxDocumentCount(self.rng.random_range(1..=8)),
            _ => Operation::SetMaxDocumentBytes(self.rng.random_range(40..=4_000)),
        }
    }

    /// Apply `operation` to the store and, while it still tracks the store, to
    /// the model.
    fn execute(&mut self, operation: &Operation, index: usize) -> Result<(), StoreError> {
        let compare = self.model_diverged_at.is_none();
        match operation {
            Operation::Put { key, text } => {
                self.store
                    .put_document(Some(text.as_bytes()), key, DocumentFormat::PlainText)?;
                if compare {
                    self.model.put(key.clone(), text.clone());
                }
            }
            Operation::Delete { key } => {
                let deleted = self.store.delete_document(key)?;
                if compare {
                    let expected = self.model.delete(key);
                    self.expect_eq(index, "delete result", &expected, &deleted);
                }
            }
            Operation::Get { key } => {
                let text = self.store.get_document_as_text(key)?;
                if compare {
                    let expected = self.model.documents.get(key).cloned();
                    self.expect_eq(index, "document text", &expected, &text);
                }
            }
            Operation::Render { key } => {
                let rendering = self.store.get_document_as_rendering(key)?;
                if compare {
                    let expected = self.model.documents.contains_key(key);
                    let actual = rendering.is_some_and(|bytes| bytes.starts_with(b"%PDF"));
                    self.expect_eq(index, "rendering present", &expected, &actual);
                }
            }
            Operation::Search { query } => {
                let texts = self.store.search(query)?;
                if compare {
                    let expected = self.model.search(query, false);
                    self.expect_eq(index, "search results", &expected, &texts);
                }
            }
            Operation::SearchByPrefix { query } => {
                let texts = self.store.search_by_prefix(query)?;
                if compare {
                    let expected = self.model.search(query, true);
                    self.expect_eq(index, "prefix search results", &expected, &texts);
                }
            }
            Operation::DeleteAll { query } => {
                let keys = self.store.delete_all(query)?;
                if compare {
                    let expected = self.model.delete_matching(query, false);
                    let actual: BTreeSet<DocumentKey> = keys.into_iter().collect();
                    self.expect_eq(index, "deleted keys", &expected, &actual);
                }
            }
            Operation::DeleteAllWithPrefix { query } => {
                let keys = self.store.delete_all_with_prefix(query)?;
                if compare {
                    let expected = self.model.delete_matching(query, true);
                    let actual: BTreeSet<DocumentKey> = keys.into_iter().collect();
                    self.expect_eq(index, "deleted keys for prefix", &expected, &actual);
                }
            }
            Operation::Undo => {
                let result = self.store.undo();
                if compare {
                    let expected = self.model.undo();
                    self.expect_undo(index, expected, &result);
                }
                result?;
            }
            Operation::UndoKey { key } => {
                let result = self.store.undo_key(key);
                if compare {
                    let expected = self.model.undo_key(key);
                    self.expect_undo(index, expected, &result);
                }
                result?;
            }
            Operation::SetMaxDocumentCount(max) => self.store.set_max_document_count(*max)?,
            Operation::SetMaxDocumentBytes(max) => self.store.set_max_document_bytes(*max)?,
        }
        Ok(())
    }

    fn expect_eq<T: PartialEq + std::fmt::Debug>(
        &mut self,
        index: usize,
        what: &str,
        expected: &T,
        actual: &T,
    ) {
        if expected != actual {
            self.checker.add_violation(InvariantViolation {
                description: format!("Store disagrees with model on {what}"),
                operation_index: index,
                context: format!("expected {expected:?}, got {actual:?}"),
            });
        }
    }

    /// An undo is expected to succeed exactly when the model had something
    /// to undo. Store failures other than "nothing to undo" are not model
    /// mismatches; they end model comparison instead.
    fn expect_undo(
        &mut self,
        index: usize,
        expected: bool,
        result: &Result<(), StoreError>,
    ) {
        let undone = match result {
            Ok(()) => true,
            Err(StoreError::NothingToUndo | StoreError::NoUndoForKey(_)) => false,
            Err(_) => return,
        };
        self.expect_eq(index, "undo outcome", &expected, &undone);
    }
}
