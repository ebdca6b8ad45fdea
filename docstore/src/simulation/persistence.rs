//! Simulated in-memory persistence for deterministic testing.
//!
//! [`SimulatedPersistence`] keeps parked documents in a map instead of on
//! disk and can inject faults:
//! - Write errors (the document stays resident)
//! - Read errors (the document stays parked)
//! - Corrupt reads (reported as corruption, the record is kept)
//!
//! The handle is cheap to clone; all clones share the same records, so a
//! test can hand one clone to the store and inspect the other.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::document::{Document, DocumentKey};
use crate::storage::{PersistenceError, PersistenceManager};

/// Configuration for fault injection.
#[derive(Debug, Clone, Default)]
pub struct FaultConfig {
    /// Probability of a read error (0.0 - 1.0).
    pub read_error_rate: f64,
    /// Probability of a write error (0.0 - 1.0).
    pub write_error_rate: f64,
    /// Probability that a read reports a corrupt record (0.0 - 1.0).
    pub corruption_rate: f64,
}

impl FaultConfig {
    /// Create a fault config with no faults (for baseline testing).
    #[must_use]
    pub fn no_faults() -> Self {
        Self::default()
    }

    /// Create a fault config with low fault rates (for stress testing).
    #[must_use]
    pub const fn low_faults() -> Self {
        Self {
            read_error_rate: 0.01,
            write_error_rate: 0.01,
            corruption_rate: 0.01,
        }
    }

    /// Create a fault config with high fault rates (for extreme testing).
    #[must_use]
    pub const fn high_faults() -> Self {
        Self {
            read_error_rate: 0.1,
            write_error_rate: 0.1,
            corruption_rate: 0.05,
        }
    }
}

/// Statistics about simulated persistence operations.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SimulatedPersistenceStats {
    /// Number of records written.
    pub writes: u64,
    /// Number of records read back (and thereby removed).
    pub reads: u64,
    /// Reads for keys that had no record.
    pub misses: u64,
    /// Number of injected write errors.
    pub injected_write_errors: u64,
    /// Number of injected read errors.
    pub injected_read_errors: u64,
    /// Number of reads reported as corrupt.
    pub corrupted_reads: u64,
}

#[derive(Debug)]
struct Inner {
    records: HashMap<DocumentKey, Document>,
    fault_config: FaultConfig,
    fail_writes: bool,
    fail_reads: bool,
    rng: StdRng,
    stats: SimulatedPersistenceStats,
}

impl Inner {
    fn should_inject_fault(&mut self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        self.rng.random::<f64>() < rate
    }
}

/// In-memory persistence manager for deterministic testing.
///
/// # Thread Safety
///
/// Uses [`Rc`] and [`RefCell`], so it is single-threaded only, like the
/// store it serves.
#[derive(Debug, Clone)]
pub struct SimulatedPersistence {
    inner: Rc<RefCell<Inner>>,
}

impl SimulatedPersistence {
    /// Create a fault-free simulated persistence manager.
    ///
    /// The seed only matters once faults are configured.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, FaultConfig::no_faults())
    }

    /// Create a simulated persistence manager with custom fault injection.
    #[must_use]
    pub fn with_config(seed: u64, fault_config: FaultConfig) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                records: HashMap::new(),
                fault_config,
                fail_writes: false,
                fail_reads: false,
                rng: StdRng::seed_from_u64(seed),
                stats: SimulatedPersistenceStats::default(),
            })),
        }
    }

    /// Whether a record for `key` is currently held.
    #[must_use]
    pub fn contains(&self, key: &DocumentKey) -> bool {
        self.inner.borrow().records.contains_key(key)
    }

    /// Number of records held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys of all held records, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<DocumentKey> {
        let mut keys: Vec<DocumentKey> = self.inner.borrow().records.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Get a snapshot of the statistics.
    #[must_use]
    pub fn stats(&self) -> SimulatedPersistenceStats {
        self.inner.borrow().stats.clone()
    }

    /// Update the fault configuration.
    pub fn set_fault_config(&self, config: FaultConfig) {
        self.inner.borrow_mut().fault_config = config;
    }

    /// Make every write fail until switched off again.
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.borrow_mut().fail_writes = fail;
    }

    /// Make every read fail until switched off again.
    pub fn set_fail_reads(&self, fail: bool) {
        self.inner.borrow_mut().fail_reads = fail;
    }

    /// Drop the record for `key` without reading it, as if it were lost.
    pub fn lose(&self, key: &DocumentKey) -> bool {
        self.inner.borrow_mut().records.remove(key).is_some()
    }
}

impl PersistenceManager<DocumentKey, Document> for SimulatedPersistence {
    fn serialize(&mut self, key: &DocumentKey, value: &Document) -> Result<(), PersistenceError> {
        let mut inner = self.inner.borrow_mut();
        let rate = inner.fault_config.write_error_rate;
        if inner.fail_writes || inner.should_inject_fault(rate) {
            inner.stats.injected_write_errors += 1;
            return Err(PersistenceError::InjectedFault(format!(
                "simulated write error for {key}"
            )));
        }
        let mut record = value.clone();
        record.drop_rendering();
        inner.records.insert(key.clone(), record);
        inner.stats.writes += 1;
        Ok(())
    }

    fn deserialize(&mut self, key: &DocumentKey) -> Result<Option<Document>, PersistenceError> {
        let mut inner = self.inner.borrow_mut();
        if !inner.records.contains_key(key) {
            inner.stats.misses += 1;
            return Ok(None);
        }
        let read_rate = inner.fault_config.read_error_rate;
        if inner.fail_reads || inner.should_inject_fault(read_rate) {
            inner.stats.injected_read_errors += 1;
            return Err(PersistenceError::InjectedFault(format!(
                "simulated read error for {key}"
            )));
        }
        let corruption_rate = inner.fault_config.corruption_rate;
        if inner.should_inject_fault(corruption_rate) {
            inner.stats.corrupted_reads += 1;
            return Err(PersistenceError::Corruption {
                key: key.to_string(),
                message: "simulated corrupt record".to_string(),
            });
        }
        inner.stats.reads += 1;
        Ok(inner.records.remove(key))
    }
}
