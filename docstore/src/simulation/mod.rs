//! Deterministic Simulation Testing (DST) infrastructure.
//!
//! This module provides tools for testing the store with:
//! - Controlled time (no real system time)
//! - In-memory persistence with fault injection
//! - Reproducible random workloads checked against a reference model
//! - Invariant checking after each operation
//!
//! # Design Principles
//!
//! Following patterns from `TigerBeetle` and `Turso`:
//! 1. All I/O is abstracted and can be simulated
//! 2. All randomness is seeded for reproducibility
//! 3. Time is controlled, not real
//! 4. Faults can be injected at any I/O boundary
//! 5. Given the same seed, execution is identical
//!
//! # Usage
//!
//! ```
//! use docstore::simulation::{FaultConfig, Simulator, SimulatorConfig};
//!
//! let config = SimulatorConfig::new(12345).with_fault_config(FaultConfig::low_faults());
//!
//! let mut sim = Simulator::new(config);
//! let result = sim.run(200);
//!
//! assert!(result.invariant_violations.is_empty());
//! ```

mod invariants;
mod persistence;
mod simulator;
mod time;

pub use invariants::{
    HistoryStats, InvariantChecker, InvariantViolation, Operation, OperationHistory,
    RecordedOperation,
};
pub use persistence::{FaultConfig, SimulatedPersistence, SimulatedPersistenceStats};
pub use simulator::{SimulationResult, Simulator, SimulatorConfig};
pub use time::SimulatedTimeSource;
