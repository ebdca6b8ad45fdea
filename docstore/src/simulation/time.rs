//! Simulated clock for deterministic testing.
//!
//! The store reads its clock once per operation that stamps documents and
//! turns the reading into a use time of `max(reading, previous + 1)`. A
//! simulated clock lets tests hold time still, step it forward, or wind it
//! back, and count how many readings an operation took.

use std::cell::Cell;

use crate::storage::time::TimeSource;

/// A clock that only moves when told to.
///
/// ```
/// use docstore::simulation::SimulatedTimeSource;
/// use docstore::storage::time::TimeSource;
///
/// let clock = SimulatedTimeSource::new(1_000);
/// clock.advance(500);
/// clock.rewind(2_000);
/// assert_eq!(clock.now_ns(), 0);
/// assert_eq!(clock.readings(), 1);
/// ```
#[derive(Debug)]
pub struct SimulatedTimeSource {
    now_ns: Cell<u64>,
    readings: Cell<u64>,
}

impl SimulatedTimeSource {
    #[must_use]
    pub const fn new(start_ns: u64) -> Self {
        Self {
            now_ns: Cell::new(start_ns),
            readings: Cell::new(0),
        }
    }

    /// A clock starting in November 2023.
    #[must_use]
    pub const fn default_start() -> Self {
        Self::new(1_700_000_000_000_000_000)
    }

    /// Move the clock forward, saturating at `u64::MAX`.
    pub fn advance(&self, ns: u64) {
        self.now_ns.set(self.now_ns.get().saturating_add(ns));
    }

    /// Move the clock backward, as a corrected system clock might, stopping
    /// at zero.
    pub fn rewind(&self, ns: u64) {
        self.now_ns.set(self.now_ns.get().saturating_sub(ns));
    }

    /// Number of times the clock has been read.
    #[must_use]
    pub fn readings(&self) -> u64 {
        self.readings.get()
    }
}

impl TimeSource for SimulatedTimeSource {
    fn now_ns(&self) -> u64 {
        self.readings.set(self.readings.get() + 1);
        self.now_ns.get()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::document::{DocumentFormat, DocumentKey, SinglePageRenderer};
    use crate::simulation::SimulatedPersistence;
    use crate::store::DocumentStore;

    fn key(s: &str) -> DocumentKey {
        DocumentKey::new(s).expect("valid key")
    }

    fn store(clock: &Rc<SimulatedTimeSource>) -> DocumentStore {
        DocumentStore::with_parts(
            Box::new(SimulatedPersistence::new(0)),
            Box::new(SinglePageRenderer),
            Box::new(Rc::clone(clock)),
        )
    }

    fn put(store: &mut DocumentStore, k: &str, text: &str) -> u64 {
        store
            .put_document(Some(text.as_bytes()), &key(k), DocumentFormat::PlainText)
            .expect("put");
        store.last_use_time(&key(k)).expect("resident")
    }

    #[test]
    fn test_frozen_clock_still_orders_uses() {
        let clock = Rc::new(SimulatedTimeSource::new(500));
        let mut store = store(&clock);

        let uses: Vec<u64> = ["a", "b", "c"]
            .iter()
            .map(|name| put(&mut store, &format!("doc://{name}"), name))
            .collect();
        assert_eq!(uses, vec![500, 501, 502]);
    }

    #[test]
    fn test_rewound_clock_does_not_reorder_uses() {
        let clock = Rc::new(SimulatedTimeSource::new(10_000));
        let mut store = store(&clock);
        let first = put(&mut store, "doc://a", "a");

        clock.rewind(5_000);
        let second = put(&mut store, "doc://b", "b");
        assert_eq!(second, first + 1);

        clock.advance(20_000);
        let third = put(&mut store, "doc://c", "c");
        assert_eq!(third, 25_000);

        store.set_max_document_count(2).expect("limit");
        assert_eq!(store.last_use_time(&key("doc://a")), None);
    }

    #[test]
    fn test_one_reading_per_search_and_group_undo() {
        let clock = Rc::new(SimulatedTimeSource::new(1));
        let mut store = store(&clock);
        for name in ["a", "b", "c"] {
            put(&mut store, &format!("doc://{name}"), "shared");
        }
        assert_eq!(clock.readings(), 3);

        store.search("shared").expect("search");
        assert_eq!(clock.readings(), 4);
        let a = store.last_use_time(&key("doc://a"));
        assert_eq!(a, store.last_use_time(&key("doc://c")));

        store.delete_all("shared").expect("delete all");
        store.undo().expect("undo");
        assert_eq!(clock.readings(), 5);
        assert!(store.last_use_time(&key("doc://b")) > a);
    }

    #[test]
    fn test_rewind_saturates_at_zero() {
        let clock = SimulatedTimeSource::new(3);
        clock.rewind(10);
        clock.advance(u64::MAX);
        clock.advance(1);
        assert_eq!(clock.now_ns(), u64::MAX);
    }
}
