//! End-to-end tests at the public store level.
//!
//! Each test file covers a specific scenario, using deterministic inputs
//! to verify a complete sequence of store operations.

#![cfg(test)]

mod helpers;

mod test_delete_all;
mod test_disk_persistence;
mod test_eviction;
mod test_pdf_ingest;
mod test_search_ordering;
mod test_undo;
mod test_undo_group;
