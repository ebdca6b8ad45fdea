//! Time source abstraction for deterministic simulation testing.
//!
//! The store stamps every use of a document with a time from a
//! [`TimeSource`], so tests can swap the system clock for a simulated one.

use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Abstraction over time operations.
pub trait TimeSource {
    /// Get the current time in nanoseconds since Unix epoch.
    fn now_ns(&self) -> u64;
}

impl<T: TimeSource + ?Sized> TimeSource for Rc<T> {
    fn now_ns(&self) -> u64 {
        (**self).now_ns()
    }
}

impl<T: TimeSource + ?Sized> TimeSource for Box<T> {
    fn now_ns(&self) -> u64 {
        (**self).now_ns()
    }
}

/// Real time source using system clock.
///
/// This is the default implementation used in production.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_ns(&self) -> u64 {
        // A clock before 1970 reads as 0; the store keeps its own ticks
        // strictly increasing regardless.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |duration| {
                u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
            })
    }
}
