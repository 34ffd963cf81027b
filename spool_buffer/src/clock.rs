//! Clocks for the buffer
//!
//! [`TtlBuffer`](crate::TtlBuffer) never reads the system time directly, it
//! asks a [`Clock`]. Production code uses [`RealClock`], tests drive
//! [`ManualClock`] forward by hand to simulate the passage of time.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

/// The `Clock` used by every buffer
///
/// A tick is one microsecond. Ticks are absolute with respect to the clock's
/// own epoch and must never go backward.
pub trait Clock {
    /// The number of ticks elapsed since the clock's epoch
    fn ticks_elapsed(&self) -> u64;
}

/// Convert a [`Duration`] into ticks, saturating at `u64::MAX`.
#[must_use]
pub fn ticks(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

#[derive(Debug, Clone, Copy)]
/// A clock that operates with respect to real-clock time.
pub struct RealClock {
    start: Instant,
}

impl Default for RealClock {
    fn default() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Clock for RealClock {
    /// Return the number of ticks since `Clock` was created.
    fn ticks_elapsed(&self) -> u64 {
        ticks(Instant::now().duration_since(self.start))
    }
}

#[derive(Debug, Clone, Default)]
/// A clock that only moves when told to.
///
/// Clones share the same tick count, so a test can hand one clone to a buffer
/// and keep another to advance time.
pub struct ManualClock {
    ticks: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a new `ManualClock` at tick zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward by `by`
    pub fn advance(&self, by: Duration) {
        let by = ticks(by);
        // fetch_update rather than fetch_add: the clock saturates, it does
        // not wrap.
        let _ = self
            .ticks
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |t| {
                Some(t.saturating_add(by))
            });
    }
}

impl Clock for ManualClock {
    fn ticks_elapsed(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }
}
