//! The time-decaying buffer
//!
//! [`TtlBuffer`] is a FIFO of items, each remembering when it arrived. Items
//! are inserted in bursts by `add` and extracted oldest-first by `batch`. Any
//! item older than the buffer's time-to-live is evicted at the end of the next
//! `add`. There is no background timer: a buffer nobody writes to keeps what
//! it has.
//!
//! Neither operation can fail. Eviction is ordinary flow control under
//! backpressure and is visible only through the injected [`Stats`] sink.

use std::{collections::VecDeque, sync::PoisonError, time::Duration};

#[cfg(not(loom))]
use std::sync::{Mutex, MutexGuard};

#[cfg(loom)]
use loom::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::{
    clock::{self, Clock, RealClock},
    stats::Stats,
};

/// A buffered item and the tick at which it arrived.
#[derive(Debug)]
struct Entry<T> {
    item: T,
    arrival: u64,
}

#[derive(Debug)]
/// A thread-safe FIFO with time-to-live eviction.
///
/// All operations serialize on a single mutex scoped to the whole buffer.
/// Critical sections are proportional to the number of items moved and do no
/// I/O.
pub struct TtlBuffer<T, S, C = RealClock> {
    entries: Mutex<VecDeque<Entry<T>>>,
    /// Time-to-live in clock ticks.
    ttl: u64,
    stats: S,
    clock: C,
}

impl<T, S> TtlBuffer<T, S, RealClock>
where
    S: Stats,
{
    /// Create a new `TtlBuffer` with a real-time clock.
    #[must_use]
    pub fn new(ttl: Duration, stats: S) -> Self {
        Self::with_clock(ttl, stats, RealClock::default())
    }
}

impl<T, S, C> TtlBuffer<T, S, C>
where
    S: Stats,
    C: Clock,
{
    /// Create a new `TtlBuffer` reading time from `clock`.
    #[must_use]
    pub fn with_clock(ttl: Duration, stats: S, clock: C) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            ttl: clock::ticks(ttl),
            stats,
            clock,
        }
    }

    /// The time-to-live this buffer was created with.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_micros(self.ttl)
    }

    /// The number of items currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the buffer holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Append `items` in order, then evict everything past its time-to-live.
    ///
    /// Every item in one call shares a single arrival time. Each item counts
    /// once as written; each eviction counts once as dropped.
    pub fn add<I>(&self, items: I)
    where
        I: IntoIterator<Item = T>,
    {
        let mut entries = self.lock();
        let now = self.clock.ticks_elapsed();

        for item in items {
            self.stats.written();
            entries.push_back(Entry { item, arrival: now });
        }

        // Strictly older than the deadline goes. With a zero ttl the items
        // just added survive until a later call observes a later tick.
        let deadline = now.saturating_sub(self.ttl);
        let mut evicted: u64 = 0;
        while entries.front().is_some_and(|entry| entry.arrival < deadline) {
            entries.pop_front();
            self.stats.dropped();
            evicted += 1;
        }

        if evicted > 0 {
            debug!(
                evicted = evicted,
                remaining = entries.len(),
                "Evicted expired items from buffer"
            );
        }
    }

    /// Remove and return up to `batch_size` of the oldest items, oldest first.
    ///
    /// A request larger than the buffer returns everything; a request of zero
    /// returns nothing. No eviction is performed and no counter moves.
    #[must_use]
    pub fn batch(&self, batch_size: usize) -> Vec<T> {
        let mut entries = self.lock();
        let n = entries.len().min(batch_size);
        if n == 0 {
            return Vec::new();
        }

        entries.drain(..n).map(|entry| entry.item).collect()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Entry<T>>> {
        // A panic while holding the lock cannot leave the deque half-updated,
        // every mutation is a single push or pop.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}


#[cfg(all(test, loom))]
mod loom_tests {
    use std::{sync::Arc as StdArc, time::Duration};

    use loom::{sync::Arc, thread};

    use super::TtlBuffer;
    use crate::{clock::ManualClock, stats::CountingStats};

    #[test]
    fn concurrent_add_and_batch() {
        loom::model(|| {
            let stats = StdArc::new(CountingStats::new());
            let buffer = Arc::new(TtlBuffer::with_clock(
                Duration::from_secs(60),
                StdArc::clone(&stats),
                ManualClock::new(),
            ));

            let producer = {
                let buffer = Arc::clone(&buffer);
                thread::spawn(move || buffer.add([1_u32, 2]))
            };
            let consumer = {
                let buffer = Arc::clone(&buffer);
                thread::spawn(move || buffer.batch(1))
            };

            buffer.add([3_u32]);
            producer.join().unwrap();
            let mut seen = consumer.join().unwrap();
            seen.extend(buffer.batch(10));

            // 1 always precedes 2, whatever else interleaves.
            let one = seen.iter().position(|v| *v == 1).unwrap();
            let two = seen.iter().position(|v| *v == 2).unwrap();
            assert!(one < two);
            assert_eq!(seen.len(), 3);
            assert!(buffer.is_empty());
            assert_eq!(stats.written_total(), 3);
        });
    }
}
