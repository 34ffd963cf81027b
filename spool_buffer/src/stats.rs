//! Self-statistics for the buffer.
//!
//! ## Metrics
//!
//! `agent.metrics_written`: Metrics handed to the buffer by `add`
//! `agent.metrics_dropped`: Metrics evicted by the buffer for exceeding their
//! time-to-live
//!
//! Both are emitted by [`MetricsStats`]. Any other sink may be injected by
//! implementing [`Stats`].

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use metrics::{Counter, Label, counter};

/// Name of the counter incremented once per metric passed to `add`.
pub const METRICS_WRITTEN: &str = "agent.metrics_written";
/// Name of the counter incremented once per metric evicted by TTL.
pub const METRICS_DROPPED: &str = "agent.metrics_dropped";

/// A sink for buffer self-statistics.
///
/// Implementations must tolerate concurrent calls. The buffer calls these
/// while holding its own lock but makes no promise to callers beyond that.
pub trait Stats: Send + Sync {
    /// One metric was written into the buffer.
    fn written(&self);
    /// One metric was evicted from the buffer.
    fn dropped(&self);
}

impl<S> Stats for Arc<S>
where
    S: Stats + ?Sized,
{
    fn written(&self) {
        self.as_ref().written();
    }

    fn dropped(&self) {
        self.as_ref().dropped();
    }
}

#[derive(Clone)]
/// [`Stats`] backed by the `metrics` crate's global recorder.
pub struct MetricsStats {
    written: Counter,
    dropped: Counter,
}

impl MetricsStats {
    /// Register the buffer counters with the given labels.
    #[must_use]
    pub fn new(labels: &[(String, String)]) -> Self {
        let labels: Vec<Label> = labels
            .iter()
            .map(|(k, v)| Label::new(k.clone(), v.clone()))
            .collect();
        Self {
            written: counter!(METRICS_WRITTEN, labels.clone()),
            dropped: counter!(METRICS_DROPPED, labels),
        }
    }
}

impl fmt::Debug for MetricsStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsStats").finish_non_exhaustive()
    }
}

impl Stats for MetricsStats {
    fn written(&self) {
        self.written.increment(1);
    }

    fn dropped(&self) {
        self.dropped.increment(1);
    }
}

#[derive(Debug, Default)]
/// [`Stats`] kept in a pair of atomics, readable in-process.
pub struct CountingStats {
    written: AtomicU64,
    dropped: AtomicU64,
}

impl CountingStats {
    /// Create a new `CountingStats` with both counts at zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total metrics written so far
    #[must_use]
    pub fn written_total(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    /// Total metrics dropped so far
    #[must_use]
    pub fn dropped_total(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Stats for CountingStats {
    fn written(&self) {
        self.written.fetch_add(1, Ordering::Relaxed);
    }

    fn dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use metrics::{Key, Label};
    use metrics_util::{
        CompositeKey, MetricKind,
        debugging::{DebugValue, DebuggingRecorder},
    };

    use super::{METRICS_DROPPED, METRICS_WRITTEN, MetricsStats, Stats};

    #[test]
    fn metrics_stats_emit_labelled_counters() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            let labels = vec![("component".to_string(), "output".to_string())];
            let stats = MetricsStats::new(&labels);
            stats.written();
            stats.written();
            stats.dropped();
        });

        #[allow(clippy::mutable_key_type)] // CompositeKey has interior mutability
        let snapshot = snapshotter.snapshot().into_hashmap();
        let labels = vec![Label::new("component", "output")];

        let written = snapshot
            .get(&CompositeKey::new(
                MetricKind::Counter,
                Key::from_parts(METRICS_WRITTEN, labels.clone()),
            ))
            .expect("written counter not found");
        assert!(matches!(written.2, DebugValue::Counter(2)));

        let dropped = snapshot
            .get(&CompositeKey::new(
                MetricKind::Counter,
                Key::from_parts(METRICS_DROPPED, labels),
            ))
            .expect("dropped counter not found");
        assert!(matches!(dropped.2, DebugValue::Counter(1)));
    }
}
