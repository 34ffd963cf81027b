//! The flush loop.
//!
//! Every output runs one [`Flusher`]. It wakes on the output's flush interval,
//! plus a random jitter, or early when a producer reports a full batch
//! waiting, and drains the buffer into the output `batch_size` metrics at a
//! time. A failed write is logged and the batch dropped: the buffer has no
//! redelivery. On shutdown the loop drains the buffer one final time.
//!
//! ## Metrics
//!
//! `output.metrics_sent`: Metrics written successfully
//! `output.write_failures`: Writes that returned an error
//! `output.metrics_failed`: Metrics lost to failed writes
//! `agent.buffer_size`: Metrics left in the buffer after a flush
//!

use std::{sync::Arc, time::Duration};

use metrics::{counter, gauge};
use rand::{Rng, SeedableRng, rngs::SmallRng};
use spool_buffer::MetricBuffer;
use tokio::{
    sync::Notify,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{output, router::Route, signals::Watcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// The resolved flush settings for one output.
pub struct Settings {
    /// Maximum metrics per write
    pub batch_size: usize,
    /// Time between flushes
    pub interval: Duration,
    /// Upper bound of the random delay added to each interval flush
    pub jitter: Duration,
}

#[derive(Debug)]
/// Drains one output's buffer into that output.
pub struct Flusher {
    output: output::Server,
    buffer: Arc<MetricBuffer>,
    settings: Settings,
    ready: Arc<Notify>,
    shutdown: Watcher,
    rng: SmallRng,
    metric_labels: Vec<(String, String)>,
}

impl Flusher {
    /// Create a new [`Flusher`] draining `buffer` into `output`.
    #[must_use]
    pub fn new(
        output: output::Server,
        buffer: Arc<MetricBuffer>,
        settings: Settings,
        shutdown: Watcher,
        metric_labels: Vec<(String, String)>,
    ) -> Self {
        Self {
            output,
            buffer,
            settings,
            ready: Arc::new(Notify::new()),
            shutdown,
            rng: SmallRng::from_rng(&mut rand::rng()),
            metric_labels,
        }
    }

    /// The producer-side handle to this flusher's buffer.
    #[must_use]
    pub fn route(&self) -> Route {
        Route::new(
            Arc::clone(&self.buffer),
            self.settings.batch_size,
            Arc::clone(&self.ready),
        )
    }

    fn jitter(&mut self) -> Duration {
        if self.settings.jitter.is_zero() {
            return Duration::ZERO;
        }
        self.rng.random_range(Duration::ZERO..self.settings.jitter)
    }

    /// Drain the buffer into the output, one batch at a time.
    ///
    /// At most the metrics held when the flush starts are taken. Anything
    /// added meanwhile waits for the next flush. Returns the number of
    /// metrics written successfully.
    pub async fn flush(&mut self) -> u64 {
        let mut budget = self.buffer.len();
        let mut written: u64 = 0;

        while budget > 0 {
            let batch = self.buffer.batch(budget.min(self.settings.batch_size));
            if batch.is_empty() {
                break;
            }
            let n = batch.len();
            budget -= n;
            match self.output.write(&batch).await {
                Ok(()) => {
                    counter!("output.metrics_sent", &self.metric_labels).increment(n as u64);
                    written += n as u64;
                }
                Err(err) => {
                    warn!("output write failed, dropping {n} metrics: {err}");
                    counter!("output.write_failures", &self.metric_labels).increment(1);
                    counter!("output.metrics_failed", &self.metric_labels).increment(n as u64);
                }
            }
        }

        let remaining = self.buffer.len();
        gauge!("agent.buffer_size", &self.metric_labels).set(remaining as f64);
        debug!(
            written = written,
            remaining = remaining,
            ttl_seconds = self.buffer.ttl().as_secs(),
            "buffer status after flush"
        );
        written
    }

    /// Run [`Flusher`] until the shutdown signal is received, then drain once
    /// more and return.
    pub async fn run(mut self) {
        let mut ticker = time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let ready = Arc::clone(&self.ready);
        let mut shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                biased;

                () = shutdown.recv() => {
                    info!("shutdown signal received, flushing remaining metrics");
                    self.flush().await;
                    return;
                }
                _ = ticker.tick() => {
                    let jitter = self.jitter();
                    if !jitter.is_zero() {
                        // Shutdown cuts the jitter short, the next iteration
                        // observes it and drains.
                        tokio::select! {
                            () = time::sleep(jitter) => {},
                            () = shutdown.recv() => {},
                        }
                    }
                    self.flush().await;
                }
                () = ready.notified() => {
                    self.flush().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
        thread,
        time::{Duration, UNIX_EPOCH},
    };

    use metrics::{Key, Label};
    use metrics_util::{
        CompositeKey, MetricKind,
        debugging::{DebugValue, DebuggingRecorder},
    };
    use spool_buffer::{Metric, MetricBuffer, MetricsStats};

    use super::{Flusher, Settings};
    use crate::{
        output::{self, json_lines},
        router::Router,
        signals,
    };

    fn metrics(n: usize) -> Vec<Metric> {
        (0..n)
            .map(|i| Metric::new("cpu", UNIX_EPOCH).with_tag("idx", i.to_string()))
            .collect()
    }

    fn read_metrics(path: &std::path::Path) -> Vec<Metric> {
        std::fs::read_to_string(path)
            .unwrap_or_default()
            .lines()
            .map(|line| serde_json::from_str(line).expect("line is not a metric"))
            .collect()
    }

    fn json_flusher(
        path: std::path::PathBuf,
        settings: Settings,
        shutdown: signals::Watcher,
    ) -> (Flusher, Arc<MetricBuffer>) {
        let buffer = Arc::new(MetricBuffer::new(
            Duration::from_secs(60),
            MetricsStats::new(&[]),
        ));
        let output =
            output::Server::JsonLines(json_lines::JsonLines::new(&json_lines::Config { path }));
        let flusher = Flusher::new(output, Arc::clone(&buffer), settings, shutdown, vec![]);
        (flusher, buffer)
    }

    #[tokio::test]
    async fn flush_drains_in_batches_in_order() {
        let dir = tempfile::tempdir().expect("directory could not be created");
        let path = dir.path().join("out.jsonl");
        let (watcher, _broadcaster) = signals::signal();
        let settings = Settings {
            batch_size: 3,
            interval: Duration::from_secs(3600),
            jitter: Duration::ZERO,
        };
        let (mut flusher, buffer) = json_flusher(path.clone(), settings, watcher);

        buffer.add(metrics(7));
        assert_eq!(flusher.flush().await, 7);
        assert!(buffer.is_empty());
        assert_eq!(read_metrics(&path), metrics(7));
    }

    #[tokio::test]
    async fn failed_writes_drop_the_batch() {
        let dir = tempfile::tempdir().expect("directory could not be created");
        let path = dir.path().join("missing").join("out.jsonl");
        let (watcher, _broadcaster) = signals::signal();
        let settings = Settings {
            batch_size: 2,
            interval: Duration::from_secs(3600),
            jitter: Duration::ZERO,
        };
        let (mut flusher, buffer) = json_flusher(path, settings, watcher);

        buffer.add(metrics(5));
        assert_eq!(flusher.flush().await, 0);
        assert!(buffer.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn flush_ends_while_producers_keep_up() {
        let dir = tempfile::tempdir().expect("directory could not be created");
        let path = dir.path().join("out.jsonl");
        let (watcher, _broadcaster) = signals::signal();
        let settings = Settings {
            batch_size: 3,
            interval: Duration::from_secs(3600),
            jitter: Duration::ZERO,
        };
        let (mut flusher, buffer) = json_flusher(path, settings, watcher);
        buffer.add(metrics(9));

        let stop = Arc::new(AtomicBool::new(false));
        let producer = {
            let buffer = Arc::clone(&buffer);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    buffer.add(metrics(3));
                    thread::yield_now();
                }
            })
        };

        let res = tokio::time::timeout(Duration::from_secs(10), flusher.flush()).await;
        stop.store(true, Ordering::Relaxed);
        producer.join().expect("producer panicked");

        let written = res.expect("flush never finished under constant load");
        assert!(written >= 9);
    }

    #[tokio::test]
    async fn full_batch_flushes_before_interval() {
        let dir = tempfile::tempdir().expect("directory could not be created");
        let path = dir.path().join("out.jsonl");
        let (watcher, broadcaster) = signals::signal();
        let settings = Settings {
            batch_size: 4,
            interval: Duration::from_secs(3600),
            jitter: Duration::from_secs(1),
        };
        let (flusher, buffer) = json_flusher(path.clone(), settings, watcher);
        let router = Router::new(vec![flusher.route()]);
        let handle = tokio::spawn(flusher.run());

        // Let the immediate first tick and its jitter pass the empty buffer.
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        router.deliver(metrics(4));

        let mut drained = false;
        for _ in 0..100 {
            if buffer.is_empty() {
                drained = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(drained, "full batch was not flushed early");

        broadcaster.signal();
        handle.await.expect("flusher panicked");
        assert_eq!(read_metrics(&path), metrics(4));
    }

    #[tokio::test]
    async fn shutdown_drains_everything() {
        let dir = tempfile::tempdir().expect("directory could not be created");
        let path = dir.path().join("out.jsonl");
        let (watcher, broadcaster) = signals::signal();
        let settings = Settings {
            batch_size: 100,
            interval: Duration::from_secs(3600),
            jitter: Duration::ZERO,
        };
        let (flusher, buffer) = json_flusher(path.clone(), settings, watcher);
        let router = Router::new(vec![flusher.route()]);

        router.deliver(metrics(10));
        broadcaster.signal();
        flusher.run().await;

        assert!(buffer.is_empty());
        assert_eq!(read_metrics(&path), metrics(10));
    }

    #[test]
    fn flush_counts_sent_and_failed() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        let dir = tempfile::tempdir().expect("directory could not be created");
        let good = dir.path().join("out.jsonl");
        let bad = dir.path().join("missing").join("out.jsonl");
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime could not be built");

        metrics::with_local_recorder(&recorder, || {
            runtime.block_on(async {
                let settings = Settings {
                    batch_size: 2,
                    interval: Duration::from_secs(3600),
                    jitter: Duration::ZERO,
                };
                let (watcher, _broadcaster) = signals::signal();
                let (mut flusher, buffer) = json_flusher(good, settings, watcher.clone());
                buffer.add(metrics(3));
                flusher.flush().await;

                let (mut flusher, buffer) = json_flusher(bad, settings, watcher);
                buffer.add(metrics(5));
                flusher.flush().await;
            });
        });

        #[allow(clippy::mutable_key_type)] // CompositeKey has interior mutability
        let snapshot = snapshotter.snapshot().into_hashmap();
        let counter = |name: &'static str| {
            let key = CompositeKey::new(
                MetricKind::Counter,
                Key::from_parts(name, Vec::<Label>::new()),
            );
            match snapshot.get(&key) {
                Some((_, _, DebugValue::Counter(value))) => *value,
                other => panic!("unexpected value for {name}: {other:?}"),
            }
        };
        // Both flushers share the empty label set, so the counters add up.
        assert_eq!(counter("output.metrics_sent"), 3);
        assert_eq!(counter("output.write_failures"), 3);
        assert_eq!(counter("output.metrics_failed"), 5);
    }
}
