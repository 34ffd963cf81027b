//! The synthetic input.
//!
//! Produces `series` metrics per interval, all sharing one name and told apart
//! by a `series` tag, each carrying a single random `value` field. Values come
//! from a seeded RNG so a given configuration gathers the same sequence every
//! run.
//!
//! ## Metrics
//!
//! `input.metrics_gathered`: Metrics produced and handed to the router
//!

use std::time::{Duration, SystemTime};

use metrics::counter;
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use spool_buffer::Metric;
use tokio::time::{self, MissedTickBehavior};
use tracing::info;

use crate::{router::Router, signals::Watcher};

use super::General;

fn default_series() -> u32 {
    1
}

fn default_interval_milliseconds() -> u64 {
    1_000
}

/// Errors produced by [`Synthetic`].
#[derive(thiserror::Error, Debug, Clone, Copy)]
pub enum Error {
    /// The gather interval was zero.
    #[error("synthetic input interval must be greater than zero")]
    ZeroInterval,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(deny_unknown_fields)]
/// Configuration of this input.
pub struct Config {
    /// The seed for random operations against this input
    pub seed: [u8; 32],
    /// The name given to every gathered metric
    pub name: String,
    /// The number of distinct series gathered per interval
    #[serde(default = "default_series")]
    pub series: u32,
    /// The time between gathers
    #[serde(default = "default_interval_milliseconds")]
    pub interval_milliseconds: u64,
}

/// The deterministic half of [`Synthetic`], separate so it can be borrowed
/// while the shutdown watcher is.
#[derive(Debug)]
struct Series {
    rng: StdRng,
    name: String,
    count: u32,
}

impl Series {
    fn gather(&mut self, now: SystemTime) -> Vec<Metric> {
        (0..self.count)
            .map(|i| {
                Metric::new(self.name.clone(), now)
                    .with_tag("series", i.to_string())
                    .with_field("value", self.rng.random::<f64>())
            })
            .collect()
    }
}

#[derive(Debug)]
/// The synthetic input.
pub struct Synthetic {
    series: Series,
    interval: Duration,
    shutdown: Watcher,
    metric_labels: Vec<(String, String)>,
}

impl Synthetic {
    /// Create a new [`Synthetic`] instance
    ///
    /// # Errors
    ///
    /// Creation will fail if the configured interval is zero.
    pub fn new(general: &General, config: Config, shutdown: Watcher) -> Result<Self, Error> {
        if config.interval_milliseconds == 0 {
            return Err(Error::ZeroInterval);
        }

        Ok(Self {
            series: Series {
                rng: StdRng::from_seed(config.seed),
                name: config.name,
                count: config.series,
            },
            interval: Duration::from_millis(config.interval_milliseconds),
            shutdown,
            metric_labels: super::metric_labels(general, "synthetic"),
        })
    }

    /// Run [`Synthetic`] to completion or until a shutdown signal is received.
    ///
    /// # Errors
    ///
    /// Function will not error.
    pub async fn spin(mut self, router: Router) -> Result<(), Error> {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let gathered = counter!("input.metrics_gathered", &self.metric_labels);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let metrics = self.series.gather(SystemTime::now());
                    gathered.increment(metrics.len() as u64);
                    router.deliver(metrics);
                }
                () = self.shutdown.recv() => {
                    info!("shutdown signal received");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::UNIX_EPOCH;

    use spool_buffer::Field;

    use super::{Config, Error, General, Synthetic};
    use crate::signals;

    fn config(seed: u8, series: u32) -> Config {
        Config {
            seed: [seed; 32],
            name: "cpu".to_string(),
            series,
            interval_milliseconds: 10,
        }
    }

    #[test]
    fn gathers_one_metric_per_series() {
        let (watcher, _broadcaster) = signals::signal();
        let mut input =
            Synthetic::new(&General::default(), config(1, 3), watcher).expect("valid config");

        let metrics = input.series.gather(UNIX_EPOCH);
        assert_eq!(metrics.len(), 3);
        for (i, metric) in metrics.iter().enumerate() {
            assert_eq!(metric.name, "cpu");
            assert_eq!(metric.tags["series"], i.to_string());
            assert_eq!(metric.timestamp, UNIX_EPOCH);
            assert!(matches!(metric.fields["value"], Field::Float(v) if (0.0..1.0).contains(&v)));
        }
    }

    #[test]
    fn same_seed_same_values() {
        let (watcher, _broadcaster) = signals::signal();
        let mut a = Synthetic::new(&General::default(), config(7, 4), watcher.clone())
            .expect("valid config");
        let mut b =
            Synthetic::new(&General::default(), config(7, 4), watcher).expect("valid config");

        for _ in 0..3 {
            assert_eq!(a.series.gather(UNIX_EPOCH), b.series.gather(UNIX_EPOCH));
        }
    }

    #[test]
    fn zero_interval_is_rejected() {
        let (watcher, _broadcaster) = signals::signal();
        let mut conf = config(0, 1);
        conf.interval_milliseconds = 0;
        assert!(matches!(
            Synthetic::new(&General::default(), conf, watcher),
            Err(Error::ZeroInterval)
        ));
    }
}
