//! The static input.
//!
//! Replays a fixed list of configured metrics every interval, each copy
//! stamped with the time of gathering.
//!
//! ## Metrics
//!
//! `input.metrics_gathered`: Metrics produced and handed to the router
//!

use std::time::{Duration, SystemTime};

use metrics::counter;
use serde::{Deserialize, Serialize};
use spool_buffer::Metric;
use tokio::time::{self, MissedTickBehavior};
use tracing::info;

use crate::{router::Router, signals::Watcher};

use super::General;

/// Errors produced by [`Static`].
#[derive(thiserror::Error, Debug, Clone, Copy)]
pub enum Error {
    /// The gather interval was zero.
    #[error("static input interval must be greater than zero")]
    ZeroInterval,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(deny_unknown_fields)]
/// Configuration of this input.
pub struct Config {
    /// The metrics to replay
    pub metrics: Vec<Metric>,
    /// The time between gathers
    pub interval_milliseconds: u64,
}

#[derive(Debug)]
/// The static input.
pub struct Static {
    metrics: Vec<Metric>,
    interval: Duration,
    shutdown: Watcher,
    metric_labels: Vec<(String, String)>,
}

impl Static {
    /// Create a new [`Static`] instance
    ///
    /// # Errors
    ///
    /// Creation will fail if the configured interval is zero.
    pub fn new(general: &General, config: Config, shutdown: Watcher) -> Result<Self, Error> {
        if config.interval_milliseconds == 0 {
            return Err(Error::ZeroInterval);
        }

        Ok(Self {
            metrics: config.metrics,
            interval: Duration::from_millis(config.interval_milliseconds),
            shutdown,
            metric_labels: super::metric_labels(general, "static"),
        })
    }

    fn gather(metrics: &[Metric], now: SystemTime) -> Vec<Metric> {
        metrics.iter().map(|m| m.restamped(now)).collect()
    }

    /// Run [`Static`] to completion or until a shutdown signal is received.
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
                    let metrics = Self::gather(&self.metrics, SystemTime::now());
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
