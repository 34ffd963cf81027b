//! The discard output.
//!
//! Accepts every batch and does nothing with it.
//!
//! ## Metrics
//!
//! `output.metrics_discarded`: Metrics received and thrown away
//!

use std::fmt;

use metrics::{Counter, counter};
use serde::{Deserialize, Serialize};
use spool_buffer::Metric;

#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
/// Configuration for [`Discard`]
pub struct Config {}

/// The discard output.
pub struct Discard {
    discarded: Counter,
}

impl fmt::Debug for Discard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Discard").finish_non_exhaustive()
    }
}

impl Discard {
    /// Create a new [`Discard`] output
    #[must_use]
    pub fn new(_config: &Config, metric_labels: Vec<(String, String)>) -> Self {
        Self {
            discarded: counter!("output.metrics_discarded", &metric_labels),
        }
    }

    pub(crate) fn write(&mut self, batch: &[Metric]) {
        self.discarded.increment(batch.len() as u64);
    }
}
