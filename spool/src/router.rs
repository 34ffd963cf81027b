//! Fan-out from inputs to output buffers.
//!
//! Every output owns one [`MetricBuffer`]. Inputs do not know about outputs,
//! they hold a [`Router`] and hand it each burst of gathered metrics. The
//! router copies the burst into every output's buffer and, when a buffer has
//! a full batch waiting, wakes that output's flush loop early.

use std::sync::Arc;

use spool_buffer::{Metric, MetricBuffer};
use tokio::sync::Notify;

#[derive(Debug, Clone)]
/// The producer-side handle to one output's buffer.
pub struct Route {
    buffer: Arc<MetricBuffer>,
    batch_size: usize,
    ready: Arc<Notify>,
}

impl Route {
    /// Create a new `Route`. `ready` is notified whenever `buffer` holds at
    /// least `batch_size` metrics after an add.
    #[must_use]
    pub fn new(buffer: Arc<MetricBuffer>, batch_size: usize, ready: Arc<Notify>) -> Self {
        Self {
            buffer,
            batch_size,
            ready,
        }
    }

    fn deliver(&self, metrics: Vec<Metric>) {
        self.buffer.add(metrics);
        if self.buffer.len() >= self.batch_size {
            self.ready.notify_one();
        }
    }
}

#[derive(Debug, Clone, Default)]
/// The set of every output's [`Route`].
pub struct Router {
    routes: Arc<[Route]>,
}

impl Router {
    /// Create a new `Router` over `routes`
    #[must_use]
    pub fn new(routes: Vec<Route>) -> Self {
        Self {
            routes: routes.into(),
        }
    }

    /// Deliver `metrics` to every route. The last route takes the original,
    /// the rest get copies.
    pub fn deliver(&self, metrics: Vec<Metric>) {
        if let Some((last, rest)) = self.routes.split_last() {
            for route in rest {
                route.deliver(metrics.clone());
            }
            last.deliver(metrics);
        }
    }
}
