//! The spool metric buffer
//!
//! This library holds the piece of spool that decouples collection from
//! transmission: a time-decaying FIFO of metrics, [`TtlBuffer`]. Inputs push
//! bursts of metrics in, outputs pull bounded batches out and anything that
//! lingers past its time-to-live is shed the next time an input writes.

#![deny(clippy::all)]
#![deny(clippy::cargo)]
#![deny(clippy::pedantic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(clippy::dbg_macro)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]
#![deny(missing_debug_implementations)]
#![allow(clippy::multiple_crate_versions)]

pub mod clock;
pub mod metric;
pub mod stats;
pub mod ttl;

pub use clock::{Clock, ManualClock, RealClock};
pub use metric::{Field, Metric};
pub use stats::{CountingStats, MetricsStats, Stats};
pub use ttl::TtlBuffer;

/// The buffer as the agent uses it: metrics in, `metrics` crate counters out.
pub type MetricBuffer<C = RealClock> = TtlBuffer<Metric, MetricsStats, C>;
