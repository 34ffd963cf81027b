//! The spool telemetry agent.
//!
//! This library supports the spool binary found elsewhere in this project.
//! Inputs gather metrics on an interval and hand them to every output's
//! [`spool_buffer::TtlBuffer`]; each output drains its buffer in batches on
//! its own flush interval. Stale metrics are shed by the buffer rather than
//! allowed to pile up when an output falls behind.

#![deny(clippy::all)]
#![deny(clippy::cargo)]
#![deny(clippy::pedantic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(clippy::dbg_macro)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]
#![deny(missing_debug_implementations)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::multiple_crate_versions)]

pub mod agent;
pub mod config;
pub mod flush;
pub mod input;
pub mod output;
pub mod router;
pub mod signals;
