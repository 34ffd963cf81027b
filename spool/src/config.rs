//! This module controls configuration parsing from the end user, providing a
//! convenience mechanism for the rest of the program. Crashes are most likely
//! to originate from this code, intentionally.
use std::{net::SocketAddr, time::Duration};

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Deserialize;

use crate::{flush, input, output};

/// Errors produced by [`Config`]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Error for a serde [`serde_yaml`].
    #[error("Failed to deserialize yaml: {0}")]
    SerdeYaml(#[from] serde_yaml::Error),
    /// The agent-wide batch size was zero
    #[error("agent batch_size must be greater than zero")]
    ZeroBatchSize,
    /// An output overrode the batch size with zero
    #[error("output {0} batch_size must be greater than zero")]
    ZeroOutputBatchSize(String),
    /// The agent-wide flush interval was zero
    #[error("agent flush_interval_milliseconds must be greater than zero")]
    ZeroFlushInterval,
    /// An output overrode the flush interval with zero
    #[error("output {0} flush_interval_milliseconds must be greater than zero")]
    ZeroOutputFlushInterval(String),
    /// An input was configured to gather on a zero interval
    #[error("input {0} interval_milliseconds must be greater than zero")]
    ZeroInputInterval(String),
    /// Error for duplicate IDs in inputs
    #[error("Duplicate input ID found: {0}")]
    DuplicateInputId(String),
    /// Error for duplicate IDs in outputs
    #[error("Duplicate output ID found: {0}")]
    DuplicateOutputId(String),
    /// No outputs were configured, every gathered metric would be lost
    #[error("At least one output must be configured")]
    NoOutputs,
}

/// Main configuration struct for this program
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// The method by which to express telemetry
    #[serde(default)]
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub telemetry: Option<Telemetry>,
    /// Defaults shared by every output
    #[serde(default)]
    pub agent: Agent,
    /// The inputs gathering metrics
    #[serde(default)]
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub input: Vec<input::Config>,
    /// The outputs receiving metrics
    #[serde(default)]
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub output: Vec<output::Config>,
}

#[derive(Debug, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
/// Defines the manner of spool's own telemetry.
pub enum Telemetry {
    /// In prometheus mode spool will emit its internal telemetry for scraping
    /// at a prometheus poll endpoint.
    Prometheus {
        /// Address and port for prometheus exporter
        addr: SocketAddr,
        /// Additional labels to include in every metric
        #[serde(default)]
        global_labels: FxHashMap<String, String>,
    },
}

fn default_flush_interval() -> u64 {
    10_000
}

fn default_batch_size() -> usize {
    1_000
}

fn default_ttl() -> u64 {
    300
}

#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(deny_unknown_fields)]
/// Agent-wide defaults, each of which an output may override.
pub struct Agent {
    /// Time between flushes of every output's buffer
    #[serde(default = "default_flush_interval")]
    pub flush_interval_milliseconds: u64,
    /// Upper bound of the random delay added to each flush
    #[serde(default)]
    pub flush_jitter_milliseconds: u64,
    /// Maximum number of metrics handed to an output per write
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Seconds a metric may wait in a buffer before eviction
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
}

impl Default for Agent {
    fn default() -> Self {
        Self {
            flush_interval_milliseconds: default_flush_interval(),
            flush_jitter_milliseconds: 0,
            batch_size: default_batch_size(),
            ttl_seconds: default_ttl(),
        }
    }
}

impl Agent {
    /// The flush settings for `output`, its overrides applied over these
    /// defaults.
    #[must_use]
    pub fn flush_settings(&self, output: &output::General) -> flush::Settings {
        flush::Settings {
            batch_size: output.batch_size.unwrap_or(self.batch_size),
            interval: Duration::from_millis(
                output
                    .flush_interval_milliseconds
                    .unwrap_or(self.flush_interval_milliseconds),
            ),
            jitter: Duration::from_millis(self.flush_jitter_milliseconds),
        }
    }

    /// The buffer time-to-live for `output`.
    #[must_use]
    pub fn ttl(&self, output: &output::General) -> Duration {
        Duration::from_secs(output.ttl_seconds.unwrap_or(self.ttl_seconds))
    }
}

fn display_id(id: Option<&String>, index: usize) -> String {
    id.cloned().unwrap_or_else(|| format!("#{index}"))
}

impl Config {
    /// Parse a [`Config`] from YAML and validate it.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML does not describe a config or the config
    /// fails [`Config::validate`].
    pub fn from_yaml(contents: &str) -> Result<Self, Error> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the config for settings the agent cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    ///
    /// * No output is configured
    /// * A batch size or flush interval, agent-wide or per output, is zero
    /// * An input gathers on a zero interval
    /// * Duplicate IDs are found in inputs or outputs
    pub fn validate(&self) -> Result<(), Error> {
        if self.output.is_empty() {
            return Err(Error::NoOutputs);
        }
        if self.agent.batch_size == 0 {
            return Err(Error::ZeroBatchSize);
        }
        if self.agent.flush_interval_milliseconds == 0 {
            return Err(Error::ZeroFlushInterval);
        }

        for (index, conf) in self.output.iter().enumerate() {
            let general = &conf.general;
            if general.batch_size == Some(0) {
                return Err(Error::ZeroOutputBatchSize(display_id(
                    general.id.as_ref(),
                    index,
                )));
            }
            if general.flush_interval_milliseconds == Some(0) {
                return Err(Error::ZeroOutputFlushInterval(display_id(
                    general.id.as_ref(),
                    index,
                )));
            }
        }
        for (index, conf) in self.input.iter().enumerate() {
            if conf.inner.interval_milliseconds() == 0 {
                return Err(Error::ZeroInputInterval(display_id(
                    conf.general.id.as_ref(),
                    index,
                )));
            }
        }

        check_duplicate_input_ids(&self.input)?;
        check_duplicate_output_ids(&self.output)?;
        Ok(())
    }
}

/// Check for duplicate IDs in input configs
fn check_duplicate_input_ids(inputs: &[input::Config]) -> Result<(), Error> {
    let mut seen_ids = FxHashSet::default();
    for input_config in inputs {
        if let Some(ref id) = input_config.general.id
            && !seen_ids.insert(id.clone())
        {
            return Err(Error::DuplicateInputId(id.clone()));
        }
    }
    Ok(())
}

/// Check for duplicate IDs in output configs
fn check_duplicate_output_ids(outputs: &[output::Config]) -> Result<(), Error> {
    let mut seen_ids = FxHashSet::default();
    for output_config in outputs {
        if let Some(ref id) = output_config.general.id
            && !seen_ids.insert(id.clone())
        {
            return Err(Error::DuplicateOutputId(id.clone()));
        }
    }
    Ok(())
}
