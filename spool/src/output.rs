//! Spool outputs
//!
//! An output is the consumer half of spool. Each one owns a buffer which its
//! flush loop, see [`crate::flush`], drains in batches and hands to the
//! output's `write`. Outputs are the variants of [`Server`].

use serde::{Deserialize, Serialize};
use spool_buffer::Metric;

pub mod discard;
pub mod json_lines;

#[derive(thiserror::Error, Debug)]
/// Errors produced by [`Server`].
pub enum Error {
    /// See [`crate::output::json_lines::Error`] for details.
    #[error(transparent)]
    JsonLines(#[from] json_lines::Error),
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
/// Configuration for [`Server`]
pub struct Config {
    /// Common output configs
    #[serde(flatten)]
    pub general: General,
    /// The output config
    #[serde(flatten)]
    pub inner: Inner,
}

#[derive(Debug, Default, Deserialize, Serialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
/// Configurations common to all [`Server`] variants
///
/// Every `Option` here overrides the agent-wide default of the same name.
pub struct General {
    /// The ID assigned to this output
    pub id: Option<String>,
    /// Maximum number of metrics handed to the output per write
    pub batch_size: Option<usize>,
    /// Seconds a metric may wait in this output's buffer before eviction
    pub ttl_seconds: Option<u64>,
    /// Time between flushes of this output's buffer
    pub flush_interval_milliseconds: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
/// Configuration for [`Server`]
pub enum Inner {
    /// See [`crate::output::discard::Config`] for details.
    Discard(discard::Config),
    /// See [`crate::output::json_lines::Config`] for details.
    JsonLines(json_lines::Config),
}

impl Inner {
    /// The name of this output's variant, as used in metric labels.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Inner::Discard(_) => "discard",
            Inner::JsonLines(_) => "json_lines",
        }
    }
}

impl Config {
    /// Labels identifying this output in self-telemetry.
    #[must_use]
    pub fn metric_labels(&self) -> Vec<(String, String)> {
        let mut labels = vec![
            ("component".to_string(), "output".to_string()),
            ("component_name".to_string(), self.inner.name().to_string()),
        ];
        if let Some(id) = &self.general.id {
            labels.push(("id".to_string(), id.clone()));
        }
        labels
    }
}

#[derive(Debug)]
/// The output server.
///
/// All outputs supported by spool are a variant of this enum. Please see
/// variant documentation for details.
pub enum Server {
    /// See [`crate::output::discard::Discard`] for details.
    Discard(discard::Discard),
    /// See [`crate::output::json_lines::JsonLines`] for details.
    JsonLines(json_lines::JsonLines),
}

impl Server {
    /// Create a new [`Server`]
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let labels = config.metric_labels();
        match &config.inner {
            Inner::Discard(conf) => Self::Discard(discard::Discard::new(conf, labels)),
            Inner::JsonLines(conf) => Self::JsonLines(json_lines::JsonLines::new(conf)),
        }
    }

    /// Write one batch of metrics
    ///
    /// # Errors
    ///
    /// Function will return an error if the underlying output fails to write.
    /// The batch is not retained; retrying is up to the caller.
    pub async fn write(&mut self, batch: &[Metric]) -> Result<(), Error> {
        match self {
            Server::Discard(inner) => inner.write(batch),
            Server::JsonLines(inner) => inner.write(batch).await?,
        }
        Ok(())
    }
}
