//! Spool inputs
//!
//! An input gathers a burst of metrics on its interval and hands the burst to
//! a [`Router`], which copies it into every output's buffer. Inputs are the
//! variants of [`Server`]. Each runs until the shutdown signal is received.

use serde::{Deserialize, Serialize};

use crate::{router::Router, signals::Watcher};

pub mod statik;
pub mod synthetic;

#[derive(thiserror::Error, Debug)]
/// Errors produced by [`Server`].
pub enum Error {
    /// See [`crate::input::synthetic::Error`] for details.
    #[error(transparent)]
    Synthetic(#[from] synthetic::Error),
    /// See [`crate::input::statik::Error`] for details.
    #[error(transparent)]
    Static(#[from] statik::Error),
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
/// Configuration for [`Server`]
pub struct Config {
    /// Common input configs
    #[serde(flatten)]
    pub general: General,
    /// The input config
    #[serde(flatten)]
    pub inner: Inner,
}

#[derive(Debug, Default, Deserialize, Serialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
/// Configurations common to all [`Server`] variants
pub struct General {
    /// The ID assigned to this input
    pub id: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
/// Configuration for [`Server`]
pub enum Inner {
    /// See [`crate::input::synthetic::Config`] for details.
    Synthetic(synthetic::Config),
    /// See [`crate::input::statik::Config`] for details.
    Static(statik::Config),
}

impl Inner {
    /// The interval, in milliseconds, on which this input gathers.
    #[must_use]
    pub fn interval_milliseconds(&self) -> u64 {
        match self {
            Inner::Synthetic(conf) => conf.interval_milliseconds,
            Inner::Static(conf) => conf.interval_milliseconds,
        }
    }

    /// The name of this input's variant, as used in metric labels.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Inner::Synthetic(_) => "synthetic",
            Inner::Static(_) => "static",
        }
    }
}

pub(crate) fn metric_labels(general: &General, name: &str) -> Vec<(String, String)> {
    let mut labels = vec![
        ("component".to_string(), "input".to_string()),
        ("component_name".to_string(), name.to_string()),
    ];
    if let Some(id) = &general.id {
        labels.push(("id".to_string(), id.clone()));
    }
    labels
}

#[derive(Debug)]
/// The input server.
///
/// All inputs supported by spool are a variant of this enum. Please see
/// variant documentation for details.
pub enum Server {
    /// See [`crate::input::synthetic::Synthetic`] for details.
    Synthetic(synthetic::Synthetic),
    /// See [`crate::input::statik::Static`] for details.
    Static(statik::Static),
}

impl Server {
    /// Create a new [`Server`] instance
    ///
    /// # Errors
    ///
    /// Function will return an error if the underlying input creation signals
    /// error.
    pub fn new(config: Config, shutdown: Watcher) -> Result<Self, Error> {
        let server = match config.inner {
            Inner::Synthetic(conf) => Self::Synthetic(synthetic::Synthetic::new(
                &config.general,
                conf,
                shutdown,
            )?),
            Inner::Static(conf) => {
                Self::Static(statik::Static::new(&config.general, conf, shutdown)?)
            }
        };
        Ok(server)
    }

    /// Run this [`Server`] to completion
    ///
    /// The input gathers on its interval, delivering every burst through
    /// `router`, until the shutdown signal is received.
    ///
    /// # Errors
    ///
    /// Function will return an error if the underlying input signals error.
    pub async fn run(self, router: Router) -> Result<(), Error> {
        match self {
            Server::Synthetic(inner) => inner.spin(router).await?,
            Server::Static(inner) => inner.spin(router).await?,
        }
        Ok(())
    }
}
