//! The agent ties inputs to outputs.
//!
//! Every output gets its own [`MetricBuffer`] and [`Flusher`]; every input
//! delivers into all of those buffers through one shared [`Router`]. Shutdown
//! is ordered: inputs stop first, then the flushers are told to stop so that
//! their final drain sees everything the inputs delivered.

use std::sync::Arc;

use spool_buffer::{MetricBuffer, MetricsStats};
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info};

use crate::{
    config::{self, Config},
    flush::Flusher,
    input,
    output,
    router::Router,
    signals::{self, Watcher},
};

#[derive(thiserror::Error, Debug)]
/// Errors produced by [`run`].
pub enum Error {
    /// See [`crate::config::Error`] for details.
    #[error(transparent)]
    Config(#[from] config::Error),
    /// See [`crate::input::Error`] for details.
    #[error(transparent)]
    Input(#[from] input::Error),
    /// A spawned task panicked or was cancelled.
    #[error("Task failed to join: {0}")]
    Join(#[from] JoinError),
}

/// Run the agent described by `config` until `shutdown` fires.
///
/// Returns once every input has stopped and every output has drained its
/// buffer a final time.
///
/// # Errors
///
/// Function will return an error if the config is invalid, an input cannot be
/// created or any input fails while running. A failing input does not stop
/// the others; the first error is returned once all have finished.
pub async fn run(config: Config, shutdown: Watcher) -> Result<(), Error> {
    config.validate()?;
    let (flush_watcher, flush_broadcaster) = signals::signal();

    let mut flushers = Vec::with_capacity(config.output.len());
    for conf in &config.output {
        let labels = conf.metric_labels();
        let buffer = Arc::new(MetricBuffer::new(
            config.agent.ttl(&conf.general),
            MetricsStats::new(&labels),
        ));
        let settings = config.agent.flush_settings(&conf.general);
        info!(
            output = conf.inner.name(),
            batch_size = settings.batch_size,
            ttl_seconds = buffer.ttl().as_secs(),
            "starting output"
        );
        flushers.push(Flusher::new(
            output::Server::new(conf),
            buffer,
            settings,
            flush_watcher.clone(),
            labels,
        ));
    }
    let router = Router::new(flushers.iter().map(Flusher::route).collect());

    // Build every input before spawning anything so a bad config never leaves
    // tasks behind.
    let mut inputs = Vec::with_capacity(config.input.len());
    for conf in config.input {
        inputs.push(input::Server::new(conf, shutdown.clone())?);
    }

    let idle = inputs.is_empty();
    let mut flush_set = JoinSet::new();
    for flusher in flushers {
        flush_set.spawn(flusher.run());
    }
    let mut input_set = JoinSet::new();
    for server in inputs {
        input_set.spawn(server.run(router.clone()));
    }
    drop(router);

    let mut result = Ok(());
    while let Some(res) = input_set.join_next().await {
        let res = res.map_err(Error::from).and_then(|r| r.map_err(Error::from));
        if let Err(err) = res {
            error!("input failed: {err}");
            if result.is_ok() {
                result = Err(err);
            }
        }
    }

    // With no inputs the agent idles until told to stop.
    if idle {
        let mut shutdown = shutdown;
        shutdown.recv().await;
    }

    info!("inputs stopped, draining outputs");
    flush_broadcaster.signal();
    while let Some(res) = flush_set.join_next().await {
        if let Err(err) = res {
            error!("output flusher failed: {err}");
            if result.is_ok() {
                result = Err(Error::Join(err));
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use std::{path::PathBuf, time::Duration};

    use spool_buffer::Metric;

    use super::{Error, run};
    use crate::{config::Config, signals};

    fn config(path: &std::path::Path) -> Config {
        let contents = format!(
            r#"
agent:
  flush_interval_milliseconds: 3600000
input:
  - id: beacon
    static:
      interval_milliseconds: 10
      metrics:
        - name: "up"
          fields:
            value: 1
output:
  - discard: {{}}
  - json_lines:
      path: "{}"
"#,
            path.display()
        );
        Config::from_yaml(&contents).expect("config is valid")
    }

    #[tokio::test]
    async fn inputs_reach_every_output_before_shutdown_completes() {
        let dir = tempfile::tempdir().expect("directory could not be created");
        let path: PathBuf = dir.path().join("out.jsonl");
        let (watcher, broadcaster) = signals::signal();

        let handle = tokio::spawn(run(config(&path), watcher));
        tokio::time::sleep(Duration::from_millis(100)).await;
        broadcaster.signal();
        handle
            .await
            .expect("agent task panicked")
            .expect("agent failed");

        // The flush interval is an hour: everything on disk came from the
        // immediate first tick or the final drain.
        let contents = std::fs::read_to_string(&path).expect("output file unreadable");
        let metrics: Vec<Metric> = contents
            .lines()
            .map(|line| serde_json::from_str(line).expect("line is not a metric"))
            .collect();
        assert!(metrics.len() > 1);
        assert!(metrics.iter().all(|m| m.name == "up"));
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_before_running() {
        let (watcher, _broadcaster) = signals::signal();
        let res = run(Config::default(), watcher).await;
        assert!(matches!(res, Err(Error::Config(_))));
    }
}
