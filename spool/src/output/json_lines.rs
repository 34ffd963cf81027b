//! The JSON lines output.
//!
//! Appends every metric as one JSON object per line to a file, creating the
//! file if it does not exist. A failed write drops the file handle; the next
//! write reopens it.

use std::{io, path::PathBuf};

use serde::{Deserialize, Serialize};
use spool_buffer::Metric;
use tokio::{
    fs::{File, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
};
use tracing::info;

#[derive(thiserror::Error, Debug)]
/// Errors produced by [`JsonLines`]
pub enum Error {
    /// Wrapper for [`std::io::Error`].
    #[error("Failed to write to {path:?}: {source}")]
    Io {
        /// The output path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },
    /// A metric could not be serialized.
    #[error("Failed to serialize metric: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
/// Configuration for [`JsonLines`]
pub struct Config {
    /// The file to append to
    pub path: PathBuf,
}

#[derive(Debug)]
/// The JSON lines output.
pub struct JsonLines {
    path: PathBuf,
    file: Option<BufWriter<File>>,
}

impl JsonLines {
    /// Create a new [`JsonLines`] output. The file is opened on first write.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            path: config.path.clone(),
            file: None,
        }
    }

    fn io_error(&self, source: io::Error) -> Error {
        Error::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Append `batch` to the file, one metric per line
    ///
    /// # Errors
    ///
    /// Function will return an error if a metric cannot be serialized or the
    /// file cannot be opened or written.
    pub async fn write(&mut self, batch: &[Metric]) -> Result<(), Error> {
        let mut lines = Vec::with_capacity(batch.len() * 128);
        for metric in batch {
            serde_json::to_writer(&mut lines, metric)?;
            lines.push(b'\n');
        }

        if self.file.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await
                .map_err(|err| self.io_error(err))?;
            info!("opened {:?} for writing", self.path);
            self.file = Some(BufWriter::new(file));
        }

        let res = match self.file.as_mut() {
            Some(file) => match file.write_all(&lines).await {
                Ok(()) => file.flush().await,
                Err(err) => Err(err),
            },
            None => Ok(()),
        };
        if let Err(err) = res {
            self.file = None;
            return Err(self.io_error(err));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use spool_buffer::Metric;

    use super::{Config, Error, JsonLines};

    #[tokio::test]
    async fn batches_append_one_line_per_metric() {
        let dir = tempfile::tempdir().expect("directory could not be created");
        let path = dir.path().join("out.jsonl");
        let mut output = JsonLines::new(&Config { path: path.clone() });

        let first = vec![
            Metric::new("cpu", UNIX_EPOCH).with_field("idle", 0.25),
            Metric::new("mem", UNIX_EPOCH).with_tag("host", "a"),
        ];
        let second = vec![
            Metric::new("disk", UNIX_EPOCH + Duration::from_secs(1)).with_field("used", 9_u64),
        ];
        output.write(&first).await.expect("first write failed");
        output.write(&second).await.expect("second write failed");
        output.write(&[]).await.expect("empty write failed");

        let contents = std::fs::read_to_string(&path).expect("output file unreadable");
        let parsed: Vec<Metric> = contents
            .lines()
            .map(|line| serde_json::from_str(line).expect("line is not a metric"))
            .collect();
        let expected: Vec<Metric> = first.into_iter().chain(second).collect();
        assert_eq!(parsed, expected);
    }

    #[tokio::test]
    async fn missing_directory_is_an_io_error() {
        let dir = tempfile::tempdir().expect("directory could not be created");
        let path = dir.path().join("no").join("such").join("out.jsonl");
        let mut output = JsonLines::new(&Config { path });

        let res = output.write(&[Metric::new("cpu", UNIX_EPOCH)]).await;
        assert!(matches!(res, Err(Error::Io { .. })));
    }
}
