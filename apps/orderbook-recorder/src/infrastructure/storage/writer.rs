//! Event Log Writer
//!
//! Single task that owns every log file. Producers hold a [`LogSink`] (a
//! bounded channel sender); the writer drains the channel and appends each
//! event as one JSON line to the file for its kind.
//!
//! # Guarantees
//!
//! - One `write_all` per record from one task, so lines never interleave
//! - Per kind, records land in the order they were sent
//! - Files are opened lazily with create + append and never truncated
//! - `close_all` runs once, after every sink is dropped, and flushes and
//!   syncs each open file
//!
//! Any I/O failure is fatal: the writer stops and returns the error, which
//! closes the channel and makes further [`LogSink::append`] calls fail.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use crate::domain::events::{EventKind, StreamEvent};
use crate::infrastructure::metrics::record_written;

/// Fatal log writer failure.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// The data directory could not be created.
    #[error("failed to create data directory {path}: {source}")]
    CreateDir {
        /// Directory path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A log file could not be opened.
    #[error("failed to open {path}: {source}")]
    Open {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A record could not be written.
    #[error("failed to append to {path}: {source}")]
    Write {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A file could not be flushed or synced on close.
    #[error("failed to flush {path}: {source}")]
    Flush {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// An event could not be serialized.
    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The writer has stopped and no longer accepts records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("log writer has stopped")]
pub struct SinkClosed;

/// Producer handle for the log writer.
#[derive(Debug, Clone)]
pub struct LogSink {
    tx: mpsc::Sender<StreamEvent>,
}

impl LogSink {
    /// Wrap an existing channel sender, for consumers other than the writer.
    #[must_use]
    pub const fn from_sender(tx: mpsc::Sender<StreamEvent>) -> Self {
        Self { tx }
    }

    /// Queue an event for appending.
    ///
    /// Waits only while the buffer is full.
    ///
    /// # Errors
    ///
    /// Returns [`SinkClosed`] if the writer has stopped.
    pub async fn append(&self, event: StreamEvent) -> Result<(), SinkClosed> {
        self.tx.send(event).await.map_err(|_| SinkClosed)
    }
}

/// Per-kind counts of records written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriterStats {
    records: BTreeMap<EventKind, u64>,
    bytes: u64,
}

impl WriterStats {
    fn record(&mut self, kind: EventKind, bytes: usize) {
        *self.records.entry(kind).or_default() += 1;
        self.bytes += bytes as u64;
    }

    /// Records written for `kind`.
    #[must_use]
    pub fn records(&self, kind: EventKind) -> u64 {
        self.records.get(&kind).copied().unwrap_or(0)
    }

    /// Records written across all kinds.
    #[must_use]
    pub fn total_records(&self) -> u64 {
        self.records.values().sum()
    }

    /// Bytes written across all kinds.
    #[must_use]
    pub const fn total_bytes(&self) -> u64 {
        self.bytes
    }
}

/// Owner of the append-only event logs.
#[derive(Debug)]
pub struct EventLogWriter {
    dir: PathBuf,
    rx: mpsc::Receiver<StreamEvent>,
    files: HashMap<EventKind, File>,
    stats: WriterStats,
}

impl EventLogWriter {
    /// Create a writer for `dir` and its sink, buffering up to `capacity` records.
    #[must_use]
    pub fn channel(dir: impl Into<PathBuf>, capacity: usize) -> (Self, LogSink) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let writer = Self {
            dir: dir.into(),
            rx,
            files: HashMap::new(),
            stats: WriterStats::default(),
        };
        (writer, LogSink { tx })
    }

    /// Path of the log for `kind` under `dir`.
    #[must_use]
    pub fn log_path(dir: &Path, kind: EventKind) -> PathBuf {
        dir.join(kind.log_file_name())
    }

    /// Append records until every sink is dropped, then close all files.
    ///
    /// # Errors
    ///
    /// Returns the first I/O or serialization failure. Files opened so far
    /// are still flushed on a best-effort basis.
    pub async fn run(mut self) -> Result<WriterStats, PersistenceError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| PersistenceError::CreateDir {
                path: self.dir.clone(),
                source,
            })?;

        tracing::info!(dir = %self.dir.display(), "Log writer started");

        while let Some(event) = self.rx.recv().await {
            if let Err(e) = self.write(&event).await {
                tracing::error!(error = %e, "Log writer failed");
                self.rx.close();
                if let Err(flush) = self.close_all().await {
                    tracing::warn!(error = %flush, "Flush after write failure also failed");
                }
                return Err(e);
            }
        }

        self.close_all().await?;
        tracing::info!(
            records = self.stats.total_records(),
            bytes = self.stats.total_bytes(),
            "Log writer closed"
        );
        Ok(self.stats)
    }

    async fn write(&mut self, event: &StreamEvent) -> Result<(), PersistenceError> {
        let kind = event.kind();
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let path = Self::log_path(&self.dir, kind);
        let file = self.target(kind, &path).await?;
        file.write_all(&line)
            .await
            .map_err(|source| PersistenceError::Write { path, source })?;

        self.stats.record(kind, line.len());
        record_written(kind);
        Ok(())
    }

    async fn target(&mut self, kind: EventKind, path: &Path) -> Result<&mut File, PersistenceError> {
        if !self.files.contains_key(&kind) {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await
                .map_err(|source| PersistenceError::Open {
                    path: path.to_path_buf(),
                    source,
                })?;
            tracing::debug!(path = %path.display(), "Opened log file");
            self.files.insert(kind, file);
        }

        self.files
            .get_mut(&kind)
            .ok_or_else(|| PersistenceError::Open {
                path: path.to_path_buf(),
                source: io::Error::other("log file handle missing"),
            })
    }

    async fn close_all(&mut self) -> Result<(), PersistenceError> {
        let mut first_error = None;

        for (kind, mut file) in self.files.drain() {
            let path = Self::log_path(&self.dir, kind);
            let result = match file.flush().await {
                Ok(()) => file.sync_all().await,
                Err(e) => Err(e),
            };
            if let Err(source) = result {
                tracing::error!(path = %path.display(), error = %source, "Failed to flush log file");
                first_error.get_or_insert(PersistenceError::Flush { path, source });
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}
