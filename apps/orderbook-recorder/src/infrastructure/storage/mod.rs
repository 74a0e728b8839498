//! Event Log Storage
//!
//! Append-only JSON line logs, one file per event kind, plus the read-side
//! helpers used by the report binary.

pub mod report;
mod writer;

pub use writer::{EventLogWriter, LogSink, PersistenceError, SinkClosed, WriterStats};
