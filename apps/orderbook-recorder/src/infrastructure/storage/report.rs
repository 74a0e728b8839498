//! Log Readers
//!
//! Read-side helpers for the event logs, used by the `book-report` binary.
//! Lines that fail to parse are counted and skipped.

use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;

use crate::domain::events::{EventKind, ReferenceEnrichment, Side, TradeEvent};
use crate::domain::reference::Direction;

use super::writer::EventLogWriter;

/// Size and record count of one log file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogStats {
    /// Event kind stored in the file.
    pub kind: EventKind,
    /// File path.
    pub path: PathBuf,
    /// Whether the file exists.
    pub exists: bool,
    /// Number of non-empty lines.
    pub records: usize,
    /// File size in bytes.
    pub bytes: u64,
}

/// Records read from a log, plus the number of lines skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct LogReadout<T> {
    /// Parsed records, in file order.
    pub records: Vec<T>,
    /// Lines that could not be parsed.
    pub bad_lines: usize,
}

/// Count records and bytes in the log for `kind`.
///
/// # Errors
///
/// Returns an error if an existing file cannot be read.
pub fn log_stats(dir: &Path, kind: EventKind) -> io::Result<LogStats> {
    let path = EventLogWriter::log_path(dir, kind);
    if !path.exists() {
        return Ok(LogStats {
            kind,
            path,
            exists: false,
            records: 0,
            bytes: 0,
        });
    }

    let bytes = fs::metadata(&path)?.len();
    let mut records = 0;
    for line in BufReader::new(fs::File::open(&path)?).lines() {
        if !line?.trim().is_empty() {
            records += 1;
        }
    }

    Ok(LogStats {
        kind,
        path,
        exists: true,
        records,
        bytes,
    })
}

/// Parse the last `limit` records of `path` (all of them when `limit` is `None`).
///
/// A missing file reads as empty.
///
/// # Errors
///
/// Returns an error if an existing file cannot be read.
pub fn read_tail<T: DeserializeOwned>(
    path: &Path,
    limit: Option<usize>,
) -> io::Result<LogReadout<T>> {
    let mut readout = LogReadout {
        records: Vec::new(),
        bad_lines: 0,
    };
    if !path.exists() {
        return Ok(readout);
    }

    for line in BufReader::new(fs::File::open(path)?).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(&line) {
            Ok(record) => readout.records.push(record),
            Err(_) => readout.bad_lines += 1,
        }
    }

    if let Some(limit) = limit {
        let skip = readout.records.len().saturating_sub(limit);
        readout.records.drain(..skip);
    }
    Ok(readout)
}

/// Movement of the reference value within the running period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodMove {
    /// Period open.
    pub open: Decimal,
    /// Value at the snapshot.
    pub current: Decimal,
    /// `current - open`.
    pub change: Decimal,
    /// Change as a percentage of `open`.
    pub change_pct: Decimal,
    /// Up / Down resolution.
    pub direction: Direction,
}

impl PeriodMove {
    /// Derive the move from a snapshot's enrichment fields.
    ///
    /// Returns `None` unless both values are present and the open is non-zero.
    #[must_use]
    pub fn from_enrichment(reference: &ReferenceEnrichment) -> Option<Self> {
        let open = reference.reference_period_open?;
        let current = reference.reference_current?;
        if open.is_zero() {
            return None;
        }
        let change = current - open;
        Some(Self {
            open,
            current,
            change,
            change_pct: (change / open * Decimal::ONE_HUNDRED).round_dp(2),
            direction: Direction::resolve(current, open),
        })
    }
}

/// Aggregate over a list of trades.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TradeSummary {
    /// Number of trades.
    pub count: usize,
    /// Trades with side BUY.
    pub buys: usize,
    /// Trades with side SELL.
    pub sells: usize,
    /// Sum of `price * size`.
    pub notional: Decimal,
    /// Trades whose price or size was not a decimal.
    pub unparsed: usize,
}

/// `price * size` of one trade.
#[must_use]
pub fn trade_notional(trade: &TradeEvent) -> Option<Decimal> {
    let price = Decimal::from_str(&trade.price).ok()?;
    let size = Decimal::from_str(&trade.size).ok()?;
    price.checked_mul(size)
}

/// Summarize `trades`.
#[must_use]
pub fn summarize_trades(trades: &[TradeEvent]) -> TradeSummary {
    let mut summary = TradeSummary::default();
    for trade in trades {
        summary.count += 1;
        match trade.side {
            Side::Buy => summary.buys += 1,
            Side::Sell => summary.sells += 1,
        }
        match trade_notional(trade) {
            Some(n) => summary.notional += n,
            None => summary.unparsed += 1,
        }
    }
    summary
}
