//! Event Log Report
//!
//! Prints statistics and recent records from the recorder's event logs.
//!
//! Usage:
//!   book-report [OPTIONS]
//!
//! Options:
//!   --stats            Record counts and file sizes (default)
//!   --snapshots        Latest book snapshots with the reference move
//!   --trades           Latest trades with volume totals
//!   --tick-changes     Latest tick size changes
//!   --all              Everything above
//!   --limit <N>        Records shown per section (default: 5)
//!   --data-dir <DIR>   Log directory (default: data)
//!
//! Example:
//!   book-report --snapshots --limit 3

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::DateTime;
use clap::Parser;

use orderbook_recorder::domain::events::{BookSnapshot, OrderLevel, Side, TickSizeChange, TradeEvent};
use orderbook_recorder::infrastructure::storage::EventLogWriter;
use orderbook_recorder::infrastructure::storage::report::{
    LogReadout, PeriodMove, log_stats, read_tail, summarize_trades, trade_notional,
};
use orderbook_recorder::EventKind;

/// Levels shown per side of a snapshot.
const BOOK_DEPTH: usize = 5;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser)]
#[command(name = "book-report")]
#[command(version, about = "Inspect recorded order-book event logs")]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Record counts and file sizes
    #[arg(long)]
    stats: bool,

    /// Latest book snapshots
    #[arg(long)]
    snapshots: bool,

    /// Latest trades
    #[arg(long)]
    trades: bool,

    /// Latest tick size changes
    #[arg(long)]
    tick_changes: bool,

    /// All sections
    #[arg(long)]
    all: bool,

    /// Records shown per section
    #[arg(short, long, default_value = "5")]
    limit: usize,

    /// Log directory
    #[arg(short, long, default_value = "data")]
    data_dir: PathBuf,
}

impl Cli {
    fn wants_stats(&self) -> bool {
        self.all || self.stats || !(self.snapshots || self.trades || self.tick_changes)
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let dir = cli.data_dir.as_path();

    if cli.wants_stats() {
        print_stats(dir)?;
    }
    if cli.all || cli.snapshots {
        print_snapshots(dir, cli.limit)?;
    }
    if cli.all || cli.trades {
        print_trades(dir, cli.limit)?;
    }
    if cli.all || cli.tick_changes {
        print_tick_changes(dir, cli.limit)?;
    }
    Ok(())
}

// ============================================================================
// Sections
// ============================================================================

fn print_stats(dir: &Path) -> anyhow::Result<()> {
    header("LOG STATISTICS");
    println!("Directory: {}", dir.display());
    println!();

    for &kind in EventKind::all() {
        let stats = log_stats(dir, kind)
            .with_context(|| format!("failed to read {}", kind.log_file_name()))?;
        if stats.exists {
            println!(
                "{:<26} {:>10} records {:>12}",
                kind.log_file_name(),
                stats.records,
                format_bytes(stats.bytes)
            );
        } else {
            println!("{:<26} {:>10}", kind.log_file_name(), "missing");
        }
    }
    println!();
    Ok(())
}

fn print_snapshots(dir: &Path, limit: usize) -> anyhow::Result<()> {
    let readout: LogReadout<BookSnapshot> = read_log(dir, EventKind::Snapshot, limit)?;
    header(&format!("LATEST {} BOOK SNAPSHOTS", readout.records.len()));

    for (i, snapshot) in readout.records.iter().enumerate() {
        println!(
            "#{} asset {} at {}",
            i + 1,
            short_id(&snapshot.asset_id),
            format_timestamp(&snapshot.timestamp)
        );

        match PeriodMove::from_enrichment(&snapshot.reference) {
            Some(m) => println!(
                "   reference open {} current {} change {:+} ({:+}%) {:?}{}",
                m.open,
                m.current,
                m.change,
                m.change_pct,
                m.direction,
                if snapshot.reference.reference_stale {
                    " [stale]"
                } else {
                    ""
                }
            ),
            None => println!("   reference unavailable"),
        }

        print_levels("bids", &snapshot.bids);
        print_levels("asks", &snapshot.asks);
        println!();
    }
    skipped_lines(readout.bad_lines);
    Ok(())
}

fn print_trades(dir: &Path, limit: usize) -> anyhow::Result<()> {
    let readout: LogReadout<TradeEvent> = read_log(dir, EventKind::Trade, limit)?;
    header(&format!("LATEST {} TRADES", readout.records.len()));

    for trade in &readout.records {
        let notional = trade_notional(trade).map_or_else(|| "-".to_string(), |n| n.to_string());
        println!(
            "{} {:<4} {:>8} x {:>12} fee {:>4} bps notional {:>12} asset {}",
            format_timestamp(&trade.timestamp),
            side_label(trade.side),
            trade.price,
            trade.size,
            trade.fee_rate_bps,
            notional,
            short_id(&trade.asset_id)
        );
    }

    let summary = summarize_trades(&readout.records);
    println!();
    println!(
        "Trades: {} (buys {}, sells {}), total notional {}",
        summary.count, summary.buys, summary.sells, summary.notional
    );
    if summary.unparsed > 0 {
        println!("Trades without a numeric price or size: {}", summary.unparsed);
    }
    skipped_lines(readout.bad_lines);
    println!();
    Ok(())
}

fn print_tick_changes(dir: &Path, limit: usize) -> anyhow::Result<()> {
    let readout: LogReadout<TickSizeChange> = read_log(dir, EventKind::TickSizeChange, limit)?;
    header(&format!("LATEST {} TICK SIZE CHANGES", readout.records.len()));

    for change in &readout.records {
        println!(
            "{} asset {} tick {} -> {}",
            format_timestamp(&change.timestamp),
            short_id(&change.asset_id),
            change.old_tick_size,
            change.new_tick_size
        );
    }
    skipped_lines(readout.bad_lines);
    println!();
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn read_log<T: serde::de::DeserializeOwned>(
    dir: &Path,
    kind: EventKind,
    limit: usize,
) -> anyhow::Result<LogReadout<T>> {
    let path = EventLogWriter::log_path(dir, kind);
    read_tail(&path, Some(limit)).with_context(|| format!("failed to read {}", path.display()))
}

fn print_levels(label: &str, levels: &[OrderLevel]) {
    if levels.is_empty() {
        println!("   {label}: (empty)");
        return;
    }
    let shown: Vec<String> = levels
        .iter()
        .take(BOOK_DEPTH)
        .map(|l| format!("{}@{}", l.size, l.price))
        .collect();
    let more = levels.len().saturating_sub(BOOK_DEPTH);
    if more > 0 {
        println!("   {label}: {} (+{more} more)", shown.join("  "));
    } else {
        println!("   {label}: {}", shown.join("  "));
    }
}

fn header(title: &str) {
    println!("{}", "=".repeat(72));
    println!("{title}");
    println!("{}", "=".repeat(72));
}

fn skipped_lines(bad_lines: usize) {
    if bad_lines > 0 {
        println!("Skipped {bad_lines} unreadable lines");
    }
}

const fn side_label(side: Side) -> &'static str {
    match side {
        Side::Buy => "BUY",
        Side::Sell => "SELL",
    }
}

fn short_id(id: &str) -> String {
    if id.len() > 16 && id.is_ascii() {
        format!("{}…{}", &id[..8], &id[id.len() - 6..])
    } else {
        id.to_string()
    }
}

fn format_timestamp(millis: &str) -> String {
    millis
        .parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .map_or_else(
            || millis.to_string(),
            |t| t.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
        )
}

#[allow(clippy::cast_precision_loss)]
fn format_bytes(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KIB {
        format!("{bytes} B")
    } else if b < KIB * KIB {
        format!("{:.2} KiB", b / KIB)
    } else {
        format!("{:.2} MiB", b / (KIB * KIB))
    }
}
