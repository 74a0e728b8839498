#![allow(clippy::unwrap_used, clippy::expect_used)]

use orderbook_recorder::domain::events::{
    BookSnapshot, OrderLevel, ReferenceEnrichment, Side, StreamEvent, TickSizeChange, TradeEvent,
};
use orderbook_recorder::infrastructure::storage::EventLogWriter;
use orderbook_recorder::infrastructure::storage::report::{log_stats, read_tail};
use orderbook_recorder::EventKind;

const TRADES: usize = 500;

fn trade(seq: usize) -> StreamEvent {
    StreamEvent::Trade(TradeEvent {
        asset_id: "7".to_string(),
        market: "m".to_string(),
        price: "0.51".to_string(),
        size: "3".to_string(),
        side: if seq % 2 == 0 { Side::Buy } else { Side::Sell },
        fee_rate_bps: "0".to_string(),
        timestamp: seq.to_string(),
    })
}

fn snapshot(seq: usize) -> StreamEvent {
    StreamEvent::Snapshot(BookSnapshot {
        asset_id: "7".to_string(),
        market: "m".to_string(),
        timestamp: seq.to_string(),
        hash: None,
        bids: vec![OrderLevel {
            price: "0.50".to_string(),
            size: "10".to_string(),
        }],
        asks: vec![],
        reference: ReferenceEnrichment::default(),
    })
}

fn tick(seq: usize) -> StreamEvent {
    StreamEvent::TickSizeChange(TickSizeChange {
        asset_id: "7".to_string(),
        market: "m".to_string(),
        old_tick_size: "0.01".to_string(),
        new_tick_size: "0.001".to_string(),
        timestamp: seq.to_string(),
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn records_of_one_kind_keep_arrival_order_under_concurrency() {
    let dir = tempfile::tempdir().unwrap();
    let (writer, sink) = EventLogWriter::channel(dir.path(), 16);
    let writer = tokio::spawn(writer.run());

    let trades = tokio::spawn({
        let sink = sink.clone();
        async move {
            for i in 0..TRADES {
                sink.append(trade(i)).await.unwrap();
            }
        }
    });
    let others = tokio::spawn({
        let sink = sink.clone();
        async move {
            for i in 0..200 {
                sink.append(snapshot(i)).await.unwrap();
                if i % 4 == 0 {
                    sink.append(tick(i)).await.unwrap();
                    tokio::task::yield_now().await;
                }
            }
        }
    });
    drop(sink);

    trades.await.unwrap();
    others.await.unwrap();
    let stats = writer.await.unwrap().unwrap();

    assert_eq!(stats.records(EventKind::Trade), TRADES as u64);
    assert_eq!(stats.records(EventKind::Snapshot), 200);
    assert_eq!(stats.records(EventKind::TickSizeChange), 50);

    let path = EventLogWriter::log_path(dir.path(), EventKind::Trade);
    let readout = read_tail::<TradeEvent>(&path, None).unwrap();
    assert_eq!(readout.bad_lines, 0);
    let stamps: Vec<usize> = readout
        .records
        .iter()
        .map(|t| t.timestamp.parse().unwrap())
        .collect();
    assert_eq!(stamps, (0..TRADES).collect::<Vec<_>>());

    let on_disk = log_stats(dir.path(), EventKind::Trade).unwrap();
    assert_eq!(on_disk.records, TRADES);
    assert!(on_disk.exists && on_disk.bytes > 0);

    let snapshots = read_tail::<BookSnapshot>(
        &EventLogWriter::log_path(dir.path(), EventKind::Snapshot),
        Some(3),
    )
    .unwrap();
    let tail: Vec<&str> = snapshots
        .records
        .iter()
        .map(|s| s.timestamp.as_str())
        .collect();
    assert_eq!(tail, vec!["197", "198", "199"]);
}
