//! Market Channel Events
//!
//! The four event kinds the venue's market channel publishes, modelled as a
//! closed sum type. The same structs are used for decoding inbound frames and
//! for writing log records, so a record carries the venue fields verbatim.
//!
//! Prices, sizes and timestamps stay as the venue's decimal strings; the
//! recorder forwards them and never does arithmetic on them.
//!
//! # Wire Format (JSON)
//!
//! ```json
//! {"event_type":"book","asset_id":"6581...","market":"0xbd31...",
//!  "bids":[{"price":"0.48","size":"30"}],"asks":[{"price":"0.52","size":"25"}],
//!  "timestamp":"1757908892351","hash":"0x..."}
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

// =============================================================================
// Event Kind
// =============================================================================

/// Tag naming one event kind; also selects the log target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    /// Full order book snapshot (`book`).
    Snapshot,
    /// Incremental price level update (`price_change`).
    PriceLevelChange,
    /// Minimum tick size update (`tick_size_change`).
    TickSizeChange,
    /// Last trade print (`last_trade_price`).
    Trade,
}

impl EventKind {
    /// All kinds, in log-file order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Snapshot,
            Self::PriceLevelChange,
            Self::TickSizeChange,
            Self::Trade,
        ]
    }

    /// The `event_type` discriminant used on the wire.
    #[must_use]
    pub const fn wire_tag(self) -> &'static str {
        match self {
            Self::Snapshot => "book",
            Self::PriceLevelChange => "price_change",
            Self::TickSizeChange => "tick_size_change",
            Self::Trade => "last_trade_price",
        }
    }

    /// Look up a kind by its wire discriminant.
    #[must_use]
    pub fn from_wire_tag(tag: &str) -> Option<Self> {
        Self::all().iter().copied().find(|k| k.wire_tag() == tag)
    }

    /// File name of the append-only log for this kind.
    #[must_use]
    pub const fn log_file_name(self) -> &'static str {
        match self {
            Self::Snapshot => "orderbook_snapshots.json",
            Self::PriceLevelChange => "price_changes.json",
            Self::TickSizeChange => "tick_size_changes.json",
            Self::Trade => "trades.json",
        }
    }

    /// Short label for metrics and log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Snapshot => "snapshot",
            Self::PriceLevelChange => "price_level_change",
            Self::TickSizeChange => "tick_size_change",
            Self::Trade => "trade",
        }
    }
}

// =============================================================================
// Shared Field Types
// =============================================================================

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy / bid side.
    Buy,
    /// Sell / ask side.
    Sell,
}

/// One rung of a bid or ask ladder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLevel {
    /// Price as sent by the venue.
    pub price: String,
    /// Resting size at that price.
    pub size: String,
}

/// Reference price fields attached to snapshots.
///
/// Serialized flat into the snapshot record. Values are JSON numbers so that
/// downstream readers can compare them directly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceEnrichment {
    /// Latest reference value known at dispatch time.
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub reference_current: Option<Decimal>,
    /// Reference value at the start of the current hour.
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub reference_period_open: Option<Decimal>,
    /// Set when `reference_current` was older than the freshness bound.
    #[serde(default)]
    pub reference_stale: bool,
}

// =============================================================================
// Event Payloads
// =============================================================================

/// Full book for one asset at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSnapshot {
    /// Asset (outcome token) id.
    pub asset_id: String,
    /// Venue market (condition) id.
    #[serde(default)]
    pub market: String,
    /// Venue timestamp in milliseconds.
    #[serde(deserialize_with = "string_or_number")]
    pub timestamp: String,
    /// Venue book hash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Bid ladder, as ordered by the venue.
    #[serde(default, alias = "buys")]
    pub bids: Vec<OrderLevel>,
    /// Ask ladder, as ordered by the venue.
    #[serde(default, alias = "sells")]
    pub asks: Vec<OrderLevel>,
    /// Reference price enrichment.
    #[serde(flatten)]
    pub reference: ReferenceEnrichment,
}

/// One changed price level inside a `price_change` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevelDelta {
    /// Asset id (newer payloads carry it per change).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<String>,
    /// Price level.
    pub price: String,
    /// New aggregate size at the level.
    pub size: String,
    /// Side the level belongs to.
    pub side: Side,
    /// Best bid after the change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_bid: Option<String>,
    /// Best ask after the change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_ask: Option<String>,
}

/// Incremental price level update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevelChange {
    /// Asset id (older payloads carry it at the top level).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<String>,
    /// Venue market id.
    #[serde(default)]
    pub market: String,
    /// Venue timestamp in milliseconds.
    #[serde(deserialize_with = "string_or_number")]
    pub timestamp: String,
    /// Changed levels.
    #[serde(alias = "price_changes")]
    pub changes: Vec<PriceLevelDelta>,
}

/// Minimum tick size update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickSizeChange {
    /// Asset id.
    pub asset_id: String,
    /// Venue market id.
    #[serde(default)]
    pub market: String,
    /// Previous tick size.
    pub old_tick_size: String,
    /// New tick size.
    pub new_tick_size: String,
    /// Venue timestamp in milliseconds.
    #[serde(deserialize_with = "string_or_number")]
    pub timestamp: String,
}

/// Last trade print.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeEvent {
    /// Asset id.
    pub asset_id: String,
    /// Venue market id.
    #[serde(default)]
    pub market: String,
    /// Execution price.
    pub price: String,
    /// Executed size.
    pub size: String,
    /// Aggressor side.
    pub side: Side,
    /// Fee rate in basis points.
    #[serde(default, deserialize_with = "string_or_number")]
    pub fee_rate_bps: String,
    /// Venue timestamp in milliseconds.
    #[serde(deserialize_with = "string_or_number")]
    pub timestamp: String,
}

// =============================================================================
// Stream Event
// =============================================================================

/// A classified market channel event.
///
/// Serializes with an `event_type` field carrying the wire discriminant, which
/// is the exact shape of a log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event_type")]
pub enum StreamEvent {
    /// `book`
    #[serde(rename = "book")]
    Snapshot(BookSnapshot),
    /// `price_change`
    #[serde(rename = "price_change")]
    PriceLevelChange(PriceLevelChange),
    /// `tick_size_change`
    #[serde(rename = "tick_size_change")]
    TickSizeChange(TickSizeChange),
    /// `last_trade_price`
    #[serde(rename = "last_trade_price")]
    Trade(TradeEvent),
}

impl StreamEvent {
    /// Kind tag of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Snapshot(_) => EventKind::Snapshot,
            Self::PriceLevelChange(_) => EventKind::PriceLevelChange,
            Self::TickSizeChange(_) => EventKind::TickSizeChange,
            Self::Trade(_) => EventKind::Trade,
        }
    }

    /// Asset id the event refers to, when there is a single one.
    #[must_use]
    pub fn asset_id(&self) -> Option<&str> {
        match self {
            Self::Snapshot(b) => Some(&b.asset_id),
            Self::PriceLevelChange(p) => p
                .asset_id
                .as_deref()
                .or_else(|| p.changes.first().and_then(|c| c.asset_id.as_deref())),
            Self::TickSizeChange(t) => Some(&t.asset_id),
            Self::Trade(t) => Some(&t.asset_id),
        }
    }

    /// Venue timestamp.
    #[must_use]
    pub fn timestamp(&self) -> &str {
        match self {
            Self::Snapshot(b) => &b.timestamp,
            Self::PriceLevelChange(p) => &p.timestamp,
            Self::TickSizeChange(t) => &t.timestamp,
            Self::Trade(t) => &t.timestamp,
        }
    }
}

/// Accept either `"1757908892351"` or `1757908892351`.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Int(n) => n.to_string(),
        Raw::Float(f) => f.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_book() -> BookSnapshot {
        BookSnapshot {
            asset_id: "42".to_string(),
            market: "0xabc".to_string(),
            timestamp: "1757908892351".to_string(),
            hash: None,
            bids: vec![OrderLevel {
                price: "0.48".to_string(),
                size: "30".to_string(),
            }],
            asks: vec![],
            reference: ReferenceEnrichment::default(),
        }
    }

    #[test]
    fn wire_tags_round_trip_through_lookup() {
        for kind in EventKind::all() {
            assert_eq!(EventKind::from_wire_tag(kind.wire_tag()), Some(*kind));
        }
        assert_eq!(EventKind::from_wire_tag("tick"), None);
    }

    #[test]
    fn log_file_names_are_distinct() {
        let mut names: Vec<_> = EventKind::all().iter().map(|k| k.log_file_name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 4);
    }

    #[test]
    fn snapshot_record_carries_event_type_and_reference_fields() {
        let mut book = sample_book();
        book.reference = ReferenceEnrichment {
            reference_current: Some(Decimal::new(6_512_345, 2)),
            reference_period_open: Some(Decimal::new(6_500_000, 2)),
            reference_stale: false,
        };

        let value = serde_json::to_value(StreamEvent::Snapshot(book)).unwrap();
        assert_eq!(value["event_type"], "book");
        assert_eq!(value["asset_id"], "42");
        assert_eq!(value["bids"][0]["price"], "0.48");
        assert!((value["reference_current"].as_f64().unwrap() - 65_123.45).abs() < 1e-9);
        assert!((value["reference_period_open"].as_f64().unwrap() - 65_000.0).abs() < 1e-9);
        assert_eq!(value["reference_stale"], false);
        assert!(value.get("hash").is_none());
    }

    #[test]
    fn missing_reference_serializes_as_null() {
        let value = serde_json::to_value(StreamEvent::Snapshot(sample_book())).unwrap();
        assert!(value["reference_current"].is_null());
        assert!(value["reference_period_open"].is_null());
    }

    #[test]
    fn snapshot_accepts_buys_sells_aliases_and_numeric_timestamp() {
        let json = r#"{"asset_id":"1","market":"m","timestamp":123,
            "buys":[{"price":"0.1","size":"5"}],"sells":[{"price":"0.9","size":"2"}]}"#;
        let book: BookSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(book.timestamp, "123");
        assert_eq!(book.bids.len(), 1);
        assert_eq!(book.asks[0].price, "0.9");
        assert_eq!(book.reference, ReferenceEnrichment::default());
    }

    #[test]
    fn price_change_accepts_both_payload_shapes() {
        let newer = r#"{"market":"m","timestamp":"1","price_changes":[
            {"asset_id":"7","price":"0.5","size":"200","side":"BUY","best_bid":"0.5","best_ask":"0.51"}]}"#;
        let older = r#"{"asset_id":"7","market":"m","timestamp":"1","changes":[
            {"price":"0.5","size":"200","side":"SELL"}]}"#;

        let a: PriceLevelChange = serde_json::from_str(newer).unwrap();
        let b: PriceLevelChange = serde_json::from_str(older).unwrap();

        assert_eq!(StreamEvent::PriceLevelChange(a).asset_id(), Some("7"));
        assert_eq!(StreamEvent::PriceLevelChange(b.clone()).asset_id(), Some("7"));
        assert_eq!(b.changes[0].side, Side::Sell);
    }

    #[test]
    fn trade_fee_rate_defaults_to_empty() {
        let json = r#"{"asset_id":"1","market":"m","price":"0.5","size":"10","side":"BUY","timestamp":"9"}"#;
        let trade: TradeEvent = serde_json::from_str(json).unwrap();
        assert_eq!(trade.fee_rate_bps, "");
        assert_eq!(StreamEvent::Trade(trade).kind(), EventKind::Trade);
    }
}
