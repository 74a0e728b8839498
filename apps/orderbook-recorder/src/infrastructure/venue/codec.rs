//! Market Channel Codec
//!
//! Decodes inbound text frames into [`StreamEvent`]s.
//!
//! A frame holds either one JSON object or a JSON array of objects. Each
//! object is classified by its `event_type` discriminant through a single
//! table of per-kind decode functions. An element that fails to decode only
//! loses that element; the caller decides what to do with the rest.

use serde_json::Value;

use crate::domain::events::{
    BookSnapshot, EventKind, PriceLevelChange, StreamEvent, TickSizeChange, TradeEvent,
};

/// A frame or frame element that could not be turned into an event.
///
/// Recoverable: the element is logged and skipped.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The frame was not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The frame or element was JSON but not an object (or array of objects).
    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),

    /// The object had no string `event_type` field.
    #[error("missing event_type discriminant")]
    MissingEventType,

    /// The discriminant named an event kind this recorder does not know.
    #[error("unknown event_type: {0}")]
    UnknownEventType(String),

    /// The payload did not match the schema for its kind.
    #[error("malformed {kind} payload: {source}")]
    Payload {
        /// Wire discriminant of the element.
        kind: &'static str,
        /// Field-level cause.
        #[source]
        source: serde_json::Error,
    },
}

impl DecodeError {
    /// Short label for metrics.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Json(_) => "invalid_json",
            Self::NotAnObject(_) => "not_an_object",
            Self::MissingEventType => "missing_event_type",
            Self::UnknownEventType(_) => "unknown_event_type",
            Self::Payload { .. } => "malformed_payload",
        }
    }
}

type DecodeFn = fn(Value) -> Result<StreamEvent, serde_json::Error>;

fn decode_snapshot(value: Value) -> Result<StreamEvent, serde_json::Error> {
    serde_json::from_value::<BookSnapshot>(value).map(StreamEvent::Snapshot)
}

fn decode_price_change(value: Value) -> Result<StreamEvent, serde_json::Error> {
    serde_json::from_value::<PriceLevelChange>(value).map(StreamEvent::PriceLevelChange)
}

fn decode_tick_size_change(value: Value) -> Result<StreamEvent, serde_json::Error> {
    serde_json::from_value::<TickSizeChange>(value).map(StreamEvent::TickSizeChange)
}

fn decode_trade(value: Value) -> Result<StreamEvent, serde_json::Error> {
    serde_json::from_value::<TradeEvent>(value).map(StreamEvent::Trade)
}

const fn decoder(kind: EventKind) -> DecodeFn {
    match kind {
        EventKind::Snapshot => decode_snapshot,
        EventKind::PriceLevelChange => decode_price_change,
        EventKind::TickSizeChange => decode_tick_size_change,
        EventKind::Trade => decode_trade,
    }
}

const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// JSON codec for the market channel.
#[derive(Debug, Default, Clone, Copy)]
pub struct EventCodec;

impl EventCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Split a text frame into its elements.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not JSON, or is a JSON scalar.
    pub fn split(&self, text: &str) -> Result<Vec<Value>, DecodeError> {
        match serde_json::from_str::<Value>(text.trim())? {
            Value::Array(items) => Ok(items),
            object @ Value::Object(_) => Ok(vec![object]),
            other => Err(DecodeError::NotAnObject(json_type_name(&other))),
        }
    }

    /// Classify one element.
    ///
    /// # Errors
    ///
    /// Returns an error for a missing or unknown discriminant or a payload
    /// that does not fit its kind.
    pub fn classify(&self, value: Value) -> Result<StreamEvent, DecodeError> {
        let Value::Object(_) = &value else {
            return Err(DecodeError::NotAnObject(json_type_name(&value)));
        };

        let tag = value
            .get("event_type")
            .and_then(Value::as_str)
            .ok_or(DecodeError::MissingEventType)?;
        let kind = EventKind::from_wire_tag(tag)
            .ok_or_else(|| DecodeError::UnknownEventType(tag.to_string()))?;

        decoder(kind)(value).map_err(|source| DecodeError::Payload {
            kind: kind.wire_tag(),
            source,
        })
    }

    /// Parse and classify a single raw object.
    ///
    /// # Errors
    ///
    /// Returns an error if `raw` is not a JSON object or cannot be classified.
    pub fn classify_str(&self, raw: &str) -> Result<StreamEvent, DecodeError> {
        let value = serde_json::from_str::<Value>(raw.trim())?;
        self.classify(value)
    }
}
