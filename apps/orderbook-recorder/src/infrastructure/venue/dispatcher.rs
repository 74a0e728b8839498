//! Message Dispatcher
//!
//! Turns inbound text frames into log records:
//!
//! 1. split the frame into elements and classify each one
//! 2. attach the reference pair to snapshots
//! 3. hand enabled kinds to the [`LogSink`]
//!
//! Decode failures are logged and counted and never stop the frame or the
//! session. A closed sink means the log writer has failed, which is fatal.

use std::sync::Arc;
use std::time::Duration;

use crate::application::ports::Clock;
use crate::domain::events::{EventKind, StreamEvent};
use crate::domain::reference::ReferenceState;
use crate::infrastructure::metrics::{
    record_decode_error, record_event_classified, record_frame_received, record_skipped,
    record_stale_enrichment,
};
use crate::infrastructure::storage::{LogSink, SinkClosed};

use super::codec::{DecodeError, EventCodec};

/// Longest frame prefix included in decode warnings.
const FRAME_PREVIEW_CHARS: usize = 120;

/// Dispatch failure; always fatal for the session.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The log writer stopped accepting records.
    #[error("log sink closed: {0}")]
    SinkClosed(#[from] SinkClosed),
}

/// Per-kind persistence switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct EventToggles {
    /// Persist `book` snapshots.
    pub snapshots: bool,
    /// Persist `price_change` events.
    pub price_changes: bool,
    /// Persist `tick_size_change` events.
    pub tick_size_changes: bool,
    /// Persist `last_trade_price` events.
    pub trades: bool,
}

impl Default for EventToggles {
    fn default() -> Self {
        Self {
            snapshots: true,
            price_changes: false,
            tick_size_changes: true,
            trades: true,
        }
    }
}

impl EventToggles {
    /// Every kind enabled.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            snapshots: true,
            price_changes: true,
            tick_size_changes: true,
            trades: true,
        }
    }

    /// Whether `kind` is persisted.
    #[must_use]
    pub const fn is_enabled(&self, kind: EventKind) -> bool {
        match kind {
            EventKind::Snapshot => self.snapshots,
            EventKind::PriceLevelChange => self.price_changes,
            EventKind::TickSizeChange => self.tick_size_changes,
            EventKind::Trade => self.trades,
        }
    }
}

/// What happened to the elements of one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameOutcome {
    /// Events handed to the log sink.
    pub dispatched: usize,
    /// Events classified but not persisted (kind disabled).
    pub skipped: usize,
    /// Frames or elements that failed to decode.
    pub rejected: usize,
}

/// Classifier, enricher and router for market channel frames.
#[derive(Debug)]
pub struct MessageDispatcher {
    codec: EventCodec,
    reference: ReferenceState,
    sink: LogSink,
    toggles: EventToggles,
    max_age: Duration,
    clock: Arc<dyn Clock>,
}

impl MessageDispatcher {
    /// Create a dispatcher.
    ///
    /// `max_age` bounds how old the reference `current` value may be before a
    /// snapshot is flagged stale.
    #[must_use]
    pub fn new(
        reference: ReferenceState,
        sink: LogSink,
        toggles: EventToggles,
        max_age: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            codec: EventCodec::new(),
            reference,
            sink,
            toggles,
            max_age,
            clock,
        }
    }

    /// Classify one raw JSON object.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] for anything that is not one of the four
    /// known event kinds.
    pub fn classify(&self, raw: &str) -> Result<StreamEvent, DecodeError> {
        self.codec.classify_str(raw)
    }

    /// Enrich (snapshots only) and persist one event if its kind is enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the log writer has stopped.
    pub async fn dispatch(&self, event: StreamEvent) -> Result<(), DispatchError> {
        let kind = event.kind();
        if !self.toggles.is_enabled(kind) {
            record_skipped(kind);
            return Ok(());
        }

        let event = self.enrich(event);
        self.sink.append(event).await?;
        Ok(())
    }

    /// Decode a whole text frame and dispatch every valid element.
    ///
    /// # Errors
    ///
    /// Returns an error only if the log writer has stopped; decode failures
    /// are reported in the [`FrameOutcome`].
    pub async fn dispatch_frame(&self, text: &str) -> Result<FrameOutcome, DispatchError> {
        record_frame_received();
        let mut outcome = FrameOutcome::default();

        let elements = match self.codec.split(text) {
            Ok(elements) => elements,
            Err(e) => {
                Self::report_rejected(&e, text);
                outcome.rejected += 1;
                return Ok(outcome);
            }
        };

        for element in elements {
            let event = match self.codec.classify(element) {
                Ok(event) => event,
                Err(e) => {
                    Self::report_rejected(&e, text);
                    outcome.rejected += 1;
                    continue;
                }
            };

            let kind = event.kind();
            record_event_classified(kind);
            if self.toggles.is_enabled(kind) {
                outcome.dispatched += 1;
            } else {
                outcome.skipped += 1;
            }
            self.dispatch(event).await?;
        }

        Ok(outcome)
    }

    fn enrich(&self, event: StreamEvent) -> StreamEvent {
        let StreamEvent::Snapshot(mut book) = event else {
            return event;
        };

        let snapshot = self.reference.snapshot();
        let now = self.clock.now();
        if let Err(reason) = snapshot.freshness(now, self.max_age) {
            record_stale_enrichment();
            tracing::warn!(
                asset_id = %book.asset_id.get(..20).unwrap_or(&book.asset_id),
                reason = %reason,
                "Snapshot enriched without a fresh reference pair"
            );
        }
        book.reference = snapshot.enrichment(now, self.max_age);
        StreamEvent::Snapshot(book)
    }

    fn report_rejected(error: &DecodeError, frame: &str) {
        record_decode_error(error.reason());
        let preview: String = frame.chars().take(FRAME_PREVIEW_CHARS).collect();
        tracing::warn!(error = %error, frame = %preview, "Dropping undecodable message");
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal::Decimal;
    use tokio::sync::mpsc;

    use super::*;
    use crate::domain::reference::{PeriodOpen, ReferencePrice};
    use crate::infrastructure::storage::EventLogWriter;

    #[derive(Debug)]
    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 12, 30, 0).unwrap()
    }

    const BOOK: &str = r#"{"event_type":"book","asset_id":"1","market":"m","timestamp":"1","bids":[],"asks":[]}"#;
    const TRADE: &str = r#"{"event_type":"last_trade_price","asset_id":"1","market":"m","price":"0.5","size":"2","side":"SELL","fee_rate_bps":"0","timestamp":"2"}"#;
    const PRICE_CHANGE: &str = r#"{"event_type":"price_change","market":"m","timestamp":"3","price_changes":[{"asset_id":"1","price":"0.5","size":"0","side":"BUY"}]}"#;

    /// Dispatcher wired to a raw channel so tests can inspect what was sent.
    fn dispatcher(
        reference: ReferenceState,
        toggles: EventToggles,
    ) -> (MessageDispatcher, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(16);
        let sink = LogSink::from_sender(tx);
        let d = MessageDispatcher::new(
            reference,
            sink,
            toggles,
            Duration::from_secs(10),
            Arc::new(FixedClock(noon())),
        );
        (d, rx)
    }

    fn fresh_reference() -> ReferenceState {
        let state = ReferenceState::new();
        state.publish_current(ReferencePrice {
            value: Decimal::new(105, 0),
            observed_at: noon(),
        });
        state.publish_period_open(PeriodOpen {
            value: Decimal::new(100, 0),
            period_start: Utc.with_ymd_and_hms(2025, 3, 14, 12, 0, 0).unwrap(),
        });
        state
    }

    #[tokio::test]
    async fn snapshot_carries_latest_reference_pair() {
        let (d, mut rx) = dispatcher(fresh_reference(), EventToggles::default());
        d.dispatch_frame(BOOK).await.unwrap();

        let StreamEvent::Snapshot(book) = rx.recv().await.unwrap() else {
            panic!("expected snapshot");
        };
        assert_eq!(book.reference.reference_current, Some(Decimal::new(105, 0)));
        assert_eq!(book.reference.reference_period_open, Some(Decimal::new(100, 0)));
        assert!(!book.reference.reference_stale);
    }

    #[tokio::test]
    async fn snapshot_before_any_fetch_has_null_reference() {
        let (d, mut rx) = dispatcher(ReferenceState::new(), EventToggles::default());
        d.dispatch_frame(BOOK).await.unwrap();

        let StreamEvent::Snapshot(book) = rx.recv().await.unwrap() else {
            panic!("expected snapshot");
        };
        assert!(book.reference.reference_current.is_none());
        assert!(book.reference.reference_period_open.is_none());
    }

    #[tokio::test]
    async fn stale_current_is_attached_and_flagged() {
        let reference = fresh_reference();
        reference.publish_current(ReferencePrice {
            value: Decimal::new(104, 0),
            observed_at: noon() - chrono::TimeDelta::seconds(60),
        });
        let (d, mut rx) = dispatcher(reference, EventToggles::default());
        d.dispatch_frame(BOOK).await.unwrap();

        let StreamEvent::Snapshot(book) = rx.recv().await.unwrap() else {
            panic!("expected snapshot");
        };
        assert_eq!(book.reference.reference_current, Some(Decimal::new(104, 0)));
        assert!(book.reference.reference_stale);
    }

    #[tokio::test]
    async fn open_from_a_previous_hour_is_attached_and_flagged() {
        let reference = ReferenceState::new();
        reference.publish_current(ReferencePrice {
            value: Decimal::new(105, 0),
            observed_at: noon(),
        });
        reference.publish_period_open(PeriodOpen {
            value: Decimal::new(100, 0),
            period_start: Utc.with_ymd_and_hms(2025, 3, 14, 9, 0, 0).unwrap(),
        });
        let (d, mut rx) = dispatcher(reference, EventToggles::default());
        d.dispatch_frame(BOOK).await.unwrap();

        let StreamEvent::Snapshot(book) = rx.recv().await.unwrap() else {
            panic!("expected snapshot");
        };
        assert_eq!(book.reference.reference_current, Some(Decimal::new(105, 0)));
        assert_eq!(book.reference.reference_period_open, Some(Decimal::new(100, 0)));
        assert!(book.reference.reference_stale);
    }

    #[tokio::test]
    async fn other_kinds_pass_through_unmodified() {
        let (d, mut rx) = dispatcher(fresh_reference(), EventToggles::all());
        let expected = d.classify(TRADE).unwrap();
        d.dispatch_frame(TRADE).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), expected);
    }

    #[tokio::test]
    async fn disabled_kind_is_counted_but_not_sent() {
        let (d, mut rx) = dispatcher(fresh_reference(), EventToggles::default());
        let outcome = d.dispatch_frame(PRICE_CHANGE).await.unwrap();
        assert_eq!(
            outcome,
            FrameOutcome {
                dispatched: 0,
                skipped: 1,
                rejected: 0
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn bad_array_element_only_drops_itself() {
        let (d, mut rx) = dispatcher(fresh_reference(), EventToggles::all());
        let frame = format!(r#"[{TRADE},{{"event_type":"mystery"}},{BOOK}]"#);

        let outcome = d.dispatch_frame(&frame).await.unwrap();
        assert_eq!(outcome.dispatched, 2);
        assert_eq!(outcome.rejected, 1);
        assert_eq!(rx.recv().await.unwrap().kind(), EventKind::Trade);
        assert_eq!(rx.recv().await.unwrap().kind(), EventKind::Snapshot);
    }

    #[tokio::test]
    async fn garbage_frame_is_rejected_without_error() {
        let (d, _rx) = dispatcher(fresh_reference(), EventToggles::all());
        let outcome = d.dispatch_frame("not json at all").await.unwrap();
        assert_eq!(outcome.rejected, 1);
    }

    #[tokio::test]
    async fn closed_sink_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let (writer, sink) = EventLogWriter::channel(dir.path(), 1);
        drop(writer);
        let d = MessageDispatcher::new(
            fresh_reference(),
            sink,
            EventToggles::all(),
            Duration::from_secs(10),
            Arc::new(FixedClock(noon())),
        );

        let result = d.dispatch_frame(TRADE).await;
        assert!(matches!(result, Err(DispatchError::SinkClosed(_))));
    }
}
