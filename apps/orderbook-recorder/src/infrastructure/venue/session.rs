//! Market Channel Session
//!
//! Owns one WebSocket connection to the venue's market channel for its whole
//! life: connect, subscribe, keep-alive, read/dispatch, and a coordinated
//! close on cancellation.
//!
//! # State
//!
//! ```text
//! Connecting -> Subscribed -> Closing -> Closed
//!      \             \__________________/^
//!       \___________________(error)______/
//! ```
//!
//! A session is never reused. Any transport failure, a close initiated by the
//! peer, or a dead log sink ends it with a [`ConnectionError`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::dispatcher::{DispatchError, FrameOutcome, MessageDispatcher};
use super::keepalive::{KeepAliveConfig, KeepAliveEvent, KeepAliveTicker};
use super::messages::{KEEPALIVE_PROBE, SubscribeRequest, is_keepalive_ack};
use crate::domain::subscription::AssetSet;
use crate::infrastructure::metrics::{record_keepalive_probe, set_session_state};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

// =============================================================================
// Error Type
// =============================================================================

/// Fatal session failure.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The WebSocket could not be established.
    #[error("failed to connect to {url}: {source}")]
    Connect {
        /// Endpoint URL.
        url: String,
        /// Transport cause.
        #[source]
        source: Box<tokio_tungstenite::tungstenite::Error>,
    },

    /// The subscription message could not be encoded.
    #[error("failed to encode subscription: {0}")]
    Encode(#[from] serde_json::Error),

    /// The subscription message could not be sent.
    #[error("failed to send subscription: {0}")]
    Subscribe(#[source] Box<tokio_tungstenite::tungstenite::Error>),

    /// Read or write failure on an established connection.
    #[error("WebSocket error: {0}")]
    Transport(#[from] Box<tokio_tungstenite::tungstenite::Error>),

    /// The peer sent a close frame.
    #[error("connection closed by peer (code {code:?}): {reason}")]
    PeerClosed {
        /// Close code, if one was sent.
        code: Option<u16>,
        /// Close reason text.
        reason: String,
    },

    /// The stream ended without a close frame.
    #[error("WebSocket stream ended")]
    StreamEnded,

    /// The log writer stopped accepting records.
    #[error(transparent)]
    Sink(#[from] DispatchError),
}

impl From<tokio_tungstenite::tungstenite::Error> for ConnectionError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(Box::new(e))
    }
}

// =============================================================================
// State
// =============================================================================

/// Handshake and lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Establishing the connection and sending the subscription.
    Connecting,
    /// Subscription sent; streaming.
    Subscribed,
    /// Close frame sent; draining.
    Closing,
    /// Connection released.
    Closed,
}

impl SessionState {
    /// Lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Subscribed => "subscribed",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }

    const fn code(self) -> u8 {
        match self {
            Self::Connecting => 0,
            Self::Subscribed => 1,
            Self::Closing => 2,
            Self::Closed => 3,
        }
    }

    const fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Connecting,
            1 => Self::Subscribed,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Shared, lock-free view of a session's state (read by the health server).
#[derive(Debug, Clone)]
pub struct SessionStatus(Arc<AtomicU8>);

impl Default for SessionStatus {
    fn default() -> Self {
        Self(Arc::new(AtomicU8::new(SessionState::Connecting.code())))
    }
}

impl SessionStatus {
    /// New status starting at `Connecting`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[must_use]
    pub fn get(&self) -> SessionState {
        SessionState::from_code(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: SessionState) {
        self.0.store(state.code(), Ordering::Release);
        set_session_state(f64::from(state.code()));
        tracing::debug!(state = state.as_str(), "Session state changed");
    }
}

// =============================================================================
// Configuration & Summary
// =============================================================================

/// Session parameters.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Market channel URL.
    pub url: String,
    /// Keep-alive cadence.
    pub keepalive: KeepAliveConfig,
    /// Upper bound on the close handshake and drain.
    pub shutdown_grace: Duration,
    /// State handle shared with observers.
    pub status: SessionStatus,
}

impl SessionConfig {
    /// Config with default keep-alive and grace for `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            keepalive: KeepAliveConfig::default(),
            shutdown_grace: Duration::from_secs(3),
            status: SessionStatus::new(),
        }
    }
}

/// Counters collected over one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    /// Text frames received (keep-alive acks included).
    pub frames: u64,
    /// Events handed to the log sink.
    pub dispatched: u64,
    /// Events classified but not persisted.
    pub skipped: u64,
    /// Frames or elements that failed to decode.
    pub rejected: u64,
    /// Keep-alive probes sent.
    pub probes_sent: u64,
    /// Keep-alive acknowledgments received.
    pub acks_received: u64,
    /// Whether the peer acknowledged our close frame before the deadline.
    pub close_acknowledged: bool,
}

impl SessionSummary {
    fn absorb(&mut self, outcome: FrameOutcome) {
        self.dispatched += outcome.dispatched as u64;
        self.skipped += outcome.skipped as u64;
        self.rejected += outcome.rejected as u64;
    }
}

// =============================================================================
// Session
// =============================================================================

/// One subscribed connection to the market channel.
pub struct Session {
    ws: WsStream,
    config: SessionConfig,
    targets: AssetSet,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("url", &self.config.url)
            .field("targets", &self.targets.len())
            .field("state", &self.config.status.get())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Connect and send the subscription.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or the
    /// subscription cannot be sent; the status is left at `Closed`.
    pub async fn open(config: SessionConfig, targets: AssetSet) -> Result<Self, ConnectionError> {
        let status = config.status.clone();
        status.set(SessionState::Connecting);
        tracing::info!(url = %config.url, assets = targets.len(), "Connecting to market channel");

        let result = Self::connect_and_subscribe(&config, &targets).await;
        match result {
            Ok(ws) => {
                status.set(SessionState::Subscribed);
                tracing::info!(
                    assets = ?targets.iter().map(|a| a.short()).collect::<Vec<_>>(),
                    "Subscribed to market channel"
                );
                Ok(Self {
                    ws,
                    config,
                    targets,
                })
            }
            Err(e) => {
                status.set(SessionState::Closed);
                Err(e)
            }
        }
    }

    async fn connect_and_subscribe(
        config: &SessionConfig,
        targets: &AssetSet,
    ) -> Result<WsStream, ConnectionError> {
        let (mut ws, _response) = tokio_tungstenite::connect_async(config.url.as_str())
            .await
            .map_err(|source| ConnectionError::Connect {
                url: config.url.clone(),
                source: Box::new(source),
            })?;

        let json = SubscribeRequest::market(targets).to_json()?;
        tracing::debug!(request = %json, "Sending subscribe request");
        ws.send(Message::Text(json.into()))
            .await
            .map_err(|e| ConnectionError::Subscribe(Box::new(e)))?;

        Ok(ws)
    }

    /// State handle for this session.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.config.status.clone()
    }

    /// Stream until cancelled or a fatal error, then close.
    ///
    /// On cancellation the session sends a close frame, keeps dispatching
    /// frames already in flight until the peer acknowledges the close or the
    /// grace period ends, and returns the summary. If the log sink dies the
    /// session still sends a close frame before returning the error; if the
    /// peer closes first, its close is answered. `dispatcher` is dropped
    /// before returning, releasing its log sink.
    ///
    /// # Errors
    ///
    /// Returns the first fatal transport or sink error.
    pub async fn run(
        self,
        dispatcher: MessageDispatcher,
        cancel: CancellationToken,
    ) -> Result<SessionSummary, ConnectionError> {
        let Self { ws, config, .. } = self;
        let status = config.status.clone();
        let (mut write, mut read) = ws.split();
        let mut summary = SessionSummary::default();

        let (keepalive_tx, mut keepalive_rx) = mpsc::channel::<KeepAliveEvent>(4);
        let keepalive_cancel = cancel.child_token();
        let keepalive = tokio::spawn(
            KeepAliveTicker::new(config.keepalive, keepalive_tx, keepalive_cancel.clone()).run(),
        );

        let result = loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break Ok(()),
                Some(KeepAliveEvent::Probe) = keepalive_rx.recv() => {
                    if let Err(e) = write.send(Message::Text(KEEPALIVE_PROBE.into())).await {
                        break Err(ConnectionError::from(e));
                    }
                    summary.probes_sent += 1;
                    record_keepalive_probe();
                    tracing::trace!("Keep-alive probe sent");
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let handled = handle_text(&dispatcher, text.as_str(), &mut summary);
                            tokio::pin!(handled);
                            // A full sink must not hold shutdown past the grace period.
                            let outcome = tokio::select! {
                                outcome = &mut handled => outcome,
                                () = cancel.cancelled() => {
                                    finish_within(config.shutdown_grace, &mut handled).await
                                }
                            };
                            if let Err(e) = outcome {
                                break Err(e);
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                break Err(ConnectionError::from(e));
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            break Err(ConnectionError::PeerClosed {
                                code: frame.as_ref().map(|f| u16::from(f.code)),
                                reason: frame.map(|f| f.reason.as_str().to_string()).unwrap_or_default(),
                            });
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => break Err(ConnectionError::from(e)),
                        None => break Err(ConnectionError::StreamEnded),
                    }
                }
            }
        };

        keepalive_cancel.cancel();
        if let Err(e) = keepalive.await {
            tracing::debug!(error = %e, "Keep-alive ticker did not stop cleanly");
        }

        let failure = result.err();
        if let Some(e) = &failure {
            tracing::error!(error = %e, "Market channel session failed");
        }

        status.set(SessionState::Closing);
        let closed = match &failure {
            None => {
                close_and_drain(
                    &mut write,
                    &mut read,
                    &dispatcher,
                    &mut summary,
                    config.shutdown_grace,
                )
                .await
            }
            // The connection is healthy; only the log writer is gone.
            Some(ConnectionError::Sink(_)) => {
                match close_quietly(&mut write, &mut read, config.shutdown_grace).await {
                    Ok(acknowledged) => summary.close_acknowledged = acknowledged,
                    Err(e) => tracing::warn!(error = %e, "Failed to send close frame"),
                }
                Ok(())
            }
            Some(ConnectionError::PeerClosed { .. }) => {
                // Flushes the close reply queued by the transport.
                if let Ok(Err(e)) = tokio::time::timeout(config.shutdown_grace, write.close()).await {
                    tracing::debug!(error = %e, "Close reply not sent");
                }
                Ok(())
            }
            Some(_) => Ok(()),
        };
        status.set(SessionState::Closed);
        drop(dispatcher);

        if let Some(e) = failure {
            return Err(e);
        }
        closed?;
        tracing::info!(
            frames = summary.frames,
            dispatched = summary.dispatched,
            rejected = summary.rejected,
            close_acknowledged = summary.close_acknowledged,
            "Market channel session closed"
        );
        Ok(summary)
    }

    /// Close without streaming: send a close frame and wait for the peer's
    /// acknowledgment up to the grace period. Inbound data is discarded.
    ///
    /// # Errors
    ///
    /// Returns an error if the close frame cannot be sent.
    pub async fn close(self) -> Result<(), ConnectionError> {
        let Self { ws, config, .. } = self;
        config.status.set(SessionState::Closing);

        let (mut write, mut read) = ws.split();
        let result = close_quietly(&mut write, &mut read, config.shutdown_grace).await;

        config.status.set(SessionState::Closed);
        result?;
        Ok(())
    }
}

fn shutdown_frame() -> CloseFrame {
    CloseFrame {
        code: CloseCode::Normal,
        reason: "shutdown".into(),
    }
}

async fn handle_text(
    dispatcher: &MessageDispatcher,
    text: &str,
    summary: &mut SessionSummary,
) -> Result<(), ConnectionError> {
    summary.frames += 1;
    if is_keepalive_ack(text) {
        summary.acks_received += 1;
        tracing::trace!("Keep-alive acknowledged");
        return Ok(());
    }

    let outcome = dispatcher.dispatch_frame(text).await?;
    summary.absorb(outcome);
    Ok(())
}

/// Wait up to `grace` for an in-flight dispatch after cancellation.
async fn finish_within<F>(grace: Duration, handled: F) -> Result<(), ConnectionError>
where
    F: Future<Output = Result<(), ConnectionError>>,
{
    tokio::time::timeout(grace, handled).await.unwrap_or_else(|_| {
        tracing::warn!("Log sink still full at grace deadline, dropping in-flight frame");
        Ok(())
    })
}

/// Send our close frame and wait up to `grace` for the peer's close.
/// Inbound data is discarded. Returns whether the close was acknowledged.
async fn close_quietly(
    write: &mut WsWrite,
    read: &mut WsRead,
    grace: Duration,
) -> Result<bool, tokio_tungstenite::tungstenite::Error> {
    write.send(Message::Close(Some(shutdown_frame()))).await?;

    let wait = async {
        while let Some(Ok(msg)) = read.next().await {
            if msg.is_close() {
                return true;
            }
        }
        false
    };
    Ok(tokio::time::timeout(grace, wait).await.unwrap_or_else(|_| {
        tracing::warn!("Close not acknowledged before grace deadline");
        false
    }))
}

/// Send our close frame, then dispatch whatever the peer still delivers until
/// it acknowledges the close or `grace` runs out. The deadline also bounds a
/// dispatch blocked on a full sink.
async fn close_and_drain(
    write: &mut WsWrite,
    read: &mut WsRead,
    dispatcher: &MessageDispatcher,
    summary: &mut SessionSummary,
    grace: Duration,
) -> Result<(), ConnectionError> {
    tracing::info!(grace_ms = grace.as_millis(), "Closing market channel session");

    if let Err(e) = write.send(Message::Close(Some(shutdown_frame()))).await {
        tracing::warn!(error = %e, "Failed to send close frame");
        return Ok(());
    }

    tokio::time::timeout(grace, drain_until_closed(read, dispatcher, summary))
        .await
        .unwrap_or_else(|_| {
            tracing::warn!("Close not acknowledged before grace deadline");
            Ok(())
        })
}

async fn drain_until_closed(
    read: &mut WsRead,
    dispatcher: &MessageDispatcher,
    summary: &mut SessionSummary,
) -> Result<(), ConnectionError> {
    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                handle_text(dispatcher, text.as_str(), summary).await?;
            }
            Ok(Message::Close(_)) => {
                summary.close_acknowledged = true;
                return Ok(());
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "Transport error while draining");
                return Ok(());
            }
        }
    }
    Ok(())
}
