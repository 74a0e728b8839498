//! Venue Market Channel
//!
//! WebSocket client for the order-book venue's public market channel.
//!
//! # Components
//!
//! - `messages`: Subscribe request and keep-alive frames
//! - `codec`: Frame splitting and event classification
//! - `keepalive`: Keep-alive ticker task
//! - `dispatcher`: Classification, snapshot enrichment and routing to the logs
//! - `session`: Connection lifecycle (connect, subscribe, stream, close)
//!
//! # Stream URL
//!
//! - Production: `wss://ws-subscriptions-clob.polymarket.com/ws/market`

pub mod codec;
pub mod dispatcher;
pub mod keepalive;
pub mod messages;
pub mod session;

pub use codec::{DecodeError, EventCodec};
pub use dispatcher::{DispatchError, EventToggles, FrameOutcome, MessageDispatcher};
pub use keepalive::{KeepAliveConfig, KeepAliveEvent, KeepAliveTicker};
pub use messages::SubscribeRequest;
pub use session::{
    ConnectionError, Session, SessionConfig, SessionState, SessionStatus, SessionSummary,
};
