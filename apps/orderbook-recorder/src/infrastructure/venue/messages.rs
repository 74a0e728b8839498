//! Outbound market channel messages.
//!
//! # Subscribe
//!
//! ```json
//! {"type":"market","assets_ids":["1096819599...","6581..."]}
//! ```
//!
//! # Keep-alive
//!
//! The venue expects the bare text frame `PING` and answers with `PONG`.

use serde::Serialize;

use crate::domain::subscription::AssetSet;

/// Keep-alive probe text frame.
pub const KEEPALIVE_PROBE: &str = "PING";

/// Keep-alive acknowledgment text frame.
pub const KEEPALIVE_ACK: &str = "PONG";

/// Channel subscription request, sent once per session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscribeRequest {
    /// Channel name.
    #[serde(rename = "type")]
    pub channel: &'static str,
    /// Asset ids to stream.
    pub assets_ids: Vec<String>,
}

impl SubscribeRequest {
    /// Market channel subscription for `targets`.
    #[must_use]
    pub fn market(targets: &AssetSet) -> Self {
        Self {
            channel: "market",
            assets_ids: targets.to_strings(),
        }
    }

    /// Serialize to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// True when `text` is the venue's keep-alive acknowledgment.
#[must_use]
pub fn is_keepalive_ack(text: &str) -> bool {
    text.trim() == KEEPALIVE_ACK
}
