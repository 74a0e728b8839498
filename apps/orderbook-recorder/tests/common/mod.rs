//! In-process market channel peer shared by the integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;

use futures_util::{SinkExt, StreamExt};
use orderbook_recorder::RecorderConfig;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

pub const ASSET: &str = "65818619657568813474341868652308942079804919287380422192892211131408793125422";

/// What the peer saw during one connection.
#[derive(Debug, Default)]
pub struct PeerLog {
    /// The first text frame, parsed.
    pub subscribe: Value,
    /// Keep-alive probes received.
    pub probes: usize,
    /// Whether the client sent a close frame.
    pub saw_close: bool,
}

/// What the peer does once its frames are sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ending {
    /// Answer keep-alive probes until the client closes.
    AwaitClose,
    /// Send a close frame (1001 "restart") and wait for the reply.
    CloseFirst,
    /// Drop the TCP connection without a close handshake.
    Abort,
}

/// A peer that accepts one connection, reads the subscription, sends
/// `frames`, then ends the connection as `ending` says.
pub struct Peer {
    pub addr: SocketAddr,
    pub frames_sent: oneshot::Receiver<()>,
    pub handle: JoinHandle<PeerLog>,
}

impl Peer {
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }
}

pub async fn spawn_peer(frames: Vec<String>) -> Peer {
    spawn_peer_with(frames, Ending::AwaitClose).await
}

pub async fn spawn_peer_with(frames: Vec<String>, ending: Ending) -> Peer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (sent_tx, sent_rx) = oneshot::channel();

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let mut log = PeerLog::default();

        match ws.next().await {
            Some(Ok(Message::Text(text))) => {
                log.subscribe = serde_json::from_str(text.as_str()).unwrap();
            }
            other => panic!("expected subscribe frame, got {other:?}"),
        }

        for frame in frames {
            ws.send(Message::Text(frame.into())).await.unwrap();
        }
        let _ = sent_tx.send(());

        match ending {
            Ending::AwaitClose => {}
            Ending::CloseFirst => {
                ws.close(Some(CloseFrame {
                    code: CloseCode::Away,
                    reason: "restart".into(),
                }))
                .await
                .unwrap();
            }
            Ending::Abort => return log,
        }

        while let Some(msg) = ws.next().await {
            match msg {
                Ok(Message::Text(text)) if text.as_str() == "PING" => {
                    log.probes += 1;
                    let _ = ws.send(Message::Text("PONG".into())).await;
                }
                Ok(Message::Close(_)) => {
                    log.saw_close = true;
                    break;
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }

        // Flushes the queued close reply.
        let _ = ws.close(None).await;
        log
    });

    Peer {
        addr,
        frames_sent: sent_rx,
        handle,
    }
}

/// Recorder config pointed at `url` and writing to `dir`, with the health
/// server disabled.
pub fn recorder_config(url: &str, dir: &Path, extra: &[(&str, &str)]) -> RecorderConfig {
    let mut vars: HashMap<String, String> = HashMap::from([
        ("RECORDER_WS_URL".to_string(), url.to_string()),
        ("RECORDER_DATA_DIR".to_string(), dir.display().to_string()),
        ("RECORDER_ASSET_IDS".to_string(), ASSET.to_string()),
        ("RECORDER_HEALTH_PORT".to_string(), "0".to_string()),
        ("RECORDER_KEEPALIVE_INTERVAL_SECS".to_string(), "60".to_string()),
        ("RECORDER_SHUTDOWN_GRACE_MS".to_string(), "2000".to_string()),
    ]);
    for (k, v) in extra {
        vars.insert((*k).to_string(), (*v).to_string());
    }
    RecorderConfig::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

pub fn book_frame(ts: u64) -> String {
    format!(
        r#"{{"event_type":"book","asset_id":"{ASSET}","market":"0xbd31","bids":[{{"price":".48","size":"30"}}],"asks":[{{"price":".52","size":"25"}}],"timestamp":"{ts}","hash":"0x0abc"}}"#
    )
}

pub fn trade_frame(ts: u64) -> String {
    format!(
        r#"{{"event_type":"last_trade_price","asset_id":"{ASSET}","market":"0xbd31","price":"0.456","size":"219.217767","side":"BUY","fee_rate_bps":"0","timestamp":"{ts}"}}"#
    )
}

pub fn tick_frame(ts: u64) -> String {
    format!(
        r#"{{"event_type":"tick_size_change","asset_id":"{ASSET}","market":"0xbd31","old_tick_size":"0.01","new_tick_size":"0.001","timestamp":"{ts}"}}"#
    )
}

/// Parse every line of `path`, failing on a partial or invalid record.
pub fn read_records(path: &Path) -> Vec<Value> {
    let content = std::fs::read_to_string(path).unwrap_or_default();
    assert!(
        content.is_empty() || content.ends_with('\n'),
        "log does not end with a newline"
    );
    content
        .lines()
        .map(|line| serde_json::from_str(line).expect("complete JSON record"))
        .collect()
}
