//! Keep-alive Ticker
//!
//! Separate task that asks the session loop to send a keep-alive probe on a
//! fixed cadence. The first probe is due one full interval after start. The
//! venue's acknowledgment is discarded by the session; no timeout is enforced
//! because a dead transport surfaces as a read error.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Keep-alive cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAliveConfig {
    /// Interval between probes.
    pub interval: Duration,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
        }
    }
}

/// Requests emitted by the ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAliveEvent {
    /// Send one probe now.
    Probe,
}

/// Ticker task.
#[derive(Debug)]
pub struct KeepAliveTicker {
    config: KeepAliveConfig,
    event_tx: mpsc::Sender<KeepAliveEvent>,
    cancel: CancellationToken,
}

impl KeepAliveTicker {
    /// Create a ticker that reports on `event_tx` until `cancel` fires.
    #[must_use]
    pub const fn new(
        config: KeepAliveConfig,
        event_tx: mpsc::Sender<KeepAliveEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            event_tx,
            cancel,
        }
    }

    /// Run until cancelled or the session loop goes away.
    pub async fn run(self) {
        let period = self.config.interval.max(Duration::from_millis(1));
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Keep-alive ticker cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if self.event_tx.send(KeepAliveEvent::Probe).await.is_err() {
                        tracing::debug!("Session loop gone, stopping keep-alive ticker");
                        break;
                    }
                }
            }
        }
    }
}
