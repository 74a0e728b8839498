//! Reference Price Synchronizer
//!
//! Keeps [`ReferenceState`] up to date from a [`ReferencePricePort`]:
//!
//! - `current` is polled on a fixed interval (last write wins)
//! - `period_open` is fetched for the running hour at startup, then once per
//!   wall-clock hour boundary, with bounded retries
//!
//! Failures only degrade enrichment; they are logged and counted, and the last
//! good value stays in place. The dispatch path never waits on this task.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::prelude::ToPrimitive;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::retry::{RetryConfig, RetryPolicy};
use crate::application::ports::{Clock, ReferencePricePort, ReferenceSourceError};
use crate::domain::reference::{
    PERIOD_SECS, PeriodOpen, ReferencePrice, ReferenceState, period_start,
};
use crate::infrastructure::metrics::{
    ReferenceField, record_reference_refresh, set_reference_value,
};

/// Shortest accepted poll period; `interval` rejects zero.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Synchronizer timing.
#[derive(Debug, Clone)]
pub struct SynchronizerConfig {
    /// Interval between `current` polls.
    pub poll_interval: Duration,
    /// Backoff for `period_open` fetches.
    pub retry: RetryConfig,
}

impl Default for SynchronizerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            retry: RetryConfig::default(),
        }
    }
}

/// Background task that owns all writes to a [`ReferenceState`].
pub struct ReferencePriceSynchronizer {
    source: Arc<dyn ReferencePricePort>,
    state: ReferenceState,
    clock: Arc<dyn Clock>,
    config: SynchronizerConfig,
}

impl ReferencePriceSynchronizer {
    /// Create a synchronizer writing into `state`.
    #[must_use]
    pub fn new(
        source: Arc<dyn ReferencePricePort>,
        state: ReferenceState,
        clock: Arc<dyn Clock>,
        config: SynchronizerConfig,
    ) -> Self {
        Self {
            source,
            state,
            clock,
            config,
        }
    }

    /// Run both refresh loops until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            poll_interval_ms = self.config.poll_interval.as_millis(),
            "Reference price synchronizer started"
        );

        tokio::join!(self.poll_current(&cancel), self.track_period_open(&cancel));

        tracing::info!("Reference price synchronizer stopped");
    }

    async fn poll_current(&self, cancel: &CancellationToken) {
        let period = self.config.poll_interval.max(MIN_POLL_INTERVAL);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let result = tokio::select! {
                () = cancel.cancelled() => break,
                result = self.source.latest_price() => result,
            };
            self.apply_current(result);
        }
    }

    fn apply_current(&self, result: Result<rust_decimal::Decimal, ReferenceSourceError>) {
        match result {
            Ok(value) => {
                self.state.publish_current(ReferencePrice {
                    value,
                    observed_at: self.clock.now(),
                });
                record_reference_refresh(ReferenceField::Current, true);
                if let Some(v) = value.to_f64() {
                    set_reference_value(ReferenceField::Current, v);
                }
                tracing::trace!(%value, "Reference price refreshed");
            }
            Err(e) => {
                record_reference_refresh(ReferenceField::Current, false);
                tracing::warn!(error = %e, "Reference price refresh failed, keeping last value");
            }
        }
    }

    async fn track_period_open(&self, cancel: &CancellationToken) {
        let period = TimeDelta::seconds(PERIOD_SECS);
        let mut target = period_start(self.clock.now());

        loop {
            let next = target + period;

            tokio::select! {
                () = cancel.cancelled() => break,
                () = self.fetch_period_open(target, next) => {}
            }

            let now = self.clock.now();
            if now < next {
                let wait = (next - now).to_std().unwrap_or_default();
                tracing::debug!(
                    next_boundary = %next,
                    wait_secs = wait.as_secs(),
                    "Waiting for next period boundary"
                );
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(wait) => {}
                }
            }

            // Skip periods that passed while the process was stalled.
            target = next.max(period_start(self.clock.now()));
        }
    }

    /// Fetch the open of the period starting at `target`, retrying until
    /// success, retry exhaustion, or `deadline` (the following boundary).
    async fn fetch_period_open(&self, target: DateTime<Utc>, deadline: DateTime<Utc>) {
        let mut policy = RetryPolicy::new(self.config.retry.clone());

        loop {
            match self.source.period_open(target).await {
                Ok(value) => {
                    record_reference_refresh(ReferenceField::PeriodOpen, true);
                    if self.state.publish_period_open(PeriodOpen {
                        value,
                        period_start: target,
                    }) {
                        if let Some(v) = value.to_f64() {
                            set_reference_value(ReferenceField::PeriodOpen, v);
                        }
                        tracing::info!(period_start = %target, %value, "Period open updated");
                    }
                    return;
                }
                Err(e) => {
                    record_reference_refresh(ReferenceField::PeriodOpen, false);

                    let Some(delay) = policy.next_delay() else {
                        tracing::warn!(
                            period_start = %target,
                            attempts = policy.attempts(),
                            error = %e,
                            "Period open fetch gave up, keeping last value"
                        );
                        return;
                    };

                    let retry_at = TimeDelta::from_std(delay)
                        .ok()
                        .and_then(|d| self.clock.now().checked_add_signed(d));
                    if retry_at.is_none_or(|at| at >= deadline) {
                        tracing::warn!(
                            period_start = %target,
                            error = %e,
                            "Period open not fetched before next boundary, keeping last value"
                        );
                        return;
                    }

                    tracing::debug!(
                        period_start = %target,
                        attempt = policy.attempts(),
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "Retrying period open fetch"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::TimeZone;
    use rust_decimal::Decimal;

    use super::*;
    use crate::application::ports::MockReferencePricePort;

    /// Wall clock that advances with tokio's (paused) time.
    #[derive(Debug)]
    struct PausedClock {
        base: DateTime<Utc>,
        start: tokio::time::Instant,
    }

    impl PausedClock {
        fn starting_at(base: DateTime<Utc>) -> Arc<Self> {
            Arc::new(Self {
                base,
                start: tokio::time::Instant::now(),
            })
        }
    }

    impl Clock for PausedClock {
        fn now(&self) -> DateTime<Utc> {
            self.base + TimeDelta::from_std(self.start.elapsed()).unwrap()
        }
    }

    fn config(max_attempts: u32) -> SynchronizerConfig {
        SynchronizerConfig {
            poll_interval: Duration::from_secs(2),
            retry: RetryConfig {
                initial_delay: Duration::from_millis(100),
                max_delay: Duration::from_secs(1),
                multiplier: 2.0,
                jitter_factor: 0.0,
                max_attempts,
            },
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 10, 20, 0).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn period_open_is_retried_until_it_succeeds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();

        let mut source = MockReferencePricePort::new();
        source
            .expect_latest_price()
            .returning(|| Ok(Decimal::new(101, 0)));
        source.expect_period_open().returning(move |requested| {
            assert_eq!(requested, Utc.with_ymd_and_hms(2025, 3, 14, 10, 0, 0).unwrap());
            if seen.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ReferenceSourceError::Network {
                    message: "timeout".to_string(),
                })
            } else {
                Ok(Decimal::new(100, 0))
            }
        });

        let state = ReferenceState::new();
        let sync = ReferencePriceSynchronizer::new(
            Arc::new(source),
            state.clone(),
            PausedClock::starting_at(start()),
            config(5),
        );
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(sync.run(cancel.clone()));

        tokio::time::sleep(Duration::from_secs(5)).await;

        let snap = state.snapshot();
        assert_eq!(snap.period_open.unwrap().value, Decimal::new(100, 0));
        assert_eq!(snap.current.unwrap().value, Decimal::new(101, 0));
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn period_open_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();

        let mut source = MockReferencePricePort::new();
        source
            .expect_latest_price()
            .returning(|| Ok(Decimal::new(101, 0)));
        source.expect_period_open().returning(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            Err(ReferenceSourceError::Api {
                status: 503,
                message: "unavailable".to_string(),
            })
        });

        let state = ReferenceState::new();
        let sync = ReferencePriceSynchronizer::new(
            Arc::new(source),
            state.clone(),
            PausedClock::starting_at(start()),
            config(2),
        );
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(sync.run(cancel.clone()));

        tokio::time::sleep(Duration::from_secs(60)).await;

        assert!(state.snapshot().period_open.is_none());
        // First try plus two retries.
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_poll_keeps_last_current_value() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();

        let mut source = MockReferencePricePort::new();
        source.expect_latest_price().returning(move || {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(Decimal::new(42, 0))
            } else {
                Err(ReferenceSourceError::Parse("bad body".to_string()))
            }
        });
        source
            .expect_period_open()
            .returning(|_| Ok(Decimal::new(40, 0)));

        let state = ReferenceState::new();
        let clock = PausedClock::starting_at(start());
        let sync = ReferencePriceSynchronizer::new(
            Arc::new(source),
            state.clone(),
            clock,
            config(1),
        );
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(sync.run(cancel.clone()));

        tokio::time::sleep(Duration::from_secs(11)).await;

        let current = state.snapshot().current.unwrap();
        assert_eq!(current.value, Decimal::new(42, 0));
        assert_eq!(current.observed_at, start());
        assert!(calls.load(Ordering::SeqCst) >= 5);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn zero_poll_interval_still_polls() {
        let mut source = MockReferencePricePort::new();
        source
            .expect_latest_price()
            .returning(|| Ok(Decimal::new(7, 0)));
        source
            .expect_period_open()
            .returning(|_| Ok(Decimal::new(6, 0)));

        let state = ReferenceState::new();
        let sync = ReferencePriceSynchronizer::new(
            Arc::new(source),
            state.clone(),
            PausedClock::starting_at(start()),
            SynchronizerConfig {
                poll_interval: Duration::ZERO,
                ..config(1)
            },
        );
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(sync.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(state.snapshot().current.unwrap().value, Decimal::new(7, 0));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_abandons_pending_fetch() {
        let mut source = MockReferencePricePort::new();
        source
            .expect_latest_price()
            .returning(|| Ok(Decimal::new(1, 0)));
        source.expect_period_open().returning(|_| {
            Err(ReferenceSourceError::Network {
                message: "refused".to_string(),
            })
        });

        let sync = ReferencePriceSynchronizer::new(
            Arc::new(source),
            ReferenceState::new(),
            PausedClock::starting_at(start()),
            config(0),
        );
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(sync.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(350)).await;
        cancel.cancel();

        let joined = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert!(joined.is_ok(), "synchronizer should stop on cancellation");
    }
}
