//! In-memory reference source for tests and dry runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;

use crate::application::ports::{ReferencePricePort, ReferenceSourceError};

/// Mock reference source.
///
/// Returns whatever was last set. A period with no configured open reports
/// [`ReferenceSourceError::PeriodUnavailable`]. An optional latency makes
/// fetches take (tokio) time so shutdown paths can be exercised.
#[derive(Debug, Default)]
pub struct MockReferenceSource {
    price: RwLock<Option<Decimal>>,
    opens: RwLock<HashMap<DateTime<Utc>, Decimal>>,
    latency: RwLock<Duration>,
    price_calls: AtomicUsize,
    open_calls: AtomicUsize,
}

impl MockReferenceSource {
    /// Create an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the value returned by `latest_price`.
    pub fn set_price(&self, price: Decimal) {
        *self.price.write() = Some(price);
    }

    /// Set the open returned for the period starting at `period_start`.
    pub fn set_period_open(&self, period_start: DateTime<Utc>, open: Decimal) {
        self.opens.write().insert(period_start, open);
    }

    /// Delay every response by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.write() = latency;
    }

    /// Number of `latest_price` calls so far.
    #[must_use]
    pub fn price_calls(&self) -> usize {
        self.price_calls.load(Ordering::SeqCst)
    }

    /// Number of `period_open` calls so far.
    #[must_use]
    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.read();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl ReferencePricePort for MockReferenceSource {
    async fn latest_price(&self) -> Result<Decimal, ReferenceSourceError> {
        self.price_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        (*self.price.read()).ok_or_else(|| ReferenceSourceError::Network {
            message: "no price configured".to_string(),
        })
    }

    async fn period_open(
        &self,
        period_start: DateTime<Utc>,
    ) -> Result<Decimal, ReferenceSourceError> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        self.opens
            .read()
            .get(&period_start)
            .copied()
            .ok_or(ReferenceSourceError::PeriodUnavailable { period_start })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[tokio::test]
    async fn unset_price_is_an_error() {
        let source = MockReferenceSource::new();
        assert!(source.latest_price().await.is_err());
        assert_eq!(source.price_calls(), 1);
    }

    #[tokio::test]
    async fn returns_configured_values() {
        let source = MockReferenceSource::new();
        let hour = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        source.set_price(Decimal::new(7, 0));
        source.set_period_open(hour, Decimal::new(6, 0));

        assert_eq!(source.latest_price().await.unwrap(), Decimal::new(7, 0));
        assert_eq!(source.period_open(hour).await.unwrap(), Decimal::new(6, 0));
        assert!(matches!(
            source.period_open(Utc.with_ymd_and_hms(2025, 1, 1, 1, 0, 0).unwrap()).await,
            Err(ReferenceSourceError::PeriodUnavailable { .. })
        ));
        assert_eq!(source.open_calls(), 2);
    }
}
