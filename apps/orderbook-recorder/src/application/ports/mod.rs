//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `ReferencePricePort`: request/response source of the reference price
//! - `Clock`: wall-clock time, replaceable in tests

use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Reference source error.
///
/// Recoverable: the synchronizer logs it and keeps the last known value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReferenceSourceError {
    /// Transport failure or timeout.
    #[error("reference source network error: {message}")]
    Network {
        /// Error details.
        message: String,
    },

    /// Non-success HTTP status.
    #[error("reference source returned {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body.
        message: String,
    },

    /// Response body could not be parsed.
    #[error("reference source response could not be parsed: {0}")]
    Parse(String),

    /// The source has no value for the requested period yet.
    #[error("no period open available for {period_start}")]
    PeriodUnavailable {
        /// Requested period start.
        period_start: DateTime<Utc>,
    },
}

/// Source of the external reference price.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReferencePricePort: Send + Sync {
    /// Latest real-time value.
    async fn latest_price(&self) -> Result<Decimal, ReferenceSourceError>;

    /// Opening value of the hourly period starting at `period_start`.
    async fn period_open(&self, period_start: DateTime<Utc>)
    -> Result<Decimal, ReferenceSourceError>;
}

/// Wall-clock source.
pub trait Clock: Send + Sync + Debug {
    /// Current UTC time.
    fn now(&self) -> DateTime<Utc>;
}

/// [`Clock`] backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
