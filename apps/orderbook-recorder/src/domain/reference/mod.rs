//! Reference Price State
//!
//! Holds the two reference values used to enrich book snapshots:
//!
//! - `current`: latest observed value, overwritten on every refresh
//! - `period_open`: value at the start of the current wall-clock hour,
//!   replaced only when a newer hour's open is fetched
//!
//! # Sharing
//!
//! [`ReferenceState`] is a single-writer/multi-reader cell. Each field holds an
//! immutable `Arc` that the writer replaces wholesale; readers clone the `Arc`s
//! and never observe a partially written value. Locks are held only for the
//! pointer swap or clone, so readers never wait on a network fetch.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::events::ReferenceEnrichment;

/// Length of one reference period in seconds.
pub const PERIOD_SECS: i64 = 3_600;

// =============================================================================
// Values
// =============================================================================

/// One observation of the real-time reference value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferencePrice {
    /// Observed value.
    pub value: Decimal,
    /// Wall-clock time the value was observed.
    pub observed_at: DateTime<Utc>,
}

/// Opening value of one hourly period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodOpen {
    /// Opening value.
    pub value: Decimal,
    /// Start of the period (always on an hour boundary).
    pub period_start: DateTime<Utc>,
}

/// Resolution of a period: did the reference finish at or above its open?
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    /// `current >= period_open`
    Up,
    /// `current < period_open`
    Down,
}

impl Direction {
    /// Apply the resolution rule.
    #[must_use]
    pub fn resolve(current: Decimal, period_open: Decimal) -> Self {
        if current >= period_open {
            Self::Up
        } else {
            Self::Down
        }
    }
}

/// Why a snapshot could not be given a fresh reference pair.
///
/// Recoverable: the snapshot is still written with whatever is known.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnrichmentUnavailable {
    /// No real-time value has been observed yet.
    #[error("no reference price observed yet")]
    NoCurrent,
    /// No period open has been fetched yet.
    #[error("no period open fetched yet")]
    NoPeriodOpen,
    /// The real-time value is older than the freshness bound.
    #[error("reference price is stale ({age_ms} ms old)")]
    StaleCurrent {
        /// Age of the value in milliseconds.
        age_ms: i64,
    },
    /// The known open belongs to an earlier period than `now`.
    #[error("period open is for {period_start}, not the running period")]
    StalePeriodOpen {
        /// Start of the period the known open belongs to.
        period_start: DateTime<Utc>,
    },
}

impl EnrichmentUnavailable {
    /// Whether a value exists but can no longer be trusted.
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        matches!(self, Self::StaleCurrent { .. } | Self::StalePeriodOpen { .. })
    }
}

// =============================================================================
// Period Arithmetic
// =============================================================================

/// Start of the hourly period containing `at`.
#[must_use]
pub fn period_start(at: DateTime<Utc>) -> DateTime<Utc> {
    let secs = at.timestamp();
    let floored = secs - secs.rem_euclid(PERIOD_SECS);
    DateTime::from_timestamp(floored, 0).unwrap_or(at)
}

/// Start of the period after the one containing `at`.
#[must_use]
pub fn next_period_start(at: DateTime<Utc>) -> DateTime<Utc> {
    period_start(at) + TimeDelta::seconds(PERIOD_SECS)
}

// =============================================================================
// Snapshot
// =============================================================================

/// Point-in-time view of both reference fields.
#[derive(Debug, Clone, Default)]
pub struct ReferenceSnapshot {
    /// Latest real-time value.
    pub current: Option<Arc<ReferencePrice>>,
    /// Open of the latest fetched period.
    pub period_open: Option<Arc<PeriodOpen>>,
}

impl ReferenceSnapshot {
    /// Direction of the running period, if both values are known.
    #[must_use]
    pub fn direction(&self) -> Option<Direction> {
        match (&self.current, &self.period_open) {
            (Some(c), Some(o)) => Some(Direction::resolve(c.value, o.value)),
            _ => None,
        }
    }

    /// Check that both values exist, `current` is within `max_age` of `now`,
    /// and `period_open` belongs to the period containing `now`.
    ///
    /// # Errors
    ///
    /// Returns the first reason the pair is not fresh.
    pub fn freshness(
        &self,
        now: DateTime<Utc>,
        max_age: Duration,
    ) -> Result<(), EnrichmentUnavailable> {
        let current = self
            .current
            .as_ref()
            .ok_or(EnrichmentUnavailable::NoCurrent)?;
        let open = self
            .period_open
            .as_ref()
            .ok_or(EnrichmentUnavailable::NoPeriodOpen)?;
        let age = now - current.observed_at;
        let max_age = TimeDelta::from_std(max_age).unwrap_or(TimeDelta::MAX);
        if age > max_age {
            return Err(EnrichmentUnavailable::StaleCurrent {
                age_ms: age.num_milliseconds(),
            });
        }
        if open.period_start != period_start(now) {
            return Err(EnrichmentUnavailable::StalePeriodOpen {
                period_start: open.period_start,
            });
        }
        Ok(())
    }

    /// Build the snapshot enrichment block with last-known values.
    #[must_use]
    pub fn enrichment(&self, now: DateTime<Utc>, max_age: Duration) -> ReferenceEnrichment {
        ReferenceEnrichment {
            reference_current: self.current.as_ref().map(|c| c.value),
            reference_period_open: self.period_open.as_ref().map(|o| o.value),
            reference_stale: self
                .freshness(now, max_age)
                .is_err_and(|reason| reason.is_stale()),
        }
    }
}

// =============================================================================
// Shared Cell
// =============================================================================

#[derive(Debug, Default)]
struct Cells {
    current: RwLock<Option<Arc<ReferencePrice>>>,
    period_open: RwLock<Option<Arc<PeriodOpen>>>,
}

/// Shared reference state; cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct ReferenceState {
    cells: Arc<Cells>,
}

impl ReferenceState {
    /// Create an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read both fields.
    #[must_use]
    pub fn snapshot(&self) -> ReferenceSnapshot {
        ReferenceSnapshot {
            current: self.cells.current.read().clone(),
            period_open: self.cells.period_open.read().clone(),
        }
    }

    /// Replace `current` (last write wins).
    pub fn publish_current(&self, price: ReferencePrice) {
        *self.cells.current.write() = Some(Arc::new(price));
    }

    /// Replace `period_open` if `open` belongs to a later period.
    ///
    /// Returns `true` when the value was replaced.
    pub fn publish_period_open(&self, open: PeriodOpen) -> bool {
        let mut slot = self.cells.period_open.write();
        if slot
            .as_ref()
            .is_some_and(|existing| existing.period_start >= open.period_start)
        {
            return false;
        }
        *slot = Some(Arc::new(open));
        true
    }
}
