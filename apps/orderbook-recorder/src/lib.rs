#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::default_trait_access
    )
)]

//! Order-Book Recorder - Market Channel Capture
//!
//! Maintains one WebSocket session to an order-book venue's public market
//! channel and appends every event to per-type JSON line logs. Book
//! snapshots are enriched with an external reference price and the open of
//! the current hourly period.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Event model and reference price rules
//!   - `events`: Snapshot, price change, tick size change and trade records
//!   - `reference`: Hourly periods, direction rule and the shared swap cell
//!   - `subscription`: Asset identifiers
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Reference price source and clock interfaces
//!   - `services`: Reference price synchronizer and retry policy
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `venue`: Market channel session, keep-alive and dispatcher
//!   - `reference`: Reference price REST adapter
//!   - `storage`: Log writer and report readers
//!   - `config`, `health`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//! Market channel WS ──► Session ──► Dispatcher ──► LogSink ──► EventLogWriter ──► *.json
//!                                      ▲
//! Reference REST ──► Synchronizer ──► ReferenceState
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Event model and reference price rules, no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

/// Process wiring and orderly shutdown.
pub mod recorder;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::events::{EventKind, StreamEvent};
pub use domain::reference::{Direction, ReferenceSnapshot, ReferenceState};
pub use domain::subscription::{AssetId, AssetSet};

// Ports
pub use application::ports::{Clock, ReferencePricePort, ReferenceSourceError, SystemClock};

// Infrastructure config
pub use infrastructure::config::{ConfigError, PresetTable, RecorderConfig};

// Reference sources
pub use infrastructure::reference::{BinanceReferenceSource, MockReferenceSource};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};

// Recorder
pub use recorder::{RecorderError, RecorderSummary};
