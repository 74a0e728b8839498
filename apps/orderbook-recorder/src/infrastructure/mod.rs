//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus the process-level plumbing.

/// Configuration loading and asset presets.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Reference price sources (REST adapter and in-memory mock).
pub mod reference;

/// Append-only event logs and their readers.
pub mod storage;

/// Logging and OpenTelemetry tracing integration.
pub mod telemetry;

/// Venue market channel client.
pub mod venue;
