//! Domain Layer - Core recorder types and business rules.
//!
//! This layer contains the stream event model, the reference price state
//! and the subscription target types. Nothing here performs I/O.

/// Market channel events (snapshots, price changes, tick sizes, trades).
pub mod events;

/// Reference price state, hourly periods and the direction rule.
pub mod reference;

/// Subscription targets (asset identifiers).
pub mod subscription;
