//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the reference price synchronizer and the port
//! interfaces it uses to reach the reference source and the clock.

/// Port interfaces for external systems (reference source, clock).
pub mod ports;

/// Application services (reference price synchronization, retry policy).
pub mod services;
