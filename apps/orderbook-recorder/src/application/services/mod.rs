//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `ReferencePriceSynchronizer`: keeps the reference price state fresh
//! - `RetryPolicy`: bounded exponential backoff used for reference fetches

mod reference_sync;
mod retry;

pub use reference_sync::{ReferencePriceSynchronizer, SynchronizerConfig};
pub use retry::{RetryConfig, RetryPolicy};
