//! Reference Price Adapters
//!
//! Implementations of [`ReferencePricePort`](crate::application::ports::ReferencePricePort).

mod binance;
mod mock;

pub use binance::BinanceReferenceSource;
pub use mock::MockReferenceSource;
