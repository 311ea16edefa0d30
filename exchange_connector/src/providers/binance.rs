//! Binance spot connector (`https://api.binance.com`, REST v3).

mod provider;
mod response;

pub use provider::BinanceExchange;

/// Catalog id of the Binance connector.
pub const ID: &str = "binance";
