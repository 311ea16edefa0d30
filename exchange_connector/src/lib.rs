//! Unified access to public market data on cryptocurrency exchanges.
//!
//! Every venue is exposed through the [`Exchange`](providers::Exchange) trait,
//! which covers the three capabilities the rest of the workspace needs:
//! loading market metadata, fetching an order book and fetching OHLCV candles.
//! [`providers::build_exchange`] constructs a connector from its lowercase id.

pub mod models;
pub mod providers;

pub use models::{
    candle::Candle,
    market::{Market, Markets},
    order_book::{OrderBook, PriceLevel},
    timeframe::{Timeframe, TimeframeError, TimeframeUnit},
};
pub use providers::{ConnectorError, ConnectorInitError, Exchange, build_exchange, exchanges};
