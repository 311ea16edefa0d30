//! Exchange abstraction for public market data.
//!
//! This module defines the [`Exchange`] trait, the unified interface every
//! venue connector implements (Binance, Bybit, Coinbase, ...), together with
//! the error taxonomy connectors report and a small catalog that builds a
//! connector from its lowercase id.
//!
//! The trait is designed for async usage and supports dynamic dispatch
//! (`dyn Exchange`) so callers can pick venues at runtime.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use exchange_connector::{Candle, ConnectorError, Exchange, Markets, OrderBook, Timeframe};
//!
//! struct Offline;
//!
//! #[async_trait]
//! impl Exchange for Offline {
//!     fn id(&self) -> &str {
//!         "offline"
//!     }
//!
//!     async fn load_markets(&self) -> Result<Markets, ConnectorError> {
//!         Ok(Markets::new())
//!     }
//!
//!     async fn fetch_order_book(
//!         &self,
//!         symbol: &str,
//!         _limit: Option<u32>,
//!     ) -> Result<OrderBook, ConnectorError> {
//!         Ok(OrderBook { symbol: symbol.into(), bids: vec![], asks: vec![], timestamp: None })
//!     }
//!
//!     async fn fetch_ohlcv(
//!         &self,
//!         _symbol: &str,
//!         _timeframe: Timeframe,
//!         _since: Option<i64>,
//!         _limit: Option<u32>,
//!     ) -> Result<Vec<Candle>, ConnectorError> {
//!         Ok(vec![])
//!     }
//! }
//! ```

pub mod binance;
pub mod bybit;
pub mod coinbase;
mod http;

use async_trait::async_trait;
use snafu::{Backtrace, Snafu};

use crate::models::{candle::Candle, market::Markets, order_book::OrderBook, timeframe::Timeframe};

/// Trait for fetching public market data from one exchange.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Unique lowercase id of the venue (e.g. `"binance"`).
    fn id(&self) -> &str;

    /// Fetches the venue's market listing, keyed by unified symbol.
    async fn load_markets(&self) -> Result<Markets, ConnectorError>;

    /// Fetches an order book snapshot for a unified symbol.
    ///
    /// `limit` caps the number of levels per side; venues may round it to a
    /// depth they support.
    async fn fetch_order_book(
        &self,
        symbol: &str,
        limit: Option<u32>,
    ) -> Result<OrderBook, ConnectorError>;

    /// Fetches OHLCV candles for a unified symbol, oldest first.
    ///
    /// # Arguments
    ///
    /// * `symbol` - Unified `BASE/QUOTE` symbol.
    /// * `timeframe` - Bucket size; unsupported values yield [`ConnectorError::NotSupported`].
    /// * `since` - Earliest bucket open time in epoch milliseconds, venue default when `None`.
    /// * `limit` - Maximum number of candles, venue default when `None`.
    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<Candle>, ConnectorError>;
}

/// Errors that can occur during the creation of a connector.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConnectorInitError {
    /// The id does not name a connector in the catalog.
    #[snafu(display("Unknown exchange id: {id}"))]
    UnknownExchange { id: String, backtrace: Backtrace },

    /// failed to init reqwest client
    #[snafu(display("Failed to build HTTP client: {source}"))]
    ClientBuild {
        source: reqwest::Error,
        backtrace: Backtrace,
    },
}

/// Errors that can occur within an [`Exchange`] implementation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConnectorError {
    /// The venue does not offer this operation or parameter (e.g. a timeframe).
    #[snafu(display("{exchange} does not support {operation}"))]
    NotSupported {
        exchange: String,
        operation: String,
        backtrace: Backtrace,
    },

    /// The venue refused the request for lack of (valid) credentials.
    #[snafu(display("{exchange} authentication failed: {message}"))]
    Authentication {
        exchange: String,
        message: String,
        backtrace: Backtrace,
    },

    /// The venue's API returned an error for this request.
    #[snafu(display("{exchange} API error: {message}"))]
    Exchange {
        exchange: String,
        message: String,
        backtrace: Backtrace,
    },

    /// The symbol is malformed or not listed on the venue.
    #[snafu(display("{exchange} does not list symbol {symbol}"))]
    BadSymbol {
        exchange: String,
        symbol: String,
        backtrace: Backtrace,
    },

    /// An error during an API request (e.g., network failure, timeout).
    #[snafu(display("API request failed: {source}"))]
    Request {
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    /// The response did not have the expected shape.
    #[snafu(display("Unexpected response from {exchange}: {message}"))]
    Decode {
        exchange: String,
        message: String,
        backtrace: Backtrace,
    },
}

impl ConnectorError {
    /// `true` when the venue itself turned the request down (unsupported,
    /// unauthenticated, API error or unknown symbol), as opposed to transport
    /// or decoding trouble.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ConnectorError::NotSupported { .. }
                | ConnectorError::Authentication { .. }
                | ConnectorError::Exchange { .. }
                | ConnectorError::BadSymbol { .. }
        )
    }
}

/// Ids of every connector [`build_exchange`] can construct.
const EXCHANGES: &[&str] = &[binance::ID, bybit::ID, coinbase::ID];

/// Lists the ids of all known exchanges, in catalog order.
pub fn exchanges() -> &'static [&'static str] {
    EXCHANGES
}

/// Build and return a boxed connector for the supplied exchange id.
pub fn build_exchange(id: &str) -> Result<Box<dyn Exchange>, ConnectorInitError> {
    match id {
        binance::ID => Ok(Box::new(binance::BinanceExchange::new()?)),
        bybit::ID => Ok(Box::new(bybit::BybitExchange::new()?)),
        coinbase::ID => Ok(Box::new(coinbase::CoinbaseExchange::new()?)),
        _ => UnknownExchangeSnafu { id }.fail(),
    }
}
