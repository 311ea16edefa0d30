//! Top-of-book quotes.

use exchange_connector::{ConnectorError, OrderBook};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::instrument;

use crate::registry::ExchangeHandle;

/// Best bid and ask of one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BestPrice {
    /// Highest bid, `None` when the bid side is empty.
    pub bid: Option<f64>,
    /// Lowest ask, `None` when the ask side is empty.
    pub ask: Option<f64>,
    /// `ask - bid`, present only when both sides are.
    pub spread: Option<f64>,
}

impl BestPrice {
    /// Reads the first level of each side.
    pub fn from_order_book(book: &OrderBook) -> Self {
        let bid = book.best_bid();
        let ask = book.best_ask();
        Self {
            bid,
            ask,
            spread: bid.zip(ask).map(|(bid, ask)| ask - bid),
        }
    }
}

/// Fetches the order book of each symbol and returns its best prices.
///
/// Stops at the first connector error and returns it.
#[instrument(skip_all, fields(exchange = exchange.id(), symbols = symbols.len()))]
pub async fn get_current_best_price<S: AsRef<str>>(
    exchange: &ExchangeHandle,
    symbols: &[S],
) -> Result<IndexMap<String, BestPrice>, ConnectorError> {
    let mut prices = IndexMap::with_capacity(symbols.len());
    for symbol in symbols {
        let symbol = symbol.as_ref();
        let book = exchange.connector().fetch_order_book(symbol, None).await?;
        prices.insert(symbol.to_string(), BestPrice::from_order_book(&book));
    }
    Ok(prices)
}
