use serde::{Deserialize, Serialize};

/// A single price level of an order book.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    pub amount: f64,
}

/// Snapshot of an order book.
///
/// Bids are ordered best (highest) first, asks best (lowest) first, as the
/// venues return them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBook {
    /// Unified symbol the book belongs to.
    pub symbol: String,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    /// Venue timestamp in epoch milliseconds, when the venue supplies one.
    pub timestamp: Option<i64>,
}

impl OrderBook {
    /// Highest bid price, if the bid side is not empty.
    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().map(|level| level.price)
    }

    /// Lowest ask price, if the ask side is not empty.
    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|level| level.price)
    }
}
