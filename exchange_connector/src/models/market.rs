use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Market metadata keyed by unified symbol (`BASE/QUOTE`), in venue order.
pub type Markets = IndexMap<String, Market>;

/// One tradable pair as listed by a venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    /// Venue-native market id (e.g. `BTCUSDT`, `BTC-USD`).
    pub id: String,
    /// Unified symbol, `BASE/QUOTE`.
    pub symbol: String,
    pub base: String,
    pub quote: String,
    /// Whether the venue currently reports the pair as trading.
    pub active: bool,
}

impl Market {
    pub fn new(id: impl Into<String>, base: &str, quote: &str, active: bool) -> Self {
        Self {
            id: id.into(),
            symbol: format!("{base}/{quote}"),
            base: base.to_string(),
            quote: quote.to_string(),
            active,
        }
    }
}

/// Splits a unified `BASE/QUOTE` symbol, `None` when it has no single slash.
pub fn split_symbol(symbol: &str) -> Option<(&str, &str)> {
    let (base, quote) = symbol.split_once('/')?;
    if base.is_empty() || quote.is_empty() || quote.contains('/') {
        return None;
    }
    Some((base, quote))
}
