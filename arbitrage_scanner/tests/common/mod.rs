#![allow(dead_code)]

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use arbitrage_scanner::registry::ExchangeFactory;
use async_trait::async_trait;
use exchange_connector::{
    Candle, ConnectorError, ConnectorInitError, Exchange, Market, Markets, OrderBook, PriceLevel,
    Timeframe,
    providers::{DecodeSnafu, ExchangeSnafu, NotSupportedSnafu, UnknownExchangeSnafu},
};
use indexmap::IndexMap;

#[derive(Debug, Clone, Copy)]
enum OhlcvMode {
    Ok,
    Reject,
    Fail,
}

/// In-memory exchange with call counters.
pub struct MockExchange {
    id: String,
    symbols: Vec<String>,
    candles: Vec<Candle>,
    book: Option<(Vec<f64>, Vec<f64>)>,
    fail_markets: bool,
    ohlcv: OhlcvMode,
    rejected_symbols: Vec<String>,
    pub market_calls: AtomicUsize,
    pub ohlcv_calls: AtomicUsize,
}

impl MockExchange {
    pub fn new(id: &str, symbols: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            candles: Vec::new(),
            book: None,
            fail_markets: false,
            ohlcv: OhlcvMode::Ok,
            rejected_symbols: Vec::new(),
            market_calls: AtomicUsize::new(0),
            ohlcv_calls: AtomicUsize::new(0),
        }
    }

    /// Rows of `[timestamp_ms, open, high, low, close, volume]`, returned for every symbol.
    pub fn with_candles(mut self, rows: &[[f64; 6]]) -> Self {
        self.candles = rows.iter().copied().map(Candle::from).collect();
        self
    }

    pub fn with_order_book(mut self, bids: &[f64], asks: &[f64]) -> Self {
        self.book = Some((bids.to_vec(), asks.to_vec()));
        self
    }

    pub fn failing_markets(mut self) -> Self {
        self.fail_markets = true;
        self
    }

    /// Every OHLCV request is refused as unsupported.
    pub fn rejecting_ohlcv(mut self) -> Self {
        self.ohlcv = OhlcvMode::Reject;
        self
    }

    /// Every OHLCV request fails with an unreadable payload.
    pub fn failing_ohlcv(mut self) -> Self {
        self.ohlcv = OhlcvMode::Fail;
        self
    }

    /// OHLCV requests for `symbol` get an API error.
    pub fn rejecting_symbol(mut self, symbol: &str) -> Self {
        self.rejected_symbols.push(symbol.to_string());
        self
    }

    pub fn ohlcv_calls(&self) -> usize {
        self.ohlcv_calls.load(Ordering::SeqCst)
    }

    pub fn market_calls(&self) -> usize {
        self.market_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Exchange for MockExchange {
    fn id(&self) -> &str {
        &self.id
    }

    async fn load_markets(&self) -> Result<Markets, ConnectorError> {
        self.market_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_markets {
            return DecodeSnafu {
                exchange: self.id.as_str(),
                message: "markets unavailable",
            }
            .fail();
        }
        Ok(self
            .symbols
            .iter()
            .map(|symbol| {
                let (base, quote) = symbol.split_once('/').unwrap_or((symbol.as_str(), ""));
                (symbol.clone(), Market::new(symbol.as_str(), base, quote, true))
            })
            .collect())
    }

    async fn fetch_order_book(
        &self,
        symbol: &str,
        _limit: Option<u32>,
    ) -> Result<OrderBook, ConnectorError> {
        let Some((bids, asks)) = &self.book else {
            return NotSupportedSnafu {
                exchange: self.id.as_str(),
                operation: "fetch_order_book",
            }
            .fail();
        };
        let levels = |prices: &[f64]| -> Vec<PriceLevel> {
            prices
                .iter()
                .map(|price| PriceLevel {
                    price: *price,
                    amount: 1.0,
                })
                .collect()
        };
        Ok(OrderBook {
            symbol: symbol.to_string(),
            bids: levels(bids),
            asks: levels(asks),
            timestamp: None,
        })
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        _since: Option<i64>,
        _limit: Option<u32>,
    ) -> Result<Vec<Candle>, ConnectorError> {
        self.ohlcv_calls.fetch_add(1, Ordering::SeqCst);
        if self.rejected_symbols.iter().any(|s| s == symbol) {
            return ExchangeSnafu {
                exchange: self.id.as_str(),
                message: format!("invalid symbol {symbol}"),
            }
            .fail();
        }
        match self.ohlcv {
            OhlcvMode::Ok => Ok(self.candles.clone()),
            OhlcvMode::Reject => NotSupportedSnafu {
                exchange: self.id.as_str(),
                operation: format!("fetch_ohlcv with timeframe {timeframe}"),
            }
            .fail(),
            OhlcvMode::Fail => DecodeSnafu {
                exchange: self.id.as_str(),
                message: "truncated body",
            }
            .fail(),
        }
    }
}

/// Factory handing out shared mock exchanges by id.
#[derive(Default, Clone)]
pub struct MockFactory {
    exchanges: IndexMap<String, Arc<MockExchange>>,
}

impl MockFactory {
    pub fn new(exchanges: impl IntoIterator<Item = MockExchange>) -> Self {
        Self {
            exchanges: exchanges
                .into_iter()
                .map(|e| (e.id.clone(), Arc::new(e)))
                .collect(),
        }
    }

    pub fn exchange(&self, id: &str) -> Arc<MockExchange> {
        Arc::clone(&self.exchanges[id])
    }
}

impl ExchangeFactory for MockFactory {
    fn known_ids(&self) -> Vec<String> {
        self.exchanges.keys().cloned().collect()
    }

    fn create(&self, id: &str) -> Result<Arc<dyn Exchange>, ConnectorInitError> {
        match self.exchanges.get(id) {
            Some(exchange) => Ok(Arc::clone(exchange) as Arc<dyn Exchange>),
            None => UnknownExchangeSnafu { id }.fail(),
        }
    }
}

pub const TWO_DAILY_CANDLES: [[f64; 6]; 2] = [
    [0.0, 100.0, 110.0, 90.0, 105.0, 10.0],
    [86_400_000.0, 105.0, 115.0, 95.0, 110.0, 12.0],
];
