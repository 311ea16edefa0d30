//! Coinbase Exchange connector (`https://api.exchange.coinbase.com`).
//!
//! Candles are only offered at six fixed granularities (1m, 5m, 15m, 1h, 6h,
//! 1d); anything else is reported as not supported.

use async_trait::async_trait;
use chrono::DateTime;
use governor::Quota;
use nonzero_ext::nonzero;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::{
    models::{
        candle::Candle,
        market::{Market, Markets, split_symbol},
        order_book::OrderBook,
        timeframe::{Timeframe, TimeframeUnit},
    },
    providers::{
        BadSymbolSnafu, ConnectorError, ConnectorInitError, DecodeSnafu, Exchange,
        NotSupportedSnafu,
        http::{RestClient, candle_row, parse_levels},
    },
};

/// Catalog id of the Coinbase connector.
pub const ID: &str = "coinbase";

const BASE_URL: &str = "https://api.exchange.coinbase.com";

/// Maximum number of candles a single request may span.
const MAX_CANDLES: i64 = 300;

#[derive(Deserialize, Debug)]
struct Product {
    id: String,
    base_currency: String,
    quote_currency: String,
    status: String,
    #[serde(default)]
    trading_disabled: bool,
}

#[derive(Deserialize, Debug)]
struct Book {
    bids: Vec<Vec<Value>>,
    asks: Vec<Vec<Value>>,
    time: Option<String>,
}

pub struct CoinbaseExchange {
    http: RestClient,
}

impl CoinbaseExchange {
    pub fn new() -> Result<Self, ConnectorInitError> {
        Self::with_base_url(BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, ConnectorInitError> {
        // public endpoints allow 10 requests per second per IP
        let quota = Quota::per_second(nonzero!(8u32));
        Ok(Self {
            http: RestClient::new(ID, base_url, quota)?,
        })
    }
}

/// Coinbase product ids join base and quote with a dash (`BTC-USD`).
fn product_id(symbol: &str) -> Result<String, ConnectorError> {
    let (base, quote) = split_symbol(symbol).ok_or_else(|| {
        BadSymbolSnafu {
            exchange: ID,
            symbol,
        }
        .build()
    })?;
    Ok(format!("{base}-{quote}"))
}

fn granularity(timeframe: Timeframe) -> Result<i64, ConnectorError> {
    let supported = match timeframe.unit() {
        TimeframeUnit::Minute => matches!(timeframe.amount(), 1 | 5 | 15),
        TimeframeUnit::Hour => matches!(timeframe.amount(), 1 | 6),
        TimeframeUnit::Day => timeframe.amount() == 1,
        TimeframeUnit::Week | TimeframeUnit::Month => false,
    };
    match timeframe.seconds() {
        Some(seconds) if supported => Ok(seconds),
        _ => NotSupportedSnafu {
            exchange: ID,
            operation: format!("fetch_ohlcv with timeframe {timeframe}"),
        }
        .fail(),
    }
}

fn parse_markets(products: Vec<Product>) -> Markets {
    products
        .into_iter()
        .map(|p| {
            let active = p.status == "online" && !p.trading_disabled;
            let market = Market::new(p.id, &p.base_currency, &p.quote_currency, active);
            (market.symbol.clone(), market)
        })
        .collect()
}

/// Rows are `[time_s, low, high, open, close, volume]`, newest first.
fn parse_candles(rows: Vec<Vec<Value>>) -> Result<Vec<Candle>, ConnectorError> {
    let mut candles = rows
        .into_iter()
        .map(|row| {
            let parsed = candle_row(&row).and_then(|(time, fields)| {
                Some((time.checked_mul(1000)?, fields))
            });
            match parsed {
                Some((timestamp, [low, high, open, close, volume])) => Ok(Candle {
                    timestamp,
                    open,
                    high,
                    low,
                    close,
                    volume,
                }),
                None => DecodeSnafu {
                    exchange: ID,
                    message: format!("malformed candle {row:?}"),
                }
                .fail(),
            }
        })
        .collect::<Result<Vec<_>, _>>()?;
    candles.sort_by_key(|c| c.timestamp);
    Ok(candles)
}

fn rfc3339_from_millis(ms: i64) -> Result<String, ConnectorError> {
    DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339())
        .ok_or_else(|| {
            NotSupportedSnafu {
                exchange: ID,
                operation: format!("fetch_ohlcv since {ms}"),
            }
            .build()
        })
}

#[async_trait]
impl Exchange for CoinbaseExchange {
    fn id(&self) -> &str {
        ID
    }

    async fn load_markets(&self) -> Result<Markets, ConnectorError> {
        let products: Vec<Product> = self.http.get_json("/products", &[]).await?;
        let markets = parse_markets(products);
        info!("Coinbase: loaded {} markets", markets.len());
        Ok(markets)
    }

    async fn fetch_order_book(
        &self,
        symbol: &str,
        limit: Option<u32>,
    ) -> Result<OrderBook, ConnectorError> {
        let path = format!("/products/{}/book", product_id(symbol)?);
        let book: Book = self.http.get_json(&path, &[("level", "2".into())]).await?;

        let mut bids = parse_levels(ID, &book.bids)?;
        let mut asks = parse_levels(ID, &book.asks)?;
        if let Some(limit) = limit {
            bids.truncate(limit as usize);
            asks.truncate(limit as usize);
        }

        let timestamp = book
            .time
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.timestamp_millis());

        Ok(OrderBook {
            symbol: symbol.to_string(),
            bids,
            asks,
            timestamp,
        })
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<Candle>, ConnectorError> {
        let seconds = granularity(timeframe)?;
        let path = format!("/products/{}/candles", product_id(symbol)?);

        let mut query = vec![("granularity", seconds.to_string())];
        if let Some(since) = since {
            let span = limit.map_or(MAX_CANDLES, |l| i64::from(l).min(MAX_CANDLES));
            query.push(("start", rfc3339_from_millis(since)?));
            query.push(("end", rfc3339_from_millis(since + span * seconds * 1000)?));
        }

        let rows: Vec<Vec<Value>> = self.http.get_json(&path, &query).await?;
        let mut candles = parse_candles(rows)?;
        if let Some(limit) = limit {
            // keep the most recent `limit` buckets
            let excess = candles.len().saturating_sub(limit as usize);
            candles.drain(..excess);
        }
        debug!("Coinbase: fetched {} candles for {}", candles.len(), symbol);
        Ok(candles)
    }
}
