//! Bybit spot connector (`https://api.bybit.com`, REST v5).
//!
//! Every v5 response is wrapped in a `{retCode, retMsg, result}` envelope;
//! a non-zero `retCode` is reported as [`ConnectorError::Exchange`].

use async_trait::async_trait;
use governor::Quota;
use nonzero_ext::nonzero;
use serde::{Deserialize, de::DeserializeOwned};
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
        BadSymbolSnafu, ConnectorError, ConnectorInitError, DecodeSnafu, Exchange, ExchangeSnafu,
        NotSupportedSnafu,
        http::{RestClient, candle_row, parse_levels},
    },
};

/// Catalog id of the Bybit connector.
pub const ID: &str = "bybit";

const BASE_URL: &str = "https://api.bybit.com";

#[derive(Deserialize, Debug)]
struct Envelope {
    #[serde(rename = "retCode")]
    ret_code: i64,
    #[serde(rename = "retMsg")]
    ret_msg: String,
    #[serde(default)]
    result: Value,
}

#[derive(Deserialize, Debug)]
struct InstrumentList {
    list: Vec<Instrument>,
}

#[derive(Deserialize, Debug)]
struct Instrument {
    symbol: String,
    #[serde(rename = "baseCoin")]
    base_coin: String,
    #[serde(rename = "quoteCoin")]
    quote_coin: String,
    status: String,
}

#[derive(Deserialize, Debug)]
struct Book {
    #[serde(rename = "b")]
    bids: Vec<Vec<Value>>,
    #[serde(rename = "a")]
    asks: Vec<Vec<Value>>,
    ts: Option<i64>,
}

#[derive(Deserialize, Debug)]
struct KlineList {
    /// Newest first: `[start_ms, open, high, low, close, volume, turnover]`.
    list: Vec<Vec<Value>>,
}

pub struct BybitExchange {
    http: RestClient,
}

impl BybitExchange {
    pub fn new() -> Result<Self, ConnectorInitError> {
        Self::with_base_url(BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, ConnectorInitError> {
        let quota = Quota::per_second(nonzero!(10u32));
        Ok(Self {
            http: RestClient::new(ID, base_url, quota)?,
        })
    }

    async fn get_result<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ConnectorError> {
        let envelope: Envelope = self.http.get_json(path, query).await?;
        unwrap_envelope(envelope)
    }
}

fn unwrap_envelope<T: DeserializeOwned>(envelope: Envelope) -> Result<T, ConnectorError> {
    if envelope.ret_code != 0 {
        return ExchangeSnafu {
            exchange: ID,
            message: format!("retCode {}: {}", envelope.ret_code, envelope.ret_msg),
        }
        .fail();
    }
    serde_json::from_value(envelope.result).map_err(|e| {
        DecodeSnafu {
            exchange: ID,
            message: e.to_string(),
        }
        .build()
    })
}

fn market_id(symbol: &str) -> Result<String, ConnectorError> {
    let (base, quote) = split_symbol(symbol).ok_or_else(|| {
        BadSymbolSnafu {
            exchange: ID,
            symbol,
        }
        .build()
    })?;
    Ok(format!("{base}{quote}"))
}

fn interval(timeframe: Timeframe) -> Result<String, ConnectorError> {
    let amount = timeframe.amount();
    let interval = match timeframe.unit() {
        TimeframeUnit::Minute if matches!(amount, 1 | 3 | 5 | 15 | 30) => amount.to_string(),
        TimeframeUnit::Hour if matches!(amount, 1 | 2 | 4 | 6 | 12) => (amount * 60).to_string(),
        TimeframeUnit::Day if amount == 1 => "D".to_string(),
        TimeframeUnit::Week if amount == 1 => "W".to_string(),
        TimeframeUnit::Month if amount == 1 => "M".to_string(),
        _ => {
            return NotSupportedSnafu {
                exchange: ID,
                operation: format!("fetch_ohlcv with timeframe {timeframe}"),
            }
            .fail();
        }
    };
    Ok(interval)
}

fn parse_markets(instruments: InstrumentList) -> Markets {
    instruments
        .list
        .into_iter()
        .map(|i| {
            let market = Market::new(i.symbol, &i.base_coin, &i.quote_coin, i.status == "Trading");
            (market.symbol.clone(), market)
        })
        .collect()
}

fn parse_klines(klines: KlineList) -> Result<Vec<Candle>, ConnectorError> {
    let mut candles = klines
        .list
        .into_iter()
        .map(|row| match candle_row(&row) {
            Some((timestamp, [open, high, low, close, volume])) => Ok(Candle {
                timestamp,
                open,
                high,
                low,
                close,
                volume,
            }),
            None => DecodeSnafu {
                exchange: ID,
                message: format!("malformed kline {row:?}"),
            }
            .fail(),
        })
        .collect::<Result<Vec<_>, _>>()?;
    candles.sort_by_key(|c| c.timestamp);
    Ok(candles)
}

#[async_trait]
impl Exchange for BybitExchange {
    fn id(&self) -> &str {
        ID
    }

    async fn load_markets(&self) -> Result<Markets, ConnectorError> {
        let instruments: InstrumentList = self
            .get_result("/v5/market/instruments-info", &[("category", "spot".into())])
            .await?;
        let markets = parse_markets(instruments);
        info!("Bybit: loaded {} markets", markets.len());
        Ok(markets)
    }

    async fn fetch_order_book(
        &self,
        symbol: &str,
        limit: Option<u32>,
    ) -> Result<OrderBook, ConnectorError> {
        let mut query = vec![("category", "spot".to_string()), ("symbol", market_id(symbol)?)];
        if let Some(limit) = limit {
            // spot depth is capped at 200 levels
            query.push(("limit", limit.clamp(1, 200).to_string()));
        }

        let book: Book = self.get_result("/v5/market/orderbook", &query).await?;
        Ok(OrderBook {
            symbol: symbol.to_string(),
            bids: parse_levels(ID, &book.bids)?,
            asks: parse_levels(ID, &book.asks)?,
            timestamp: book.ts,
        })
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<Candle>, ConnectorError> {
        let mut query = vec![
            ("category", "spot".to_string()),
            ("symbol", market_id(symbol)?),
            ("interval", interval(timeframe)?),
        ];
        if let Some(since) = since {
            query.push(("start", since.to_string()));
        }
        if let Some(limit) = limit {
            query.push(("limit", limit.clamp(1, 1000).to_string()));
        }

        let klines: KlineList = self.get_result("/v5/market/kline", &query).await?;
        let candles = parse_klines(klines)?;
        debug!("Bybit: fetched {} candles for {}", candles.len(), symbol);
        Ok(candles)
    }
}
