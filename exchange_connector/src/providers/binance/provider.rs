use async_trait::async_trait;
use governor::Quota;
use nonzero_ext::nonzero;
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
        binance::{
            ID,
            response::{Depth, ExchangeInfo, Kline},
        },
        http::{RestClient, candle_row, parse_levels},
    },
};

const BASE_URL: &str = "https://api.binance.com";

pub struct BinanceExchange {
    http: RestClient,
}

impl BinanceExchange {
    /// Creates a connector against the public Binance spot API.
    pub fn new() -> Result<Self, ConnectorInitError> {
        Self::with_base_url(BASE_URL)
    }

    /// Creates a connector against another Binance-compatible host (e.g. the testnet).
    pub fn with_base_url(base_url: &str) -> Result<Self, ConnectorInitError> {
        // Binance allows 6000 request weight per minute; klines and depth cost 2-5.
        let quota = Quota::per_second(nonzero!(10u32));
        Ok(Self {
            http: RestClient::new(ID, base_url, quota)?,
        })
    }
}

/// Binance market ids are the base and quote concatenated (`BTCUSDT`).
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
    let supported = match timeframe.unit() {
        TimeframeUnit::Minute => matches!(timeframe.amount(), 1 | 3 | 5 | 15 | 30),
        TimeframeUnit::Hour => matches!(timeframe.amount(), 1 | 2 | 4 | 6 | 8 | 12),
        TimeframeUnit::Day => matches!(timeframe.amount(), 1 | 3),
        TimeframeUnit::Week | TimeframeUnit::Month => timeframe.amount() == 1,
    };
    if !supported {
        return NotSupportedSnafu {
            exchange: ID,
            operation: format!("fetch_ohlcv with timeframe {timeframe}"),
        }
        .fail();
    }
    // Binance intervals use the same spelling as `Timeframe`'s display form.
    Ok(timeframe.to_string())
}

pub(super) fn parse_markets(info: ExchangeInfo) -> Markets {
    info.symbols
        .into_iter()
        .map(|s| {
            let active = s.status == "TRADING";
            let market = Market::new(s.symbol, &s.base_asset, &s.quote_asset, active);
            (market.symbol.clone(), market)
        })
        .collect()
}

pub(super) fn parse_klines(klines: Vec<Kline>) -> Result<Vec<Candle>, ConnectorError> {
    klines
        .into_iter()
        .map(|k| match candle_row(&k) {
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
                message: format!("malformed kline {k:?}"),
            }
            .fail(),
        })
        .collect()
}

#[async_trait]
impl Exchange for BinanceExchange {
    fn id(&self) -> &str {
        ID
    }

    async fn load_markets(&self) -> Result<Markets, ConnectorError> {
        let info: ExchangeInfo = self.http.get_json("/api/v3/exchangeInfo", &[]).await?;
        let markets = parse_markets(info);
        info!("Binance: loaded {} markets", markets.len());
        Ok(markets)
    }

    async fn fetch_order_book(
        &self,
        symbol: &str,
        limit: Option<u32>,
    ) -> Result<OrderBook, ConnectorError> {
        let mut query = vec![("symbol", market_id(symbol)?)];
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }

        let depth: Depth = self.http.get_json("/api/v3/depth", &query).await?;
        Ok(OrderBook {
            symbol: symbol.to_string(),
            bids: parse_levels(ID, &depth.bids)?,
            asks: parse_levels(ID, &depth.asks)?,
            timestamp: None,
        })
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<Candle>, ConnectorError> {
        let mut query = vec![("symbol", market_id(symbol)?), ("interval", interval(timeframe)?)];
        if let Some(since) = since {
            query.push(("startTime", since.to_string()));
        }
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }

        let klines: Vec<Kline> = self.http.get_json("/api/v3/klines", &query).await?;
        let candles = parse_klines(klines)?;
        debug!("Binance: fetched {} candles for {}", candles.len(), symbol);
        Ok(candles)
    }
}
