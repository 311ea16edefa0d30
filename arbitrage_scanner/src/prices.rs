//! Closing-price download for many symbols across many exchanges.

use exchange_connector::ConnectorError;
use indexmap::IndexMap;
use tracing::{debug, instrument, warn};

use crate::{
    cache::{CacheStatus, SeriesCache},
    config::FetchConfig,
    registry::{ExchangeHandle, ExchangeRef, ExchangeRegistry},
    series::PriceSeries,
    table::Table,
};

/// Result of fetching one symbol on one exchange.
#[derive(Debug)]
pub enum SeriesOutcome {
    /// Served from the cache file.
    Cached(PriceSeries),
    /// Downloaded from the exchange and written to the cache.
    Downloaded(PriceSeries),
    /// The exchange turned the request down (unsupported timeframe, unknown
    /// symbol, missing credentials, API error).
    Rejected(ConnectorError),
    /// The request failed in transport or returned an unreadable payload.
    Failed(ConnectorError),
}

impl SeriesOutcome {
    /// The series, when one was obtained.
    pub fn series(&self) -> Option<&PriceSeries> {
        match self {
            SeriesOutcome::Cached(series) | SeriesOutcome::Downloaded(series) => Some(series),
            SeriesOutcome::Rejected(_) | SeriesOutcome::Failed(_) => None,
        }
    }

    /// Consumes the outcome, keeping the series if there is one.
    pub fn into_series(self) -> Option<PriceSeries> {
        match self {
            SeriesOutcome::Cached(series) | SeriesOutcome::Downloaded(series) => Some(series),
            SeriesOutcome::Rejected(_) | SeriesOutcome::Failed(_) => None,
        }
    }

    /// Summary used in [`PriceData::statuses`].
    pub fn status(&self) -> SymbolStatus {
        match self {
            SeriesOutcome::Cached(_) => SymbolStatus::Cached,
            SeriesOutcome::Downloaded(series) if series.is_empty() => SymbolStatus::Empty,
            SeriesOutcome::Downloaded(_) => SymbolStatus::Downloaded,
            SeriesOutcome::Rejected(e) => SymbolStatus::Rejected(e.to_string()),
            SeriesOutcome::Failed(e) => SymbolStatus::Failed(e.to_string()),
        }
    }
}

/// Per-symbol summary of how its column was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolStatus {
    /// Read from the cache.
    Cached,
    /// Downloaded with at least one candle.
    Downloaded,
    /// Downloaded, but the exchange returned no candles; the column is empty.
    Empty,
    /// Rejected by the exchange; no column.
    Rejected(String),
    /// Transport or decode failure; no column.
    Failed(String),
}

impl SymbolStatus {
    /// `true` when the table has a column for the symbol.
    pub fn has_column(&self) -> bool {
        matches!(
            self,
            SymbolStatus::Cached | SymbolStatus::Downloaded | SymbolStatus::Empty
        )
    }
}

/// Tables and per-symbol statuses returned by [`get_price_data`].
#[derive(Debug, Default, Clone)]
pub struct PriceData {
    /// One table per exchange id, columns named by symbol.
    pub tables: IndexMap<String, Table>,
    /// Outcome of every requested (exchange, symbol) pair.
    pub statuses: IndexMap<String, IndexMap<String, SymbolStatus>>,
}

impl PriceData {
    /// Table of one exchange.
    pub fn table(&self, exchange: &str) -> Option<&Table> {
        self.tables.get(exchange)
    }

    /// Status of one (exchange, symbol) pair.
    pub fn status(&self, exchange: &str, symbol: &str) -> Option<&SymbolStatus> {
        self.statuses.get(exchange)?.get(symbol)
    }
}

/// Loads one symbol's closing prices from the cache or the exchange.
pub async fn fetch_symbol_series(
    exchange: &ExchangeHandle,
    symbol: &str,
    cache: &SeriesCache,
    config: &FetchConfig,
) -> SeriesOutcome {
    let timeframe = config.timeframe.to_string();
    let result = cache
        .get_or_fetch(exchange.id(), symbol, &timeframe, || async move {
            let candles = exchange
                .connector()
                .fetch_ohlcv(symbol, config.timeframe, None, None)
                .await?;
            debug!("Downloaded {} candles of {symbol} from {}", candles.len(), exchange.id());
            Ok::<_, ConnectorError>(PriceSeries::from_candles(symbol, &candles))
        })
        .await;

    match result {
        Ok((series, CacheStatus::Hit)) => SeriesOutcome::Cached(series),
        Ok((series, CacheStatus::Miss)) => SeriesOutcome::Downloaded(series),
        Err(e) if e.is_rejection() => {
            warn!("{} rejected {symbol}: {e}", exchange.id());
            SeriesOutcome::Rejected(e)
        }
        Err(e) => {
            warn!("Failed to fetch {symbol} from {}: {e}", exchange.id());
            SeriesOutcome::Failed(e)
        }
    }
}

/// Loads the requested exchanges, then fetches closing prices of `symbols`
/// on every exchange in the registry and joins them into one [`Table`] per
/// exchange.
///
/// The result covers what [`ExchangeRegistry::get_exchanges`] returns: the
/// exchanges named here plus any loaded earlier. An empty `exchanges` slice
/// loads the whole catalog. Exchanges that fail to load are left out.
/// Symbols the exchange rejects or fails to serve have no column; their
/// reason is recorded in [`PriceData::statuses`]. Requests run one at a time.
#[instrument(skip_all, fields(symbols = symbols.len(), timeframe = %config.timeframe))]
pub async fn get_price_data<S: AsRef<str>>(
    registry: &mut ExchangeRegistry,
    symbols: &[S],
    exchanges: &[ExchangeRef],
    config: &FetchConfig,
) -> PriceData {
    let mut unique: Vec<&str> = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let symbol: &str = symbol.as_ref();
        if !unique.contains(&symbol) {
            unique.push(symbol);
        }
    }

    let cache = SeriesCache::from_config(config);
    let mut data = PriceData::default();
    for exchange in registry.get_exchanges(exchanges).await.into_values() {
        let mut table = Table::new();
        let mut statuses = IndexMap::with_capacity(unique.len());
        for symbol in &unique {
            let outcome = fetch_symbol_series(&exchange, symbol, &cache, config).await;
            statuses.insert(symbol.to_string(), outcome.status());
            if let Some(series) = outcome.into_series() {
                // symbols are unique, so the column cannot exist yet
                if let Err(e) = table.join_series(&series) {
                    warn!("Dropping {symbol} for {}: {e}", exchange.id());
                }
            }
        }
        data.tables.insert(exchange.id().to_string(), table);
        data.statuses.insert(exchange.id().to_string(), statuses);
    }
    data
}
