//! Loaded exchange connectors and their market metadata.
//!
//! An [`ExchangeRegistry`] owns every connector that has been constructed and
//! had its markets loaded during the process lifetime. Loading is lazy and
//! additive: asking for an exchange that is already present is free, and an
//! exchange that fails to construct or to load markets is skipped without a
//! partial record, so it will be attempted again on the next request.

use std::{fmt, sync::Arc};

use exchange_connector::{
    ConnectorError, ConnectorInitError, Exchange, Markets, build_exchange, exchanges,
};
use indexmap::IndexMap;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::symbols::arbitrage_symbols;

/// Builds connectors from exchange ids.
///
/// The registry only talks to connectors through this trait, so tests can
/// swap the network-backed catalog for in-memory fakes.
pub trait ExchangeFactory: Send + Sync {
    /// Ids attempted when a caller does not name any exchange.
    fn known_ids(&self) -> Vec<String>;

    /// Constructs the connector for `id`.
    fn create(&self, id: &str) -> Result<Arc<dyn Exchange>, ConnectorInitError>;
}

/// Factory backed by the connectors built into `exchange_connector`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CatalogFactory;

impl ExchangeFactory for CatalogFactory {
    fn known_ids(&self) -> Vec<String> {
        exchanges().iter().map(|id| id.to_string()).collect()
    }

    fn create(&self, id: &str) -> Result<Arc<dyn Exchange>, ConnectorInitError> {
        build_exchange(id).map(Arc::from)
    }
}

/// A requested exchange: either an id for the factory or a ready connector.
#[derive(Clone)]
pub enum ExchangeRef {
    /// Lowercase exchange id, e.g. `"binance"`.
    Id(String),
    /// Connector constructed by the caller.
    Connector(Arc<dyn Exchange>),
}

impl ExchangeRef {
    /// The exchange id this reference resolves to.
    pub fn id(&self) -> &str {
        match self {
            ExchangeRef::Id(id) => id,
            ExchangeRef::Connector(connector) => connector.id(),
        }
    }
}

impl fmt::Debug for ExchangeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeRef::Id(id) => f.debug_tuple("Id").field(id).finish(),
            ExchangeRef::Connector(connector) => {
                f.debug_tuple("Connector").field(&connector.id()).finish()
            }
        }
    }
}

impl From<&str> for ExchangeRef {
    fn from(id: &str) -> Self {
        ExchangeRef::Id(id.to_string())
    }
}

impl From<String> for ExchangeRef {
    fn from(id: String) -> Self {
        ExchangeRef::Id(id)
    }
}

impl From<Arc<dyn Exchange>> for ExchangeRef {
    fn from(connector: Arc<dyn Exchange>) -> Self {
        ExchangeRef::Connector(connector)
    }
}

/// A connector together with the markets it reported when loaded.
///
/// Cloning is cheap; clones share the connector and the market table.
#[derive(Clone)]
pub struct ExchangeHandle {
    connector: Arc<dyn Exchange>,
    markets: Arc<Markets>,
}

impl ExchangeHandle {
    /// Wraps a connector whose markets have already been fetched.
    pub fn new(connector: Arc<dyn Exchange>, markets: Markets) -> Self {
        Self {
            connector,
            markets: Arc::new(markets),
        }
    }

    /// Exchange id.
    pub fn id(&self) -> &str {
        self.connector.id()
    }

    /// The underlying connector.
    pub fn connector(&self) -> &dyn Exchange {
        self.connector.as_ref()
    }

    /// Market metadata keyed by unified symbol.
    pub fn markets(&self) -> &Markets {
        &self.markets
    }

    /// Listed symbols in venue order.
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.markets.keys().map(String::as_str)
    }

    /// `true` when the exchange lists `symbol`.
    pub fn has_symbol(&self, symbol: &str) -> bool {
        self.markets.contains_key(symbol)
    }
}

impl fmt::Debug for ExchangeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeHandle")
            .field("id", &self.id())
            .field("markets", &self.markets.len())
            .finish()
    }
}

/// Why an exchange could not be added to the registry.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The connector could not be constructed.
    #[error(transparent)]
    Init(#[from] ConnectorInitError),

    /// The connector failed to return its market listing.
    #[error("failed to load markets: {0}")]
    Markets(#[from] ConnectorError),
}

/// An exchange skipped during [`ExchangeRegistry::load`].
#[derive(Debug)]
pub struct LoadFailure {
    /// Requested exchange id.
    pub id: String,
    /// Cause of the failure.
    pub error: LoadError,
}

/// Outcome of one [`ExchangeRegistry::load`] call.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Ids newly added by this call.
    pub loaded: Vec<String>,
    /// Exchanges that were requested but skipped.
    pub failed: Vec<LoadFailure>,
}

/// Process-lifetime cache of loaded exchanges, keyed by id in load order.
pub struct ExchangeRegistry {
    factory: Box<dyn ExchangeFactory>,
    exchanges: IndexMap<String, ExchangeHandle>,
}

impl Default for ExchangeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExchangeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeRegistry")
            .field("exchanges", &self.exchanges)
            .finish_non_exhaustive()
    }
}

impl ExchangeRegistry {
    /// Empty registry using the built-in connector catalog.
    pub fn new() -> Self {
        Self::with_factory(CatalogFactory)
    }

    /// Empty registry using a custom connector factory.
    pub fn with_factory(factory: impl ExchangeFactory + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            exchanges: IndexMap::new(),
        }
    }

    /// A loaded exchange by id.
    pub fn get(&self, id: &str) -> Option<&ExchangeHandle> {
        self.exchanges.get(id)
    }

    /// Number of loaded exchanges.
    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    /// `true` when nothing has been loaded yet.
    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    /// Ids of the loaded exchanges in load order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.exchanges.keys().map(String::as_str)
    }

    /// Loads every requested exchange that is not present yet.
    ///
    /// An empty `requested` slice means every id the factory knows. Failures
    /// are logged and collected in the report; they never abort the loop.
    #[instrument(skip_all, fields(requested = requested.len()))]
    pub async fn load(&mut self, requested: &[ExchangeRef]) -> LoadReport {
        let requested: Vec<ExchangeRef> = if requested.is_empty() {
            self.factory
                .known_ids()
                .into_iter()
                .map(ExchangeRef::Id)
                .collect()
        } else {
            requested.to_vec()
        };

        let mut report = LoadReport::default();
        for exchange in requested {
            let id = exchange.id().to_string();
            if self.exchanges.contains_key(&id) {
                continue;
            }
            match self.load_one(exchange).await {
                Ok(handle) => {
                    info!("Loaded {} markets from {}", handle.markets().len(), handle.id());
                    let key = handle.id().to_string();
                    self.exchanges.insert(key.clone(), handle);
                    report.loaded.push(key);
                }
                Err(error) => {
                    warn!("Skipping exchange {id}: {error}");
                    report.failed.push(LoadFailure { id, error });
                }
            }
        }
        report
    }

    async fn load_one(&self, exchange: ExchangeRef) -> Result<ExchangeHandle, LoadError> {
        let connector = match exchange {
            ExchangeRef::Id(id) => self.factory.create(&id)?,
            ExchangeRef::Connector(connector) => connector,
        };
        let markets = connector.load_markets().await?;
        Ok(ExchangeHandle::new(connector, markets))
    }

    /// Ensures the requested exchanges are loaded and returns a copy of the
    /// whole registry, including exchanges loaded by earlier calls.
    pub async fn get_exchanges(
        &mut self,
        requested: &[ExchangeRef],
    ) -> IndexMap<String, ExchangeHandle> {
        self.load(requested).await;
        self.exchanges.clone()
    }

    /// Handles for the requested exchanges that loaded successfully, in
    /// request order. An empty slice selects the whole registry.
    pub(crate) async fn resolve(&mut self, requested: &[ExchangeRef]) -> Vec<ExchangeHandle> {
        let all = self.get_exchanges(requested).await;
        if requested.is_empty() {
            return all.into_values().collect();
        }
        let mut handles: Vec<ExchangeHandle> = Vec::with_capacity(requested.len());
        for exchange in requested {
            let Some(handle) = all.get(exchange.id()) else {
                continue;
            };
            if !handles.iter().any(|h| h.id() == handle.id()) {
                handles.push(handle.clone());
            }
        }
        handles
    }

    /// Symbols listed on at least two of the requested exchanges.
    ///
    /// See [`arbitrage_symbols`] for the ordering rules.
    #[instrument(skip_all)]
    pub async fn get_arbitrage_symbols(&mut self, requested: &[ExchangeRef]) -> Vec<String> {
        let handles = self.resolve(requested).await;
        arbitrage_symbols(&handles)
    }
}
