//! Cross-exchange price collection for spotting arbitrage candidates.
//!
//! The crate loads exchange connectors into an [`ExchangeRegistry`], finds the
//! symbols listed on at least two of them, downloads closing-price history per
//! (exchange, symbol) with an on-disk cache, and joins the series into
//! per-exchange [`Table`]s that the [`plot`] helpers can render.
//!
//! ```no_run
//! # async fn run() {
//! use arbitrage_scanner::{ExchangeRef, ExchangeRegistry, FetchConfig, get_price_data};
//!
//! let mut registry = ExchangeRegistry::new();
//! let exchanges: [ExchangeRef; 2] = ["binance".into(), "bybit".into()];
//! let symbols = registry.get_arbitrage_symbols(&exchanges).await;
//!
//! let config = FetchConfig { cache_dir: "cache".into(), ..Default::default() };
//! let data = get_price_data(&mut registry, &symbols, &exchanges, &config).await;
//! for (exchange, table) in &data.tables {
//!     println!("{exchange}: {} rows x {} columns", table.n_rows(), table.n_columns());
//! }
//! # }
//! ```

#![warn(missing_docs)]

pub mod cache;
pub mod config;
pub mod plot;
pub mod prices;
pub mod quotes;
pub mod registry;
pub mod series;
pub mod symbols;
pub mod table;

pub use cache::SeriesCache;
pub use config::FetchConfig;
pub use prices::{PriceData, SeriesOutcome, SymbolStatus, get_price_data};
pub use quotes::{BestPrice, get_current_best_price};
pub use registry::{ExchangeHandle, ExchangeRef, ExchangeRegistry};
pub use series::PriceSeries;
pub use symbols::arbitrage_symbols;
pub use table::{Table, TableError, merge_series, merge_tables_on_column};
