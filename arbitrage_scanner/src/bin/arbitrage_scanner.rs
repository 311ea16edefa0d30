use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use arbitrage_scanner::{
    ExchangeRef, ExchangeRegistry, FetchConfig, get_current_best_price, get_price_data,
    merge_tables_on_column,
    plot::{HeatmapOptions, LineChartOptions, correlation_heatmap, line_chart},
};
use clap::{Args, Parser, Subcommand};
use exchange_connector::Timeframe;
use tracing::info;
use tracing_subscriber::{EnvFilter, prelude::*};

#[derive(Parser)]
#[command(version, about = "Cross-exchange price scanner")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Args)]
struct GlobalArgs {
    /// TOML file with cache_dir, timeframe and cache_ttl_secs
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    #[arg(long, global = true, value_name = "DIR")]
    cache_dir: Option<PathBuf>,
    #[arg(long, global = true, value_name = "TF")]
    timeframe: Option<Timeframe>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Load exchanges and list their market counts
    Exchanges { ids: Vec<String> },
    /// Print symbols listed on at least two exchanges
    Symbols { ids: Vec<String> },
    /// Fetch closing prices into one table per exchange
    Prices {
        #[arg(long, value_delimiter = ',', required = true)]
        symbols: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        exchanges: Vec<String>,
        /// Write a line chart per exchange, prefixed with the exchange id
        #[arg(long, value_name = "FILE")]
        chart: Option<PathBuf>,
        /// Write a correlation heatmap per exchange, prefixed with the exchange id
        #[arg(long, value_name = "FILE")]
        heatmap: Option<PathBuf>,
    },
    /// Chart one symbol's close across exchanges
    Compare {
        #[arg(long)]
        symbol: String,
        #[arg(long, value_delimiter = ',', required = true)]
        exchanges: Vec<String>,
        #[arg(long, value_name = "FILE")]
        out: PathBuf,
    },
    /// Print best bid, ask and spread
    Quotes {
        #[arg(long)]
        exchange: String,
        #[arg(long, value_delimiter = ',', required = true)]
        symbols: Vec<String>,
    },
}

impl GlobalArgs {
    fn fetch_config(&self) -> Result<FetchConfig> {
        let mut config = match &self.config {
            Some(path) => FetchConfig::load_path(path)?,
            None => FetchConfig::default(),
        };
        if let Some(dir) = &self.cache_dir {
            config.cache_dir = dir.clone();
        }
        if let Some(timeframe) = self.timeframe {
            config.timeframe = timeframe;
        }
        Ok(config)
    }
}

fn refs(ids: &[String]) -> Vec<ExchangeRef> {
    ids.iter().map(|id| ExchangeRef::from(id.as_str())).collect()
}

/// `charts/prices.html` for `binance` becomes `charts/binance-prices.html`.
fn prefixed(path: &Path, exchange: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "chart.html".into());
    path.with_file_name(format!("{exchange}-{name}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.global.fetch_config()?;
    let mut registry = ExchangeRegistry::new();

    match cli.cmd {
        Cmd::Exchanges { ids } => {
            let report = registry.load(&refs(&ids)).await;
            for id in registry.ids() {
                if let Some(handle) = registry.get(id) {
                    println!("{id}\t{} markets", handle.markets().len());
                }
            }
            for failure in &report.failed {
                println!("{}\tfailed: {}", failure.id, failure.error);
            }
        }
        Cmd::Symbols { ids } => {
            for symbol in registry.get_arbitrage_symbols(&refs(&ids)).await {
                println!("{symbol}");
            }
        }
        Cmd::Prices {
            symbols,
            exchanges,
            chart,
            heatmap,
        } => {
            let data = get_price_data(&mut registry, &symbols, &refs(&exchanges), &config).await;
            for (exchange, statuses) in &data.statuses {
                for (symbol, status) in statuses {
                    println!("{exchange}\t{symbol}\t{status:?}");
                }
            }
            for (exchange, table) in &data.tables {
                info!("{exchange}: {} rows x {} columns", table.n_rows(), table.n_columns());
                if let Some(path) = &chart {
                    let options = LineChartOptions {
                        title: Some(format!("{exchange} close ({})", config.timeframe)),
                        separate_y_axis: true,
                        hidden: false,
                    };
                    let out = prefixed(path, exchange);
                    line_chart(table, &options)
                        .write_html(&out)
                        .with_context(|| format!("writing {}", out.display()))?;
                }
                if let Some(path) = &heatmap {
                    let options = HeatmapOptions {
                        title: Some(format!("{exchange} close correlation")),
                        clamp: true,
                    };
                    let out = prefixed(path, exchange);
                    correlation_heatmap(table, &options)?
                        .write_html(&out)
                        .with_context(|| format!("writing {}", out.display()))?;
                }
            }
        }
        Cmd::Compare {
            symbol,
            exchanges,
            out,
        } => {
            let data = get_price_data(&mut registry, &[&symbol], &refs(&exchanges), &config).await;
            let with_column: Vec<(&str, _)> = data
                .tables
                .iter()
                .filter(|(_, table)| table.has_column(&symbol))
                .map(|(id, table)| (id.as_str(), table))
                .collect();
            if with_column.is_empty() {
                bail!("no exchange returned prices for {symbol}");
            }
            let labels: Vec<&str> = with_column.iter().map(|(id, _)| *id).collect();
            let tables: Vec<_> = with_column.iter().map(|(_, table)| *table).collect();
            let merged = merge_tables_on_column(&tables, &labels, &symbol)?;

            let options = LineChartOptions {
                title: Some(format!("{symbol} close by exchange")),
                ..Default::default()
            };
            line_chart(&merged, &options)
                .write_html(&out)
                .with_context(|| format!("writing {}", out.display()))?;
            println!("{}", out.display());
        }
        Cmd::Quotes { exchange, symbols } => {
            registry.load(&refs(std::slice::from_ref(&exchange))).await;
            let Some(handle) = registry.get(&exchange) else {
                bail!("exchange {exchange} could not be loaded");
            };
            let prices = get_current_best_price(handle, &symbols).await?;
            for (symbol, price) in prices {
                println!("{symbol}\t{}", serde_json::to_string(&price)?);
            }
        }
    }

    Ok(())
}
