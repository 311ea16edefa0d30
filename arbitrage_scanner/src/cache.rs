//! On-disk cache of downloaded price series.
//!
//! One file per (exchange, symbol) pair lives at
//! `{cache_dir}/{exchange}-{symbol}.pkl`, with every `/` in the name replaced
//! by `-` (`binance-BTC-USDT.pkl`). Files hold a bincode-encoded
//! [`CacheEntry`] that records the format version and the timeframe it was
//! downloaded at. Anything that makes an entry unusable (missing file,
//! corrupt bytes, another format version, another timeframe, too old) is
//! treated as a miss, never as an error.

use std::{
    future::Future,
    io,
    path::{Path, PathBuf},
};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{config::FetchConfig, series::PriceSeries};

/// Version written into every entry; entries with another version are misses.
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// Errors raised while reading or writing a cache file.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem failure.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// File or directory being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The entry could not be serialized.
    #[error("failed to encode cache entry: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    /// The file content is not a valid entry.
    #[error("failed to decode cache entry: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    /// The file was written by an incompatible format version.
    #[error("cache format version {found}, expected {expected}")]
    Version {
        /// Version stored in the file.
        found: u32,
        /// Version this build writes.
        expected: u32,
    },
}

/// Serialized form of one cached series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Format version, see [`CACHE_FORMAT_VERSION`].
    pub version: u32,
    /// Exchange id.
    pub exchange: String,
    /// Unified symbol.
    pub symbol: String,
    /// Timeframe string the candles were requested at.
    pub timeframe: String,
    /// Download time in epoch milliseconds.
    pub fetched_at_ms: i64,
    /// `(epoch_ms, close)` pairs in index order.
    pub points: Vec<(i64, f64)>,
}

impl CacheEntry {
    fn from_series(exchange: &str, timeframe: &str, series: &PriceSeries) -> Self {
        Self {
            version: CACHE_FORMAT_VERSION,
            exchange: exchange.to_string(),
            symbol: series.name().to_string(),
            timeframe: timeframe.to_string(),
            fetched_at_ms: Utc::now().timestamp_millis(),
            points: series
                .iter()
                .map(|(ts, close)| (ts.timestamp_millis(), close))
                .collect(),
        }
    }

    /// Rebuilds the series; points with out-of-range timestamps are dropped.
    pub fn to_series(&self) -> PriceSeries {
        PriceSeries::from_points(
            self.symbol.as_str(),
            self.points
                .iter()
                .filter_map(|(ms, close)| Some((DateTime::from_timestamp_millis(*ms)?, *close))),
        )
    }

    fn fetched_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.fetched_at_ms)
    }
}

/// Whether [`SeriesCache::get_or_fetch`] served the series from disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Read from an existing cache file.
    Hit,
    /// Produced by the fetch closure.
    Miss,
}

/// Directory-backed series cache.
#[derive(Debug, Clone, Default)]
pub struct SeriesCache {
    dir: PathBuf,
    ttl: Option<TimeDelta>,
}

impl SeriesCache {
    /// Cache rooted at `dir`; an empty path means the working directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ttl: None,
        }
    }

    /// Entries older than `ttl` become misses.
    pub fn with_ttl(mut self, ttl: TimeDelta) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Cache configured from `cache_dir` and `cache_ttl_secs`.
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            dir: config.cache_dir.clone(),
            ttl: config.cache_ttl(),
        }
    }

    /// Directory holding the cache files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for a pair, e.g. `binance-BTC-USDT.pkl`.
    pub fn file_name(exchange: &str, symbol: &str) -> String {
        format!("{exchange}-{symbol}.pkl").replace('/', "-")
    }

    /// Full path of the cache file for a pair.
    pub fn path_for(&self, exchange: &str, symbol: &str) -> PathBuf {
        self.dir.join(Self::file_name(exchange, symbol))
    }

    /// Reads a cached series downloaded at `timeframe`, `None` on any miss.
    pub fn load(&self, exchange: &str, symbol: &str, timeframe: &str) -> Option<PriceSeries> {
        let path = self.path_for(exchange, symbol);
        let entry = match read_entry(&path) {
            Ok(entry) => entry,
            Err(CacheError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                debug!("Cache miss for {exchange} {symbol}: no file at {}", path.display());
                return None;
            }
            Err(e) => {
                warn!("Ignoring unreadable cache file {}: {e}", path.display());
                return None;
            }
        };

        if entry.exchange != exchange || entry.symbol != symbol {
            debug!(
                "Cache miss for {exchange} {symbol}: {} holds {} {}",
                path.display(),
                entry.exchange,
                entry.symbol
            );
            return None;
        }
        if entry.timeframe != timeframe {
            debug!(
                "Cache miss for {exchange} {symbol}: stored timeframe {} != {timeframe}",
                entry.timeframe
            );
            return None;
        }
        if let Some(ttl) = self.ttl {
            let expired = entry
                .fetched_at()
                .is_none_or(|fetched| Utc::now() - fetched > ttl);
            if expired {
                debug!("Cache miss for {exchange} {symbol}: entry expired");
                return None;
            }
        }

        debug!("Cache hit for {exchange} {symbol} ({} points)", entry.points.len());
        Some(entry.to_series())
    }

    /// Writes `series` as the entry for (`exchange`, `series.name()`),
    /// creating the directory if needed and replacing any previous file.
    pub fn store(
        &self,
        exchange: &str,
        timeframe: &str,
        series: &PriceSeries,
    ) -> Result<PathBuf, CacheError> {
        let path = self.path_for(exchange, series.name());
        write_entry(&path, &CacheEntry::from_series(exchange, timeframe, series))?;
        debug!("Cached {} points at {}", series.len(), path.display());
        Ok(path)
    }

    /// Returns the cached series for the pair, or runs `fetch` and caches
    /// its result.
    ///
    /// Errors from `fetch` are returned untouched. A failed cache write is
    /// logged and the fetched series is still returned.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        exchange: &str,
        symbol: &str,
        timeframe: &str,
        fetch: F,
    ) -> Result<(PriceSeries, CacheStatus), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<PriceSeries, E>>,
    {
        if let Some(series) = self.load(exchange, symbol, timeframe) {
            return Ok((series, CacheStatus::Hit));
        }

        let series = fetch().await?.renamed(symbol);
        if let Err(e) = self.store(exchange, timeframe, &series) {
            warn!("Failed to cache {exchange} {symbol}: {e}");
        }
        Ok((series, CacheStatus::Miss))
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> CacheError + '_ {
    move |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Reads and decodes an entry, checking its format version.
pub fn read_entry(path: &Path) -> Result<CacheEntry, CacheError> {
    let bytes = std::fs::read(path).map_err(io_error(path))?;
    let (entry, _): (CacheEntry, usize) =
        bincode::serde::decode_from_slice(&bytes, bincode::config::standard())?;
    if entry.version != CACHE_FORMAT_VERSION {
        return Err(CacheError::Version {
            found: entry.version,
            expected: CACHE_FORMAT_VERSION,
        });
    }
    Ok(entry)
}

/// Encodes and writes an entry through a temporary file and a rename.
pub fn write_entry(path: &Path, entry: &CacheEntry) -> Result<(), CacheError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_error(parent))?;
    }
    let bytes = bincode::serde::encode_to_vec(entry, bincode::config::standard())?;
    let tmp = path.with_extension("pkl.tmp");
    std::fs::write(&tmp, bytes).map_err(io_error(&tmp))?;
    std::fs::rename(&tmp, path).map_err(io_error(path))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use tempfile::TempDir;

    use super::*;

    fn sample() -> PriceSeries {
        PriceSeries::from_points(
            "BTC/USDT",
            [
                (Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap(), 105.0),
                (Utc.with_ymd_and_hms(1970, 1, 2, 0, 0, 0).unwrap(), 110.0),
            ],
        )
    }

    #[test]
    fn file_names_replace_slashes() {
        assert_eq!(SeriesCache::file_name("binance", "BTC/USDT"), "binance-BTC-USDT.pkl");
        assert_eq!(
            SeriesCache::new("").path_for("bybit", "ETH/BTC"),
            PathBuf::from("bybit-ETH-BTC.pkl")
        );
        assert_eq!(
            SeriesCache::new("/tmp/cache").path_for("bybit", "ETH/BTC"),
            PathBuf::from("/tmp/cache/bybit-ETH-BTC.pkl")
        );
    }

    #[test]
    fn store_then_load_returns_the_series() {
        let dir = TempDir::new().unwrap();
        let cache = SeriesCache::new(dir.path().join("nested"));
        let path = cache.store("binance", "1d", &sample()).unwrap();

        assert!(path.ends_with("binance-BTC-USDT.pkl"));
        assert_eq!(cache.load("binance", "BTC/USDT", "1d"), Some(sample()));
    }

    #[test]
    fn other_timeframe_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let cache = SeriesCache::new(dir.path());
        cache.store("binance", "1d", &sample()).unwrap();
        assert_eq!(cache.load("binance", "BTC/USDT", "1w"), None);
    }

    #[test]
    fn colliding_file_name_of_another_pair_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let cache = SeriesCache::new(dir.path());
        let dashed = sample().renamed("BTC-USDT");
        cache.store("binance", "1d", &dashed).unwrap();

        assert_eq!(
            cache.path_for("binance", "BTC/USDT"),
            cache.path_for("binance", "BTC-USDT")
        );
        assert_eq!(cache.load("binance", "BTC/USDT", "1d"), None);
        assert_eq!(cache.load("binance", "BTC-USDT", "1d"), Some(dashed));
    }

    #[test]
    fn corrupt_and_foreign_versions_are_misses() {
        let dir = TempDir::new().unwrap();
        let cache = SeriesCache::new(dir.path());
        let path = cache.path_for("binance", "BTC/USDT");

        std::fs::write(&path, b"\x80\x04not bincode").unwrap();
        assert_eq!(cache.load("binance", "BTC/USDT", "1d"), None);

        let mut entry = CacheEntry::from_series("binance", "1d", &sample());
        entry.version = CACHE_FORMAT_VERSION + 1;
        write_entry(&path, &entry).unwrap();
        assert!(matches!(read_entry(&path), Err(CacheError::Version { .. })));
        assert_eq!(cache.load("binance", "BTC/USDT", "1d"), None);
    }

    #[test]
    fn expired_entries_are_misses() {
        let dir = TempDir::new().unwrap();
        let cache = SeriesCache::new(dir.path()).with_ttl(TimeDelta::hours(1));
        let path = cache.path_for("binance", "BTC/USDT");

        let mut entry = CacheEntry::from_series("binance", "1d", &sample());
        write_entry(&path, &entry).unwrap();
        assert!(cache.load("binance", "BTC/USDT", "1d").is_some());

        entry.fetched_at_ms -= TimeDelta::hours(2).num_milliseconds();
        write_entry(&path, &entry).unwrap();
        assert_eq!(cache.load("binance", "BTC/USDT", "1d"), None);
    }

    #[tokio::test]
    async fn get_or_fetch_only_fetches_on_miss() {
        let dir = TempDir::new().unwrap();
        let cache = SeriesCache::new(dir.path());
        let mut calls = 0;

        for expected in [CacheStatus::Miss, CacheStatus::Hit] {
            let (series, status) = cache
                .get_or_fetch("binance", "BTC/USDT", "1d", || {
                    calls += 1;
                    async { Ok::<_, std::convert::Infallible>(sample()) }
                })
                .await
                .unwrap();
            assert_eq!(status, expected);
            assert_eq!(series, sample());
        }
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn unwritable_cache_still_returns_the_download() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();
        let cache = SeriesCache::new(&blocker);

        let (series, status) = cache
            .get_or_fetch("binance", "BTC/USDT", "1d", || async {
                Ok::<_, std::convert::Infallible>(sample())
            })
            .await
            .unwrap();
        assert_eq!(status, CacheStatus::Miss);
        assert_eq!(series, sample());
    }
}
