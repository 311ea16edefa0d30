//! Options for price fetching.
//!
//! [`FetchConfig`] is the key/value mapping accepted by
//! [`get_price_data`](crate::prices::get_price_data). Every key is optional:
//!
//! | key | default | meaning |
//! |---|---|---|
//! | `cache_dir` | `""` | directory holding cache files; empty means the working directory |
//! | `timeframe` | `"1d"` | candle bucket, any value the connector accepts (`"1w"`, `"4h"`, ...) |
//! | `cache_ttl_secs` | none | age after which a cache entry is refetched; none keeps entries forever |
//!
//! The same shape can be loaded from a TOML file with [`FetchConfig::load_path`].

use std::path::{Path, PathBuf};

use chrono::TimeDelta;
use exchange_connector::Timeframe;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not valid TOML or has values of the wrong type.
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Price-fetch options; see the module docs for the keys.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Directory for cache files.
    pub cache_dir: PathBuf,
    /// Candle bucket requested from the exchanges.
    pub timeframe: Timeframe,
    /// Maximum cache entry age in seconds.
    pub cache_ttl_secs: Option<u64>,
}

impl FetchConfig {
    /// Cache entry lifetime, `None` when entries never expire.
    pub fn cache_ttl(&self) -> Option<TimeDelta> {
        self.cache_ttl_secs.map(|secs| {
            i64::try_from(secs)
                .ok()
                .and_then(TimeDelta::try_seconds)
                .unwrap_or(TimeDelta::MAX)
        })
    }

    /// Parses a configuration from TOML text.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Reads and parses a TOML configuration file.
    pub fn load_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}
