//! Canonical in-memory representation of an OHLCV candle.
//!
//! This struct is the standard output of [`Exchange::fetch_ohlcv`](crate::providers::Exchange::fetch_ohlcv)
//! for every connector, whatever the venue's wire format looks like.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single OHLCV candle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bucket open time in epoch milliseconds (UTC).
    pub timestamp: i64,

    /// Opening price.
    pub open: f64,

    /// Highest price during the bucket.
    pub high: f64,

    /// Lowest price during the bucket.
    pub low: f64,

    /// Closing price.
    pub close: f64,

    /// Base volume traded during the bucket.
    pub volume: f64,
}

impl Candle {
    /// Bucket open time as a calendar timestamp, `None` when out of range.
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

/// Builds a candle from a `[timestamp_ms, open, high, low, close, volume]` row.
impl From<[f64; 6]> for Candle {
    fn from(row: [f64; 6]) -> Self {
        Self {
            timestamp: row[0] as i64,
            open: row[1],
            high: row[2],
            low: row[3],
            close: row[4],
            volume: row[5],
        }
    }
}
