//! Closing-price history for one (exchange, symbol) pair.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use exchange_connector::Candle;

/// A named, time-indexed sequence of closing prices.
///
/// The index is strictly increasing: inserting a timestamp twice keeps the
/// last value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PriceSeries {
    name: String,
    points: BTreeMap<DateTime<Utc>, f64>,
}

impl PriceSeries {
    /// Creates an empty series.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            points: BTreeMap::new(),
        }
    }

    /// Creates a series from (timestamp, value) pairs in any order.
    pub fn from_points(
        name: impl Into<String>,
        points: impl IntoIterator<Item = (DateTime<Utc>, f64)>,
    ) -> Self {
        Self {
            name: name.into(),
            points: points.into_iter().collect(),
        }
    }

    /// Keeps the close of each candle, indexed by its open time.
    ///
    /// Candles whose epoch-millisecond timestamp is out of chrono's range are
    /// dropped.
    pub fn from_candles(name: impl Into<String>, candles: &[Candle]) -> Self {
        Self::from_points(
            name,
            candles
                .iter()
                .filter_map(|candle| Some((candle.datetime()?, candle.close))),
        )
    }

    /// The series name, normally the symbol.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the same points under another name.
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// `true` when the series has no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Value at `timestamp`, if any.
    pub fn get(&self, timestamp: &DateTime<Utc>) -> Option<f64> {
        self.points.get(timestamp).copied()
    }

    /// Timestamps in increasing order.
    pub fn index(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        self.points.keys().copied()
    }

    /// Values in index order.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.values().copied()
    }

    /// (timestamp, value) pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (DateTime<Utc>, f64)> + '_ {
        self.points.iter().map(|(ts, value)| (*ts, *value))
    }
}
